use crate::errors::DbError;
use crate::RecordId;
use std::fmt;
use std::sync::Arc;

/// The closed set of field types a table column can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer, stored as 4 bytes big-endian.
    Int,
    /// Fixed-capacity string: a 4-byte big-endian length prefix followed by
    /// `capacity` payload bytes, space-padded.
    Str(usize),
}

impl FieldType {
    /// Serialized width in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str(capacity) => 4 + capacity,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn matches(&self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (Field::Int(_), FieldType::Int) | (Field::Str(_), FieldType::Str(_))
        )
    }

    fn write(&self, ty: FieldType, out: &mut [u8]) {
        match (self, ty) {
            (Field::Int(value), FieldType::Int) => {
                out[..4].copy_from_slice(&value.to_be_bytes());
            }
            (Field::Str(value), FieldType::Str(capacity)) => {
                let bytes = value.as_bytes();
                let len = bytes.len().min(capacity);
                out[..4].copy_from_slice(&(len as u32).to_be_bytes());
                out[4..4 + len].copy_from_slice(&bytes[..len]);
                for byte in &mut out[4 + len..4 + capacity] {
                    *byte = b' ';
                }
            }
            _ => unreachable!("field value does not match its declared type"),
        }
    }

    fn read(ty: FieldType, data: &[u8]) -> Result<Field, DbError> {
        match ty {
            FieldType::Int => {
                let raw: [u8; 4] = data[..4]
                    .try_into()
                    .map_err(|_| DbError::Corrupt("short integer field".to_string()))?;
                Ok(Field::Int(i32::from_be_bytes(raw)))
            }
            FieldType::Str(capacity) => {
                let raw: [u8; 4] = data[..4]
                    .try_into()
                    .map_err(|_| DbError::Corrupt("short string prefix".to_string()))?;
                let len = (u32::from_be_bytes(raw) as usize).min(capacity);
                let value = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Field::Str(value))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(value) => write!(f, "{value}"),
            Field::Str(value) => write!(f, "{value}"),
        }
    }
}

/// An ordered list of field types with optional column names. Cheap to
/// clone; every tuple carries one.
#[derive(Debug, Clone, Eq)]
pub struct TupleDesc {
    items: Arc<Vec<(FieldType, Option<String>)>>,
}

impl TupleDesc {
    pub fn new(types: Vec<FieldType>) -> Self {
        Self {
            items: Arc::new(types.into_iter().map(|ty| (ty, None)).collect()),
        }
    }

    pub fn with_names(items: Vec<(FieldType, Option<String>)>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.items.get(index).map(|(ty, _)| *ty)
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.items.get(index).and_then(|(_, name)| name.as_deref())
    }

    pub fn types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.items.iter().map(|(ty, _)| *ty)
    }

    /// Total serialized width of one record.
    pub fn width(&self) -> usize {
        self.items.iter().map(|(ty, _)| ty.width()).sum()
    }
}

/// Schema equality ignores column names: two descriptors describe the same
/// physical layout when their type lists agree.
impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.0 == b.0)
    }
}

/// A fixed-width record. Freshly built tuples carry no record id; tuples
/// handed out by an iterator carry the id of their physical slot.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: TupleDesc,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: TupleDesc, fields: Vec<Field>) -> Self {
        Self {
            desc,
            fields,
            record_id: None,
        }
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Whether the field values line up with the declared schema.
    pub fn conforms(&self) -> bool {
        self.fields.len() == self.desc.num_fields()
            && self
                .fields
                .iter()
                .zip(self.desc.types())
                .all(|(field, ty)| field.matches(ty))
    }

    pub(crate) fn write_bytes(&self, out: &mut [u8]) {
        let mut offset = 0;
        for (field, ty) in self.fields.iter().zip(self.desc.types()) {
            field.write(ty, &mut out[offset..offset + ty.width()]);
            offset += ty.width();
        }
    }

    pub fn from_bytes(desc: &TupleDesc, data: &[u8]) -> Result<Tuple, DbError> {
        if data.len() < desc.width() {
            return Err(DbError::Corrupt("truncated tuple record".to_string()));
        }
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for ty in desc.types() {
            fields.push(Field::read(ty, &data[offset..offset + ty.width()])?);
            offset += ty.width();
        }
        Ok(Tuple {
            desc: desc.clone(),
            fields,
            record_id: None,
        })
    }
}
