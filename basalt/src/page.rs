use crate::errors::DbError;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{PageId, RecordId};

/// Number of tuple slots on a page of `page_size` bytes holding records of
/// `tuple_width` bytes each. Every slot costs one header bit on top of its
/// record.
pub fn slots_per_page(page_size: usize, tuple_width: usize) -> usize {
    (page_size * 8) / (tuple_width * 8 + 1)
}

fn header_len(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// A slotted heap page: an occupancy bitmap followed by fixed-width tuple
/// records. Slot `i` maps to bit `i % 8` of header byte `i / 8`.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: TupleDesc,
    page_size: usize,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Decodes a page-sized byte buffer. The buffer becomes the page's
    /// first before-image.
    pub fn parse(pid: PageId, data: &[u8], desc: TupleDesc) -> Result<Self, DbError> {
        let width = desc.width();
        if width == 0 {
            return Err(DbError::Corrupt("zero-width tuple schema".to_string()));
        }
        let num_slots = slots_per_page(data.len(), width);
        let header_bytes = header_len(num_slots);

        let header = data[..header_bytes].to_vec();
        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) != 0 {
                let start = header_bytes + slot * width;
                let mut tuple = Tuple::from_bytes(&desc, &data[start..start + width])?;
                tuple.set_record_id(Some(RecordId::new(pid, slot)));
                slots.push(Some(tuple));
            } else {
                slots.push(None);
            }
        }

        let mut page = Self {
            pid,
            desc,
            page_size: data.len(),
            header,
            slots,
            dirtied_by: None,
            before_image: Vec::new(),
        };
        page.before_image = page.page_data();
        Ok(page)
    }

    /// The image of a page that has never held a tuple, as written when a
    /// heap file grows.
    pub fn empty_data(page_size: usize) -> Vec<u8> {
        vec![0; page_size]
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn empty_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header
            .get(slot / 8)
            .is_some_and(|byte| byte & (1 << (slot % 8)) != 0)
            && slot < self.slots.len()
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    /// Places the tuple into the lowest-numbered empty slot and stamps its
    /// record id. The caller is responsible for marking the page dirty.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId, DbError> {
        if tuple.tuple_desc() != &self.desc || !tuple.conforms() {
            return Err(DbError::SchemaMismatch);
        }
        let Some(slot) = self.slots.iter().position(|slot| slot.is_none()) else {
            crate::basalt_debug_log!(
                "[HeapPage::insert_tuple] no empty slot on page {:?}",
                self.pid
            );
            return Err(DbError::PageFull);
        };
        let rid = RecordId::new(self.pid, slot);
        tuple.set_record_id(Some(rid));
        self.set_slot(slot, true);
        self.slots[slot] = Some(tuple);
        Ok(rid)
    }

    /// Clears the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), DbError> {
        let rid = tuple.record_id().ok_or(DbError::TupleNotOnPage)?;
        if rid.page_id != self.pid || !self.is_slot_used(rid.slot) {
            return Err(DbError::TupleNotOnPage);
        }
        self.set_slot(rid.slot, false);
        self.slots[rid.slot] = None;
        Ok(())
    }

    /// Occupied tuples in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    /// The transaction that last dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// Serializes the page: occupancy header, then each slot's record.
    /// Vacant slots are written as zeros.
    pub fn page_data(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.page_size];
        data[..self.header.len()].copy_from_slice(&self.header);
        let width = self.desc.width();
        for (slot, tuple) in self.slots.iter().enumerate() {
            if let Some(tuple) = tuple {
                let start = self.header.len() + slot * width;
                tuple.write_bytes(&mut data[start..start + width]);
            }
        }
        data
    }

    /// The byte snapshot taken when the page was loaded or last flushed.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }
}
