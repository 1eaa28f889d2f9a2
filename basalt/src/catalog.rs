//! The table registry: resolves table ids to their backing files.

use crate::errors::DbError;
use crate::heap_file::{DbFile, HeapFile};
use crate::tuple::TupleDesc;
use crate::TableId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

struct CatalogInner {
    files: HashMap<TableId, Arc<dyn DbFile>>,
    next_table_id: TableId,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner {
                files: HashMap::new(),
                next_table_id: 1,
            }),
        }
    }

    /// Registers an existing file under its own id. For heap files that is
    /// the stable hash of their path, so re-registering the same path
    /// replaces the previous entry.
    pub fn register(&self, file: Arc<dyn DbFile>) -> TableId {
        let id = file.id();
        self.inner.write().files.insert(id, file);
        id
    }

    /// Creates (or reopens) a heap file under a catalog-assigned id and
    /// registers it.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        desc: TupleDesc,
    ) -> io::Result<Arc<HeapFile>> {
        let mut inner = self.inner.write();
        let id = inner.next_table_id;
        inner.next_table_id += 1;
        let file = Arc::new(HeapFile::with_id(path, desc, id)?);
        inner.files.insert(id, file.clone());
        Ok(file)
    }

    pub fn file(&self, table_id: TableId) -> Result<Arc<dyn DbFile>, DbError> {
        self.inner
            .read()
            .files
            .get(&table_id)
            .cloned()
            .ok_or(DbError::MissingTable(table_id))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
