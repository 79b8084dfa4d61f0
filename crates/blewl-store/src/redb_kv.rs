use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, StorageError, Table, TableDefinition};
use tracing::debug;

use crate::error::KvError;
use crate::kv::KvStore;

/// All namespaces share one table; the namespace is part of the key.
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blewl");

type BlobTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

/// Durable engine on a single redb file.
///
/// Each `set`/`delete` commits its own write transaction, so after a crash a
/// key holds either the previous or the new blob. An uncommitted transaction
/// is rolled back on drop, including on the error paths below.
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
    path: Arc<PathBuf>,
}

impl RedbKv {
    /// Open the database file at `path`, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let db = Database::create(path).map_err(KvError::open)?;
        let kv = Self {
            db: Arc::new(db),
            path: Arc::new(path.to_path_buf()),
        };

        // A fresh file has no table yet; create it so reads see "absent"
        kv.update(|_| Ok(())).map_err(|e| match e {
            KvError::Write(reason) => KvError::Open(reason),
            other => other,
        })?;

        debug!(path = %path.display(), "Opened redb store");
        Ok(kv)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the blob table inside one committed write transaction.
    fn update<F>(&self, f: F) -> Result<(), KvError>
    where
        F: FnOnce(&mut BlobTable<'_>) -> Result<(), StorageError>,
    {
        let txn = self.db.begin_write().map_err(KvError::write)?;
        {
            let mut table = txn.open_table(BLOBS).map_err(KvError::write)?;
            f(&mut table).map_err(KvError::write)?;
        }
        txn.commit().map_err(KvError::write)
    }
}

impl std::fmt::Debug for RedbKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKv")
            .field("path", &self.path.display())
            .finish_non_exhaustive()
    }
}

impl KvStore for RedbKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let txn = self.db.begin_read().map_err(KvError::read)?;
        let table = txn.open_table(BLOBS).map_err(KvError::read)?;
        let blob = table.get(key).map_err(KvError::read)?;
        Ok(blob.map(|guard| guard.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.update(|table| table.insert(key, value).map(|_| ()))
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        self.update(|table| table.remove(key).map(|_| ()))
    }
}
