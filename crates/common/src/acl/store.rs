use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::audit::AuditLog;
use super::principal::PrincipalTable;
use super::resource::ResourceTable;
use super::{PersistError, DEFAULT_TABLE_CAPACITY};

/// Process-wide authorization state
///
/// Owns the principal table and the resource table behind their own
/// mutexes, plus the audit log. One `Store` is built at startup and an
/// `Arc` of it is threaded into every connection's guard; tests build a
/// store per test.
///
/// Locking discipline: each accessor takes the lock for the duration of
/// one table operation. Guards must never hold a table lock across
/// channel I/O or any other await point.
#[derive(Debug)]
pub struct Store {
    principals: Mutex<PrincipalTable>,
    resources: Mutex<ResourceTable>,
    audit: AuditLog,
}

impl Store {
    /// A store with the default table capacities (250 each).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TABLE_CAPACITY, DEFAULT_TABLE_CAPACITY)
    }

    pub fn with_capacity(principal_capacity: usize, resource_capacity: usize) -> Self {
        Self {
            principals: Mutex::new(PrincipalTable::new(principal_capacity)),
            resources: Mutex::new(ResourceTable::new(resource_capacity)),
            audit: AuditLog::default(),
        }
    }

    /// Lock the principal table. A poisoned lock is recovered: table
    /// operations keep their invariants even when a panicking thread held
    /// the lock.
    pub fn principals(&self) -> MutexGuard<'_, PrincipalTable> {
        self.principals.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the resource table.
    pub fn resources(&self) -> MutexGuard<'_, ResourceTable> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Load both tables from their list files. Missing files are treated
    /// as empty tables so a first boot starts clean.
    pub fn load_from_files(
        &self,
        principals_path: impl AsRef<Path>,
        resources_path: impl AsRef<Path>,
    ) -> Result<(), PersistError> {
        if principals_path.as_ref().exists() {
            self.principals().load_from_file(principals_path)?;
        }
        if resources_path.as_ref().exists() {
            self.resources().load_from_file(resources_path)?;
        }
        Ok(())
    }

    /// Save both tables to their list files.
    pub fn save_to_files(
        &self,
        principals_path: impl AsRef<Path>,
        resources_path: impl AsRef<Path>,
    ) -> Result<(), PersistError> {
        self.principals().save_to_file(principals_path)?;
        self.resources().save_to_file(resources_path)?;
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{PrincipalRecord, ResourceRecord};

    #[test]
    fn test_store_roundtrip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let p_path = dir.path().join("principals.bin");
        let r_path = dir.path().join("resources.bin");

        let store = Store::new();
        store
            .principals()
            .add(PrincipalRecord::new("alice", "ed25519", vec![1]))
            .unwrap();
        let mut doc = ResourceRecord::new("doc1", "file", "/tmp/doc1");
        doc.add_owner("alice");
        store.resources().add(doc).unwrap();

        store.save_to_files(&p_path, &r_path).unwrap();

        let restored = Store::new();
        restored.load_from_files(&p_path, &r_path).unwrap();
        assert!(restored.principals().contains("alice"));
        assert!(restored.resources().contains("doc1"));
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new();
        store
            .load_from_files(dir.path().join("p.bin"), dir.path().join("r.bin"))
            .unwrap();
        assert!(store.principals().is_empty());
        assert!(store.resources().is_empty());
    }
}
