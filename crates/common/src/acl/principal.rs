use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{PersistError, TableError, LIST_FORMAT_VERSION};

/// A named identity with an authentication credential
///
/// The credential is opaque to the table: for the `ed25519` algorithm tag it
/// is the raw public key bytes, for certificate-based algorithms it is a
/// serialized certificate. The guard compares it bit-for-bit during
/// authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub name: String,
    pub algorithm: String,
    pub credential: Vec<u8>,
}

impl PrincipalRecord {
    pub fn new(name: impl Into<String>, algorithm: impl Into<String>, credential: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            credential,
        }
    }
}

impl fmt::Display for PrincipalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "principal {} alg {} credential {} bytes",
            self.name,
            self.algorithm,
            self.credential.len()
        )
    }
}

/// Serialized form of a principal table: the record sequence plus the
/// manager set, with a format version reserved up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalList {
    pub format_version: u32,
    pub principals: Vec<PrincipalRecord>,
    pub managers: Vec<String>,
}

impl PrincipalList {
    /// Membership probe on the list form, for inspecting a persisted blob
    /// without loading it into a table.
    pub fn contains(&self, name: &str) -> bool {
        self.principals.iter().any(|p| p.name == name)
    }
}

/// Process-wide registry of principals
///
/// Name-keyed ordered map with a bounded capacity and a separate set of
/// manager names. Lookups and mutations take `&self`/`&mut self`; the
/// owning [`Store`](super::Store) serializes access behind a mutex.
#[derive(Debug, Clone)]
pub struct PrincipalTable {
    capacity: usize,
    principals: BTreeMap<String, PrincipalRecord>,
    managers: BTreeSet<String>,
}

impl PrincipalTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            principals: BTreeMap::new(),
            managers: BTreeSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Insert a principal. Fails on a duplicate name or a full table.
    pub fn add(&mut self, record: PrincipalRecord) -> Result<(), TableError> {
        if record.name.is_empty() {
            return Err(TableError::InvalidRecord("empty principal name".into()));
        }
        if self.principals.contains_key(&record.name) {
            return Err(TableError::Duplicate(record.name));
        }
        if self.principals.len() >= self.capacity {
            return Err(TableError::Capacity(self.capacity));
        }
        self.principals.insert(record.name.clone(), record);
        Ok(())
    }

    /// Remove a principal. Fails if absent.
    ///
    /// Existing ACL references to the name are left in place and become
    /// inert; the manager flag is dropped so a later re-add does not
    /// inherit it.
    pub fn delete(&mut self, name: &str) -> Result<(), TableError> {
        if self.principals.remove(name).is_none() {
            return Err(TableError::NotFound(name.to_string()));
        }
        self.managers.remove(name);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&PrincipalRecord> {
        self.principals.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.principals.contains_key(name)
    }

    /// Mark an existing principal as a manager. Fails if the principal is
    /// not in the table.
    pub fn add_manager(&mut self, name: &str) -> Result<(), TableError> {
        if !self.principals.contains_key(name) {
            return Err(TableError::NotFound(name.to_string()));
        }
        self.managers.insert(name.to_string());
        Ok(())
    }

    pub fn is_manager(&self, name: &str) -> bool {
        self.managers.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrincipalRecord> {
        self.principals.values()
    }

    /// Snapshot the table into its serialized list form.
    pub fn to_list(&self) -> PrincipalList {
        PrincipalList {
            format_version: LIST_FORMAT_VERSION,
            principals: self.principals.values().cloned().collect(),
            managers: self.managers.iter().cloned().collect(),
        }
    }

    /// Reset the table and repopulate it from a list. The capacity is kept;
    /// a list larger than the capacity fails partway and leaves the loaded
    /// prefix, so callers should treat an error as a corrupt table.
    pub fn load_list(&mut self, list: PrincipalList) -> Result<(), PersistError> {
        if list.format_version != LIST_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(list.format_version));
        }
        self.principals.clear();
        self.managers.clear();
        for record in list.principals {
            self.add(record)?;
        }
        for manager in list.managers {
            self.add_manager(&manager)?;
        }
        Ok(())
    }

    /// Write the list form to a file as a single binary blob.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let bytes = bincode::serialize(&self.to_list())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Replace the table contents with a previously saved list file.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let bytes = std::fs::read(path)?;
        let list: PrincipalList = bincode::deserialize(&bytes)?;
        self.load_list(list)
    }
}

impl Default for PrincipalTable {
    fn default() -> Self {
        Self::new(super::DEFAULT_TABLE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> PrincipalRecord {
        PrincipalRecord::new(name, "ed25519", vec![1, 2, 3])
    }

    #[test]
    fn test_add_find_delete() {
        let mut table = PrincipalTable::default();
        table.add(record("alice")).unwrap();

        assert!(table.contains("alice"));
        assert_eq!(table.find("alice").unwrap().algorithm, "ed25519");

        table.delete("alice").unwrap();
        assert!(!table.contains("alice"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_add_fails() {
        let mut table = PrincipalTable::default();
        table.add(record("alice")).unwrap();
        assert_eq!(
            table.add(record("alice")),
            Err(TableError::Duplicate("alice".to_string()))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_absent_fails() {
        let mut table = PrincipalTable::default();
        assert_eq!(
            table.delete("ghost"),
            Err(TableError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_capacity_enforced() {
        let mut table = PrincipalTable::new(2);
        table.add(record("a")).unwrap();
        table.add(record("b")).unwrap();
        assert_eq!(table.add(record("c")), Err(TableError::Capacity(2)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_manager_flag_dropped_on_delete() {
        let mut table = PrincipalTable::default();
        table.add(record("admin")).unwrap();
        table.add_manager("admin").unwrap();
        assert!(table.is_manager("admin"));

        table.delete("admin").unwrap();
        table.add(record("admin")).unwrap();
        assert!(!table.is_manager("admin"));
    }

    #[test]
    fn test_manager_requires_principal() {
        let mut table = PrincipalTable::default();
        assert!(table.add_manager("nobody").is_err());
    }

    #[test]
    fn test_list_roundtrip() {
        let mut table = PrincipalTable::default();
        table.add(record("alice")).unwrap();
        table.add(record("admin")).unwrap();
        table.add_manager("admin").unwrap();

        let list = table.to_list();
        let mut restored = PrincipalTable::default();
        restored.load_list(list).unwrap();

        assert!(restored.contains("alice"));
        assert!(restored.is_manager("admin"));
        assert!(!restored.is_manager("alice"));
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("principals.bin");

        let mut table = PrincipalTable::default();
        table.add(record("alice")).unwrap();
        table.save_to_file(&path).unwrap();

        // The blob is inspectable in list form without a table
        let list: PrincipalList =
            bincode::deserialize(&std::fs::read(&path).unwrap()).unwrap();
        assert!(list.contains("alice"));
        assert!(!list.contains("bob"));

        let mut restored = PrincipalTable::default();
        restored.load_from_file(&path).unwrap();
        assert_eq!(restored.find("alice"), table.find("alice"));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut table = PrincipalTable::default();
        let list = PrincipalList {
            format_version: 99,
            principals: vec![],
            managers: vec![],
        };
        assert!(matches!(
            table.load_list(list),
            Err(PersistError::UnsupportedVersion(99))
        ));
    }
}
