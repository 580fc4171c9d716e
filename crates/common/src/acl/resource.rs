use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{PersistError, TableError, LIST_FORMAT_VERSION};

/// The four access lists a resource carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Right {
    Reader,
    Writer,
    Deleter,
    Owner,
}

impl Right {
    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Reader => "reader",
            Right::Writer => "writer",
            Right::Deleter => "deleter",
            Right::Owner => "owner",
        }
    }
}

impl FromStr for Right {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Right::Reader),
            "writer" => Ok(Right::Writer),
            "deleter" => Ok(Right::Deleter),
            "owner" => Ok(Right::Owner),
            other => Err(TableError::InvalidRecord(format!("unknown right: {other}"))),
        }
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action a session may request against a resource
///
/// Parsed from the `access_mode` argument of `open_resource` and the action
/// string of `access_check`. Both the action vocabulary (`read`, `write`,
/// `delete`, `own`) and the list vocabulary (`reader`, `writer`, `deleter`,
/// `owner`) are accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delete,
    Own,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Own => "own",
        }
    }
}

impl FromStr for Action {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" | "reader" => Ok(Action::Read),
            "write" | "writer" => Ok(Action::Write),
            "delete" | "deleter" => Ok(Action::Delete),
            "own" | "owner" => Ok(Action::Own),
            other => Err(TableError::InvalidRecord(format!(
                "unknown access mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed, addressable data object with four access lists
///
/// `location` addresses the backing store (a path or URI); the record itself
/// never holds payload bytes. The access lists are ordered sets of principal
/// names. Names need not resolve to a live principal: rights are checked
/// against the principal table only at the moment an operation exercises
/// them, so a list may name a principal created later (forward delegation)
/// or deleted earlier (inert).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub identifier: String,
    pub resource_type: String,
    pub location: String,
    pub time_created: String,
    pub time_last_written: String,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
    pub deleters: Vec<String>,
    pub owners: Vec<String>,
}

impl ResourceRecord {
    /// A fresh record with both timestamps set to now and empty lists.
    pub fn new(
        identifier: impl Into<String>,
        resource_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let now = super::now_rfc3339();
        Self {
            identifier: identifier.into(),
            resource_type: resource_type.into(),
            location: location.into(),
            time_created: now.clone(),
            time_last_written: now,
            ..Default::default()
        }
    }

    fn list(&self, right: Right) -> &Vec<String> {
        match right {
            Right::Reader => &self.readers,
            Right::Writer => &self.writers,
            Right::Deleter => &self.deleters,
            Right::Owner => &self.owners,
        }
    }

    fn list_mut(&mut self, right: Right) -> &mut Vec<String> {
        match right {
            Right::Reader => &mut self.readers,
            Right::Writer => &mut self.writers,
            Right::Deleter => &mut self.deleters,
            Right::Owner => &mut self.owners,
        }
    }

    pub fn on_list(&self, right: Right, name: &str) -> bool {
        self.list(right).iter().any(|n| n == name)
    }

    pub fn on_reader_list(&self, name: &str) -> bool {
        self.on_list(Right::Reader, name)
    }

    pub fn on_writer_list(&self, name: &str) -> bool {
        self.on_list(Right::Writer, name)
    }

    pub fn on_deleter_list(&self, name: &str) -> bool {
        self.on_list(Right::Deleter, name)
    }

    pub fn on_owner_list(&self, name: &str) -> bool {
        self.on_list(Right::Owner, name)
    }

    /// Append a name to an access list. Appending a name that is already
    /// present is a success no-op; grants never reorder or remove entries.
    pub fn add_right(&mut self, right: Right, name: impl Into<String>) {
        let name = name.into();
        let list = self.list_mut(right);
        if !list.iter().any(|n| n == &name) {
            list.push(name);
        }
    }

    pub fn add_reader(&mut self, name: impl Into<String>) {
        self.add_right(Right::Reader, name)
    }

    pub fn add_writer(&mut self, name: impl Into<String>) {
        self.add_right(Right::Writer, name)
    }

    pub fn add_deleter(&mut self, name: impl Into<String>) {
        self.add_right(Right::Deleter, name)
    }

    pub fn add_owner(&mut self, name: impl Into<String>) {
        self.add_right(Right::Owner, name)
    }

    /// Check the shape a record must have to enter the table: a non-empty
    /// identifier and at least one owner.
    pub fn validate(&self) -> Result<(), TableError> {
        if self.identifier.is_empty() {
            return Err(TableError::InvalidRecord("empty resource identifier".into()));
        }
        if self.owners.is_empty() {
            return Err(TableError::InvalidRecord(format!(
                "resource {} has no owner",
                self.identifier
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resource {} type {} at {} owners [{}]",
            self.identifier,
            self.resource_type,
            self.location,
            self.owners.join(", ")
        )
    }
}

/// Serialized form of a resource table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceList {
    pub format_version: u32,
    pub resources: Vec<ResourceRecord>,
}

impl ResourceList {
    /// Membership probe on the list form, for inspecting a persisted blob
    /// without loading it into a table.
    pub fn contains(&self, identifier: &str) -> bool {
        self.resources.iter().any(|r| r.identifier == identifier)
    }
}

/// Process-wide registry of resources
///
/// Mirrors [`PrincipalTable`](super::PrincipalTable): a bounded, name-keyed
/// ordered map, serialized behind the owning store's mutex.
#[derive(Debug, Clone)]
pub struct ResourceTable {
    capacity: usize,
    resources: BTreeMap<String, ResourceRecord>,
}

impl ResourceTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            resources: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Insert a resource. Fails on a malformed record, a duplicate
    /// identifier, or a full table.
    pub fn add(&mut self, record: ResourceRecord) -> Result<(), TableError> {
        record.validate()?;
        if self.resources.contains_key(&record.identifier) {
            return Err(TableError::Duplicate(record.identifier));
        }
        if self.resources.len() >= self.capacity {
            return Err(TableError::Capacity(self.capacity));
        }
        self.resources.insert(record.identifier.clone(), record);
        Ok(())
    }

    /// Remove a resource by identifier and declared type. A type mismatch
    /// is reported as not-found so callers cannot probe for typed names.
    pub fn delete(&mut self, identifier: &str, resource_type: &str) -> Result<(), TableError> {
        match self.resources.get(identifier) {
            Some(record) if record.resource_type == resource_type => {
                self.resources.remove(identifier);
                Ok(())
            }
            _ => Err(TableError::NotFound(identifier.to_string())),
        }
    }

    pub fn find(&self, identifier: &str) -> Option<&ResourceRecord> {
        self.resources.get(identifier)
    }

    pub fn find_mut(&mut self, identifier: &str) -> Option<&mut ResourceRecord> {
        self.resources.get_mut(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.resources.contains_key(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.resources.values()
    }

    pub fn to_list(&self) -> ResourceList {
        ResourceList {
            format_version: LIST_FORMAT_VERSION,
            resources: self.resources.values().cloned().collect(),
        }
    }

    /// Reset the table and repopulate it from a list.
    pub fn load_list(&mut self, list: ResourceList) -> Result<(), PersistError> {
        if list.format_version != LIST_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(list.format_version));
        }
        self.resources.clear();
        for record in list.resources {
            self.add(record)?;
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let bytes = bincode::serialize(&self.to_list())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let bytes = std::fs::read(path)?;
        let list: ResourceList = bincode::deserialize(&bytes)?;
        self.load_list(list)
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new(super::DEFAULT_TABLE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ResourceRecord {
        let mut r = ResourceRecord::new(id, "file", format!("/tmp/{id}"));
        r.add_owner("alice");
        r
    }

    #[test]
    fn test_add_and_membership() {
        let mut r = record("doc1");
        r.add_reader("bob");

        assert!(r.on_owner_list("alice"));
        assert!(r.on_reader_list("bob"));
        assert!(!r.on_writer_list("bob"));
        assert!(!r.on_reader_list("carol"));
    }

    #[test]
    fn test_add_right_is_idempotent() {
        let mut r = record("doc1");
        r.add_reader("bob");
        r.add_reader("bob");
        assert_eq!(r.readers, vec!["bob".to_string()]);
    }

    #[test]
    fn test_grant_preserves_existing_rights() {
        let mut r = record("doc1");
        r.add_reader("bob");
        r.add_writer("carol");

        // Granting never removes another entry
        assert!(r.on_reader_list("bob"));
        assert!(r.on_writer_list("carol"));
        assert!(r.on_owner_list("alice"));
    }

    #[test]
    fn test_validate_requires_owner_and_identifier() {
        let no_owner = ResourceRecord::new("doc1", "file", "/tmp/doc1");
        assert!(no_owner.validate().is_err());

        let mut no_id = ResourceRecord::new("", "file", "/tmp/doc1");
        no_id.add_owner("alice");
        assert!(no_id.validate().is_err());

        assert!(record("doc1").validate().is_ok());
    }

    #[test]
    fn test_table_duplicate_and_capacity() {
        let mut table = ResourceTable::new(1);
        table.add(record("doc1")).unwrap();
        assert!(matches!(
            table.add(record("doc1")),
            Err(TableError::Duplicate(_))
        ));
        assert_eq!(table.add(record("doc2")), Err(TableError::Capacity(1)));
    }

    #[test]
    fn test_delete_checks_type() {
        let mut table = ResourceTable::default();
        table.add(record("doc1")).unwrap();

        assert!(matches!(
            table.delete("doc1", "blob"),
            Err(TableError::NotFound(_))
        ));
        assert!(table.contains("doc1"));

        table.delete("doc1", "file").unwrap();
        assert!(!table.contains("doc1"));
    }

    #[test]
    fn test_list_roundtrip_preserves_acls() {
        let mut table = ResourceTable::default();
        let mut r = record("doc1");
        r.add_reader("bob");
        r.add_deleter("carol");
        table.add(r).unwrap();

        let mut restored = ResourceTable::default();
        restored.load_list(table.to_list()).unwrap();

        let r = restored.find("doc1").unwrap();
        assert!(r.on_reader_list("bob"));
        assert!(r.on_deleter_list("carol"));
        assert!(r.on_owner_list("alice"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.bin");

        let mut table = ResourceTable::default();
        table.add(record("doc1")).unwrap();
        table.save_to_file(&path).unwrap();

        let list: ResourceList =
            bincode::deserialize(&std::fs::read(&path).unwrap()).unwrap();
        assert!(list.contains("doc1"));

        let mut restored = ResourceTable::default();
        restored.load_from_file(&path).unwrap();
        assert_eq!(restored.find("doc1"), table.find("doc1"));
    }

    #[test]
    fn test_action_parses_both_vocabularies() {
        assert_eq!("read".parse::<Action>().unwrap(), Action::Read);
        assert_eq!("reader".parse::<Action>().unwrap(), Action::Read);
        assert_eq!("own".parse::<Action>().unwrap(), Action::Own);
        assert_eq!("owner".parse::<Action>().unwrap(), Action::Own);
        assert!("admin".parse::<Action>().is_err());
    }
}
