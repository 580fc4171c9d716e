use std::fmt;

/// Maximum open resources per session
pub const MAX_LOCAL_DESCRIPTORS: usize = 50;

/// Errors from the session descriptor table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor table full at {MAX_LOCAL_DESCRIPTORS} entries")]
    Full,

    #[error("invalid descriptor: {0}")]
    Invalid(i64),

    #[error("descriptor {descriptor} is open on {open}, not {requested}")]
    NameMismatch {
        descriptor: i64,
        open: String,
        requested: String,
    },
}

/// One open resource in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub resource_name: String,
    /// Byte cursor shared by reads and writes on this descriptor
    pub offset: u64,
}

impl fmt::Display for DescriptorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.resource_name, self.offset)
    }
}

/// Session-scoped arena of open resources
///
/// The slot index is the over-the-wire local descriptor. Slots are reused
/// after close; a fresh open may hand out a previously closed integer.
/// Every access re-checks that the caller's resource name matches the
/// name the slot was opened for, which catches descriptor/name confusion.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    slots: Vec<Option<DescriptorEntry>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open descriptors.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Allocate the first free slot for `resource_name`.
    pub fn open(&mut self, resource_name: impl Into<String>) -> Result<usize, DescriptorError> {
        let entry = DescriptorEntry {
            resource_name: resource_name.into(),
            offset: 0,
        };
        if let Some(slot) = self.slots.iter().position(Option::is_none) {
            self.slots[slot] = Some(entry);
            return Ok(slot);
        }
        if self.slots.len() < MAX_LOCAL_DESCRIPTORS {
            self.slots.push(Some(entry));
            return Ok(self.slots.len() - 1);
        }
        Err(DescriptorError::Full)
    }

    fn slot_index(&self, descriptor: i64) -> Result<usize, DescriptorError> {
        let index = usize::try_from(descriptor).map_err(|_| DescriptorError::Invalid(descriptor))?;
        if index >= self.slots.len() || self.slots[index].is_none() {
            return Err(DescriptorError::Invalid(descriptor));
        }
        Ok(index)
    }

    /// Look up an open descriptor, checking the caller's resource name
    /// against the one the slot was opened for.
    pub fn entry_mut(
        &mut self,
        descriptor: i64,
        resource_name: &str,
    ) -> Result<&mut DescriptorEntry, DescriptorError> {
        let index = self.slot_index(descriptor)?;
        match self.slots[index].as_mut() {
            Some(entry) if entry.resource_name == resource_name => Ok(entry),
            Some(entry) => Err(DescriptorError::NameMismatch {
                descriptor,
                open: entry.resource_name.clone(),
                requested: resource_name.to_string(),
            }),
            None => Err(DescriptorError::Invalid(descriptor)),
        }
    }

    /// Close a descriptor and free its slot. Closing an already-closed or
    /// never-opened descriptor fails.
    pub fn close(&mut self, descriptor: i64, resource_name: &str) -> Result<(), DescriptorError> {
        self.entry_mut(descriptor, resource_name)?;
        let index = self.slot_index(descriptor)?;
        self.slots[index] = None;
        Ok(())
    }
}
