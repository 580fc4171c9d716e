//! Audit log of guard decisions.
//!
//! Every guard-mediated operation appends a record of who asked for what
//! and whether it was allowed. The log is a bounded in-process ring; when
//! full, the oldest record is dropped. Integrity of the log is not
//! defended.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Default number of audit records retained
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

/// One guard decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339 timestamp of the decision
    pub time: String,
    /// Session principal, or the claimed name during authentication
    pub principal: String,
    /// Operation tag, e.g. `open_resource`
    pub operation: String,
    /// Resource the operation addressed, if any
    pub resource: Option<String>,
    /// Whether the operation succeeded
    pub outcome: bool,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.time,
            self.principal,
            self.operation,
            self.resource.as_deref().unwrap_or("-"),
            if self.outcome { "allowed" } else { "denied" }
        )
    }
}

/// Bounded, shared audit log
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a decision, evicting the oldest record when full.
    pub fn record(
        &self,
        principal: impl Into<String>,
        operation: impl Into<String>,
        resource: Option<&str>,
        outcome: bool,
    ) {
        let record = AuditRecord {
            time: super::now_rfc3339(),
            principal: principal.into(),
            operation: operation.into(),
            resource: resource.map(str::to_string),
            outcome,
        };
        tracing::debug!(audit = %record, "guard decision");

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Copy of the current records, oldest first.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}
