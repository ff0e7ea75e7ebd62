//! Access audit logging.
//!
//! Records the outcome of every retrieval and every search hit. The store
//! keeps recent events in an [`AuditLog`] and forwards each one to any
//! attached [`AuditSink`] (files, databases, etc.).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::source::SourceId;

/// A sink that receives access events. Implement this to forward events
/// to a file, database, or other persistent store.
pub trait AuditSink: Send {
    /// Append an event. Called for every recorded access.
    fn append(&mut self, event: AccessEvent);
}

/// Which store operation produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Retrieve,
    Search,
}

/// How an access attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Granted,
    NotFound,
    Denied,
    Expired,
    MissingSecondFactor,
    IntegrityFailure,
    /// Any failure outside the authorization and integrity checks.
    Error,
}

impl AccessOutcome {
    pub(crate) fn from_error(err: &VaultError) -> Self {
        match err {
            VaultError::NotFound(_) => Self::NotFound,
            VaultError::PermissionDenied => Self::Denied,
            VaultError::Expired => Self::Expired,
            VaultError::MissingSecondFactor => Self::MissingSecondFactor,
            VaultError::Integrity => Self::IntegrityFailure,
            _ => Self::Error,
        }
    }
}

/// A permanent record of one access attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub source_id: SourceId,
    /// The acting user, if the security context named one.
    pub user: Option<String>,
    pub operation: Operation,
    pub outcome: AccessOutcome,
    pub timestamp: DateTime<Utc>,
}

/// An in-memory log of access events.
///
/// Events are only ever appended; [`AuditLog::drain`] hands them off in
/// order so a long-lived store does not retain every event forever.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AccessEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn append(&mut self, event: AccessEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the retained events, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, AccessEvent> {
        self.events.iter()
    }

    /// A copy of every retained event.
    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.clone()
    }

    /// Remove and return every retained event, oldest first.
    pub fn drain(&mut self) -> Vec<AccessEvent> {
        std::mem::take(&mut self.events)
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes access events as JSON lines (one per event) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, event: AccessEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode audit event");
                return;
            }
        };
        if let Err(e) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
            tracing::warn!(error = %e, "failed to write audit event");
        }
    }
}
