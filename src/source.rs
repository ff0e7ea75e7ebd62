//! Sources and their persisted, encrypted records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::context::{self, DerivationContext};
use crate::error::{Result, VaultError};
use crate::policy::AccessPolicy;

/// Identifier assigned to a source by the store. Immutable and unique for
/// the lifetime of the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for SourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A confidential item as a caller holds it: plaintext content plus
/// unencrypted metadata. Content is wiped when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Source {
    pub content: Vec<u8>,
    #[zeroize(skip)]
    pub metadata: BTreeMap<String, String>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub last_modified: DateTime<Utc>,
    #[zeroize(skip)]
    pub version: u32,
}

impl Source {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
            created_at: now,
            last_modified: now,
            version: 1,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("last_modified", &self.last_modified)
            .field("version", &self.version)
            .finish()
    }
}

/// The persisted form of a source. Owned by the store; never handed to
/// callers.
///
/// The policy is held as its canonical JSON snapshot. That snapshot is both
/// what gets read back for authorization and the exact input to key
/// derivation, so the two can never drift apart.
#[derive(Clone)]
pub(crate) struct SourceRecord {
    pub id: SourceId,
    pub ciphertext: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    pub policy_snapshot: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
}

impl SourceRecord {
    /// Read the policy snapshot back.
    pub fn policy(&self) -> Result<AccessPolicy> {
        serde_json::from_str(&self.policy_snapshot).map_err(|e| VaultError::Validation(e.to_string()))
    }

    /// The key-derivation context for this record's content.
    pub fn derivation_context(&self) -> Result<DerivationContext> {
        derivation_context(&self.policy_snapshot)
    }

    /// Rebuild the caller-facing source around decrypted content.
    pub fn to_source(&self, content: Vec<u8>) -> Source {
        Source {
            content,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            version: self.version,
        }
    }
}

impl fmt::Debug for SourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRecord")
            .field("id", &self.id)
            .field("ciphertext", &format_args!("<{} bytes>", self.ciphertext.len()))
            .field("metadata", &self.metadata)
            .field("version", &self.version)
            .finish()
    }
}

/// Canonical snapshot of a policy, as persisted and as fed to key derivation.
pub(crate) fn policy_snapshot(policy: &AccessPolicy) -> Result<String> {
    context::canonical_json(policy)
}

/// `{"policy": <snapshot>}`, the context every record's key is derived from.
pub(crate) fn derivation_context(snapshot: &str) -> Result<DerivationContext> {
    let mut ctx = DerivationContext::new();
    ctx.insert_json("policy", snapshot)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AccessLevel;

    #[test]
    fn test_snapshot_reads_back_and_derives_stable_context() {
        let policy = AccessPolicy::new(AccessLevel::Restricted, ["zoe", "alice"], "mock").requiring_2fa();
        let snapshot = policy_snapshot(&policy).unwrap();
        let now = Utc::now();
        let record = SourceRecord {
            id: SourceId::new("id-1"),
            ciphertext: vec![1, 2, 3],
            metadata: BTreeMap::new(),
            policy_snapshot: snapshot.clone(),
            created_at: now,
            last_modified: now,
            version: 1,
        };

        assert_eq!(record.policy().unwrap(), policy);
        assert_eq!(
            record.derivation_context().unwrap().canonical_bytes().unwrap(),
            record.derivation_context().unwrap().canonical_bytes().unwrap()
        );
        assert_eq!(snapshot, policy_snapshot(&record.policy().unwrap()).unwrap());
    }

    #[test]
    fn test_malformed_snapshot_is_validation_error() {
        let now = Utc::now();
        let record = SourceRecord {
            id: SourceId::new("id-2"),
            ciphertext: Vec::new(),
            metadata: BTreeMap::new(),
            policy_snapshot: r#"{"level":"cosmic"}"#.to_string(),
            created_at: now,
            last_modified: now,
            version: 1,
        };
        assert!(matches!(record.policy(), Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_debug_does_not_print_content() {
        let source = Source::new(b"do not print".to_vec()).with_metadata("title", "x");
        let rendered = format!("{source:?}");
        assert!(!rendered.contains("do not print"));
        assert!(rendered.contains("12 bytes"));
    }
}
