//! # sourcevault
//!
//! Policy-bound encrypted storage for confidential source material.
//!
//! Each source is encrypted under a key derived from the canonical form of
//! its access policy and stored with that policy as an immutable snapshot.
//! Every read goes through the same gate: the caller's security context is
//! checked against the allow-list, the expiration and the second-factor
//! requirement, and only then is anything decrypted.
//!
//! ```no_run
//! use sourcevault::{AccessLevel, AccessPolicy, SecurityContext, Source, SourceStore, VaultConfig};
//!
//! # fn main() -> sourcevault::Result<()> {
//! let store = SourceStore::from_config(&VaultConfig::default())?;
//! let policy = AccessPolicy::new(AccessLevel::Confidential, ["alice"], "default");
//! let id = store.store(&Source::new(b"secret".to_vec()), &policy)?;
//!
//! let source = store.retrieve(&id, &SecurityContext::for_user("alice"))?;
//! assert_eq!(source.content, b"secret");
//! # Ok(())
//! # }
//! ```
//!
//! ## Public API
//!
//! The store, policies, providers and the two boundary collaborators
//! (citations and semantic indexing) are public. Raw key material and
//! stored ciphertext never leave the crate.

pub mod audit;
pub mod citation;
pub mod config;
pub mod context;
pub(crate) mod crypto;
pub mod error;
pub mod keys;
pub mod policy;
pub mod provider;
pub mod semantic;
pub mod source;
pub mod store;

pub use audit::{AccessEvent, AccessOutcome, AuditLog, AuditSink, FileAuditSink, Operation};
pub use citation::{Citation, CitationCatalog, CitationFormatter, CitationStyle, TemplateFormatter};
pub use config::VaultConfig;
pub use context::DerivationContext;
pub use crypto::Cipher;
pub use error::{Result, VaultError};
pub use keys::Salt;
pub use policy::{
    AccessLevel, AccessPolicy, AccessState, PresenceVerifier, SecondFactorVerifier, SecurityContext,
};
pub use provider::{AeadProvider, EncryptionProvider, MockProvider};
pub use semantic::{EmbeddingProvider, HashingEmbedding, SemanticIndex, SemanticMatch, SemanticMatcher};
pub use source::{Source, SourceId};
pub use store::{IdGenerator, RandomIds, SearchQuery, SourceStore, DEFAULT_SCHEME};

/// Generate a fresh key-derivation salt.
///
/// Persist it (see [`Salt::to_hex`] and the `salt` field of [`VaultConfig`]) if records
/// must stay readable across restarts.
pub fn generate_salt() -> Result<Salt> {
    Salt::generate()
}
