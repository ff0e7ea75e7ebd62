//! The secure source store.
//!
//! Owns the identifier → record map and enforces the two protocols:
//!
//! - **store**: resolve provider → snapshot policy → encrypt → insert under a
//!   fresh identifier.
//! - **retrieve / search**: look up → authorize → decrypt.
//!
//! Authorization always completes before any decryption is attempted for a
//! record. Records are immutable once inserted and are shared as `Arc`s, so
//! readers hold the map lock only long enough to clone a pointer and never
//! observe a partially written record. Key derivation and cipher work run
//! outside every lock.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::audit::{AccessEvent, AccessOutcome, AuditLog, AuditSink, Operation};
use crate::config::VaultConfig;
use crate::crypto::{self, Cipher};
use crate::error::{Result, VaultError};
use crate::policy::{AccessPolicy, AccessState, PresenceVerifier, SecondFactorVerifier, SecurityContext};
use crate::provider::{AeadProvider, EncryptionProvider};
use crate::source::{self, Source, SourceId, SourceRecord};

/// Scheme alias that resolves to the store's default provider.
pub const DEFAULT_SCHEME: &str = "default";

const DEFAULT_MAX_ID_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Produces candidate identifiers for new records.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<SourceId>;
}

/// Random RFC 4122 version-4 UUIDs drawn from the system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> Result<SourceId> {
        let mut bytes = [0u8; 16];
        crypto::fill_random(&mut bytes)?;
        let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(SourceId::new(id.hyphenated().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Predicate applied to decrypted sources during [`SourceStore::search`].
///
/// Every metadata pair must match exactly. If `text` is set it must occur in
/// a metadata value or in the content, ignoring ASCII case. An empty query
/// matches every source the caller may read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SearchQuery {
    /// Matches every readable source.
    pub fn all() -> Self {
        Self::default()
    }

    /// Free-text query over metadata values and content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Also require metadata `key` to equal `value`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether a decrypted `source` satisfies the query.
    pub fn matches(&self, source: &Source) -> bool {
        let metadata_ok = self
            .metadata
            .iter()
            .all(|(k, v)| source.metadata.get(k) == Some(v));
        if !metadata_ok {
            return false;
        }

        let needle = match self.text.as_deref().map(str::trim) {
            None | Some("") => return true,
            Some(text) => text.as_bytes(),
        };
        source
            .metadata
            .values()
            .any(|value| contains_ignore_ascii_case(value.as_bytes(), needle))
            || contains_ignore_ascii_case(&source.content, needle)
    }
}

/// Substring test that folds ASCII case in place. Decrypted content is never
/// copied into a lowered buffer.
fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

impl From<&str> for SearchQuery {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory store of policy-bound encrypted sources.
///
/// `SourceStore` is `Send + Sync`; share it behind an `Arc` to serve many
/// threads.
pub struct SourceStore {
    records: RwLock<HashMap<SourceId, Arc<SourceRecord>>>,
    providers: HashMap<String, Arc<dyn EncryptionProvider>>,
    default_scheme: String,
    ids: Box<dyn IdGenerator>,
    verifier: Box<dyn SecondFactorVerifier>,
    audit: Mutex<AuditLog>,
    sinks: Mutex<Vec<Box<dyn AuditSink>>>,
    max_id_attempts: u32,
}

impl fmt::Debug for SourceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&String> = self.providers.keys().collect();
        schemes.sort();
        f.debug_struct("SourceStore")
            .field("records", &self.records.read().len())
            .field("schemes", &schemes)
            .field("default_scheme", &self.default_scheme)
            .field("max_id_attempts", &self.max_id_attempts)
            .finish()
    }
}

impl SourceStore {
    /// A store whose default scheme is `provider`'s.
    pub fn new(provider: Arc<dyn EncryptionProvider>) -> Self {
        let default_scheme = provider.scheme().to_string();
        let mut providers = HashMap::new();
        providers.insert(default_scheme.clone(), provider);
        Self {
            records: RwLock::new(HashMap::new()),
            providers,
            default_scheme,
            ids: Box::new(RandomIds),
            verifier: Box::new(PresenceVerifier),
            audit: Mutex::new(AuditLog::new()),
            sinks: Mutex::new(Vec::new()),
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }

    /// A store with AES-256-GCM and ChaCha20-Poly1305 providers built from
    /// `config`.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        config.validate()?;
        let aes = AeadProvider::with_salt(Cipher::Aes256Gcm, config.salt()?, config.pbkdf2_iterations)?;
        let chacha = AeadProvider::with_salt(
            Cipher::ChaCha20Poly1305,
            config.salt()?,
            config.pbkdf2_iterations,
        )?;

        Self::new(Arc::new(aes))
            .with_provider(Arc::new(chacha))
            .with_default_scheme(&config.default_scheme)?
            .with_max_id_attempts(config.max_id_attempts)
    }

    /// Register an additional provider under its scheme name.
    pub fn with_provider(mut self, provider: Arc<dyn EncryptionProvider>) -> Self {
        self.providers.insert(provider.scheme().to_string(), provider);
        self
    }

    /// Choose which registered scheme `"default"` resolves to.
    pub fn with_default_scheme(mut self, scheme: &str) -> Result<Self> {
        if !self.providers.contains_key(scheme) {
            return Err(VaultError::Config(format!("default scheme not registered: {scheme}")));
        }
        self.default_scheme = scheme.to_string();
        Ok(self)
    }

    /// Replace the identifier source. Mostly useful for tests.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Replace the verifier that checks second-factor evidence.
    pub fn with_second_factor_verifier(mut self, verifier: impl SecondFactorVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    /// How many identifiers `store` tries before reporting a collision.
    pub fn with_max_id_attempts(mut self, attempts: u32) -> Result<Self> {
        if attempts == 0 {
            return Err(VaultError::Config("max_id_attempts must be non-zero".into()));
        }
        self.max_id_attempts = attempts;
        Ok(self)
    }

    /// Forward every access event to `sink` as well as the in-memory log.
    ///
    /// Sinks run after the log lock is released, so a slow sink delays only
    /// the caller that produced the event and other sinks.
    pub fn add_audit_sink(&self, sink: Box<dyn AuditSink>) {
        self.sinks.lock().push(sink);
    }

    /// A copy of the access events retained so far.
    pub fn audit_events(&self) -> Vec<AccessEvent> {
        self.audit.lock().events()
    }

    /// Remove and return the retained access events, oldest first.
    pub fn drain_audit_events(&self) -> Vec<AccessEvent> {
        self.audit.lock().drain()
    }

    /// Number of retained access events.
    pub fn audit_len(&self) -> usize {
        self.audit.lock().len()
    }

    /// The concrete scheme `"default"` resolves to.
    pub fn default_scheme(&self) -> &str {
        &self.default_scheme
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Whether a record exists, without authorizing anything.
    pub fn contains(&self, id: impl AsRef<str>) -> bool {
        self.records.read().contains_key(id.as_ref())
    }

    /// Every stored identifier, sorted.
    pub fn ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.records.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Encrypt `source` under `policy` and persist it. Returns the new
    /// identifier.
    ///
    /// The policy is snapshotted with its scheme resolved, so later changes
    /// to the store's default never affect existing records. The source's
    /// own timestamps and version are ignored: the record starts at
    /// version 1, created now.
    pub fn store(&self, source: &Source, policy: &AccessPolicy) -> Result<SourceId> {
        let provider = self.provider(&policy.encryption_scheme)?;

        let mut persisted = policy.clone();
        persisted.encryption_scheme = provider.scheme().to_string();
        let snapshot = source::policy_snapshot(&persisted)?;
        let context = source::derivation_context(&snapshot)?;

        let ciphertext = provider.encrypt(&source.content, &context)?;
        let now = Utc::now();

        let mut records = self.records.write();
        for _ in 0..self.max_id_attempts {
            let id = self.ids.next_id()?;
            match records.entry(id.clone()) {
                Entry::Occupied(_) => {
                    warn!(source_id = %id, "generated identifier collided; retrying");
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(SourceRecord {
                        id: id.clone(),
                        ciphertext,
                        metadata: source.metadata.clone(),
                        policy_snapshot: snapshot,
                        created_at: now,
                        last_modified: now,
                        version: 1,
                    }));
                    debug!(source_id = %id, scheme = provider.scheme(), level = %persisted.level, "stored source");
                    return Ok(id);
                }
            }
        }

        Err(VaultError::IdentifierCollision {
            attempts: self.max_id_attempts,
        })
    }

    /// Authorize `context` against the stored policy, then decrypt.
    ///
    /// Check order: not found, permission, expiration, second factor,
    /// integrity. Nothing is decrypted unless every check before it passed.
    pub fn retrieve(&self, id: impl AsRef<str>, context: &SecurityContext) -> Result<Source> {
        let id = id.as_ref();
        let result = self.retrieve_inner(id, context);

        let outcome = match &result {
            Ok(_) => {
                debug!(source_id = id, user = ?context.user, "retrieved source");
                AccessOutcome::Granted
            }
            Err(e) => {
                warn!(source_id = id, user = ?context.user, error = %e, "retrieve refused");
                AccessOutcome::from_error(e)
            }
        };
        self.record_access(id, context, Operation::Retrieve, outcome);

        result
    }

    fn retrieve_inner(&self, id: &str, context: &SecurityContext) -> Result<Source> {
        let record = self
            .records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        let policy = record.policy()?;
        policy.authorize(context, &*self.verifier, Utc::now())?;
        self.decrypt_record(&record, &policy)
    }

    /// Decrypt and filter every record `context` is authorized to read.
    ///
    /// Records that fail authorization, or whose policy snapshot cannot be
    /// read, are skipped without being decrypted and without an error.
    /// Results are ordered by creation time. An integrity failure on an
    /// authorized record is audited and aborts the search.
    pub fn search(&self, query: &SearchQuery, context: &SecurityContext) -> Result<Vec<Source>> {
        let now = Utc::now();
        let mut candidates: Vec<Arc<SourceRecord>> = self.records.read().values().cloned().collect();
        candidates.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut found = Vec::new();
        for record in candidates {
            let policy = match record.policy() {
                Ok(policy) => policy,
                Err(e) => {
                    warn!(source_id = %record.id, error = %e, "skipping record with unreadable policy");
                    continue;
                }
            };
            if policy.authorize(context, &*self.verifier, now).is_err() {
                continue;
            }

            let source = match self.decrypt_record(&record, &policy) {
                Ok(source) => source,
                Err(e) => {
                    warn!(source_id = %record.id, error = %e, "search aborted");
                    self.record_access(record.id.as_str(), context, Operation::Search, AccessOutcome::from_error(&e));
                    return Err(e);
                }
            };
            if query.matches(&source) {
                self.record_access(record.id.as_str(), context, Operation::Search, AccessOutcome::Granted);
                found.push(source);
            }
        }

        debug!(user = ?context.user, hits = found.len(), "search complete");
        Ok(found)
    }

    /// The persistent access state of a stored source.
    pub fn access_state(&self, id: impl AsRef<str>) -> Result<AccessState> {
        self.access_state_at(id, Utc::now())
    }

    /// The access state as of `now`.
    pub fn access_state_at(&self, id: impl AsRef<str>, now: DateTime<Utc>) -> Result<AccessState> {
        let id = id.as_ref();
        let record = self
            .records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        Ok(record.policy()?.state_at(now))
    }

    fn provider(&self, scheme: &str) -> Result<&Arc<dyn EncryptionProvider>> {
        let resolved = if scheme == DEFAULT_SCHEME {
            self.default_scheme.as_str()
        } else {
            scheme
        };
        self.providers
            .get(resolved)
            .ok_or_else(|| VaultError::UnsupportedScheme(scheme.to_string()))
    }

    /// Only called once `policy` has authorized the caller.
    fn decrypt_record(&self, record: &SourceRecord, policy: &AccessPolicy) -> Result<Source> {
        let provider = self.provider(&policy.encryption_scheme)?;
        let context = record.derivation_context()?;
        let content = provider.decrypt(&record.ciphertext, &context)?;
        Ok(record.to_source(content))
    }

    fn record_access(&self, id: &str, context: &SecurityContext, operation: Operation, outcome: AccessOutcome) {
        let event = AccessEvent {
            source_id: SourceId::new(id),
            user: context.user.clone(),
            operation,
            outcome,
            timestamp: Utc::now(),
        };
        self.audit.lock().append(event.clone());

        let mut sinks = self.sinks.lock();
        for sink in sinks.iter_mut() {
            sink.append(event.clone());
        }
    }
}
