//! Error types for sourcevault.
//!
//! Every variant is a distinct failure mode of the store or its
//! collaborators. Messages are intentionally minimal: they signal *what*
//! failed without revealing *why* in ways that could leak cryptographic
//! state or which part of a derivation context was wrong.

use thiserror::Error;

/// The single error type for all sourcevault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No record is stored under the given identifier.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The acting user is not in the policy's allow-list.
    #[error("permission denied")]
    PermissionDenied,

    /// The policy's expiration has passed.
    #[error("access policy expired")]
    Expired,

    /// The policy requires second-factor evidence and none valid was presented.
    #[error("second factor required")]
    MissingSecondFactor,

    /// Authentication tag verification failed. Covers tampered ciphertext
    /// and a mismatched derivation context alike.
    #[error("integrity check failed")]
    Integrity,

    /// The derivation context could not be canonically serialized.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Every generated identifier collided with an existing record.
    #[error("identifier collision after {attempts} attempts")]
    IdentifierCollision { attempts: u32 },

    /// A persisted policy snapshot could not be read back.
    #[error("invalid policy snapshot: {0}")]
    Validation(String),

    /// No encryption provider is registered for the policy's scheme.
    #[error("unsupported encryption scheme: {0}")]
    UnsupportedScheme(String),

    /// The underlying AEAD seal operation failed.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// Configuration was unreadable or held an invalid value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A citation style's required field was absent from the field context.
    #[error("missing citation field: {0}")]
    MissingField(String),

    /// The requested citation style is not registered.
    #[error("unknown citation style: {0}")]
    UnknownStyle(String),
}

/// Result type for sourcevault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
