//! Key derivation and ownership.
//!
//! This module owns two responsibilities:
//! 1. Deriving content keys from a canonical context using PBKDF2-HMAC-SHA256.
//! 2. Holding salt and key material in types that are opaque, non-cloneable,
//!    and zeroised on drop.
//!
//! Together with `crypto`, this is the only module that imports `ring`
//! key-handling primitives.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-SHA256(
//!     password   = canonical_bytes(context),
//!     salt       = provider salt,
//!     iterations = provider work factor,
//! ) -> 256-bit key
//! ```
//!
//! Identical contexts under one salt derive identical keys. The salt is
//! fixed for the provider's lifetime, so a provider rebuilt with the same
//! salt can decrypt what an earlier instance encrypted.

use std::fmt;
use std::num::NonZeroU32;

use ring::{digest, pbkdf2};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};

/// Default PBKDF2 work factor.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// A provider-lifetime key-derivation salt.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Read-only after construction, so one salt may be shared across threads
///   without locking.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Salt {
    bytes: Vec<u8>,
}

impl Salt {
    /// Minimum accepted salt length in bytes.
    pub const MIN_LEN: usize = 16;

    /// Generate a fresh random salt of [`Salt::MIN_LEN`] bytes.
    pub fn generate() -> Result<Self> {
        let mut bytes = vec![0u8; Self::MIN_LEN];
        crypto::fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Wrap caller-supplied salt bytes, e.g. restored from configuration.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(VaultError::Config(format!(
                "salt must be at least {} bytes",
                Self::MIN_LEN
            )));
        }
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded salt.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| VaultError::Config(format!("salt is not valid hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Hex encoding, for persisting the salt alongside configuration.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Salt").field("len", &self.bytes.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A content key derived for one context.
///
/// Never leaves the crate; providers borrow the bytes for a single
/// encrypt or decrypt call and drop the key immediately after.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Stretch `secret` into a 256-bit key with PBKDF2-HMAC-SHA256.
pub(crate) fn derive_key(salt: &Salt, iterations: NonZeroU32, secret: &[u8]) -> DerivedKey {
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt.as_bytes(),
        secret,
        &mut bytes,
    );
    DerivedKey { bytes }
}

/// Single-pass SHA-256 of `secret`. Only for the non-production mock
/// provider, where a work factor would just slow down tests.
pub(crate) fn digest_key(secret: &[u8]) -> DerivedKey {
    let hash = digest::digest(&digest::SHA256, secret);
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(hash.as_ref());
    DerivedKey { bytes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterations() -> NonZeroU32 {
        NonZeroU32::new(1_000).unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = Salt::from_bytes(vec![9u8; 16]).unwrap();
        let a = derive_key(&salt, iterations(), b"policy-a");
        let b = derive_key(&salt, iterations(), b"policy-a");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_context_or_salt_gives_different_key() {
        let salt = Salt::from_bytes(vec![9u8; 16]).unwrap();
        let other_salt = Salt::from_bytes(vec![8u8; 16]).unwrap();
        let base = derive_key(&salt, iterations(), b"policy-a");
        assert_ne!(base.as_bytes(), derive_key(&salt, iterations(), b"policy-b").as_bytes());
        assert_ne!(base.as_bytes(), derive_key(&other_salt, iterations(), b"policy-a").as_bytes());
    }

    #[test]
    fn test_short_salt_rejected() {
        assert!(matches!(Salt::from_bytes(vec![0u8; 4]), Err(VaultError::Config(_))));
        assert!(matches!(Salt::from_hex("zz"), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_salt_hex_roundtrip_and_redacted_debug() {
        let salt = Salt::generate().unwrap();
        let restored = Salt::from_hex(&salt.to_hex()).unwrap();
        assert_eq!(salt.as_bytes(), restored.as_bytes());
        assert!(!format!("{salt:?}").contains(&salt.to_hex()));
    }
}
