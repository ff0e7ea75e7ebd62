//! Encryption capabilities.
//!
//! An [`EncryptionProvider`] derives a key from a [`DerivationContext`] and
//! performs authenticated encryption under it. Implementations are chosen
//! when the store is built; the store looks them up by the scheme name
//! recorded in each access policy.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

use ring::{digest, hmac};

use crate::context::DerivationContext;
use crate::crypto::{self, Cipher, KEY_LEN};
use crate::error::{Result, VaultError};
use crate::keys::{self, DerivedKey, Salt, DEFAULT_ITERATIONS};

/// Context-bound authenticated encryption.
///
/// `decrypt` must fail with [`VaultError::Integrity`] both for tampered
/// input and for a context that differs from the one used to encrypt, and
/// must not let callers tell the two apart.
pub trait EncryptionProvider: Send + Sync {
    /// The scheme name policies use to select this provider.
    fn scheme(&self) -> &str;

    fn encrypt(&self, plaintext: &[u8], context: &DerivationContext) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8], context: &DerivationContext) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// AEAD provider
// ---------------------------------------------------------------------------

/// PBKDF2-HMAC-SHA256 key derivation feeding a `ring` AEAD cipher.
#[derive(Debug)]
pub struct AeadProvider {
    cipher: Cipher,
    salt: Salt,
    iterations: NonZeroU32,
}

impl AeadProvider {
    /// A provider with a fresh random salt and the default work factor.
    pub fn new(cipher: Cipher) -> Result<Self> {
        Self::with_salt(cipher, Salt::generate()?, DEFAULT_ITERATIONS)
    }

    /// A provider with an explicit salt and work factor. Reusing the salt
    /// and iteration count of an earlier provider reproduces its keys.
    pub fn with_salt(cipher: Cipher, salt: Salt, iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| VaultError::Config("pbkdf2 iterations must be non-zero".into()))?;
        Ok(Self {
            cipher,
            salt,
            iterations,
        })
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// The provider's salt, hex-encoded.
    pub fn salt_hex(&self) -> String {
        self.salt.to_hex()
    }

    fn key_for(&self, context: &DerivationContext) -> Result<DerivedKey> {
        let secret = context.canonical_bytes()?;
        Ok(keys::derive_key(&self.salt, self.iterations, &secret))
    }
}

impl EncryptionProvider for AeadProvider {
    fn scheme(&self) -> &str {
        self.cipher.scheme()
    }

    fn encrypt(&self, plaintext: &[u8], context: &DerivationContext) -> Result<Vec<u8>> {
        let key = self.key_for(context)?;
        crypto::encrypt(self.cipher, key.as_bytes(), plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &DerivationContext) -> Result<Vec<u8>> {
        let key = self.key_for(context)?;
        crypto::decrypt(self.cipher, key.as_bytes(), ciphertext)
    }
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

const MOCK_TAG_LEN: usize = 32;

/// Deterministic provider for tests. NOT a secure cipher.
///
/// The key is a plain SHA-256 of the canonical context; content is XORed
/// with a digest keystream and followed by an HMAC-SHA256 tag, so tampering
/// and context mismatches are still detected. Identical inputs always give
/// identical output. Call counters let tests assert that no decryption was
/// attempted.
#[derive(Debug, Default)]
pub struct MockProvider {
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `encrypt` calls so far.
    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    /// Number of `decrypt` calls so far.
    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn apply_keystream(key: &[u8; KEY_LEN], data: &mut [u8]) {
        for (block_index, chunk) in data.chunks_mut(digest::SHA256_OUTPUT_LEN).enumerate() {
            let mut ctx = digest::Context::new(&digest::SHA256);
            ctx.update(key);
            ctx.update(&(block_index as u64).to_be_bytes());
            let block = ctx.finish();
            for (byte, pad) in chunk.iter_mut().zip(block.as_ref()) {
                *byte ^= pad;
            }
        }
    }
}

impl EncryptionProvider for MockProvider {
    fn scheme(&self) -> &str {
        "mock"
    }

    fn encrypt(&self, plaintext: &[u8], context: &DerivationContext) -> Result<Vec<u8>> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let key = keys::digest_key(&context.canonical_bytes()?);

        let mut body = plaintext.to_vec();
        Self::apply_keystream(key.as_bytes(), &mut body);
        let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes()), &body);
        body.extend_from_slice(tag.as_ref());
        Ok(body)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &DerivationContext) -> Result<Vec<u8>> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if ciphertext.len() < MOCK_TAG_LEN {
            return Err(VaultError::Integrity);
        }
        let key = keys::digest_key(&context.canonical_bytes()?);

        let (body, tag) = ciphertext.split_at(ciphertext.len() - MOCK_TAG_LEN);
        hmac::verify(&hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes()), body, tag)
            .map_err(|_| VaultError::Integrity)?;

        let mut plaintext = body.to_vec();
        Self::apply_keystream(key.as_bytes(), &mut plaintext);
        Ok(plaintext)
    }
}
