//! Low-level AEAD and randomness.
//!
//! Together with `keys`, this is the only place that touches `ring::aead`
//! and `ring::rand`. Providers encrypt and decrypt exclusively through the
//! functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM or ChaCha20-Poly1305 (both authenticated)
//! - **Nonce**: 96-bit, generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, CHACHA20_POLY1305};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = aead::NONCE_LEN;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// The authenticated ciphers a provider can be built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl Cipher {
    /// Scheme name recorded in access policies.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }

    fn algorithm(&self) -> &'static aead::Algorithm {
        match self {
            Self::Aes256Gcm => &AES_256_GCM,
            Self::ChaCha20Poly1305 => &CHACHA20_POLY1305,
        }
    }

    /// Length of the authentication tag appended to every ciphertext.
    pub fn tag_len(&self) -> usize {
        self.algorithm().tag_len()
    }
}

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultError::RandomnessFailure)
}

fn sealing_key(cipher: Cipher, key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    // Both supported algorithms take 256-bit keys, so this cannot fail for
    // a well-formed `DerivedKey`.
    let unbound =
        UnboundKey::new(cipher.algorithm(), key_bytes).map_err(|_| VaultError::EncryptionFailure)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key_bytes`.
///
/// The nonce is prepended to the output so callers never manage it.
///
/// ```text
/// [ nonce (12 bytes) ][ ciphertext ][ tag ]
/// ```
pub fn encrypt(cipher: Cipher, key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = sealing_key(cipher, key_bytes)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| VaultError::EncryptionFailure)?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&in_out);
    Ok(output)
}

/// Decrypt a payload produced by [`encrypt`].
///
/// A wrong key, a truncated payload and a flipped bit all fail the same way,
/// with [`VaultError::Integrity`]. No partial plaintext is ever returned.
pub fn decrypt(cipher: Cipher, key_bytes: &[u8; KEY_LEN], payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < NONCE_LEN + cipher.tag_len() {
        return Err(VaultError::Integrity);
    }

    let (nonce_bytes, sealed) = payload.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| VaultError::Integrity)?;

    let key = sealing_key(cipher, key_bytes).map_err(|_| VaultError::Integrity)?;
    let mut in_out = sealed.to_vec();
    let len = match key.open_in_place(nonce, Aad::empty(), &mut in_out) {
        Ok(plaintext) => plaintext.len(),
        Err(_) => {
            in_out.zeroize();
            return Err(VaultError::Integrity);
        }
    };

    // Hand back the opened buffer itself; the tag bytes are wiped first.
    in_out[len..].zeroize();
    in_out.truncate(len);
    Ok(in_out)
}
