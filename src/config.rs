//! Store configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! pbkdf2_iterations = 100000
//! salt = "6f1c..."            # hex, optional; random per process when absent
//! default_scheme = "aes-256-gcm"
//! max_id_attempts = 8
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::Cipher;
use crate::error::{Result, VaultError};
use crate::keys::{Salt, DEFAULT_ITERATIONS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// PBKDF2 work factor for the AEAD providers.
    pub pbkdf2_iterations: u32,
    /// Hex-encoded key-derivation salt. Keys are only reproducible across
    /// restarts when this is set.
    pub salt: Option<String>,
    /// Scheme used when a policy asks for `"default"`.
    pub default_scheme: String,
    /// How many identifiers `store` generates before giving up on collisions.
    pub max_id_attempts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_ITERATIONS,
            salt: None,
            default_scheme: Cipher::Aes256Gcm.scheme().to_string(),
            max_id_attempts: 8,
        }
    }
}

impl VaultConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VaultError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(VaultError::Config("pbkdf2_iterations must be non-zero".into()));
        }
        if self.max_id_attempts == 0 {
            return Err(VaultError::Config("max_id_attempts must be non-zero".into()));
        }
        if self.default_scheme.trim().is_empty() || self.default_scheme == crate::store::DEFAULT_SCHEME {
            return Err(VaultError::Config("default_scheme must name a concrete scheme".into()));
        }
        if let Some(salt) = &self.salt {
            Salt::from_hex(salt)?;
        }
        Ok(())
    }

    /// The configured salt, or a fresh random one.
    pub(crate) fn salt(&self) -> Result<Salt> {
        match &self.salt {
            Some(encoded) => Salt::from_hex(encoded),
            None => Salt::generate(),
        }
    }
}
