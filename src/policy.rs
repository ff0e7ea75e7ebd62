//! Access policies and the security contexts they are checked against.
//!
//! A policy is bound to a source when it is stored and never changes
//! afterwards. Authorization is evaluated per call, in a fixed order:
//! allow-list, then expiration, then second factor.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Classification tag. Informational; enforcement uses the other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Restricted,
    Confidential,
}

impl AccessLevel {
    /// Lower-case name, as used in snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
            Self::Confidential => "confidential",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "restricted" => Ok(Self::Restricted),
            "confidential" => Ok(Self::Confidential),
            other => Err(VaultError::Validation(format!("unknown access level: {other}"))),
        }
    }
}

/// Who may read a source and under what conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub level: AccessLevel,
    pub allowed_users: BTreeSet<String>,
    /// Selects the encryption provider. `"default"` resolves to the
    /// store's default scheme at store time.
    pub encryption_scheme: String,
    /// Absent means the policy never expires.
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub require_2fa: bool,
}

impl AccessPolicy {
    /// A policy that never expires and needs no second factor.
    pub fn new<I, S>(level: AccessLevel, allowed_users: I, encryption_scheme: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            level,
            allowed_users: allowed_users.into_iter().map(Into::into).collect(),
            encryption_scheme: encryption_scheme.into(),
            expiration: None,
            require_2fa: false,
        }
    }

    /// Deny access from `expiration` onwards.
    pub fn expires_at(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Require verified second-factor evidence on every read.
    pub fn requiring_2fa(mut self) -> Self {
        self.require_2fa = true;
        self
    }

    /// Whether `user` is on the allow-list.
    pub fn allows(&self, user: &str) -> bool {
        self.allowed_users.contains(user)
    }

    /// The persistent access state at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> AccessState {
        match self.expiration {
            Some(expiration) if expiration <= now => AccessState::Expired,
            _ => AccessState::Active,
        }
    }

    /// Run the authorization checks in order. No cryptographic work
    /// happens here; callers decrypt only after this returns `Ok`.
    pub fn authorize(
        &self,
        context: &SecurityContext,
        verifier: &dyn SecondFactorVerifier,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user = match context.user.as_deref() {
            Some(user) if self.allows(user) => user,
            _ => return Err(VaultError::PermissionDenied),
        };

        if self.state_at(now) == AccessState::Expired {
            return Err(VaultError::Expired);
        }

        if self.require_2fa {
            let verified = context
                .second_factor
                .as_deref()
                .map(|evidence| verifier.verify(user, evidence))
                .unwrap_or(false);
            if !verified {
                return Err(VaultError::MissingSecondFactor);
            }
        }

        Ok(())
    }
}

/// Persistent access state of a stored item. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessState {
    Active,
    Expired,
}

/// The acting principal and any proof it presents. Assumed to be
/// authenticated upstream; never persisted. Only the user and the second
/// factor take part in authorization, so nothing else is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityContext {
    pub user: Option<String>,
    #[serde(default)]
    pub second_factor: Option<String>,
}

impl SecurityContext {
    /// A context acting as `user`, with no second factor.
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::default()
        }
    }

    /// Attach second-factor evidence, checked by the store's verifier.
    pub fn with_second_factor(mut self, evidence: impl Into<String>) -> Self {
        self.second_factor = Some(evidence.into());
        self
    }
}

/// Decides whether second-factor evidence is valid for a user.
pub trait SecondFactorVerifier: Send + Sync {
    fn verify(&self, user: &str, evidence: &str) -> bool;
}

impl<F> SecondFactorVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn verify(&self, user: &str, evidence: &str) -> bool {
        self(user, evidence)
    }
}

/// Accepts any non-blank evidence. Suitable when the second factor was
/// already checked upstream and the context only carries its result.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceVerifier;

impl SecondFactorVerifier for PresenceVerifier {
    fn verify(&self, _user: &str, evidence: &str) -> bool {
        !evidence.trim().is_empty()
    }
}
