//! Authorization gate for the emergency-halt transition.
//!
//! The authority provider owns the identity -> authorized mapping. The
//! orchestrator asks exactly one question per halt attempt and treats every
//! answer other than an explicit `Authorized` as a refusal (fail-closed).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

// --- Caller identity ----------------------------------------------------

/// Opaque principal presented by a caller of the halt entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// --- Gate contract ------------------------------------------------------

/// Answer returned by an authority provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityAnswer {
    Authorized,
    Denied,
    /// Provider could not be reached or could not read its records.
    Unavailable,
}

/// Capability interface of the external authority provider.
///
/// `query` must not mutate authority state.
pub trait AuthorizationGate: Send + Sync {
    fn query(&self, identity: &CallerId) -> AuthorityAnswer;
}

impl<G: AuthorizationGate + ?Sized> AuthorizationGate for Arc<G> {
    fn query(&self, identity: &CallerId) -> AuthorityAnswer {
        (**self).query(identity)
    }
}

/// Fail-closed authorization check.
///
/// Empty identities are refused without consulting the provider.
pub fn is_authorized(gate: &dyn AuthorizationGate, identity: &CallerId) -> bool {
    if identity.is_empty() {
        tracing::debug!("AuthorizationRefused reason=empty_identity");
        return false;
    }
    match gate.query(identity) {
        AuthorityAnswer::Authorized => true,
        AuthorityAnswer::Denied => {
            tracing::debug!("AuthorizationRefused caller={} reason=denied", identity);
            false
        }
        AuthorityAnswer::Unavailable => {
            tracing::warn!(
                "AuthorizationRefused caller={} reason=provider_unavailable (fail-closed)",
                identity
            );
            false
        }
    }
}

// --- Reference provider -------------------------------------------------

/// In-memory authority provider holding one AuthorityRecord per identity.
///
/// Records are mutated through `grant`/`revoke` by whoever owns the registry;
/// the orchestrator only ever sees it through [`AuthorizationGate`].
#[derive(Debug)]
pub struct AuthorityRegistry {
    records: RwLock<HashMap<CallerId, bool>>,
    available: AtomicBool,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn with_authorized(identities: impl IntoIterator<Item = CallerId>) -> Self {
        let records = identities.into_iter().map(|id| (id, true)).collect();
        Self {
            records: RwLock::new(records),
            available: AtomicBool::new(true),
        }
    }

    /// Mark `identity` as authorized. Returns false if the records are unreadable.
    pub fn grant(&self, identity: CallerId) -> bool {
        self.set(identity, true)
    }

    /// Mark `identity` as not authorized. Returns false if the records are unreadable.
    pub fn revoke(&self, identity: CallerId) -> bool {
        self.set(identity, false)
    }

    /// Simulate the provider going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn set(&self, identity: CallerId, authorized: bool) -> bool {
        match self.records.write() {
            Ok(mut records) => {
                records.insert(identity, authorized);
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for AuthorityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationGate for AuthorityRegistry {
    fn query(&self, identity: &CallerId) -> AuthorityAnswer {
        if !self.available.load(Ordering::Acquire) {
            return AuthorityAnswer::Unavailable;
        }
        match self.records.read() {
            Ok(records) => {
                if records.get(identity).copied().unwrap_or(false) {
                    AuthorityAnswer::Authorized
                } else {
                    AuthorityAnswer::Denied
                }
            }
            Err(_) => AuthorityAnswer::Unavailable,
        }
    }
}
