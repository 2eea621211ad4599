//! Yield router.
//!
//! `destination = blake3::derive_key(DESTINATION_CONTEXT, routing_params)`.
//! The derivation is a pure function of the routing bytes, so identical
//! params always name the same destination and distinct params collide only
//! with cryptographically negligible probability.
//!
//! Routing is staged: `route` computes the entry, `record` books it. The
//! orchestrator only calls `record` once the whole cycle commits.

use crate::error::CollaboratorError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::{self, Write as _};

const DESTINATION_CONTEXT: &str = "leverage-orchestrator 2024-01 yield destination v1";

// --- Destination identifier ---------------------------------------------

/// Opaque 32-byte destination identifier, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationId([u8; 32]);

impl DestinationId {
    pub fn derive(routing_params: &[u8]) -> Self {
        Self(blake3::derive_key(DESTINATION_CONTEXT, routing_params))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            // Writing into a String cannot fail.
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationId({})", self.to_hex())
    }
}

impl Serialize for DestinationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DestinationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid destination id: {hex}")))
    }
}

// --- Router -------------------------------------------------------------

/// One booked routing of yield to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedYield {
    pub destination: DestinationId,
    pub amount: u128,
}

/// Ledger of routed yield.
#[derive(Debug, Default)]
pub struct YieldRouter {
    routed: Vec<RoutedYield>,
    totals: HashMap<DestinationId, u128>,
}

impl YieldRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the routing for `yield_amount` without booking it.
    ///
    /// Returns `Ok(None)` for a zero yield.
    pub fn route(
        &self,
        yield_amount: u128,
        routing_params: &[u8],
    ) -> Result<Option<RoutedYield>, CollaboratorError> {
        if yield_amount == 0 {
            return Ok(None);
        }
        if routing_params.is_empty() {
            return Err(CollaboratorError::Routing {
                reason: "routing params are empty".to_string(),
            });
        }
        let destination = DestinationId::derive(routing_params);
        let booked = self.routed_total(&destination);
        if booked.checked_add(yield_amount).is_none() {
            return Err(CollaboratorError::Routing {
                reason: format!("routed total for {destination} would overflow"),
            });
        }
        Ok(Some(RoutedYield {
            destination,
            amount: yield_amount,
        }))
    }

    /// Book a routing previously returned by [`YieldRouter::route`].
    pub fn record(&mut self, routed: RoutedYield) {
        let total = self.totals.entry(routed.destination).or_insert(0);
        *total = total.saturating_add(routed.amount);
        self.routed.push(routed);
    }

    pub fn routed(&self) -> &[RoutedYield] {
        &self.routed
    }

    pub fn routed_total(&self, destination: &DestinationId) -> u128 {
        self.totals.get(destination).copied().unwrap_or(0)
    }
}
