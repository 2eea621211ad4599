//! Authorization for the emergency halt.

pub mod gate;

pub use gate::{AuthorityAnswer, AuthorityRegistry, AuthorizationGate, CallerId, is_authorized};
