//! Yield routing to content-addressed destinations.

pub mod router;

pub use router::{DestinationId, RoutedYield, YieldRouter};
