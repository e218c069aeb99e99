//! Admin HTTP surface: vendor config and mapping management, a routing lookup, and health.

pub mod router;

pub use router::{AdminState, router};
