//! Routing Module
//!
//! Generates the per-location configuration units consumed by the serving
//! process:
//! - naming: injective unit file names derived from location roots
//! - unit: server block rendering and read-back
//! - router: full-set replacement of managed units

pub mod naming;
pub mod router;
pub mod unit;

pub use naming::*;
pub use router::*;
pub use unit::*;
