//! Control Plane Module
//!
//! Top-level flows: gathering the desired state, driving a reconciliation
//! pass and controlling the serving process.

pub mod configure;
pub mod driver;
pub mod service;

pub use configure::*;
pub use driver::*;
pub use service::*;
