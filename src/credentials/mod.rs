//! Credentials Module
//!
//! Models the htpasswd credential store and reconciles it against the
//! desired user set.

pub mod reconciler;
pub mod store;

pub use reconciler::*;
pub use store::*;
