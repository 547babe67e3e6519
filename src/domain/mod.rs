//! Domain layer - Core value objects and port definitions
//!
//! This module defines the desired-state value objects and the traits (ports)
//! that adapters implement, following hexagonal architecture principles.

pub mod desired;
pub mod ports;

pub use desired::*;
pub use ports::*;
