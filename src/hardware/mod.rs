//! Hardware Module
//!
//! Block device discovery and the RAID array planner built on top of it.

pub mod discovery;
pub mod raid;

pub use discovery::*;
pub use raid::*;
