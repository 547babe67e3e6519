//! RAID Module
//!
//! Plans, validates and builds an mdadm array from disks the scanner reports
//! as eligible.

pub mod commit;
pub mod plan;
pub mod planner;
pub mod wizard;

pub use commit::*;
pub use plan::*;
pub use planner::*;
pub use wizard::*;
