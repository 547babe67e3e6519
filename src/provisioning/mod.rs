//! Provisioning Module
//!
//! Filesystem side of reconciliation: location trees, ownership policy and
//! migration of data from retired roots.

pub mod migration;
pub mod policy;
pub mod provisioner;

pub use migration::*;
pub use policy::*;
pub use provisioner::*;
