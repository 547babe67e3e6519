//! Hardware Discovery Module
//!
//! Discovers whole block devices on Linux systems and identifies the one
//! hosting the root filesystem.

pub mod scanner;

pub use scanner::*;
