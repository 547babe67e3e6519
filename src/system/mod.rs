//! System Adapters
//!
//! Implementations of the [`SystemExecutor`](crate::domain::ports::SystemExecutor)
//! port:
//! - Process: spawns real host programs
//! - Scripted: records calls and replays canned outputs

pub mod process;
pub mod scripted;

pub use process::*;
pub use scripted::*;
