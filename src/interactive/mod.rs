//! Interactive Adapters
//!
//! Implementations of the [`Prompter`](crate::domain::ports::Prompter) port.

pub mod scripted;
pub mod terminal;

pub use scripted::*;
pub use terminal::*;
