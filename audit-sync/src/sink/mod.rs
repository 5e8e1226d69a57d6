//! Destinations of indexed audit records.

mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::Sink;
