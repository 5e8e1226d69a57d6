mod base;
mod connection;
mod pipeline;
mod replicator;
mod sink;

pub use base::*;
pub use connection::*;
pub use pipeline::*;
pub use replicator::*;
pub use sink::*;
