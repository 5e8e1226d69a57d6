pub mod metrics;
pub mod tracing;

pub use crate::tracing::init_test_tracing;
