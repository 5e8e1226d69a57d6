pub mod audit_log;
mod db;
pub mod migrations;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use db::*;
