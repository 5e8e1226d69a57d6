use fail::fail_point;

use crate::error::SyncResult;

/// Fails a claim before it reaches the store.
pub const POLLER_BEFORE_CLAIM: &str = "poller.before_claim";

/// Fails a bulk write before it reaches the sink.
pub const WORKER_BEFORE_BULK_WRITE: &str = "worker.before_bulk_write";

/// Returns an error when the named failpoint is configured with `return`.
///
/// Compiles to a no-op unless the `failpoints` feature is enabled.
#[cfg_attr(not(feature = "failpoints"), allow(unused_variables))]
pub fn sync_fail_point(name: &str) -> SyncResult<()> {
    fail_point!(name, |_| {
        crate::bail!(
            crate::error::ErrorKind::InjectedFailure,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
