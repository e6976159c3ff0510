//! Small shared helpers with no domain knowledge of their own.

pub mod fs;
pub mod hash;
pub mod time;

pub use fs::atomic_write_json;
pub use hash::sha1_hex;
pub use time::{iso_from, iso_now, parse_iso};

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless the stop flag fires first.
///
/// Returns `true` when the sleep was interrupted by cancellation.
pub async fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
