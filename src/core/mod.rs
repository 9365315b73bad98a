// Core ledger data structures

mod block;
mod hash;
mod transaction;

pub use block::*;
pub use hash::*;
pub use transaction::*;

/// Current wall-clock time in seconds since the Unix epoch
pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
