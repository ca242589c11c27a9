//! Lease claim/release and retry scheduling for `silver.rollup_configs`.
//! Every mutation here is a single guarded `UPDATE ... RETURNING`; there is
//! no in-process locking.

pub mod claim;
pub mod retry;

pub use claim::{budget_exceeded, release_no_progress, release_success, try_claim, ReleaseOutcome};
pub use retry::{next_retry_time, schedule_retry};
