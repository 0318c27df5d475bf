//! Process-wide tunables for the index planner.
//!
//! These are not query-visible session properties (those live in
//! [`crate::idx::planner::PlannerConfig`], since they come from the query
//! engine's session property plumbing); these are deployment-level knobs an
//! operator tunes via environment variable, in the same
//! [`once_cell`]-backed style the rest of this crate's dependency tree uses
//! for its own constants.

use once_cell::sync::Lazy;

/// Multiplier applied to the detected CPU count to size the bounded
/// concurrency semaphore gating the scanner's worker pool (spec: `4 * cpu_count`).
pub static SCANNER_CONCURRENCY_MULTIPLIER: Lazy<usize> =
	lazy_env_parse_or_else!("TIP_SCANNER_CONCURRENCY_MULTIPLIER", usize, |_| 4);

/// Number of key-value pairs requested per underlying range-scan batch.
pub static SCANNER_BATCH_SIZE: Lazy<u32> = lazy_env_parse!("TIP_SCANNER_BATCH_SIZE", u32, 1_000);

/// Floor for the cardinality-cache short-circuit poll interval, in
/// milliseconds. A `pollInterval` configured below this is clamped up so a
/// misconfigured session property can't busy-poll the metrics store.
pub static MIN_POLL_INTERVAL_MILLIS: Lazy<u64> =
	lazy_env_parse!("TIP_MIN_POLL_INTERVAL_MILLIS", u64, 1);
