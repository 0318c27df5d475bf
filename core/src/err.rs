use std::fmt;

use thiserror::Error;

/// Errors the planner can surface from a single `apply` call.
///
/// `IndexDisabled` and `NoIndexedConstraint` from the error taxonomy are
/// deliberately *not* variants here: both are non-fatal dispositions that
/// resolve straight to [`crate::model::PlanResult::DoNotUseIndex`] rather
/// than failing the call (see [`crate::idx::planner::IndexPlanner::apply`]).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The metrics store could not produce a row count or cardinality estimate.
	#[error("metrics store unavailable: {0}")]
	MetricsUnavailable(String),

	/// A scan task against the index table failed; all sibling tasks for the
	/// same `apply` call are cancelled.
	#[error("index scan failed: {0}")]
	ScanFailure(String),

	/// The planning call was cancelled by an external interrupt.
	#[error("planning interrupted")]
	Interrupted,

	/// A programmer error: a configuration value violated its documented
	/// contract (`rangesPerBin <= 0`, `numShards <= 1`, a threshold outside
	/// `[0, 1]`).
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

impl Error {
	pub fn invalid_config(msg: impl fmt::Display) -> Self {
		Error::InvalidConfig(msg.to_string())
	}
}
