//! The secondary-index query planner (spec §4): cardinality-driven cost
//! modeling, concurrent fan-out index scans, sharded index-key addressing,
//! and tablet-split binning, orchestrated by [`planner::IndexPlanner`].

pub mod binner;
pub mod cache;
pub mod planner;
pub mod scanner;
pub mod sharding;

use crate::model::{ByteRange, ColumnConstraint};

/// One indexed constraint paired with the byte ranges its domain already
/// carries (spec §4.5.1: "Let `CR(c)` be the byte-ranges derived from each
/// `c`'s domain"). `ColumnConstraint::domain` is already lowered to
/// [`ByteRange`]s by the row serializer before it reaches this crate (out
/// of scope, §1/§6), so `CR(c)` is simply `c.domain.clone()`.
pub(crate) type ConstraintRanges = Vec<(ColumnConstraint, Vec<ByteRange>)>;
