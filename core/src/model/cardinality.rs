use super::ColumnId;

/// A per-column cardinality estimate, valid only within the `apply` call
/// that produced it (spec §3: "created by the cache, valid only within one
/// planning call").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityEstimate {
	pub column: ColumnId,
	pub estimated_matching_rows: u64,
}

impl CardinalityEstimate {
	pub fn new(column: ColumnId, estimated_matching_rows: u64) -> Self {
		Self {
			column,
			estimated_matching_rows,
		}
	}
}
