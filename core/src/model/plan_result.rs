use super::TabletSplit;

/// The planner's decision: either use the index and here are the splits, or
/// fall back to a base-table scan. Deliberately a plain tagged variant
/// rather than an exception (Design Note §9: "Do not encode 'skip index'
/// via exceptions").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanResult {
	/// Use the index. An empty `Vec` means the indexed predicates provably
	/// match no rows (spec §3 invariant 3 / §8 boundary 10) — this is
	/// distinct from `DoNotUseIndex`.
	UseIndex(Vec<TabletSplit>),
	/// Scan the base table directly; the index would not help or is not
	/// applicable.
	DoNotUseIndex,
}

impl PlanResult {
	pub fn is_use_index(&self) -> bool {
		matches!(self, PlanResult::UseIndex(_))
	}
}
