//! Memoizes per-column-constraint cardinality estimates and supports
//! short-circuit polling that returns as soon as any column is "small
//! enough" (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::cnf;
use crate::err::Error;
use crate::idx::sharding::ShardedIndexStorage;
use crate::idx::ConstraintRanges;
use crate::kvs::{Authorizations, MetricsStore};
use crate::model::{ByteRange, CardinalityEstimate, ColumnId};
use crate::pool::WorkerPool;

/// Per-`(column, range)` memoization table, shared across concurrent
/// `apply` calls (spec §4.2: "safe for concurrent readers"; §5: "shared
/// across concurrent `apply` calls").
///
/// Grounded on the `DashMap`-backed cache in the teacher's
/// `idx/trees/store/cache.rs` (`TreeCaches`), which memoizes per-key
/// computed values behind an `Arc<DashMap<..>>` for the same reason: cheap
/// concurrent reads, occasional concurrent inserts.
pub struct CardinalityCache<M: MetricsStore> {
	metrics: Arc<M>,
	pool: WorkerPool,
	sharding: Arc<ShardedIndexStorage>,
	memo: Arc<DashMap<(ColumnId, ByteRange), u64>>,
}

impl<M: MetricsStore> Clone for CardinalityCache<M> {
	fn clone(&self) -> Self {
		Self {
			metrics: self.metrics.clone(),
			pool: self.pool.clone(),
			sharding: self.sharding.clone(),
			memo: self.memo.clone(),
		}
	}
}

impl<M: MetricsStore + 'static> CardinalityCache<M> {
	pub(crate) fn new(metrics: Arc<M>, pool: WorkerPool, sharding: Arc<ShardedIndexStorage>) -> Self {
		Self {
			metrics,
			pool,
			sharding,
			memo: Arc::new(DashMap::new()),
		}
	}

	/// Drops every memoized estimate for `column` (spec §4.2: "memoized
	/// across queries until an external invalidation event"). The event's
	/// source is out of scope (§1); this is the entry point for it.
	pub fn invalidate_column(&self, column: &ColumnId) {
		self.memo.retain(|(c, _), _| c != column);
	}

	/// Computes (or recalls) a cardinality estimate per constraint, returned
	/// ascending by estimate.
	///
	/// `small_card_threshold == 0` runs in full mode: every estimate is
	/// awaited. `small_card_threshold > 0` runs in short-circuit mode: as
	/// soon as one estimate is `<= small_card_threshold`, the remaining
	/// in-flight estimator tasks are aborted and dropped from the result
	/// (spec §4.2).
	pub async fn get_cardinalities(
		&self,
		schema: &str,
		table: &str,
		_auths: &Authorizations,
		constraint_ranges: &ConstraintRanges,
		small_card_threshold: u64,
		poll_interval: Duration,
	) -> Result<Vec<CardinalityEstimate>, Error> {
		let short_circuit = small_card_threshold > 0;
		debug!(
			"cardinality lookup for {schema}.{table}: {} constraints, short_circuit={short_circuit}",
			constraint_ranges.len()
		);

		let mut abort_handles = Vec::with_capacity(constraint_ranges.len());
		let mut in_flight = FuturesUnordered::new();
		for (submission_index, (constraint, ranges)) in constraint_ranges.iter().enumerate() {
			let this = self.clone();
			let column = constraint.id.clone();
			let ranges = ranges.clone();
			let handle = self
				.pool
				.spawn(async move { (submission_index, this.estimate_for(column, ranges).await) })
				.await?;
			abort_handles.push(handle.abort_handle());
			in_flight.push(handle);
		}

		let poll_interval =
			poll_interval.max(Duration::from_millis(*cnf::MIN_POLL_INTERVAL_MILLIS));
		let mut ticker = tokio::time::interval(poll_interval);
		// The first tick fires immediately; consume it so the loop below only
		// wakes on the configured cadence from here on.
		ticker.tick().await;

		// Each result is tagged with the index it was submitted at, so the
		// final sort can break ties on submission order rather than on
		// whatever order tasks happened to complete in.
		let mut results: Vec<(usize, CardinalityEstimate)> = Vec::with_capacity(abort_handles.len());
		while !in_flight.is_empty() {
			tokio::select! {
				Some(joined) = in_flight.next() => {
					let (submission_index, estimate) = joined
						.map_err(|e| Error::MetricsUnavailable(format!("cardinality task panicked: {e}")))?;
					let estimate = estimate?;
					let hit = short_circuit && estimate.estimated_matching_rows <= small_card_threshold;
					results.push((submission_index, estimate));
					if hit {
						trace!("cardinality short-circuit: dropping {} in-flight task(s)", in_flight.len());
						for ah in &abort_handles {
							ah.abort();
						}
						break;
					}
				}
				_ = ticker.tick() => {
					trace!("cardinality poll tick, {} still in flight", in_flight.len());
				}
			}
		}

		// Sort by `(estimate, submission_index)`: ties keep the submission
		// order over `constraint_ranges` (Open Question 2), not the
		// nondeterministic order tasks happened to complete in.
		results.sort_by_key(|(submission_index, e)| (e.estimated_matching_rows, *submission_index));
		Ok(results.into_iter().map(|(_, e)| e).collect())
	}

	async fn estimate_for(
		&self,
		column: ColumnId,
		ranges: Vec<ByteRange>,
	) -> Result<CardinalityEstimate, Error> {
		// The index table spreads every logical range across `numShards`
		// physical shards (spec §3, `IndexEntry`), and the metrics store's
		// contract is keyed on a shard-prefixed range (spec §6,
		// `cardinality(column, shard_prefixed_range)`), so the per-column
		// estimate sums cardinalities across every shard, not just the bare
		// unsharded range.
		let mut total = 0u64;
		for range in ranges {
			for shard_range in self.sharding.encode_all_shard_ranges(&range) {
				let key = (column.clone(), shard_range.clone());
				if let Some(cached) = self.memo.get(&key) {
					total += *cached;
					continue;
				}
				let estimate = self.metrics.cardinality(&column, &shard_range).await?;
				self.memo.insert(key, estimate);
				total += estimate;
			}
		}
		Ok(CardinalityEstimate::new(column, total))
	}
}
