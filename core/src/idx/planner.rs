//! Top-level policy (spec §4.5): filters for indexed constraints,
//! optionally consults the cardinality cache, chooses between single-column
//! lookup and multi-column intersection, applies the selectivity threshold,
//! and emits tablet splits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cnf;
use crate::err::Error;
use crate::idx::binner::RangeBinner;
use crate::idx::cache::CardinalityCache;
use crate::idx::scanner::IndexScanner;
use crate::idx::sharding::ShardedIndexStorage;
use crate::idx::ConstraintRanges;
use crate::kvs::{Authorizations, KvStoreConnector, MetricsStore};
use crate::model::{ByteRange, ColumnConstraint, ColumnId, PlanResult, RowId};
use crate::pool::WorkerPool;

/// Per-query session properties (spec §4.5.1). These come from the query
/// engine's session property plumbing (out of scope, §1) and so are passed
/// explicitly into [`IndexPlanner::apply`] rather than held process-global,
/// unlike the deployment-level tunables in [`crate::cnf`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
	/// Master switch.
	pub optimize_index_enabled: bool,
	/// Whether to consult the cardinality cache at all.
	pub index_metrics_enabled: bool,
	/// Whether the cardinality cache may short-circuit.
	pub index_short_circuit_enabled: bool,
	/// Maximum index-scan ratio vs. table row count before falling back, in
	/// `[0, 1]`.
	pub index_threshold: f64,
	/// "Small enough to skip intersection" threshold, as a fraction of
	/// `numRows`, in `[0, 1]`.
	pub index_small_card_threshold: f64,
	/// "Small enough to skip intersection" threshold, as an absolute row
	/// count ceiling.
	pub index_small_card_row_threshold: u64,
	/// Target tablet-split size.
	pub num_index_rows_per_split: u32,
	/// Cardinality-cache short-circuit poll interval.
	pub index_cardinality_cache_polling_duration: Duration,
}

impl PlannerConfig {
	fn validate(&self) -> Result<(), Error> {
		for (name, value) in [
			("indexThreshold", self.index_threshold),
			("indexSmallCardThreshold", self.index_small_card_threshold),
		] {
			if !(0.0..=1.0).contains(&value) {
				return Err(Error::invalid_config(format!("{name} must be in [0, 1], got {value}")));
			}
		}
		if self.num_index_rows_per_split == 0 {
			return Err(Error::invalid_config("numIndexRowsPerSplit must be > 0"));
		}
		Ok(())
	}

	/// `min(numRows * smallPct, smallRowThreshold)` (spec §4.5.1).
	fn small_cardinality_threshold(&self, num_rows: u64) -> u64 {
		let by_pct = (num_rows as f64 * self.index_small_card_threshold).floor() as u64;
		by_pct.min(self.index_small_card_row_threshold)
	}
}

/// Orchestrates [`CardinalityCache`], [`IndexScanner`], and [`RangeBinner`]
/// behind the decision algorithm of spec §4.5.2.
///
/// Owns the worker pool (spec §5: "The planner owns an unbounded cached
/// thread pool... created at planner construction and torn down at planner
/// shutdown").
pub struct IndexPlanner<C: KvStoreConnector, M: MetricsStore> {
	connector: Arc<C>,
	metrics: Arc<M>,
	pool: WorkerPool,
	cache: CardinalityCache<M>,
	sharding: Arc<ShardedIndexStorage>,
}

impl<C: KvStoreConnector + 'static, M: MetricsStore + 'static> IndexPlanner<C, M> {
	/// Constructs a planner backed by `num_shards` physical index shards
	/// (spec §4.1, `ShardedIndexStorage`'s own constructor parameter). This is
	/// deployment-level index topology, fixed for the planner's lifetime, and
	/// so is a constructor argument rather than a [`PlannerConfig`] session
	/// property (those come from the query engine's per-query plumbing,
	/// §4.5.1, and a shard count isn't one of them).
	///
	/// # Errors
	/// Returns [`Error::InvalidConfig`] if `num_shards <= 1`.
	pub fn new(connector: C, metrics: M, num_shards: usize) -> Result<Self, Error> {
		let sharding = Arc::new(ShardedIndexStorage::new(num_shards)?);
		let width = *cnf::SCANNER_CONCURRENCY_MULTIPLIER * num_cpus::get();
		let pool = WorkerPool::new(width);
		let metrics = Arc::new(metrics);
		let cache = CardinalityCache::new(metrics.clone(), pool.clone(), sharding.clone());
		Ok(Self {
			connector: Arc::new(connector),
			metrics,
			pool,
			cache,
			sharding,
		})
	}

	/// Best-effort, idempotent interruption of any workers still running
	/// (spec §5, "Lifecycle").
	pub fn shutdown(&self) {
		self.pool.shutdown();
	}

	/// Exposes the cardinality cache so callers can invalidate it on index
	/// writes (spec §4.2, "until an external invalidation event" — the event
	/// itself is out of scope, §1).
	pub fn cardinality_cache(&self) -> &CardinalityCache<M> {
		&self.cache
	}

	/// Decides whether to use the index for `constraints`, and if so,
	/// produces the tablet splits to execute (spec §4.5.2).
	#[allow(clippy::too_many_arguments)]
	pub async fn apply(
		&self,
		schema: &str,
		table: &str,
		index_table: &str,
		constraints: &[ColumnConstraint],
		row_id_ranges: &[ByteRange],
		auths: &Authorizations,
		config: &PlannerConfig,
	) -> Result<PlanResult, Error> {
		config.validate()?;

		if !config.optimize_index_enabled {
			debug!("index optimization disabled, falling back to base-table scan");
			return Ok(PlanResult::DoNotUseIndex);
		}

		let constraint_ranges = Self::indexed_constraint_ranges(constraints);
		if constraint_ranges.is_empty() {
			debug!("no indexed constraint in query, falling back to base-table scan");
			return Ok(PlanResult::DoNotUseIndex);
		}

		let scanner = IndexScanner::new(self.connector.clone(), self.pool.clone(), self.sharding.clone());

		if !config.index_metrics_enabled {
			let scanned =
				scanner.scan(index_table, &constraint_ranges, row_id_ranges, auths).await?;
			let ranges = Self::intersect_all(&constraint_ranges, scanned)?;
			return Ok(PlanResult::UseIndex(RangeBinner::bin(
				config.num_index_rows_per_split,
				ranges,
			)?));
		}

		self.apply_with_metrics(
			schema,
			table,
			index_table,
			&constraint_ranges,
			row_id_ranges,
			auths,
			config,
			&scanner,
		)
		.await
	}

	#[allow(clippy::too_many_arguments)]
	async fn apply_with_metrics(
		&self,
		schema: &str,
		table: &str,
		index_table: &str,
		constraint_ranges: &ConstraintRanges,
		row_id_ranges: &[ByteRange],
		auths: &Authorizations,
		config: &PlannerConfig,
		scanner: &IndexScanner<C>,
	) -> Result<PlanResult, Error> {
		let num_rows = self.metrics.num_rows_in_table(schema, table).await?;
		let small_t = config.small_cardinality_threshold(num_rows);

		let cache_threshold = if config.index_short_circuit_enabled {
			small_t
		} else {
			0
		};
		let poll_duration = config.index_cardinality_cache_polling_duration;

		let cards = self
			.cache
			.get_cardinalities(schema, table, auths, constraint_ranges, cache_threshold, poll_duration)
			.await?;

		let Some(lowest) = cards.first() else {
			debug!("cardinality cache returned no estimates, falling back to base-table scan");
			return Ok(PlanResult::DoNotUseIndex);
		};

		let row_ranges = if lowest.estimated_matching_rows > small_t {
			// No constraint is small enough on its own.
			if constraint_ranges.len() == 1 && num_rows > 0 {
				let ratio = lowest.estimated_matching_rows as f64 / num_rows as f64;
				if ratio >= config.index_threshold {
					debug!(
						"single indexed column ratio {ratio} >= threshold {}, skipping index scan",
						config.index_threshold
					);
					return Ok(PlanResult::DoNotUseIndex);
				}
			}
			let scanned =
				scanner.scan(index_table, constraint_ranges, row_id_ranges, auths).await?;
			Self::intersect_all(constraint_ranges, scanned)?
		} else {
			// One column is small enough: skip intersection entirely.
			let low_column = lowest.column.clone();
			let single: ConstraintRanges = constraint_ranges
				.iter()
				.filter(|(c, _)| c.id == low_column)
				.cloned()
				.collect();
			let mut scanned = scanner.scan(index_table, &single, row_id_ranges, auths).await?;
			let rows = scanned.remove(&low_column).unwrap_or_default();
			Self::rows_to_ranges(rows)
		};

		if row_ranges.is_empty() {
			debug!("indexed predicates match no rows");
			return Ok(PlanResult::UseIndex(Vec::new()));
		}

		let ratio = row_ranges.len() as f64 / num_rows.max(1) as f64;
		if ratio >= config.index_threshold {
			debug!(
				"post-scan ratio {ratio} >= threshold {}, falling back to base-table scan",
				config.index_threshold
			);
			return Ok(PlanResult::DoNotUseIndex);
		}

		Ok(PlanResult::UseIndex(RangeBinner::bin(config.num_index_rows_per_split, row_ranges)?))
	}

	/// Filters for `indexed == true` constraints, pairing each with its
	/// already-lowered byte ranges (spec §4.5.2: `C`, `CR(c)`). Warns once
	/// per dropped, non-indexed constraint (spec §7, `NoIndexedConstraint`).
	///
	/// Open Question 1 (spec §9): when a constraint's domain lowers to zero
	/// byte ranges, it is kept (not silently dropped) with an empty range
	/// list, which the scanner then treats as "matches nothing" for that
	/// column — the safer of the two readings, since silently dropping it
	/// would widen the result instead of narrowing it.
	fn indexed_constraint_ranges(constraints: &[ColumnConstraint]) -> ConstraintRanges {
		let mut out = Vec::new();
		for c in constraints {
			if !c.indexed {
				warn!("column {} has no index, excluded from index planning", c.id.display_name);
				continue;
			}
			let ranges = c.domain.clone();
			out.push((c.clone(), ranges));
		}
		out
	}

	fn rows_to_ranges(rows: HashSet<RowId>) -> Vec<ByteRange> {
		let mut rows: Vec<RowId> = rows.into_iter().collect();
		rows.sort();
		rows.into_iter().map(|r| ByteRange::point(r.into_bytes())).collect()
	}

	/// Folds set-intersection across every scanned constraint in submission
	/// order, seeded by the first entry of `constraint_ranges` (spec §4.5.3,
	/// §5 "Ordering"). The result is materialized by sorting row-ids, a
	/// deterministic per-call order (spec §4.5.3).
	fn intersect_all(
		constraint_ranges: &ConstraintRanges,
		mut scanned: HashMap<ColumnId, HashSet<RowId>>,
	) -> Result<Vec<ByteRange>, Error> {
		let mut columns = constraint_ranges.iter().map(|(c, _)| &c.id);
		let Some(first) = columns.next() else {
			return Ok(Vec::new());
		};
		let mut acc = scanned.remove(first).unwrap_or_default();
		for column in columns {
			let next = scanned.remove(column).unwrap_or_default();
			acc.retain(|row| next.contains(row));
		}
		Ok(Self::rows_to_ranges(acc))
	}
}

#[cfg(test)]
mod tests {
	use async_trait::async_trait;

	use super::*;
	use crate::kvs::{Key, Scanner as KvScanner};
	use crate::model::Domain;

	fn config() -> PlannerConfig {
		PlannerConfig {
			optimize_index_enabled: true,
			index_metrics_enabled: false,
			index_short_circuit_enabled: false,
			index_threshold: 0.3,
			index_small_card_threshold: 0.01,
			index_small_card_row_threshold: 100_000,
			num_index_rows_per_split: 2,
			index_cardinality_cache_polling_duration: Duration::from_millis(1),
		}
	}

	fn column(name: &str) -> ColumnId {
		ColumnId::new("cf", name, name)
	}

	fn domain() -> Domain {
		vec![ByteRange::unbounded()]
	}

	struct StubScanner {
		by_column: HashMap<String, Vec<u8>>,
		rows: std::vec::IntoIter<u8>,
	}

	#[async_trait]
	impl KvScanner for StubScanner {
		fn set_ranges(&mut self, _ranges: Vec<ByteRange>) {}

		fn fetch_column_family(&mut self, tag: &[u8]) {
			let tag = String::from_utf8_lossy(tag).to_string();
			let rows = self.by_column.get(&tag).cloned().unwrap_or_default();
			self.rows = rows.into_iter();
		}

		async fn next_entry(&mut self) -> Result<Option<(Key, Vec<u8>)>, Error> {
			Ok(self.rows.next().map(|r| (Key::new(vec![r], vec![r]), vec![])))
		}

		async fn close(&mut self) {}
	}

	struct StubConnector {
		// Keyed by the column-family tag (`"<family>:<qualifier>"`, see
		// `super::column_family_tag`) rather than table name, since every
		// constraint in one `apply` call shares the same index table and is
		// distinguished only by which column family the scanner fetches.
		by_column: HashMap<String, Vec<u8>>,
		// Shared with the test so a scan count can be asserted after the
		// connector has been moved into the planner.
		opens: Arc<std::sync::atomic::AtomicUsize>,
	}

	impl StubConnector {
		fn new(by_column: HashMap<String, Vec<u8>>) -> (Self, Arc<std::sync::atomic::AtomicUsize>) {
			let opens = Arc::new(std::sync::atomic::AtomicUsize::new(0));
			(
				Self {
					by_column,
					opens: opens.clone(),
				},
				opens,
			)
		}
	}

	#[async_trait]
	impl KvStoreConnector for StubConnector {
		type Scan = StubScanner;

		async fn create_batch_scanner(
			&self,
			_table: &str,
			_auths: &Authorizations,
			_threads_hint: usize,
		) -> Result<Self::Scan, Error> {
			self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			Ok(StubScanner {
				by_column: self.by_column.clone(),
				rows: Vec::new().into_iter(),
			})
		}
	}

	struct StubMetrics {
		num_rows: u64,
		cardinalities: HashMap<String, u64>,
	}

	#[async_trait]
	impl MetricsStore for StubMetrics {
		async fn num_rows_in_table(&self, _schema: &str, _table: &str) -> Result<u64, Error> {
			Ok(self.num_rows)
		}

		async fn cardinality(&self, column: &ColumnId, _range: &ByteRange) -> Result<u64, Error> {
			Ok(self.cardinalities.get(&column.display_name).copied().unwrap_or_default())
		}
	}

	#[tokio::test]
	async fn s1_disabled_yields_do_not_use_index() {
		let (connector, _opens) = StubConnector::new(HashMap::new());
		let metrics = StubMetrics {
			num_rows: 100,
			cardinalities: HashMap::new(),
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.optimize_index_enabled = false;
		let constraints = vec![ColumnConstraint::new(column("a"), domain(), true)];
		let result = planner
			.apply("ns", "tb", "ns.tb/a", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		assert_eq!(result, PlanResult::DoNotUseIndex);
	}

	#[tokio::test]
	async fn s2_no_indexed_columns_yields_do_not_use_index() {
		let (connector, _opens) = StubConnector::new(HashMap::new());
		let metrics = StubMetrics {
			num_rows: 100,
			cardinalities: HashMap::new(),
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let constraints = vec![ColumnConstraint::new(column("a"), domain(), false)];
		let result = planner
			.apply("ns", "tb", "ns.tb/a", &constraints, &[ByteRange::unbounded()], &vec![], &config())
			.await
			.unwrap();
		assert_eq!(result, PlanResult::DoNotUseIndex);
	}

	#[tokio::test]
	async fn s3_no_metrics_single_column_bins_the_scan() {
		let mut by_column = HashMap::new();
		by_column.insert("cf:a".to_string(), vec![1u8, 3, 7]);
		let (connector, _opens) = StubConnector::new(by_column);
		let metrics = StubMetrics {
			num_rows: 0,
			cardinalities: HashMap::new(),
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.index_metrics_enabled = false;
		let constraints = vec![ColumnConstraint::new(column("a"), domain(), true)];
		let result = planner
			.apply("ns", "tb", "ns.tb/a", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		match result {
			PlanResult::UseIndex(splits) => {
				assert_eq!(splits.len(), 2);
				assert_eq!(splits[0].len(), 2);
				assert_eq!(splits[1].len(), 1);
			}
			other => panic!("expected UseIndex, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn s5_threshold_exceeded_yields_do_not_use_index() {
		let (connector, opens) = StubConnector::new(HashMap::new());
		let mut cardinalities = HashMap::new();
		cardinalities.insert("a".to_string(), 800_000u64);
		let metrics = StubMetrics {
			num_rows: 1_000_000,
			cardinalities,
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.index_metrics_enabled = true;
		cfg.index_threshold = 0.5;
		let constraints = vec![ColumnConstraint::new(column("a"), domain(), true)];
		let result = planner
			.apply("ns", "tb", "ns.tb/a", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		assert_eq!(result, PlanResult::DoNotUseIndex);
		// Testable property 5 (spec §8): the single-column ratio short-circuit
		// must fire without ever issuing a KV-store scan.
		assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn s4_short_circuit_scans_only_the_small_column() {
		let mut by_column = HashMap::new();
		by_column.insert("cf:a".to_string(), vec![2u8, 4]);
		by_column.insert("cf:b".to_string(), vec![9u8]);
		let (connector, _opens) = StubConnector::new(by_column);
		let mut cardinalities = HashMap::new();
		cardinalities.insert("a".to_string(), 5_000u64);
		cardinalities.insert("b".to_string(), 800_000u64);
		let metrics = StubMetrics {
			num_rows: 1_000_000,
			cardinalities,
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.index_metrics_enabled = true;
		cfg.index_short_circuit_enabled = true;
		cfg.index_small_card_threshold = 0.01;
		cfg.index_small_card_row_threshold = 100_000;
		let constraints = vec![
			ColumnConstraint::new(column("a"), domain(), true),
			ColumnConstraint::new(column("b"), domain(), true),
		];
		let result = planner
			.apply("ns", "tb", "ns.tb", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		match result {
			PlanResult::UseIndex(splits) => {
				let total: usize = splits.iter().map(|s| s.len()).sum();
				assert_eq!(total, 2);
			}
			other => panic!("expected UseIndex, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn s6_intersection_path_combines_both_columns() {
		let mut by_column = HashMap::new();
		by_column.insert("cf:a".to_string(), vec![1u8, 2, 3, 4]);
		by_column.insert("cf:b".to_string(), vec![2u8, 4, 5]);
		let (connector, _opens) = StubConnector::new(by_column);
		let mut cardinalities = HashMap::new();
		cardinalities.insert("a".to_string(), 200_000u64);
		cardinalities.insert("b".to_string(), 150_000u64);
		let metrics = StubMetrics {
			num_rows: 1_000_000,
			cardinalities,
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.index_metrics_enabled = true;
		cfg.index_threshold = 0.3;
		cfg.index_small_card_threshold = 0.01;
		cfg.index_small_card_row_threshold = 100_000;
		let constraints = vec![
			ColumnConstraint::new(column("a"), domain(), true),
			ColumnConstraint::new(column("b"), domain(), true),
		];
		let result = planner
			.apply("ns", "tb", "ns.tb", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		match result {
			PlanResult::UseIndex(splits) => {
				assert_eq!(splits.len(), 1);
				assert_eq!(splits[0].len(), 2);
			}
			other => panic!("expected UseIndex, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn empty_intersection_is_use_index_empty_not_do_not_use_index() {
		let mut by_column = HashMap::new();
		by_column.insert("cf:a".to_string(), vec![1u8]);
		by_column.insert("cf:b".to_string(), vec![2u8]);
		let (connector, _opens) = StubConnector::new(by_column);
		let metrics = StubMetrics {
			num_rows: 0,
			cardinalities: HashMap::new(),
		};
		let planner = IndexPlanner::new(connector, metrics, 4).unwrap();
		let mut cfg = config();
		cfg.index_metrics_enabled = false;
		let constraints = vec![
			ColumnConstraint::new(column("a"), domain(), true),
			ColumnConstraint::new(column("b"), domain(), true),
		];
		let result = planner
			.apply("ns", "tb", "ns.tb", &constraints, &[ByteRange::unbounded()], &vec![], &cfg)
			.await
			.unwrap();
		assert_eq!(result, PlanResult::UseIndex(Vec::new()));
	}

	#[test]
	fn rejects_threshold_outside_unit_interval() {
		let mut cfg = config();
		cfg.index_threshold = 1.5;
		assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
	}

	#[test]
	fn rejects_zero_rows_per_split() {
		let mut cfg = config();
		cfg.num_index_rows_per_split = 0;
		assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
	}
}
