//! Executes range scans against an index table in parallel, one task per
//! indexed constraint, and returns the row-ids each constraint's ranges
//! produced (spec §4.3).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cnf;
use crate::err::Error;
use crate::idx::sharding::ShardedIndexStorage;
use crate::idx::ConstraintRanges;
use crate::kvs::{Authorizations, KvStoreConnector, Scanner as KvScanner};
use crate::model::{ByteRange, ColumnId, RowId};
use crate::pool::WorkerPool;

/// The writer's `(family, qualifier)`-derived column-family tag (spec §6:
/// "the planner must compute the same tag the writer uses"). The writer's
/// convention is out of scope (§1); this crate only needs to reproduce it
/// deterministically, so it is a plain delimited concatenation.
fn column_family_tag(column: &ColumnId) -> Vec<u8> {
	let mut tag = Vec::with_capacity(column.family.len() + column.qualifier.len() + 1);
	tag.extend_from_slice(column.family.as_bytes());
	tag.push(b':');
	tag.extend_from_slice(column.qualifier.as_bytes());
	tag
}

pub struct IndexScanner<C: KvStoreConnector> {
	connector: Arc<C>,
	pool: WorkerPool,
	sharding: Arc<ShardedIndexStorage>,
}

impl<C: KvStoreConnector + 'static> IndexScanner<C> {
	pub(crate) fn new(connector: Arc<C>, pool: WorkerPool, sharding: Arc<ShardedIndexStorage>) -> Self {
		Self {
			connector,
			pool,
			sharding,
		}
	}

	/// Scans `index_table` for every `(constraint, ranges)` pair, one task
	/// per constraint, filtering each matched row-id against `row_id_ranges`
	/// (spec §4.3). On any task failure, the remaining tasks are aborted and
	/// the whole scan fails (spec §7, `ScanFailure`; §5, "any task failure
	/// cancels siblings").
	pub async fn scan(
		&self,
		index_table: &str,
		constraint_ranges: &ConstraintRanges,
		row_id_ranges: &[ByteRange],
		auths: &Authorizations,
	) -> Result<HashMap<ColumnId, HashSet<RowId>>, Error> {
		let threads_hint = *cnf::SCANNER_CONCURRENCY_MULTIPLIER * num_cpus::get();

		let mut handles = Vec::with_capacity(constraint_ranges.len());
		for (constraint, ranges) in constraint_ranges {
			let connector = self.connector.clone();
			let table = index_table.to_string();
			let column = constraint.id.clone();
			let ranges = ranges.clone();
			let row_id_ranges = row_id_ranges.to_vec();
			let auths = auths.clone();
			let sharding = self.sharding.clone();
			let handle = self
				.pool
				.spawn(async move {
					Self::scan_one(
						connector,
						table,
						column,
						ranges,
						row_id_ranges,
						auths,
						threads_hint,
						sharding,
					)
					.await
				})
				.await?;
			handles.push(handle);
		}

		// Cancellation handles are captured before consumption so a failure
		// partway through submission order can still cancel tasks that are
		// still running further down the list (spec §5, §7).
		let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

		// Result consumption follows submission order, not completion order,
		// so that downstream intersection has a deterministic seed (spec §5,
		// "Ordering").
		let mut out = HashMap::with_capacity(handles.len());
		for handle in handles {
			match handle.await {
				Ok(Ok((column, rows))) => {
					out.insert(column, rows);
				}
				Ok(Err(e)) => {
					for ah in &abort_handles {
						ah.abort();
					}
					return Err(e);
				}
				Err(e) => {
					for ah in &abort_handles {
						ah.abort();
					}
					return Err(Error::ScanFailure(format!("scan task panicked: {e}")));
				}
			}
		}
		Ok(out)
	}

	async fn scan_one(
		connector: Arc<C>,
		table: String,
		column: ColumnId,
		ranges: Vec<ByteRange>,
		row_id_ranges: Vec<ByteRange>,
		auths: Authorizations,
		threads_hint: usize,
		sharding: Arc<ShardedIndexStorage>,
	) -> Result<(ColumnId, HashSet<RowId>), Error> {
		let tag = column_family_tag(&column);
		// Every real index key carries a shard prefix (spec §3, `IndexEntry`),
		// so each logical range is fanned out across every shard before it is
		// handed to the connector (spec §4.1, `encodeAllShards`, generalized
		// here from point lookups to range scans).
		let sharded_ranges: Vec<ByteRange> =
			ranges.iter().flat_map(|r| sharding.encode_all_shard_ranges(r)).collect();
		let mut scanner = connector.create_batch_scanner(&table, &auths, threads_hint).await?;
		let outcome = Self::drain(&mut scanner, sharded_ranges, &tag, &row_id_ranges).await;
		// Released on every exit path, per spec §4.3 / §9.
		scanner.close().await;
		outcome.map(|rows| (column, rows))
	}

	async fn drain(
		scanner: &mut C::Scan,
		ranges: Vec<ByteRange>,
		tag: &[u8],
		row_id_ranges: &[ByteRange],
	) -> Result<HashSet<RowId>, Error> {
		scanner.set_ranges(ranges);
		scanner.fetch_column_family(tag);
		let mut rows = HashSet::new();
		while let Some((key, _value)) = scanner.next_entry().await? {
			let row_id = RowId::new(key.column_qualifier().to_vec());
			if row_id_ranges.is_empty() || row_id_ranges.iter().any(|r| r.contains_key(row_id.as_bytes()))
			{
				rows.insert(row_id);
			}
		}
		Ok(rows)
	}
}
