use async_trait::async_trait;

use crate::err::Error;
use crate::model::{ByteRange, ColumnId};

/// The metrics store this connector reads row counts and per-value
/// cardinalities from (spec §1, out of scope; spec §6, "To the metrics
/// store").
#[async_trait]
pub trait MetricsStore: Send + Sync {
	/// Total number of rows currently in `schema.table`.
	async fn num_rows_in_table(&self, schema: &str, table: &str) -> Result<u64, Error>;

	/// Estimated number of index entries for `column` within the
	/// shard-prefixed `range`.
	async fn cardinality(&self, column: &ColumnId, range: &ByteRange) -> Result<u64, Error>;
}
