use async_trait::async_trait;

use super::{Authorizations, Key, Val};
use crate::err::Error;
use crate::model::ByteRange;

/// The physical scanner / connector to the underlying sorted key-value
/// store (spec §1, out of scope; spec §6, "To the KV-store connector").
#[async_trait]
pub trait KvStoreConnector: Send + Sync {
	type Scan: Scanner;

	/// Opens a scoped batch scanner against `table`. The caller is
	/// responsible for calling [`Scanner::close`] on every exit path (spec
	/// §4.3, §5, §9 "Resource scope").
	async fn create_batch_scanner(
		&self,
		table: &str,
		auths: &Authorizations,
		threads_hint: usize,
	) -> Result<Self::Scan, Error>;
}

/// One scoped scan over an index table. Mirrors the Accumulo-style
/// `BatchScanner` contract in spec §6: `setRanges`, `fetchColumnFamily`,
/// iteration, `close`.
#[async_trait]
pub trait Scanner: Send {
	/// Restricts this scan to the union of `ranges`.
	fn set_ranges(&mut self, ranges: Vec<ByteRange>);

	/// Restricts this scan to the column family identified by `tag` (the
	/// writer's `(family, qualifier)`-derived tag, spec §6).
	fn fetch_column_family(&mut self, tag: &[u8]);

	/// Returns the next `(key, value)` pair, or `None` once the scan is
	/// exhausted.
	async fn next_entry(&mut self) -> Result<Option<(Key, Val)>, Error>;

	/// Releases the scanner's server-side resources. Must be idempotent:
	/// called on normal completion, early return, and error paths alike.
	async fn close(&mut self);
}
