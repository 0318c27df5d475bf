use super::RowId;

/// One row of the index table: `(shard_prefix ++ value, column_family_tag,
/// row_id)`. Written by the external indexer (out of scope, §1); the
/// planner only ever reads these back via [`crate::kvs::Scanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
	/// The shard-prefixed, indexed-value key (see
	/// [`crate::idx::sharding::ShardedIndexStorage`]).
	pub key: Vec<u8>,
	/// The writer's `(family, qualifier)`-derived column family tag.
	pub column_family_tag: Vec<u8>,
	/// The referenced base-table row-id, carried in the column qualifier.
	pub row_id: RowId,
}
