/// A raw key from the sorted key-value store, with an accessor for the
/// column-qualifier component (spec §6: "iteration yielding `(Key, Value)`
/// with accessors for column qualifier"). For an index entry this is where
/// the writer encodes the referenced base-table row-id (spec §4.3: "the
/// column qualifier carries the referenced row-id").
///
/// The planner never parses the full key layout itself — that is the
/// connector's row/family/qualifier/timestamp packing convention (out of
/// scope, §1) — it only ever reads the qualifier back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
	bytes: Vec<u8>,
	qualifier: Vec<u8>,
}

impl Key {
	pub fn new(bytes: Vec<u8>, qualifier: Vec<u8>) -> Self {
		Self {
			bytes,
			qualifier,
		}
	}

	/// The full, opaque key bytes as ordered by the store's comparator.
	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// The column-qualifier component, carrying the index entry's row-id.
	pub fn column_qualifier(&self) -> &[u8] {
		&self.qualifier
	}
}
