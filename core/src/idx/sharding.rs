use std::hash::{Hash, Hasher};
use std::ops::Bound;

use crate::err::Error;
use crate::model::ByteRange;

/// Deterministic fan-out of a logical index key across `num_shards`
/// physical shards, so index writes and reads spread evenly across all
/// tablet servers (spec §4.1).
///
/// Stateless beyond the shard count: equality and hashing depend only on
/// `num_shards` (spec §4.1, "Equality and hashing depend only on
/// `numShards`").
#[derive(Debug, Clone)]
pub struct ShardedIndexStorage {
	num_shards: usize,
	width: usize,
}

impl ShardedIndexStorage {
	/// Constructs a storage codec for `num_shards` physical shards.
	///
	/// # Errors
	/// Returns [`Error::InvalidConfig`] if `num_shards <= 1`.
	pub fn new(num_shards: usize) -> Result<Self, Error> {
		if num_shards <= 1 {
			return Err(Error::invalid_config(format!(
				"numShards must be > 1, got {num_shards}"
			)));
		}
		Ok(Self {
			num_shards,
			width: decimal_digits(num_shards - 1),
		})
	}

	pub fn num_shards(&self) -> usize {
		self.num_shards
	}

	/// The fixed width of the zero-padded ASCII decimal shard prefix.
	pub fn prefix_width(&self) -> usize {
		self.width
	}

	fn shard_of(&self, bytes: &[u8]) -> usize {
		(abs_non_negative(fnv1a_32(bytes) as i32) as usize) % self.num_shards
	}

	fn prefix_for_shard(&self, shard: usize) -> Vec<u8> {
		format!("{:0width$}", shard, width = self.width).into_bytes()
	}

	/// `shard_prefix ++ bytes`, where `shard_prefix` is the ASCII decimal of
	/// `|hash(bytes)| mod num_shards`, zero-padded to [`Self::prefix_width`].
	pub fn encode(&self, bytes: &[u8]) -> Vec<u8> {
		let mut out = self.prefix_for_shard(self.shard_of(bytes));
		out.extend_from_slice(bytes);
		out
	}

	/// Strips the shard prefix back off, returning the original logical key.
	pub fn decode<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
		&bytes[self.width..]
	}

	/// Enumerates all `num_shards` shard-prefixed forms of `bytes`, in shard
	/// order `0..num_shards`. Used by the scanner to fan out a point lookup
	/// across every shard (spec §4.1).
	pub fn encode_all_shards(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
		(0..self.num_shards)
			.map(|shard| {
				let mut out = self.prefix_for_shard(shard);
				out.extend_from_slice(bytes);
				out
			})
			.collect()
	}

	/// Shard-prefixes one side of a range bound, value-by-value.
	fn prefixed_bound(prefix: &[u8], bound: &Bound<Vec<u8>>) -> Option<Bound<Vec<u8>>> {
		match bound {
			Bound::Included(v) => {
				let mut out = prefix.to_vec();
				out.extend_from_slice(v);
				Some(Bound::Included(out))
			}
			Bound::Excluded(v) => {
				let mut out = prefix.to_vec();
				out.extend_from_slice(v);
				Some(Bound::Excluded(out))
			}
			Bound::Unbounded => None,
		}
	}

	/// The smallest key strictly greater than every key carrying `prefix`,
	/// used as the exclusive upper bound standing in for an unbounded end
	/// once a range has been scoped to one shard. `prefix` is always an
	/// ASCII decimal string, so incrementing its last byte never overflows.
	fn prefix_successor(prefix: &[u8]) -> Vec<u8> {
		let mut out = prefix.to_vec();
		let last = out.last_mut().expect("shard prefix width is always >= 1");
		*last += 1;
		out
	}

	/// Shard-prefixes a single logical-value `range` for one shard, for use
	/// in range scans rather than the point lookups [`Self::encode_all_shards`]
	/// targets (spec §4.1's fan-out, generalized to ranges for
	/// [`crate::idx::scanner::IndexScanner`] and
	/// [`crate::idx::cache::CardinalityCache`], both of which scan/estimate
	/// over `ByteRange`s, not bare values). An unbounded side is replaced
	/// with the bound of this shard's own key space, so the result still
	/// scopes to exactly one shard's keys rather than spilling into the
	/// next.
	pub fn encode_range(&self, shard: usize, range: &ByteRange) -> ByteRange {
		let prefix = self.prefix_for_shard(shard);
		let start = Self::prefixed_bound(&prefix, &range.start)
			.unwrap_or_else(|| Bound::Included(prefix.clone()));
		let end = Self::prefixed_bound(&prefix, &range.end)
			.unwrap_or_else(|| Bound::Excluded(Self::prefix_successor(&prefix)));
		ByteRange::new(start, end)
	}

	/// Enumerates `encode_range` across every shard in shard order
	/// `0..num_shards` (spec §4.1, generalized from point lookups to range
	/// scans).
	pub fn encode_all_shard_ranges(&self, range: &ByteRange) -> Vec<ByteRange> {
		(0..self.num_shards).map(|shard| self.encode_range(shard, range)).collect()
	}
}

impl PartialEq for ShardedIndexStorage {
	fn eq(&self, other: &Self) -> bool {
		self.num_shards == other.num_shards
	}
}

impl Eq for ShardedIndexStorage {}

impl Hash for ShardedIndexStorage {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.num_shards.hash(state);
	}
}

/// `|hash(bytes)| mod numShards`'s `abs`, with the edge case that
/// `i32::MIN` has no positive representation: fold it to the non-negative
/// sentinel `0` rather than overflow (spec §4.1, §9).
fn abs_non_negative(hash: i32) -> u32 {
	if hash == i32::MIN {
		0
	} else {
		hash.unsigned_abs()
	}
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
	const OFFSET_BASIS: u32 = 0x811c_9dc5;
	const PRIME: u32 = 0x0100_0193;
	let mut hash = OFFSET_BASIS;
	for &b in bytes {
		hash ^= b as u32;
		hash = hash.wrapping_mul(PRIME);
	}
	hash
}

fn decimal_digits(mut n: usize) -> usize {
	let mut digits = 1;
	while n >= 10 {
		n /= 10;
		digits += 1;
	}
	digits
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_one_or_fewer_shards() {
		assert!(matches!(
			ShardedIndexStorage::new(1),
			Err(Error::InvalidConfig(_))
		));
		assert!(matches!(
			ShardedIndexStorage::new(0),
			Err(Error::InvalidConfig(_))
		));
	}

	#[test]
	fn width_boundaries() {
		assert_eq!(ShardedIndexStorage::new(2).unwrap().prefix_width(), 1);
		assert_eq!(ShardedIndexStorage::new(100).unwrap().prefix_width(), 2);
		assert_eq!(ShardedIndexStorage::new(1000).unwrap().prefix_width(), 3);
	}

	#[test]
	fn round_trips() {
		let s = ShardedIndexStorage::new(16).unwrap();
		for sample in [&b""[..], b"a", b"row-12345", &[0xff, 0x00, 0x7f]] {
			let encoded = s.encode(sample);
			assert_eq!(s.decode(&encoded), sample);
		}
	}

	#[test]
	fn encode_all_shards_is_exhaustive_and_distinct() {
		let s = ShardedIndexStorage::new(9).unwrap();
		let all = s.encode_all_shards(b"value");
		assert_eq!(all.len(), 9);
		let distinct: std::collections::HashSet<_> = all.iter().collect();
		assert_eq!(distinct.len(), 9);
		for (shard, encoded) in all.iter().enumerate() {
			let expected_prefix = format!("{shard}");
			assert!(encoded.starts_with(expected_prefix.as_bytes()));
			assert_eq!(s.decode(encoded), b"value");
		}
	}

	#[test]
	fn equality_and_hash_depend_only_on_shard_count() {
		use std::collections::hash_map::DefaultHasher;
		let a = ShardedIndexStorage::new(4).unwrap();
		let b = ShardedIndexStorage::new(4).unwrap();
		let c = ShardedIndexStorage::new(8).unwrap();
		assert_eq!(a, b);
		assert_ne!(a, c);

		let hash_of = |v: &ShardedIndexStorage| {
			let mut h = DefaultHasher::new();
			v.hash(&mut h);
			h.finish()
		};
		assert_eq!(hash_of(&a), hash_of(&b));
	}

	#[test]
	fn abs_non_negative_folds_int_min_to_zero() {
		assert_eq!(abs_non_negative(i32::MIN), 0);
		assert_eq!(abs_non_negative(-5), 5);
		assert_eq!(abs_non_negative(5), 5);
	}

	#[test]
	fn encode_range_matches_encode_for_a_point_range() {
		let s = ShardedIndexStorage::new(9).unwrap();
		let point = ByteRange::new(Bound::Included(b"value".to_vec()), Bound::Included(b"value".to_vec()));
		for shard in 0..9 {
			let sharded = s.encode_range(shard, &point);
			let expected = {
				let mut out = s.prefix_for_shard(shard);
				out.extend_from_slice(b"value");
				out
			};
			assert_eq!(sharded.start, Bound::Included(expected.clone()));
			assert_eq!(sharded.end, Bound::Included(expected));
		}
	}

	#[test]
	fn encode_range_scopes_unbounded_sides_to_one_shard() {
		let s = ShardedIndexStorage::new(4).unwrap();
		let unbounded = ByteRange::unbounded();
		let sharded = s.encode_range(2, &unbounded);
		assert_eq!(sharded.start, Bound::Included(b"2".to_vec()));
		assert_eq!(sharded.end, Bound::Excluded(b"3".to_vec()));
		assert!(sharded.contains_key(b"2anything"));
		assert!(!sharded.contains_key(b"3anything"));
		assert!(!sharded.contains_key(b"1anything"));
	}

	#[test]
	fn encode_all_shard_ranges_is_exhaustive_and_distinct() {
		let s = ShardedIndexStorage::new(9).unwrap();
		let range = ByteRange::new(Bound::Included(b"a".to_vec()), Bound::Excluded(b"m".to_vec()));
		let all = s.encode_all_shard_ranges(&range);
		assert_eq!(all.len(), 9);
		let distinct: std::collections::HashSet<_> = all.iter().collect();
		assert_eq!(distinct.len(), 9);
		for (shard, r) in all.iter().enumerate() {
			let prefix = format!("{shard}");
			match &r.start {
				Bound::Included(v) => assert!(v.starts_with(prefix.as_bytes())),
				other => panic!("expected an included start, got {other:?}"),
			}
		}
	}
}
