//! Packs a flat list of row-id ranges into fixed-size tablet splits (spec
//! §4.4).

use crate::err::Error;
use crate::model::{ByteRange, TabletSplit};

/// Stateless; carries no tablet-locality hint (spec §4.4: "mixed-server
/// splits").
pub struct RangeBinner;

impl RangeBinner {
	/// Splits `ranges` into consecutive slices of `ranges_per_bin`, one
	/// [`TabletSplit`] per slice. Preserves input order; the last bin may be
	/// short.
	///
	/// # Errors
	/// Returns [`Error::InvalidConfig`] if `ranges_per_bin == 0` (spec §4.4:
	/// "a programmer error").
	pub fn bin(ranges_per_bin: u32, ranges: Vec<ByteRange>) -> Result<Vec<TabletSplit>, Error> {
		if ranges_per_bin == 0 {
			return Err(Error::invalid_config("rangesPerBin must be > 0"));
		}
		let ranges_per_bin = ranges_per_bin as usize;
		Ok(ranges.chunks(ranges_per_bin).map(|chunk| TabletSplit::new(chunk.to_vec())).collect())
	}
}
