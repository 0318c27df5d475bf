//! The planner's data model: predicate inputs, the byte-range currency the
//! row serializer and KV-store connector speak, and the tablet splits the
//! planner emits.

mod byte_range;
mod cardinality;
mod constraint;
mod index_entry;
mod plan_result;
mod row_id;
mod split;

pub use byte_range::ByteRange;
pub use cardinality::CardinalityEstimate;
pub use constraint::{ColumnConstraint, ColumnId, Domain};
pub use index_entry::IndexEntry;
pub use plan_result::PlanResult;
pub use row_id::RowId;
pub use split::TabletSplit;
