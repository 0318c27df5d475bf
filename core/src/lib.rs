#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

#[doc(hidden)]
pub mod cnf;
pub mod err;
pub mod idx;
pub mod kvs;
pub mod model;
mod pool;

pub use err::Error;
pub use idx::cache::CardinalityCache;
pub use idx::planner::{IndexPlanner, PlannerConfig};
pub use idx::sharding::ShardedIndexStorage;
pub use kvs::{Authorizations, KvStoreConnector, MetricsStore, Scanner};
pub use model::{
	ByteRange, CardinalityEstimate, ColumnConstraint, ColumnId, Domain, PlanResult, RowId,
	TabletSplit,
};
