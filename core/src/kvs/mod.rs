//! Collaborator interfaces for the external systems this crate orchestrates
//! but does not implement: the metrics store and the key-value store
//! connector (spec §1, "Out of scope"; §6, "External interfaces"). Only the
//! contracts are defined here, expressed as `async_trait` traits per Design
//! Note §9 ("capability-based... small trait/interface abstractions with
//! sharp methods").

mod connector;
mod key;
mod metrics;

pub use connector::{KvStoreConnector, Scanner};
pub use key::Key;
pub use metrics::MetricsStore;

/// A raw value in the sorted key-value store.
pub type Val = Vec<u8>;
/// Opaque authorization labels forwarded verbatim to the connector and
/// metrics store; the planner never inspects them.
pub type Authorizations = Vec<String>;
