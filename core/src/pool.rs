//! The planner's per-instance worker pool: an unbounded cached task pool
//! gated by a bounded concurrency semaphore of width `4 * cpu_count` (spec
//! §5), so fan-out scans get the effect of a bounded pool without
//! queue-head-of-line blocking on pool growth.
//!
//! Grounded on the semaphore-gated acquire shape of
//! `clockworklabs-SpacetimeDB/crates/core/src/util/lending_pool.rs`
//! (`LendingPool`), simplified: this pool gates access to `tokio::spawn`
//! itself rather than checking out a pooled value, since the spec's pool
//! has no resources to lend, only a concurrency budget.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};

use crate::err::Error;

/// Created at planner construction, torn down at planner shutdown (spec §5,
/// "Lifecycle").
///
/// Tracks the [`AbortHandle`] of every task spawned through it so that
/// `shutdown()` can interrupt workers already running, not just block new
/// submissions (spec §5: "immediate, best-effort interruption of workers").
/// Each task removes its own entry on completion, so the registry only ever
/// holds handles for tasks that are still outstanding.
#[derive(Clone)]
pub(crate) struct WorkerPool {
	semaphore: Arc<Semaphore>,
	next_id: Arc<AtomicU64>,
	outstanding: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl WorkerPool {
	pub(crate) fn new(width: usize) -> Self {
		Self {
			semaphore: Arc::new(Semaphore::new(width.max(1))),
			next_id: Arc::new(AtomicU64::new(0)),
			outstanding: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Acquires a permit and spawns `fut` on the runtime's cached thread
	/// pool. The permit is held for the lifetime of the spawned task, so at
	/// most `width` tasks from this pool run concurrently.
	///
	/// The registry insert happens while still holding the registry lock
	/// that the task's own completion-time removal also needs, so a task
	/// that finishes instantly cannot race ahead of its own registration.
	pub(crate) async fn spawn<F, T>(&self, fut: F) -> Result<JoinHandle<T>, Error>
	where
		F: Future<Output = T> + Send + 'static,
		T: Send + 'static,
	{
		let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| Error::Interrupted)?;
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let outstanding = self.outstanding.clone();
		let mut guard = self.outstanding.lock().expect("worker pool registry poisoned");
		let handle = tokio::spawn(async move {
			let _permit = permit;
			let out = fut.await;
			outstanding.lock().expect("worker pool registry poisoned").remove(&id);
			out
		});
		guard.insert(id, handle.abort_handle());
		drop(guard);
		Ok(handle)
	}

	/// Immediate, best-effort interruption of both queued acquisitions and
	/// workers already running (spec §5, "Lifecycle"). Idempotent (spec §5,
	/// "`shutdown()` ... must be idempotent"); closing an already-closed
	/// semaphore and aborting an already-finished task are both no-ops.
	pub(crate) fn shutdown(&self) {
		self.semaphore.close();
		let mut guard = self.outstanding.lock().expect("worker pool registry poisoned");
		for (_, handle) in guard.drain() {
			handle.abort();
		}
	}
}
