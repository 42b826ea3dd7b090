//! Cancellable periodic task scaffold.
//!
//! A [`PeriodicWorker`] runs a tick closure on a fixed interval until its
//! [`tokio_util::sync::CancellationToken`] fires, at which point the running
//! tick is allowed to finish and no further tick is started. This crate knows
//! nothing about what a tick does: `nscache`'s refresh loop supplies that.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A spawned periodic task plus the handle needed to stop it.
pub struct PeriodicWorker {
	shutdown: CancellationToken,
	handle: tokio::task::JoinHandle<()>,
}

impl PeriodicWorker {
	/// Spawns `tick` to run immediately, then every `period` thereafter, on
	/// the current Tokio runtime. `tick` receives a child of `shutdown` so it
	/// can itself be interrupted mid-step if it awaits something cancellable.
	pub fn spawn<F, Fut>(period: Duration, shutdown: CancellationToken, mut tick: F) -> Self
	where
		F: FnMut(CancellationToken) -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send,
	{
		let worker_token = shutdown.clone();
		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					biased;
					_ = worker_token.cancelled() => {
						tracing::info!("periodic worker cancelled");
						break;
					}
					_ = interval.tick() => {
						tick(worker_token.child_token()).await;
					}
				}
			}
		});

		Self { shutdown, handle }
	}

	/// Requests shutdown without waiting for the in-flight tick to finish.
	pub fn cancel(&self) {
		self.shutdown.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Cancels and waits for the spawned task to exit.
	pub async fn shutdown(self) {
		self.shutdown.cancel();
		let _ = self.handle.await;
	}
}
