//! Background refresh loop.
//!
//! Implemented as an explicit state machine driven by one
//! `nscache-worker`-scheduled periodic tick. `Init`/`Connecting`/
//! `Reconnecting` all share the same "try to connect, then fall through to
//! the active steps on success" branch; the three ACTIVE fetches use
//! `enqueue_with_reconnect`, so an individual RPC's own reconnect attempt
//! does most of the recovery work, and only a still-broken session after
//! that demotes the worker out of `Active`.

use std::sync::Arc;

use nscache_model::UserSettingsFactory;
use nscache_transport::{RpcClient, TransportConnector, TransportError};
use parking_lot::Mutex;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::{events, CacheConfig};
use crate::registry::{CacheEntry, Registry};
use crate::wire::{parse_cached_keys, parse_elliptics_remotes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
	Init,
	Connecting,
	Active,
	Reconnecting,
	Stopped,
}

impl WorkerState {
	pub fn is_running(self) -> bool {
		!matches!(self, Self::Init | Self::Stopped)
	}

	fn needs_connect(self) -> bool {
		matches!(self, Self::Init | Self::Connecting | Self::Reconnecting)
	}
}

/// Everything one refresh tick needs, shared across tick invocations via
/// `Arc`/interior mutability. Owned by [`crate::facade::NamespaceStateCache`].
pub struct RefreshContext<C: TransportConnector, U> {
	pub client: Arc<tokio::sync::Mutex<RpcClient<C>>>,
	pub registry: Arc<Registry<U>>,
	pub factory: Arc<dyn UserSettingsFactory<Value = U> + Send + Sync>,
	pub clock: Arc<dyn Clock>,
	pub config: Arc<CacheConfig>,
	pub state: Arc<Mutex<WorkerState>>,
	pub callbacks: Arc<Mutex<Vec<Box<dyn Fn(bool) + Send + Sync>>>>,
}

impl<C: TransportConnector, U> Clone for RefreshContext<C, U> {
	fn clone(&self) -> Self {
		Self {
			client: Arc::clone(&self.client),
			registry: Arc::clone(&self.registry),
			factory: Arc::clone(&self.factory),
			clock: Arc::clone(&self.clock),
			config: Arc::clone(&self.config),
			state: Arc::clone(&self.state),
			callbacks: Arc::clone(&self.callbacks),
		}
	}
}

/// One execution of the periodic fetch-and-replace cycle.
pub async fn tick<C, U>(ctx: &RefreshContext<C, U>)
where
	C: TransportConnector,
	U: Send + Sync + 'static,
{
	let state = *ctx.state.lock();

	if state.needs_connect() {
		let mut client = ctx.client.lock().await;
		match client.connect().await {
			Ok(()) => {
				tracing::info!("refresh worker connected");
				*ctx.state.lock() = WorkerState::Active;
			}
			Err(err) => {
				tracing::warn!(error = %err, "refresh worker failed to connect this tick");
				*ctx.state.lock() = WorkerState::Connecting;
				return;
			}
		}
	}

	let mut any_transport_failure = false;

	any_transport_failure |= !step_namespaces_states(ctx).await;
	any_transport_failure |= !step_cached_keys(ctx).await;
	any_transport_failure |= !step_config_remotes(ctx).await;

	*ctx.state.lock() = if any_transport_failure {
		WorkerState::Reconnecting
	} else {
		WorkerState::Active
	};

	let now = ctx.clock.now_secs();
	let any_important_expired = ctx.registry.refresh_staleness_and_derived_views(
		now,
		ctx.config.warning_time.as_secs(),
		ctx.config.expire_time.as_secs(),
	);

	if !ctx.config.cache_path.as_os_str().is_empty() {
		if let Err(err) = crate::persist::persist_to_path(ctx.registry.as_ref(), &ctx.config.cache_path).await {
			tracing::warn!(error = %err, "failed to persist registry (best-effort)");
		}
	}

	for callback in ctx.callbacks.lock().iter() {
		callback(any_important_expired);
	}
}

/// `true` on success (including a purely namespace-level parse failure,
/// which is non-fatal); `false` only on a transport-level failure.
async fn step_namespaces_states<C, U>(ctx: &RefreshContext<C, U>) -> bool
where
	C: TransportConnector,
	U: Send + Sync + 'static,
{
	let reply = match enqueue(ctx, events::GET_NAMESPACES_STATES).await {
		Ok(reply) => reply,
		Err(EnqueueFailure::ConnectionLost) => return false,
		Err(EnqueueFailure::ServerRejected) => return true,
	};

	let Some(namespaces) = reply.as_object() else {
		tracing::warn!("get_namespaces_states reply was not an object, skipping");
		return true;
	};

	let now = ctx.clock.now_secs();

	for (name, payload) in namespaces {
		let is_deleted = payload
			.pointer("/settings/__service/is_deleted")
			.and_then(Value::as_bool)
			.unwrap_or(false);

		if is_deleted {
			ctx.registry.remove_namespace(name);
			continue;
		}

		let raw_settings = payload.get("settings").cloned().unwrap_or(Value::Null);
		if !ctx.config.accepts_namespace(name, &raw_settings) {
			tracing::debug!(namespace = %name, "namespace rejected by namespace_filter");
			continue;
		}

		match nscache_model::NamespaceSnapshot::from_payload(name, payload, ctx.factory.as_ref()) {
			Ok(snapshot) => {
				ctx.registry
					.replace_namespace(name.clone(), CacheEntry::new(snapshot, now, payload.clone()));
			}
			Err(err) => {
				tracing::warn!(namespace = %err.namespace(), error = %err, "skipping namespace this tick");
			}
		}
	}

	true
}

async fn step_cached_keys<C, U>(ctx: &RefreshContext<C, U>) -> bool
where
	C: TransportConnector,
	U: Send + Sync + 'static,
{
	let reply = match enqueue(ctx, events::GET_CACHED_KEYS).await {
		Ok(reply) => reply,
		Err(EnqueueFailure::ConnectionLost) => return false,
		Err(EnqueueFailure::ServerRejected) => return true,
	};

	match parse_cached_keys(&reply) {
		Ok(parsed) => {
			let now = ctx.clock.now_secs();
			ctx.registry.replace_cached_keys(CacheEntry::new(parsed, now, reply));
		}
		Err(err) => tracing::warn!(error = %err, "failed to parse get_cached_keys reply, keeping previous table"),
	}

	true
}

async fn step_config_remotes<C, U>(ctx: &RefreshContext<C, U>) -> bool
where
	C: TransportConnector,
	U: Send + Sync + 'static,
{
	let reply = match enqueue(ctx, events::GET_CONFIG_REMOTES).await {
		Ok(reply) => reply,
		Err(EnqueueFailure::ConnectionLost) => return false,
		Err(EnqueueFailure::ServerRejected) => return true,
	};

	match parse_elliptics_remotes(&reply) {
		Ok(parsed) if parsed.is_empty() => {
			tracing::warn!("get_config_remotes returned an empty list, keeping previous bootstrap peers");
		}
		Ok(parsed) => {
			let now = ctx.clock.now_secs();
			ctx.registry.replace_elliptics_remotes(CacheEntry::new(parsed, now, reply));
		}
		Err(err) => tracing::warn!(error = %err, "failed to parse get_config_remotes reply, keeping previous list"),
	}

	true
}

/// Distinguishes a still-broken session (demotes the worker out of
/// `Active`) from a server-side rejection: logged and skipped, connection
/// stays healthy.
enum EnqueueFailure {
	ConnectionLost,
	ServerRejected,
}

async fn enqueue<C, U>(ctx: &RefreshContext<C, U>, event: &'static str) -> Result<Value, EnqueueFailure>
where
	C: TransportConnector,
	U: Send + Sync + 'static,
{
	let mut client = ctx.client.lock().await;
	match client
		.enqueue_with_reconnect(event, Value::Null, ctx.config.enqueue_timeout)
		.await
	{
		Ok(reply) => Ok(reply),
		Err(err @ TransportError::Server { .. }) => {
			tracing::warn!(event, error = %err, "server rejected request, skipping this step");
			Err(EnqueueFailure::ServerRejected)
		}
		Err(err) => {
			tracing::warn!(event, error = %err, "lost connection to control service");
			Err(EnqueueFailure::ConnectionLost)
		}
	}
}
