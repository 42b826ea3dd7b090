//! Public read-side surface exposed to the embedding proxy.
//!
//! All return values are immutable snapshots (`Arc<NamespaceSnapshot<U>>`)
//! or small owned copies; nothing here blocks on the network. A small
//! façade type owning shared state plus a background task handle, with
//! construction, lifecycle, and read operations kept in separate `impl`
//! sections.

use std::collections::HashMap;
use std::sync::Arc;

use nscache_model::{GroupId, NamespaceSnapshot, RandomSource, UserSettingsFactory};
use nscache_transport::{RpcClient, TransportConnector};
use nscache_worker::PeriodicWorker;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::refresh::{self, RefreshContext, WorkerState};
use crate::registry::{CacheEntry, Registry};

/// The namespace state cache engine: background refresh worker, versioned
/// registry, and read-side façade, parameterised over the embedder's
/// transport connector `C` and opaque user-settings value `U`.
pub struct NamespaceStateCache<C: TransportConnector, U> {
	config: Arc<CacheConfig>,
	registry: Arc<Registry<U>>,
	factory: Arc<dyn UserSettingsFactory<Value = U> + Send + Sync>,
	clock: Arc<dyn Clock>,
	random: Mutex<Box<dyn RandomSource>>,
	client: Arc<tokio::sync::Mutex<RpcClient<C>>>,
	state: Arc<Mutex<WorkerState>>,
	callbacks: Arc<Mutex<Vec<Box<dyn Fn(bool) + Send + Sync>>>>,
	worker: Mutex<Option<PeriodicWorker>>,
}

impl<C, U> NamespaceStateCache<C, U>
where
	C: TransportConnector + 'static,
	U: Send + Sync + 'static,
{
	/// Builds the cache, rehydrating from `config.cache_path` if it is
	/// non-empty and a blob exists there, before the refresh worker ever
	/// runs. Rehydrate happens here unconditionally of `auto_start`, so a
	/// caller can read a persisted snapshot before ever calling `start()`.
	pub async fn new(
		config: CacheConfig,
		connector: C,
		factory: Arc<dyn UserSettingsFactory<Value = U> + Send + Sync>,
		clock: Arc<dyn Clock>,
		random: Box<dyn RandomSource>,
	) -> Result<Self, CacheError> {
		let remotes = nscache_transport::parse_remotes(&config.remotes)?;
		let client = RpcClient::new(connector, remotes, config.reconnect_timeout)?;

		let registry = match crate::persist::rehydrate_from_path(&config.cache_path, factory.as_ref()).await {
			Ok(Some(registry)) => registry,
			Ok(None) => Registry::new(),
			Err(err) => {
				tracing::warn!(error = %err, "failed to rehydrate cache blob, starting from an empty registry");
				Registry::new()
			}
		};

		let cache = Self {
			config: Arc::new(config),
			registry: Arc::new(registry),
			factory,
			clock,
			random: Mutex::new(random),
			client: Arc::new(tokio::sync::Mutex::new(client)),
			state: Arc::new(Mutex::new(WorkerState::Init)),
			callbacks: Arc::new(Mutex::new(Vec::new())),
			worker: Mutex::new(None),
		};

		if cache.config.auto_start {
			cache.start()?;
		}

		Ok(cache)
	}

	fn refresh_context(&self) -> RefreshContext<C, U> {
		RefreshContext {
			client: Arc::clone(&self.client),
			registry: Arc::clone(&self.registry),
			factory: Arc::clone(&self.factory),
			clock: Arc::clone(&self.clock),
			config: Arc::clone(&self.config),
			state: Arc::clone(&self.state),
			callbacks: Arc::clone(&self.callbacks),
		}
	}

	/// Registers a callback invoked after every refresh tick with whether
	/// any namespace the user-settings factory accepted is currently
	/// expired.
	pub fn on_refresh(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
		self.callbacks.lock().push(Box::new(callback));
	}

	/// Starts the background refresh loop. Fails if already running.
	pub fn start(&self) -> Result<(), CacheError> {
		let mut worker_guard = self.worker.lock();
		if worker_guard.is_some() {
			return Err(CacheError::UpdateLoopAlreadyStarted);
		}

		*self.state.lock() = WorkerState::Connecting;
		let ctx = self.refresh_context();
		let shutdown = CancellationToken::new();
		let worker = PeriodicWorker::spawn(self.config.update_period, shutdown, move |_token| {
			let ctx = ctx.clone();
			async move { refresh::tick(&ctx).await }
		});
		*worker_guard = Some(worker);
		Ok(())
	}

	/// Stops the background refresh loop, waiting for an in-flight tick to
	/// finish. Fails if already stopped (or never started).
	pub async fn stop(&self) -> Result<(), CacheError> {
		let worker = self.worker.lock().take();
		match worker {
			Some(worker) => {
				worker.shutdown().await;
				*self.state.lock() = WorkerState::Stopped;
				Ok(())
			}
			None => Err(CacheError::UpdateLoopAlreadyStopped),
		}
	}

	pub fn is_running(&self) -> bool {
		self.worker.lock().is_some()
	}

	/// `true` iff at least one namespace the user-settings factory accepted
	/// is present and not expired.
	pub fn is_valid(&self) -> bool {
		self.registry
			.all_namespaces()
			.values()
			.any(|entry| !entry.expired && entry.value.has_user_settings())
	}

	fn namespace_entry(&self, name: &str) -> Result<CacheEntry<NamespaceSnapshot<U>>, CacheError> {
		let entry = self.registry.namespace(name).ok_or_else(|| CacheError::NamespaceNotFound {
			namespace: name.to_string(),
		})?;
		if entry.expired {
			return Err(CacheError::CacheIsExpired {
				namespace: name.to_string(),
			});
		}
		Ok(entry)
	}

	pub fn get_namespace_state(&self, name: &str) -> Result<Arc<NamespaceSnapshot<U>>, CacheError> {
		self.namespace_entry(name).map(|entry| entry.value)
	}

	/// Resolves via the group → couple → namespace back-references rebuilt
	/// on the most recent tick. A group unknown to any currently-registered
	/// couple fails with `UnknownGroup`; a group whose
	/// derived-view namespace has since been dropped from the registry
	/// (a race with a deleting refresh) fails with `UnknownNamespace`.
	pub fn find_namespace_state(&self, group: GroupId) -> Result<Arc<NamespaceSnapshot<U>>, CacheError> {
		let derived = self.registry.derived_views();
		let namespace = derived
			.namespace_for_group(group)
			.ok_or(CacheError::UnknownGroup { group: group.0 })?;

		let entry = self
			.registry
			.namespace(namespace)
			.ok_or_else(|| CacheError::UnknownNamespace {
				namespace: namespace.to_string(),
			})?;
		if entry.expired {
			return Err(CacheError::CacheIsExpired {
				namespace: namespace.to_string(),
			});
		}
		Ok(entry.value)
	}

	/// `weights.groups(size)` using the cache's injected `RandomSource`, so
	/// callers never need to thread their own RNG through the façade.
	pub fn pick_groups(&self, namespace: &str, size: u64) -> Result<Vec<GroupId>, CacheError> {
		let entry = self.namespace_entry(namespace)?;
		let mut random = self.random.lock();
		entry.value.weights().groups(size, random.as_mut()).map_err(CacheError::from)
	}

	/// `weights.couple_sequence(size)`, see [`Self::pick_groups`].
	pub fn couple_sequence(&self, namespace: &str, size: u64) -> Result<Vec<Vec<GroupId>>, CacheError> {
		let entry = self.namespace_entry(namespace)?;
		let mut random = self.random.lock();
		entry
			.value
			.weights()
			.couple_sequence(size, random.as_mut())
			.map_err(CacheError::from)
	}

	/// `weights.set_feedback(couple_id, feedback_tag)`.
	pub fn set_feedback(&self, namespace: &str, couple_marker: u64, tag: &str) -> Result<bool, CacheError> {
		let entry = self.namespace_entry(namespace)?;
		entry.value.weights().set_feedback(couple_marker, tag).map_err(CacheError::from)
	}

	/// `couples().get_couple_groupset(group, groupset_id)`, failing with
	/// `UnknownGroup` when `group` belongs to no couple in `namespace` (the
	/// only way this lookup can miss — see `CacheError::UnknownGroupset`'s
	/// doc comment for why there is no corresponding groupset-level miss).
	pub fn couple_groupset(
		&self,
		namespace: &str,
		group: GroupId,
		groupset_id: &nscache_model::GroupsetId,
	) -> Result<Arc<serde_json::Value>, CacheError> {
		let entry = self.namespace_entry(namespace)?;
		entry
			.value
			.couples()
			.get_couple_groupset(group, groupset_id)
			.map(|value| Arc::new(value.clone()))
			.ok_or(CacheError::UnknownGroup { group: group.0 })
	}

	/// The per-key fallback group override table from the last successful
	/// `get_cached_keys` fetch (or rehydrate).
	pub fn cached_keys(&self) -> Option<Arc<HashMap<String, HashMap<String, Vec<i64>>>>> {
		self.registry.cached_keys().map(|entry| entry.value)
	}

	/// Resolves one `cached_keys[key][couple_id]` override against
	/// `namespace`'s configured replication factor.
	///
	/// `get_cached_keys` replies are forwarded into the table verbatim (see
	/// `crate::wire::parse_cached_keys`) without checking that each
	/// `cache_groups` array actually has `groups_count` entries — the control
	/// service is trusted but not infallible, and a truncated or padded
	/// override here is exactly the caller-visible shape mismatch
	/// `CacheError::InvalidGroupsCount` exists for. Returns `Ok(None)` when no
	/// override is registered for `key`/`couple_id` (not an error: the caller
	/// falls back to the namespace's normal weighted selection).
	pub fn resolve_cached_key_groups(
		&self,
		namespace: &str,
		key: &str,
		couple_id: &str,
	) -> Result<Option<Vec<GroupId>>, CacheError> {
		let entry = self.namespace_entry(namespace)?;
		let Some(cached) = self.cached_keys() else {
			return Ok(None);
		};
		let Some(groups) = cached.get(key).and_then(|by_couple| by_couple.get(couple_id)) else {
			return Ok(None);
		};

		let expected = entry.value.settings().groups_count();
		if groups.len() != expected {
			return Err(CacheError::InvalidGroupsCount {
				expected,
				actual: groups.len(),
			});
		}

		Ok(Some(groups.iter().map(|&g| GroupId(g as u64)).collect()))
	}

	/// The bootstrap peer list from the last successful `get_config_remotes`
	/// fetch (or rehydrate).
	pub fn elliptics_remotes(&self) -> Option<Arc<Vec<(String, u16, i32)>>> {
		self.registry.elliptics_remotes().map(|entry| entry.value)
	}
}
