use std::collections::HashMap;
use std::sync::Arc;

use nscache_model::{CoupleStatus, GroupId, NamespaceSnapshot};
use parking_lot::Mutex;

/// A `key -> couple_id -> cache_groups` override table, as returned by
/// `get_cached_keys`.
pub type CachedKeys = HashMap<String, HashMap<String, Vec<i64>>>;

/// The bootstrap peer list returned by `get_config_remotes`: `(host, port,
/// family)` tuples, forwarded verbatim. `family` is the raw address-family
/// integer the control service sends (e.g. `AF_INET`/`AF_INET6` as `int`),
/// not a symbolic name.
pub type EllipticsRemotes = Vec<(String, u16, i32)>;

/// One entry in the [`Registry`]: a shared value plus the bookkeeping needed
/// for staleness policy and verbatim re-persistence.
///
/// `raw` is kept alongside the parsed `value` so the entry can be
/// re-serialized exactly as fetched without re-deriving it from the typed
/// model.
#[derive(Clone)]
pub struct CacheEntry<T> {
	pub value: Arc<T>,
	pub last_update_time: u64,
	pub expired: bool,
	pub raw: serde_json::Value,
}

impl<T> CacheEntry<T> {
	pub fn new(value: T, last_update_time: u64, raw: serde_json::Value) -> Self {
		Self {
			value: Arc::new(value),
			last_update_time,
			expired: false,
			raw,
		}
	}
}

/// Derived views recomputed once per tick, so readers resolving a group to
/// its owning namespace never walk every snapshot.
#[derive(Default, Clone)]
pub struct DerivedViews {
	group_namespace: HashMap<GroupId, String>,
	bad_groups: Vec<GroupId>,
}

impl DerivedViews {
	pub fn namespace_for_group(&self, group: GroupId) -> Option<&str> {
		self.group_namespace.get(&group).map(String::as_str)
	}

	pub fn bad_groups(&self) -> &[GroupId] {
		&self.bad_groups
	}
}

/// `map<namespace_name, cache_entry>`, plus the two non-namespaced
/// single-cache entries for `cached_keys` and `elliptics_remotes`. All
/// operations hold a single mutex briefly; readers never block on the
/// refresh worker for longer than an `Arc` clone.
pub struct Registry<U> {
	namespaces: Mutex<HashMap<String, CacheEntry<NamespaceSnapshot<U>>>>,
	cached_keys: Mutex<Option<CacheEntry<CachedKeys>>>,
	elliptics_remotes: Mutex<Option<CacheEntry<EllipticsRemotes>>>,
	derived: Mutex<Arc<DerivedViews>>,
}

impl<U> Default for Registry<U> {
	fn default() -> Self {
		Self {
			namespaces: Mutex::new(HashMap::new()),
			cached_keys: Mutex::new(None),
			elliptics_remotes: Mutex::new(None),
			derived: Mutex::new(Arc::new(DerivedViews::default())),
		}
	}
}

impl<U> Registry<U> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn replace_namespace(&self, name: String, entry: CacheEntry<NamespaceSnapshot<U>>) {
		self.namespaces.lock().insert(name, entry);
	}

	pub fn remove_namespace(&self, name: &str) -> bool {
		self.namespaces.lock().remove(name).is_some()
	}

	pub fn namespace(&self, name: &str) -> Option<CacheEntry<NamespaceSnapshot<U>>> {
		self.namespaces.lock().get(name).cloned()
	}

	pub fn all_namespaces(&self) -> HashMap<String, CacheEntry<NamespaceSnapshot<U>>> {
		self.namespaces.lock().clone()
	}

	pub fn replace_cached_keys(&self, entry: CacheEntry<CachedKeys>) {
		*self.cached_keys.lock() = Some(entry);
	}

	pub fn cached_keys(&self) -> Option<CacheEntry<CachedKeys>> {
		self.cached_keys.lock().clone()
	}

	pub fn replace_elliptics_remotes(&self, entry: CacheEntry<EllipticsRemotes>) {
		*self.elliptics_remotes.lock() = Some(entry);
	}

	pub fn elliptics_remotes(&self) -> Option<CacheEntry<EllipticsRemotes>> {
		self.elliptics_remotes.lock().clone()
	}

	pub fn derived_views(&self) -> Arc<DerivedViews> {
		self.derived.lock().clone()
	}

	/// Scans every entry, flips `expired` per `now - last_update_time`
	/// against the configured thresholds, and rebuilds the group → namespace
	/// and bad-groups derived views. Returns whether any namespace accepted
	/// by the user-settings factory is expired, for the post-refresh
	/// callback signal.
	pub fn refresh_staleness_and_derived_views(
		&self,
		now: u64,
		warning_time: u64,
		expire_time: u64,
	) -> bool
	where
		U: 'static,
	{
		let mut namespaces = self.namespaces.lock();
		let mut any_important_expired = false;
		let mut group_namespace = HashMap::new();
		let mut bad_groups = Vec::new();

		for (name, entry) in namespaces.iter_mut() {
			let age = now.saturating_sub(entry.last_update_time);
			if age >= expire_time {
				entry.expired = true;
				if entry.value.has_user_settings() {
					any_important_expired = true;
				}
			} else if age >= warning_time {
				tracing::warn!(namespace = %name, age, "namespace cache entry is approaching expiry");
			}

			for (status, group_ids) in entry.value.couples().iter() {
				if status == CoupleStatus::Bad {
					bad_groups.extend(group_ids.iter().copied());
				}
				for group in group_ids {
					group_namespace.insert(group, name.clone());
				}
			}
		}

		*self.derived.lock() = Arc::new(DerivedViews {
			group_namespace,
			bad_groups,
		});

		any_important_expired
	}
}
