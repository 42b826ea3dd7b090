use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Construction parameters for [`crate::facade::NamespaceStateCache`].
/// Defaults mirror the source system's own defaults so an embedder can get
/// away with setting only `remotes` and `cache_path`.
pub struct CacheConfig {
	/// Comma- and colon-separated `host[:port]` list, default port 10053.
	pub remotes: String,
	pub update_period: Duration,
	/// Empty to disable persistence.
	pub cache_path: PathBuf,
	pub warning_time: Duration,
	pub expire_time: Duration,
	/// Control-service app name.
	pub worker_name: String,
	pub enqueue_timeout: Duration,
	pub reconnect_timeout: Duration,
	/// May reject a namespace by name and raw settings before a snapshot is
	/// even constructed for it.
	pub namespace_filter: Option<Arc<dyn Fn(&str, &serde_json::Value) -> bool + Send + Sync>>,
	pub auto_start: bool,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			remotes: String::new(),
			update_period: Duration::from_secs(60),
			cache_path: PathBuf::new(),
			warning_time: Duration::from_secs(300),
			expire_time: Duration::from_secs(600),
			worker_name: "mastermind2.26".to_string(),
			enqueue_timeout: Duration::from_millis(4000),
			reconnect_timeout: Duration::from_millis(4000),
			namespace_filter: None,
			auto_start: false,
		}
	}
}

impl CacheConfig {
	pub fn accepts_namespace(&self, name: &str, raw_settings: &serde_json::Value) -> bool {
		match &self.namespace_filter {
			Some(filter) => filter(name, raw_settings),
			None => true,
		}
	}
}

/// The three RPC event names consumed from the control service. Contractual,
/// not configurable.
pub mod events {
	pub const GET_NAMESPACES_STATES: &str = "get_namespaces_states";
	pub const GET_CACHED_KEYS: &str = "get_cached_keys";
	pub const GET_CONFIG_REMOTES: &str = "get_config_remotes";
}
