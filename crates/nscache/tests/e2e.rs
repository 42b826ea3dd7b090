//! End-to-end scenarios from spec.md §8 (E1-E6), driven against the
//! in-memory `StubConnector` so nothing here touches a real socket.
//!
//! Mirrors the teacher's `crates/editor/tests/broker_e2e.rs` shape: a small
//! `spawn_*`/`build_*` helper constructing the thing under test, then
//! `#[tokio::test]` functions polling for an eventually-true condition
//! instead of asserting on a fixed number of background ticks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nscache::{
	CacheConfig, CacheError, Clock, FixedClock, FixedRandom, GroupId, NamespaceStateCache, UserSettingsFactory,
	UserSettingsHandle,
};
use nscache_transport::stub::{StubConnector, StubStep};
use serde_json::{json, Value};

fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

/// Accepts every namespace, so `is_valid()` can ever report `true`.
struct AcceptAllFactory;

impl UserSettingsFactory for AcceptAllFactory {
	type Value = ();

	fn build(
		&self,
		_namespace: &str,
		_raw_settings: &Value,
	) -> Result<Option<UserSettingsHandle<()>>, Box<dyn std::error::Error + Send + Sync>> {
		Ok(Some(UserSettingsHandle::without_release(())))
	}
}

fn ns0_payload() -> Value {
	json!({
		"settings": {
			"groups-count": 2,
			"success-copies-num": "quorum",
		},
		"couples": [
			{
				"id": "1:2",
				"couple_status": "OK",
				"free_effective_space": 100,
				"hosts": {"dc": "A"},
				"groups": [
					{"id": 1, "status": "COUPLED"},
					{"id": 2, "status": "COUPLED"},
				],
			},
			{
				"id": "3:4",
				"couple_status": "OK",
				"free_effective_space": 50,
				"hosts": {"dc": "B"},
				"groups": [
					{"id": 3, "status": "COUPLED"},
					{"id": 4, "status": "COUPLED"},
				],
			},
		],
		"weights": {
			"2": [
				[[1, 2], 10, 100],
				[[3, 4], 30, 20],
			],
		},
		"statistics": {"is_full": false},
	})
}

fn namespaces_states_reply() -> Value {
	json!({ "ns0": ns0_payload() })
}

fn deleted_namespaces_states_reply() -> Value {
	json!({ "ns0": { "settings": { "__service": { "is_deleted": true } } } })
}

fn empty_cached_keys_reply() -> Value {
	json!({})
}

/// ns0's `groups-count` is 2; "1:2" carries a well-formed override, "3:4"
/// carries a malformed one (three groups where two are expected).
fn cached_keys_reply() -> Value {
	json!({
		"some-key": {
			"1:2": {"cache_groups": [1, 2]},
			"3:4": {"cache_groups": [3, 4, 5]},
		},
	})
}

fn config_remotes_reply() -> Value {
	// family is the raw AF_INET address-family integer (2 on Linux), not a
	// symbolic string: matches what get_config_remotes actually sends.
	json!([["host-a", 10053, 2]])
}

/// One tick's worth of scripted replies, in the fixed order the refresh
/// loop issues them: `get_namespaces_states`, `get_cached_keys`,
/// `get_config_remotes`.
fn one_tick_script(namespaces_reply: Value) -> Vec<StubStep> {
	vec![
		StubStep::Reply(namespaces_reply),
		StubStep::Reply(empty_cached_keys_reply()),
		StubStep::Reply(config_remotes_reply()),
	]
}

fn base_config(remotes: &str) -> CacheConfig {
	CacheConfig {
		remotes: remotes.to_string(),
		update_period: Duration::from_millis(30),
		cache_path: PathBuf::new(),
		warning_time: Duration::from_secs(300),
		expire_time: Duration::from_secs(600),
		enqueue_timeout: Duration::from_millis(200),
		reconnect_timeout: Duration::from_millis(200),
		auto_start: false,
		..CacheConfig::default()
	}
}

/// Polls `cond` every 5ms until it returns `true` or `timeout` elapses.
/// Returns whether it succeeded, so callers get a clear panic message
/// instead of a timing-dependent assertion failure deep in the condition.
async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if cond() {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}

// E1: happy path - first refresh populates the registry and the sampler
// filters by memory / draws by cumulative weight as spec.md §8 describes.
#[tokio::test]
async fn e1_happy_path_filters_by_memory_and_draws_by_weight() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let mut config = base_config("h1:10053");
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.5)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared in the registry"
	);

	// C2 (memory=20) is filtered out by a size-40 request; only C1 (memory=100)
	// clears the `memory >= size` floor, so the weighted draw over the
	// single remaining entry always lands on it regardless of `u`.
	let groups = cache.pick_groups("ns0", 40).unwrap();
	assert_eq!(groups, vec![GroupId(1), GroupId(2)]);

	// Neither couple is filtered by size=0, so both are in play: total
	// effective weight = 10 + 30 = 40; u=0.5 -> shoot=20; cumulative
	// = [10 (C1), 40 (C2)]; 20 > 10 so C2 wins.
	let groups = cache.pick_groups("ns0", 0).unwrap();
	assert_eq!(groups, vec![GroupId(3), GroupId(4)]);

	cache.stop().await.unwrap();
}

// E2: a namespace marked `__service.is_deleted` on a later refresh is
// removed from the registry; subsequent lookups fail `NamespaceNotFound`.
#[tokio::test]
async fn e2_deleted_namespace_is_removed() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let connector_handle = connector.clone();
	let mut config = base_config("h1:10053");
	config.update_period = Duration::from_millis(150);
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared before the deletion tick was scripted"
	);

	for step in one_tick_script(deleted_namespaces_states_reply()) {
		connector_handle.push(step);
	}

	assert!(
		wait_until(Duration::from_secs(3), || matches!(
			cache.get_namespace_state("ns0"),
			Err(CacheError::NamespaceNotFound { .. })
		))
		.await,
		"ns0 was never removed after the deletion tick"
	);

	cache.stop().await.unwrap();
}

// E3: the primary endpoint refuses every connection; the client must still
// populate the registry from the secondary and report itself valid.
#[tokio::test]
async fn e3_outage_on_primary_endpoint_falls_back_to_secondary() {
	init_tracing();
	let connector = StubConnector::flaky(1, one_tick_script(namespaces_states_reply()));
	let mut config = base_config("bad:10053,good:10053");
	config.update_period = Duration::from_millis(30);
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.is_valid()).await,
		"cache never became valid despite the secondary endpoint being reachable"
	);
	assert!(cache.get_namespace_state("ns0").is_ok());

	cache.stop().await.unwrap();
}

// E4: once the entry's age crosses `expire_time`, reads fail
// `CacheIsExpired` and `is_valid()` reports `false`, even though the
// last-fetched snapshot is still sitting in the registry.
#[tokio::test]
async fn e4_stale_entry_is_flagged_expired() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let mut config = base_config("h1:10053");
	config.update_period = Duration::from_millis(20);
	config.warning_time = Duration::from_secs(2);
	config.expire_time = Duration::from_secs(3);
	config.auto_start = true;

	let clock = Arc::new(FixedClock::new(0));
	let clock_dyn: Arc<dyn Clock> = clock.clone();

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		clock_dyn,
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared"
	);

	// The stub script is exhausted after the first tick; later ticks see a
	// server error on every RPC (treated as "server still unreachable, skip
	// this step"), so `last_update_time` never advances further — this is
	// the stand-in for "stop the server after one successful refresh".
	clock.set(4);

	assert!(
		wait_until(Duration::from_secs(2), || matches!(
			cache.pick_groups("ns0", 0),
			Err(CacheError::CacheIsExpired { .. })
		))
		.await,
		"entry was never flagged expired"
	);
	assert!(
		wait_until(Duration::from_secs(1), || !cache.is_valid()).await,
		"cache never reported itself invalid once ns0 expired"
	);

	cache.stop().await.unwrap();
}

// E5: feedback decay is local to the published snapshot and min-monotone;
// `available` after a harsher tag must not un-decay the coefficient.
#[tokio::test]
async fn e5_feedback_decay_is_local_and_min_monotone() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let mut config = base_config("h1:10053");
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		// Without feedback this draw would favor C2 (0.99 * 40 = 39 > 10).
		Box::new(FixedRandom::always(0.99)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared"
	);

	assert!(cache.set_feedback("ns0", 3, "permanently_unavailable").unwrap());

	for _ in 0..3 {
		let groups = cache.pick_groups("ns0", 0).unwrap();
		assert_eq!(groups, vec![GroupId(1), GroupId(2)]);
	}

	// Raising back with `available` must not un-decay the coefficient.
	assert!(cache.set_feedback("ns0", 3, "available").unwrap());
	let groups = cache.pick_groups("ns0", 0).unwrap();
	assert_eq!(groups, vec![GroupId(1), GroupId(2)]);

	cache.stop().await.unwrap();
}

// E6: a persisted blob rehydrates into a usable snapshot before `start()`
// is ever called, so a restart survives a control-plane outage.
#[tokio::test]
async fn e6_rehydrate_from_persisted_blob() {
	init_tracing();
	let tmp = tempfile::tempdir().unwrap();
	let cache_path = tmp.path().join("ns-cache.bin");

	{
		let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
		let mut config = base_config("h1:10053");
		config.cache_path = cache_path.clone();
		config.auto_start = true;

		let cache = NamespaceStateCache::new(
			config,
			connector,
			Arc::new(AcceptAllFactory),
			Arc::new(FixedClock::new(0)),
			Box::new(FixedRandom::always(0.0)),
		)
		.await
		.unwrap();

		assert!(
			wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
			"ns0 never appeared before the blob could be persisted"
		);
		assert!(
			wait_until(Duration::from_secs(2), || cache_path.exists()).await,
			"cache blob was never written"
		);

		cache.stop().await.unwrap();
	}

	let connector = StubConnector::refusing();
	let mut config = base_config("h1:10053");
	config.cache_path = cache_path;
	config.auto_start = false;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	// Never started: the persisted snapshot must already be readable.
	// u=0.0 -> shoot=0, which lands in C1's (memory=100) cumulative bucket.
	let groups = cache.pick_groups("ns0", 0).unwrap();
	assert_eq!(groups, vec![GroupId(1), GroupId(2)]);
}

// A `cached_keys` override with the right `cache_groups` length resolves to
// the literal group list; one with the wrong length is reported as
// `InvalidGroupsCount` rather than silently truncated or padded.
#[tokio::test]
async fn resolve_cached_key_groups_checks_override_length() {
	init_tracing();
	let script = vec![
		StubStep::Reply(namespaces_states_reply()),
		StubStep::Reply(cached_keys_reply()),
		StubStep::Reply(config_remotes_reply()),
	];
	let connector = StubConnector::scripted(script);
	let mut config = base_config("h1:10053");
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.cached_keys().is_some()).await,
		"cached_keys override table never populated"
	);

	let groups = cache.resolve_cached_key_groups("ns0", "some-key", "1:2").unwrap();
	assert_eq!(groups, Some(vec![GroupId(1), GroupId(2)]));

	let err = cache.resolve_cached_key_groups("ns0", "some-key", "3:4").unwrap_err();
	assert_eq!(err, CacheError::InvalidGroupsCount { expected: 2, actual: 3 });

	assert_eq!(cache.resolve_cached_key_groups("ns0", "missing-key", "1:2").unwrap(), None);

	cache.stop().await.unwrap();
}

// `couple_groupset` forwards the couple's opaque hosts blob regardless of
// which groupset id is asked for, and fails `UnknownGroup` (never
// `UnknownGroupset`, see its doc comment) for a group no couple owns.
#[tokio::test]
async fn couple_groupset_is_opaque_and_keyed_by_group() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let mut config = base_config("h1:10053");
	config.auto_start = true;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared"
	);

	let any_id = nscache_model::GroupsetId("anything".into());
	let other_id = nscache_model::GroupsetId("something-else".into());
	let hosts = cache.couple_groupset("ns0", GroupId(1), &any_id).unwrap();
	assert_eq!(*hosts, json!({"dc": "A"}));
	assert_eq!(hosts, cache.couple_groupset("ns0", GroupId(1), &other_id).unwrap());

	let err = cache.couple_groupset("ns0", GroupId(99), &any_id).unwrap_err();
	assert_eq!(err, CacheError::UnknownGroup { group: 99 });

	cache.stop().await.unwrap();
}

// Property 9: an empty remotes spec must fail `NamespaceStateCache::new`
// with `RemotesEmpty`, not surface as a later connection failure.
#[tokio::test]
async fn new_rejects_an_empty_remotes_spec() {
	init_tracing();
	let connector = StubConnector::scripted(Vec::new());
	let config = base_config("");

	let err = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap_err();

	assert_eq!(err, CacheError::RemotesEmpty);
}

// Property 10: starting or stopping the refresh loop twice in a row is
// reported, never silently accepted.
#[tokio::test]
async fn double_start_and_double_stop_are_rejected() {
	init_tracing();
	let connector = StubConnector::scripted(one_tick_script(namespaces_states_reply()));
	let mut config = base_config("h1:10053");
	config.auto_start = false;

	let cache = NamespaceStateCache::new(
		config,
		connector,
		Arc::new(AcceptAllFactory),
		Arc::new(FixedClock::new(0)),
		Box::new(FixedRandom::always(0.0)),
	)
	.await
	.unwrap();

	cache.start().unwrap();
	assert_eq!(cache.start().unwrap_err(), CacheError::UpdateLoopAlreadyStarted);

	assert!(
		wait_until(Duration::from_secs(2), || cache.get_namespace_state("ns0").is_ok()).await,
		"ns0 never appeared"
	);

	cache.stop().await.unwrap();
	assert_eq!(cache.stop().await.unwrap_err(), CacheError::UpdateLoopAlreadyStopped);
}
