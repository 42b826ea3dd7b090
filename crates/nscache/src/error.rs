use thiserror::Error;

/// Errors surfaced across the façade boundary to embedders.
///
/// These are the only errors that ever reach a caller of
/// [`crate::facade::NamespaceStateCache`]. Transport failures and
/// per-namespace parse failures are contained and logged upstream (see
/// `nscache_transport::TransportError` and `nscache_model::SnapshotError`).
/// One flat enum, each variant carrying the identifying context a caller
/// needs to pattern-match on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
	#[error("couple not found for the drawn cumulative weight")]
	CoupleNotFound,

	#[error("no couple has enough free memory for the requested size")]
	NotEnoughMemory,

	#[error("unknown namespace '{namespace}'")]
	UnknownNamespace { namespace: String },

	/// Raised by [`crate::facade::NamespaceStateCache::resolve_cached_key_groups`]
	/// when a `get_cached_keys` override's `cache_groups` array doesn't carry
	/// exactly `groups_count` entries. The control service's reply is
	/// forwarded into the override table verbatim and never length-checked
	/// before that point, so a truncated or padded override is a genuine,
	/// reachable caller-visible failure rather than a defensive check.
	#[error("invalid groups count: expected {expected}, got {actual}")]
	InvalidGroupsCount { expected: usize, actual: usize },

	#[error("cache entry for '{namespace}' is expired")]
	CacheIsExpired { namespace: String },

	#[error("update loop is already started")]
	UpdateLoopAlreadyStarted,

	#[error("update loop is already stopped")]
	UpdateLoopAlreadyStopped,

	#[error("unknown feedback '{feedback}' for couple '{couple_id}'")]
	UnknownFeedback { couple_id: String, feedback: String },

	#[error("namespace '{namespace}' not found")]
	NamespaceNotFound { namespace: String },

	#[error("unknown group {group}")]
	UnknownGroup { group: u64 },

	/// Part of the stable error vocabulary but currently unreachable:
	/// `nscache_model::CouplesView::get_couple_groupset` treats `groupset_id`
	/// as an opaque, never-validated roundtrip key (no concrete groupset
	/// substructure is observed anywhere in the payloads this crate parses),
	/// so the only way that lookup can miss is an unknown `group`, which
	/// `crate::facade::NamespaceStateCache::couple_groupset` already reports
	/// as `UnknownGroup`. Kept in the enum for forward compatibility with a
	/// control-service wire format that validates groupset ids.
	#[error("unknown groupset '{groupset}'")]
	UnknownGroupset { groupset: String },

	#[error("remotes list is empty")]
	RemotesEmpty,
}

impl From<nscache_model::SamplerError> for CacheError {
	fn from(err: nscache_model::SamplerError) -> Self {
		match err {
			nscache_model::SamplerError::NotEnoughMemory => Self::NotEnoughMemory,
			nscache_model::SamplerError::CoupleNotFound => Self::CoupleNotFound,
		}
	}
}

impl From<nscache_model::UnknownFeedback> for CacheError {
	fn from(err: nscache_model::UnknownFeedback) -> Self {
		Self::UnknownFeedback {
			couple_id: err.couple_id,
			feedback: err.feedback,
		}
	}
}

impl From<nscache_transport::RemotesEmpty> for CacheError {
	fn from(_: nscache_transport::RemotesEmpty) -> Self {
		Self::RemotesEmpty
	}
}
