//! Parsing for the two non-namespaced RPC replies (`get_cached_keys`,
//! `get_config_remotes`). Shared between fresh fetches in [`crate::refresh`]
//! and blob rehydrate in [`crate::persist`] so both run the same
//! construction pipeline.

use serde_json::Value;

use crate::registry::{CachedKeys, EllipticsRemotes};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
	#[error("cached_keys payload: expected an object")]
	CachedKeysNotObject,
	#[error("cached_keys['{key}']: expected an object")]
	CachedKeysEntryNotObject { key: String },
	#[error("cached_keys['{key}']['{couple}'].cache_groups: expected an array of integers")]
	CacheGroupsNotArray { key: String, couple: String },
	#[error("elliptics_remotes payload: expected an array")]
	RemotesNotArray,
	#[error("elliptics_remotes[{index}]: expected a [host, port, family] tuple")]
	RemoteEntryMalformed { index: usize },
}

/// `key -> couple_id -> { cache_groups: [int,...] }`.
pub fn parse_cached_keys(raw: &Value) -> Result<CachedKeys, WireError> {
	let obj = raw.as_object().ok_or(WireError::CachedKeysNotObject)?;
	let mut out = CachedKeys::new();

	for (key, couples_raw) in obj {
		let couples_obj = couples_raw.as_object().ok_or_else(|| WireError::CachedKeysEntryNotObject {
			key: key.clone(),
		})?;
		let mut couples = std::collections::HashMap::new();
		for (couple_id, value) in couples_obj {
			let groups = value
				.get("cache_groups")
				.and_then(Value::as_array)
				.ok_or_else(|| WireError::CacheGroupsNotArray {
					key: key.clone(),
					couple: couple_id.clone(),
				})?
				.iter()
				.filter_map(Value::as_i64)
				.collect();
			couples.insert(couple_id.clone(), groups);
		}
		out.insert(key.clone(), couples);
	}

	Ok(out)
}

/// Array of `[host, port, family]` tuples.
pub fn parse_elliptics_remotes(raw: &Value) -> Result<EllipticsRemotes, WireError> {
	let array = raw.as_array().ok_or(WireError::RemotesNotArray)?;
	let mut out = Vec::with_capacity(array.len());

	for (index, entry) in array.iter().enumerate() {
		let tuple = entry.as_array().ok_or(WireError::RemoteEntryMalformed { index })?;
		let host = tuple
			.first()
			.and_then(Value::as_str)
			.ok_or(WireError::RemoteEntryMalformed { index })?
			.to_string();
		let port = tuple
			.get(1)
			.and_then(Value::as_u64)
			.ok_or(WireError::RemoteEntryMalformed { index })? as u16;
		let family = tuple
			.get(2)
			.and_then(Value::as_i64)
			.ok_or(WireError::RemoteEntryMalformed { index })? as i32;
		out.push((host, port, family));
	}

	Ok(out)
}
