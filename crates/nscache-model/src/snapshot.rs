//! Namespace snapshot construction and read-side accessors.
//!
//! Parsing order is fixed: settings → couples → weights → statistics →
//! consistency check. Any failure aborts construction with a
//! [`SnapshotError`] naming the namespace and cause; nothing is partially
//! published, so the caller (the refresh worker) simply keeps the previous
//! entry.

use std::collections::HashMap;

use serde_json::Value;

use crate::couple::{Couple, CoupleStatus};
use crate::error::{SamplerError, SnapshotError, UnknownFeedback};
use crate::feedback::FeedbackTag;
use crate::group::{Group, GroupStatus};
use crate::ids::{CoupleId, CoupleIndex, GroupId, GroupIndex, GroupsetId};
use crate::random::RandomSource;
use crate::sampler::WeightSampler;
use crate::settings::{AuthKeys, NamespaceSettings, UserSettingsFactory};
use crate::weight::WeightEntry;

fn wire_obj<'a>(v: &'a Value, namespace: &str, field: &'static str) -> Result<&'a serde_json::Map<String, Value>, SnapshotError> {
	v.as_object().ok_or_else(|| SnapshotError::WrongType {
		namespace: namespace.to_string(),
		field,
	})
}

fn wire_array<'a>(v: &'a Value, namespace: &str, field: &'static str) -> Result<&'a Vec<Value>, SnapshotError> {
	v.as_array().ok_or_else(|| SnapshotError::WrongType {
		namespace: namespace.to_string(),
		field,
	})
}

fn wire_u64(v: &Value, namespace: &str, field: &'static str) -> Result<u64, SnapshotError> {
	v.as_u64().ok_or_else(|| SnapshotError::WrongType {
		namespace: namespace.to_string(),
		field,
	})
}

fn wire_str<'a>(v: &'a Value, namespace: &str, field: &'static str) -> Result<&'a str, SnapshotError> {
	v.as_str().ok_or_else(|| SnapshotError::WrongType {
		namespace: namespace.to_string(),
		field,
	})
}

fn missing(namespace: &str, field: &'static str) -> SnapshotError {
	SnapshotError::MissingField {
		namespace: namespace.to_string(),
		field,
	}
}

/// A fully-constructed, internally consistent namespace state produced from
/// one refresh tick.
///
/// Immutable except for [`WeightSampler`] coefficients, which may still be
/// mutated by feedback after publication (see `weights().set_feedback`).
pub struct NamespaceSnapshot<U> {
	name: String,
	settings: NamespaceSettings<U>,
	groups: Vec<Group>,
	couples: Vec<Couple>,
	group_index_by_id: HashMap<GroupId, GroupIndex>,
	couple_index_by_id: HashMap<CoupleId, CoupleIndex>,
	weights: WeightSampler,
	is_full: bool,
	extract: String,
}

impl<U> NamespaceSnapshot<U> {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_full(&self) -> bool {
		self.is_full
	}

	/// Short human summary, stable across refreshes with identical payloads
	/// (property 7).
	pub fn extract(&self) -> &str {
		&self.extract
	}

	pub fn has_user_settings(&self) -> bool {
		self.settings.user_settings.is_some()
	}

	pub fn settings(&self) -> &NamespaceSettings<U> {
		&self.settings
	}

	pub fn couples(&self) -> CouplesView<'_, U> {
		CouplesView { snapshot: self }
	}

	pub fn weights(&self) -> WeightsView<'_, U> {
		WeightsView { snapshot: self }
	}

	fn group_index(&self, group: GroupId) -> Option<GroupIndex> {
		self.group_index_by_id.get(&group).copied()
	}

	fn couple_for_group(&self, group: GroupId) -> Option<&Couple> {
		let idx = self.group_index(group)?;
		let couple_ref = self.groups[idx.0 as usize].couple_ref;
		Some(&self.couples[couple_ref.0 as usize])
	}

	fn couple_groups(&self, couple: &Couple) -> Vec<GroupId> {
		couple
			.groups
			.iter()
			.map(|idx| self.groups[idx.0 as usize].id)
			.collect()
	}

	/// Build a snapshot from one namespace's raw payload, as returned by
	/// `get_namespaces_states`.
	pub fn from_payload(
		name: &str,
		payload: &Value,
		factory: &dyn UserSettingsFactory<Value = U>,
	) -> Result<Self, SnapshotError> {
		let settings_raw = payload.get("settings").ok_or_else(|| missing(name, "settings"))?;
		let settings = parse_settings(name, settings_raw, factory)?;

		let couples_raw = payload.get("couples").ok_or_else(|| missing(name, "couples"))?;
		let (groups, couples, group_index_by_id, couple_index_by_id) =
			parse_couples(name, couples_raw)?;

		let weights_raw = payload.get("weights").ok_or_else(|| missing(name, "weights"))?;
		let weight_entries = parse_weights(
			name,
			weights_raw,
			settings.groups_count,
			&couples,
			&group_index_by_id,
			&groups,
		)?;

		let statistics_raw = payload.get("statistics");
		let is_full = statistics_raw
			.and_then(|s| s.get("is_full"))
			.and_then(Value::as_bool)
			.unwrap_or(false);

		let nonzero_weights = weight_entries.iter().filter(|w| w.base_weight != 0).count();

		if couples.is_empty() {
			return Err(SnapshotError::EmptyCouples {
				namespace: name.to_string(),
			});
		}

		let (effective_nonzero, is_static) = if nonzero_weights == 0 && !is_full {
			if settings.static_groups.is_empty() {
				return Err(SnapshotError::NoWeightedCouples {
					namespace: name.to_string(),
				});
			}
			(1, true)
		} else {
			(nonzero_weights, false)
		};

		let mut extract = format!(
			"namespace={} groups-count={} couples-for-write={}",
			name, settings.groups_count, effective_nonzero
		);
		if is_static {
			extract.push_str(" [static]");
		}
		if is_full {
			extract.push_str(" [full]");
		}
		extract.push_str(&format!(" couples={}", couples.len()));

		let weights = WeightSampler::new(weight_entries);

		Ok(Self {
			name: name.to_string(),
			settings,
			groups,
			couples,
			group_index_by_id,
			couple_index_by_id,
			weights,
			is_full,
			extract,
		})
	}
}

fn parse_settings<U>(
	namespace: &str,
	raw: &Value,
	factory: &dyn UserSettingsFactory<Value = U>,
) -> Result<NamespaceSettings<U>, SnapshotError> {
	let obj = wire_obj(raw, namespace, "settings")?;

	let groups_count = obj
		.get("groups-count")
		.ok_or_else(|| missing(namespace, "settings.groups-count"))
		.and_then(|v| wire_u64(v, namespace, "settings.groups-count"))? as usize;

	let success_copies_policy = obj
		.get("success-copies-num")
		.ok_or_else(|| missing(namespace, "settings.success-copies-num"))
		.and_then(|v| wire_str(v, namespace, "settings.success-copies-num"))?
		.to_string();

	let auth_keys = obj.get("auth-keys").and_then(|v| v.as_object()).map(|auth| AuthKeys {
		read: auth.get("read").and_then(Value::as_str).map(str::to_string),
		write: auth.get("write").and_then(Value::as_str).map(str::to_string),
	});

	let static_groups = match obj.get("static-couple") {
		Some(v) => wire_array(v, namespace, "settings.static-couple")?
			.iter()
			.map(|g| wire_u64(g, namespace, "settings.static-couple[]").map(GroupId))
			.collect::<Result<Vec<_>, _>>()?,
		None => Vec::new(),
	};

	let user_settings = factory
		.build(namespace, raw)
		.map_err(|source| SnapshotError::UserSettingsFactory {
			namespace: namespace.to_string(),
			source,
		})?;

	Ok(NamespaceSettings {
		name: namespace.to_string(),
		groups_count,
		success_copies_policy,
		static_groups,
		auth_keys,
		user_settings,
	})
}

type ParsedCouples = (
	Vec<Group>,
	Vec<Couple>,
	HashMap<GroupId, GroupIndex>,
	HashMap<CoupleId, CoupleIndex>,
);

fn parse_couples(namespace: &str, raw: &Value) -> Result<ParsedCouples, SnapshotError> {
	let entries = wire_array(raw, namespace, "couples")?;

	let mut groups = Vec::new();
	let mut couples = Vec::with_capacity(entries.len());
	let mut group_index_by_id = HashMap::new();
	let mut couple_index_by_id: HashMap<CoupleId, CoupleIndex> = HashMap::new();

	for entry in entries {
		let obj = wire_obj(entry, namespace, "couples[]")?;

		let id: CoupleId = obj
			.get("id")
			.ok_or_else(|| missing(namespace, "couples[].id"))
			.and_then(|v| wire_str(v, namespace, "couples[].id"))?
			.to_string()
			.into();

		if couple_index_by_id.contains_key(&id) {
			return Err(SnapshotError::DuplicateCouple {
				namespace: namespace.to_string(),
				couple_id: id.0,
			});
		}

		let status = obj
			.get("couple_status")
			.and_then(Value::as_str)
			.map(CoupleStatus::from_wire)
			.unwrap_or(CoupleStatus::Unknown);

		let free_effective_space = obj
			.get("free_effective_space")
			.and_then(Value::as_u64)
			.unwrap_or(0);

		let hosts = obj.get("hosts").cloned().unwrap_or(Value::Null);

		let couple_index = CoupleIndex(couples.len() as u32);

		let groups_raw = obj
			.get("groups")
			.ok_or_else(|| missing(namespace, "couples[].groups"))
			.and_then(|v| wire_array(v, namespace, "couples[].groups"))?;

		let mut group_refs = Vec::with_capacity(groups_raw.len());
		for group_raw in groups_raw {
			let group_obj = wire_obj(group_raw, namespace, "couples[].groups[]")?;
			let group_id = group_obj
				.get("id")
				.ok_or_else(|| missing(namespace, "couples[].groups[].id"))
				.and_then(|v| wire_u64(v, namespace, "couples[].groups[].id"))
				.map(GroupId)?;

			let group_status = group_obj
				.get("status")
				.and_then(Value::as_str)
				.map(GroupStatus::from_wire)
				.unwrap_or(GroupStatus::Unknown);

			if group_index_by_id.contains_key(&group_id) {
				return Err(SnapshotError::DuplicateGroup {
					namespace: namespace.to_string(),
					group: group_id.0,
				});
			}

			let group_index = GroupIndex(groups.len() as u32);
			groups.push(Group {
				id: group_id,
				status: group_status,
				couple_ref: couple_index,
			});
			group_index_by_id.insert(group_id, group_index);
			group_refs.push(group_index);
		}

		couple_index_by_id.insert(id.clone(), couple_index);
		couples.push(Couple {
			id,
			groups: group_refs,
			status,
			free_effective_space,
			hosts,
		});
	}

	Ok((groups, couples, group_index_by_id, couple_index_by_id))
}

fn parse_weights(
	namespace: &str,
	raw: &Value,
	groups_count: usize,
	couples: &[Couple],
	group_index_by_id: &HashMap<GroupId, GroupIndex>,
	groups: &[Group],
) -> Result<Vec<WeightEntry>, SnapshotError> {
	let obj = wire_obj(raw, namespace, "weights")?;
	let key = groups_count.to_string();
	let Some(bucket) = obj.get(&key) else {
		// No weighted couples published for this replication factor; an
		// empty weights table is valid (e.g. a fully static namespace).
		return Ok(Vec::new());
	};
	let bucket = wire_array(bucket, namespace, "weights[groups_count]")?;

	let mut out = Vec::with_capacity(bucket.len());
	for item in bucket {
		let item = wire_array(item, namespace, "weights[][]")?;
		if item.len() < 3 {
			return Err(SnapshotError::WrongType {
				namespace: namespace.to_string(),
				field: "weights[][]",
			});
		}

		let wire_groups = wire_array(&item[0], namespace, "weights[][0]")?;
		let mut entry_groups = Vec::with_capacity(wire_groups.len());
		for g in wire_groups {
			entry_groups.push(wire_u64(g, namespace, "weights[][0][]").map(GroupId)?);
		}

		if entry_groups.len() != groups_count {
			return Err(SnapshotError::GroupsCountMismatch {
				namespace: namespace.to_string(),
				couple_id: format!("{:?}", entry_groups),
				expected: groups_count,
				actual: entry_groups.len(),
			});
		}

		let base_weight = wire_u64(&item[1], namespace, "weights[][1]")?;
		let memory = wire_u64(&item[2], namespace, "weights[][2]")?;

		let min_group = *entry_groups.iter().min().expect("non-empty groups_count checked above");

		// Resolve to the couple these groups belong to and sanity-check that
		// all groups agree.
		let mut couple_ref: Option<CoupleIndex> = None;
		for g in &entry_groups {
			let Some(group_index) = group_index_by_id.get(g) else {
				return Err(SnapshotError::UnknownGroupReference {
					namespace: namespace.to_string(),
					couple_id: format!("{:?}", entry_groups),
					group: g.0,
				});
			};
			let this_couple = groups[group_index.0 as usize].couple_ref;
			match couple_ref {
				None => couple_ref = Some(this_couple),
				Some(prev) if prev.0 != this_couple.0 => {
					return Err(SnapshotError::InconsistentCouple {
						namespace: namespace.to_string(),
						groups: format!("{:?}", entry_groups),
					});
				}
				_ => {}
			}
		}
		let couple_ref = couple_ref.expect("entry_groups is non-empty");

		// The weighted entry's own group count was already checked against
		// `groups_count` above; this checks it against the *couple's* actual
		// group list, so a couple built with a different number of groups
		// than this entry claims (property 1) is rejected rather than
		// silently accepted.
		let couple = &couples[couple_ref.0 as usize];
		if couple.groups.len() != entry_groups.len() {
			return Err(SnapshotError::CoupleGroupsSizeMismatch {
				namespace: namespace.to_string(),
				couple_id: couple.id.0.clone(),
				expected: couple.groups.len(),
				actual: entry_groups.len(),
			});
		}

		out.push(WeightEntry {
			couple_ref,
			base_weight,
			memory,
			id: min_group.0,
		});
	}

	out.sort_by(|a, b| b.memory.cmp(&a.memory));
	Ok(out)
}

/// Snapshot-scoped accessors over couples and groups.
pub struct CouplesView<'a, U> {
	snapshot: &'a NamespaceSnapshot<U>,
}

impl<'a, U> CouplesView<'a, U> {
	pub fn get_groups(&self, group: GroupId) -> Option<Vec<GroupId>> {
		let couple = self.snapshot.couple_for_group(group)?;
		Some(self.snapshot.couple_groups(couple))
	}

	pub fn free_effective_space(&self, group: GroupId) -> Option<u64> {
		self.snapshot.couple_for_group(group).map(|c| c.free_effective_space)
	}

	pub fn hosts(&self, group: GroupId) -> Option<&'a Value> {
		self.snapshot.couple_for_group(group).map(|c| &c.hosts)
	}

	pub fn status(&self, group: GroupId) -> Option<CoupleStatus> {
		self.snapshot.couple_for_group(group).map(|c| c.status)
	}

	/// Opaque groupset lookup: forwards the payload identity roundtrip
	/// without interpreting it. No concrete groupset substructure is
	/// observed anywhere upstream, so a couple's hosts tree itself is
	/// treated as the sole opaque blob addressed by any `groupset_id`:
	/// callers get the same value back regardless of which id they pass.
	pub fn get_couple_groupset(&self, group: GroupId, _groupset_id: &GroupsetId) -> Option<&'a Value> {
		self.hosts(group)
	}

	pub fn by_id(&self, couple_id: &CoupleId) -> Option<&'a Couple> {
		self.snapshot
			.couple_index_by_id
			.get(couple_id)
			.map(|idx| &self.snapshot.couples[idx.0 as usize])
	}

	pub fn len(&self) -> usize {
		self.snapshot.couples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.snapshot.couples.is_empty()
	}

	/// Every couple's status and member group ids, for callers building
	/// cross-namespace derived views (bad-groups list, group→namespace
	/// index) without re-deriving per-couple state themselves.
	pub fn iter(&self) -> impl Iterator<Item = (CoupleStatus, Vec<GroupId>)> + 'a {
		let snapshot = self.snapshot;
		snapshot.couples.iter().map(move |c| (c.status, snapshot.couple_groups(c)))
	}
}

/// Snapshot-scoped accessors over the weight sampler.
pub struct WeightsView<'a, U> {
	snapshot: &'a NamespaceSnapshot<U>,
}

impl<'a, U> WeightsView<'a, U> {
	pub fn groups(&self, size: u64, random: &mut dyn RandomSource) -> Result<Vec<GroupId>, SamplerError> {
		let couple_ref = self.snapshot.weights.pick(size, random)?;
		let couple = &self.snapshot.couples[couple_ref.0 as usize];
		Ok(self.snapshot.couple_groups(couple))
	}

	pub fn couple_sequence(
		&self,
		size: u64,
		random: &mut dyn RandomSource,
	) -> Result<Vec<Vec<GroupId>>, SamplerError> {
		let couple_refs = self.snapshot.weights.sequence(size, random)?;
		Ok(couple_refs
			.into_iter()
			.map(|idx| self.snapshot.couple_groups(&self.snapshot.couples[idx.0 as usize]))
			.collect())
	}

	/// Applies `tag`'s coefficient (via `min`) to every weighted entry whose
	/// couple contains the group `couple_marker`. Returns `Ok(false)` (not
	/// an error) when no entry matches, mirroring the original
	/// `set_coefficient`'s silent no-op, since feedback can race a couple
	/// being dropped by the next refresh.
	pub fn set_feedback(&self, couple_marker: u64, tag: &str) -> Result<bool, UnknownFeedback> {
		let feedback = FeedbackTag::parse_or_err(&couple_marker.to_string(), tag)?;
		let marker = GroupId(couple_marker);

		let mut matched = false;
		for entry in self.snapshot.weights.entries() {
			let couple = &self.snapshot.couples[entry.couple_ref.0 as usize];
			if self.snapshot.couple_groups(couple).contains(&marker) {
				self.snapshot.weights.set_coefficient(entry.couple_ref, feedback.coefficient());
				matched = true;
			}
		}
		Ok(matched)
	}

	pub fn is_empty(&self) -> bool {
		self.snapshot.weights.is_empty()
	}
}
