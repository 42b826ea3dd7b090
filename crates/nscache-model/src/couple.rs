use crate::ids::{CoupleId, GroupIndex};

/// Status of a couple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoupleStatus {
	Unknown,
	Bad,
}

impl CoupleStatus {
	pub(crate) fn from_wire(raw: &str) -> Self {
		match raw {
			"BAD" => Self::Bad,
			_ => Self::Unknown,
		}
	}
}

/// An ordered set of groups that together store one replica of data for a
/// namespace: the replication unit.
///
/// Invariant: for every entry in `groups`, the referenced [`crate::group::Group`]
/// exists in the owning snapshot's arena and its `couple_ref` points back to
/// this couple; `groups.len()` equals the namespace's configured
/// `groups_count`.
#[derive(Debug, Clone)]
pub struct Couple {
	pub id: CoupleId,
	/// Indices into the snapshot's group arena, in wire order.
	pub groups: Vec<GroupIndex>,
	pub status: CoupleStatus,
	pub free_effective_space: u64,
	/// Opaque per-couple host tree, forwarded verbatim from the payload.
	pub hosts: serde_json::Value,
}
