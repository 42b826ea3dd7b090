use crate::ids::CoupleIndex;

/// Static (per-refresh) part of a weighted couple entry. Ordered by
/// descending `memory` within [`crate::sampler::WeightSampler`]; the
/// mutable `coefficient` lives in a side-table, not here, so this part of
/// the snapshot stays truly immutable and freely shareable.
#[derive(Debug, Clone)]
pub struct WeightEntry {
	pub couple_ref: CoupleIndex,
	pub base_weight: u64,
	pub memory: u64,
	/// `min(groups)` of the referenced couple: the entry's identity as
	/// reported to callers.
	pub id: u64,
}
