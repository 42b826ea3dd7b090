//! Weighted couple selection.
//!
//! Grounded on `original_source/src/couple_weights.cpp` and
//! `couple_sequence_p.hpp`: entries are sorted once, by descending memory,
//! at construction; `pick` filters by memory, folds in the coefficient,
//! builds a prefix-sum table and draws a uniform shoot point;  `sequence`
//! repeats `pick` while removing the chosen entry and recomputing the
//! remaining prefix sums.

use parking_lot::Mutex;

use crate::error::SamplerError;
use crate::ids::CoupleIndex;
use crate::random::RandomSource;
use crate::weight::WeightEntry;

/// Immutable weight table plus a mutable per-entry coefficient side-table,
/// guarded by its own short-lived lock, keeping per-couple feedback
/// mutation off an otherwise immutable snapshot.
pub struct WeightSampler {
	/// Sorted by descending `memory`, fixed for the lifetime of the snapshot.
	entries: Vec<WeightEntry>,
	/// Parallel to `entries`; starts at 1.0, only ever decreases via `min`.
	coefficients: Mutex<Vec<f64>>,
}

impl WeightSampler {
	/// `entries` must already be sorted by descending `memory`.
	pub fn new(entries: Vec<WeightEntry>) -> Self {
		let coefficients = Mutex::new(vec![1.0; entries.len()]);
		Self { entries, coefficients }
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[WeightEntry] {
		&self.entries
	}

	/// `effective = base_weight * coefficient`, zero entries dropped, in the
	/// current entry order (already descending by memory, filtered to
	/// `memory >= size`).
	fn effective_weights(&self, size: u64) -> Vec<(usize, u64)> {
		let coefficients = self.coefficients.lock();
		let mut out = Vec::with_capacity(self.entries.len());
		for (index, entry) in self.entries.iter().enumerate() {
			if entry.memory < size {
				// Entries are sorted by descending memory: once we see one
				// below the threshold, all the rest are too.
				break;
			}
			let effective = (entry.base_weight as f64 * coefficients[index]).floor() as u64;
			if effective == 0 {
				continue;
			}
			out.push((index, effective));
		}
		out
	}

	/// Draw one couple whose `memory >= size`, weighted by `base_weight *
	/// coefficient`. Ties on cumulative sum resolve to the lower-indexed
	/// entry (stable `lower_bound`).
	pub fn pick(
		&self,
		size: u64,
		random: &mut dyn RandomSource,
	) -> Result<CoupleIndex, SamplerError> {
		let weighted = self.effective_weights(size);
		if weighted.is_empty() {
			return Err(SamplerError::NotEnoughMemory);
		}

		let mut cumulative = Vec::with_capacity(weighted.len());
		let mut total: u64 = 0;
		for (index, weight) in &weighted {
			total += weight;
			cumulative.push((total, *index));
		}

		let u = random.next_f64();
		let u = if u >= 1.0 { 0.999_999_999_999 } else { u };
		let shoot = (u * total as f64).floor() as u64;

		let position = cumulative.partition_point(|(cum, _)| *cum <= shoot);
		let Some(&(_, entry_index)) = cumulative.get(position) else {
			return Err(SamplerError::CoupleNotFound);
		};

		Ok(self.entries[entry_index].couple_ref)
	}

	/// A non-repeating sequence of couples, built by repeating `pick` over a
	/// shrinking working set. Returned eagerly as a `Vec` (the whole working
	/// set is bounded by the number of weighted entries in one namespace, so
	/// laziness buys nothing here and a `Vec` is simpler to test).
	pub fn sequence(
		&self,
		size: u64,
		random: &mut dyn RandomSource,
	) -> Result<Vec<CoupleIndex>, SamplerError> {
		let mut working = self.effective_weights(size);
		if working.is_empty() {
			return Err(SamplerError::NotEnoughMemory);
		}

		let mut out = Vec::with_capacity(working.len());
		while !working.is_empty() {
			let mut cumulative = Vec::with_capacity(working.len());
			let mut total: u64 = 0;
			for (index, weight) in &working {
				total += weight;
				cumulative.push((total, *index));
			}

			let u = random.next_f64();
			let u = if u >= 1.0 { 0.999_999_999_999 } else { u };
			let shoot = (u * total as f64).floor() as u64;

			let position = cumulative.partition_point(|(cum, _)| *cum <= shoot);
			let Some(&(_, entry_index)) = cumulative.get(position) else {
				return Err(SamplerError::CoupleNotFound);
			};

			out.push(self.entries[entry_index].couple_ref);
			working.retain(|(index, _)| *index != entry_index);
		}

		Ok(out)
	}

	/// `coefficient <- min(current, value)` for every entry whose couple
	/// matches `couple_ref`. Monotone non-increasing within one snapshot's
	/// lifetime; resets only happen on snapshot replacement.
	pub fn set_coefficient(&self, couple_ref: CoupleIndex, value: f64) -> bool {
		let mut found = false;
		let mut coefficients = self.coefficients.lock();
		for (index, entry) in self.entries.iter().enumerate() {
			if entry.couple_ref == couple_ref {
				coefficients[index] = coefficients[index].min(value);
				found = true;
			}
		}
		found
	}

	/// Current coefficient for a couple, for tests and diagnostics.
	pub fn coefficient_of(&self, couple_ref: CoupleIndex) -> Option<f64> {
		let coefficients = self.coefficients.lock();
		self.entries
			.iter()
			.position(|entry| entry.couple_ref == couple_ref)
			.map(|index| coefficients[index])
	}
}

impl std::fmt::Debug for WeightSampler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WeightSampler")
			.field("entries", &self.entries.len())
			.finish()
	}
}
