/// Injected source of uniform randomness, consumed only by the weight
/// sampler. `next_f64` must return a value in `[0, 1)`; the sampler computes
/// the shoot point as `floor(u * total)`.
pub trait RandomSource: Send + Sync {
	fn next_f64(&mut self) -> f64;
}

/// A small, dependency-free xorshift64* generator.
///
/// Not cryptographically strong and not meant to be: couple selection only
/// needs a reasonable distribution across replicas, not unpredictability.
/// Kept in-crate rather than pulling in `rand` because nothing else in this
/// workspace needs a general-purpose RNG.
pub struct XorShiftRandom {
	state: u64,
}

impl XorShiftRandom {
	pub fn new(seed: u64) -> Self {
		Self {
			state: if seed == 0 { 0x9E3779B97F4A7C15 } else { seed },
		}
	}

	pub fn from_system_time() -> Self {
		let nanos = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_nanos() as u64)
			.unwrap_or(0x2545F4914F6CDD1D);
		Self::new(nanos)
	}

	fn next_u64(&mut self) -> u64 {
		let mut x = self.state;
		x ^= x << 13;
		x ^= x >> 7;
		x ^= x << 17;
		self.state = x;
		x
	}
}

impl RandomSource for XorShiftRandom {
	fn next_f64(&mut self) -> f64 {
		// Top 53 bits give a uniformly distributed f64 in [0, 1).
		let bits = self.next_u64() >> 11;
		(bits as f64) * (1.0 / (1u64 << 53) as f64)
	}
}

/// A deterministic source for tests: replays a fixed sequence of draws, then
/// repeats the last value.
#[derive(Debug, Clone)]
pub struct FixedRandom {
	draws: Vec<f64>,
	next: usize,
}

impl FixedRandom {
	pub fn new(draws: Vec<f64>) -> Self {
		assert!(!draws.is_empty(), "FixedRandom needs at least one draw");
		Self { draws, next: 0 }
	}

	pub fn always(value: f64) -> Self {
		Self::new(vec![value])
	}
}

impl RandomSource for FixedRandom {
	fn next_f64(&mut self) -> f64 {
		let value = self.draws[self.next.min(self.draws.len() - 1)];
		if self.next < self.draws.len() - 1 {
			self.next += 1;
		}
		value
	}
}
