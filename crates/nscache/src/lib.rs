//! Client-side cache for the "mastermind" storage-topology control service.
//!
//! Owns the background refresh worker, the versioned cache registry,
//! persistence, and the public read-side façade. The data model
//! and weight sampler live in [`nscache_model`]; the reconnecting RPC
//! client lives in [`nscache_transport`]; the cancellable periodic task
//! scaffold lives in [`nscache_worker`]. This crate wires the three
//! together into one embeddable engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod facade;
pub mod persist;
pub mod refresh;
pub mod registry;
mod wire;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CacheConfig;
pub use error::CacheError;
pub use facade::NamespaceStateCache;
pub use refresh::WorkerState;
pub use registry::{CacheEntry, CachedKeys, DerivedViews, EllipticsRemotes, Registry};

pub use nscache_model::{
	Couple, CoupleId, CoupleStatus, FeedbackTag, FixedRandom, Group, GroupId, GroupStatus, GroupsetId,
	NamespaceSettings, NamespaceSnapshot, NoUserSettings, RandomSource, SamplerError, SnapshotError,
	UserSettingsFactory, UserSettingsHandle, WeightEntry, XorShiftRandom,
};
pub use nscache_transport::{Remote, Transport, TransportConnector, TransportError};
