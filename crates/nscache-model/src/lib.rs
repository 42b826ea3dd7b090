//! Namespace snapshot data model.
//!
//! Owns everything spec'd as "Snapshot model" and "Weight sampler": the
//! group/couple arena, namespace settings, the weighted-couple sampler, and
//! the structured errors produced while building a snapshot from a raw
//! refresh payload. Deliberately has no knowledge of transport, the
//! registry, or persistence: those live in `nscache`.

pub mod couple;
pub mod error;
pub mod feedback;
pub mod group;
pub mod ids;
pub mod random;
pub mod sampler;
pub mod settings;
pub mod snapshot;
pub mod weight;

pub use couple::{Couple, CoupleStatus};
pub use error::{SamplerError, SnapshotError, UnknownFeedback};
pub use feedback::FeedbackTag;
pub use group::{Group, GroupStatus};
pub use ids::{CoupleId, CoupleIndex, GroupId, GroupIndex, GroupsetId};
pub use random::{FixedRandom, RandomSource, XorShiftRandom};
pub use sampler::WeightSampler;
pub use settings::{AuthKeys, NamespaceSettings, NoUserSettings, UserSettingsFactory, UserSettingsHandle};
pub use snapshot::{CouplesView, NamespaceSnapshot, WeightsView};
pub use weight::WeightEntry;
