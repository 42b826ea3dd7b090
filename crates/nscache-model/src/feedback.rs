use crate::error::UnknownFeedback;

/// Availability hint supplied by the embedding proxy about a couple it just
/// tried to use. Maps to a coefficient applied via `min` against the
/// couple's current coefficient, monotone non-increasing for the lifetime
/// of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTag {
	Available,
	PartlyUnavailable,
	TemporaryUnavailable,
	PermanentlyUnavailable,
}

impl FeedbackTag {
	pub fn coefficient(self) -> f64 {
		match self {
			Self::Available => 1.0,
			Self::PartlyUnavailable => 0.1,
			Self::TemporaryUnavailable => 0.01,
			Self::PermanentlyUnavailable => 0.0,
		}
	}

	pub fn parse(tag: &str) -> Option<Self> {
		match tag {
			"available" => Some(Self::Available),
			"partly_unavailable" => Some(Self::PartlyUnavailable),
			"temporary_unavailable" => Some(Self::TemporaryUnavailable),
			"permanently_unavailable" => Some(Self::PermanentlyUnavailable),
			_ => None,
		}
	}

	pub fn parse_or_err(couple_id: &str, tag: &str) -> Result<Self, UnknownFeedback> {
		Self::parse(tag).ok_or_else(|| UnknownFeedback {
			couple_id: couple_id.to_string(),
			feedback: tag.to_string(),
		})
	}
}
