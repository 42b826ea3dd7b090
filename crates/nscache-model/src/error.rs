use thiserror::Error;

/// Failures constructing a [`crate::snapshot::NamespaceSnapshot`] from a raw
/// payload. Always named with the namespace and the stage of the
/// settings → couples → weights → statistics → consistency pipeline that
/// failed; never fatal to the refresh worker, which logs and retains the
/// previous cache entry for that namespace.
#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("namespace {namespace}: missing field '{field}'")]
	MissingField { namespace: String, field: &'static str },

	#[error("namespace {namespace}: field '{field}' has the wrong type")]
	WrongType { namespace: String, field: &'static str },

	#[error("namespace {namespace}: couple '{couple_id}' reuses groups already assigned to another couple")]
	DuplicateCouple { namespace: String, couple_id: String },

	#[error("namespace {namespace}: group {group} is already assigned to another couple")]
	DuplicateGroup { namespace: String, group: u64 },

	#[error("namespace {namespace}: group {group} referenced by couple '{couple_id}' has no group entry")]
	UnknownGroupReference { namespace: String, couple_id: String, group: u64 },

	#[error("namespace {namespace}: couples list is empty")]
	EmptyCouples { namespace: String },

	#[error(
		"namespace {namespace}: weighted entry for couple '{couple_id}' has {actual} groups, expected {expected}"
	)]
	GroupsCountMismatch {
		namespace: String,
		couple_id: String,
		expected: usize,
		actual: usize,
	},

	#[error(
		"namespace {namespace}: no weighted couples were obtained and the namespace has no static groups"
	)]
	NoWeightedCouples { namespace: String },

	#[error("namespace {namespace}: weighted entry groups {groups} span more than one couple")]
	InconsistentCouple { namespace: String, groups: String },

	#[error(
		"namespace {namespace}: weighted entry for couple '{couple_id}' has {actual} groups, but the couple itself has {expected}"
	)]
	CoupleGroupsSizeMismatch {
		namespace: String,
		couple_id: String,
		expected: usize,
		actual: usize,
	},

	#[error("namespace {namespace}: user settings factory failed: {source}")]
	UserSettingsFactory {
		namespace: String,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}

impl SnapshotError {
	pub fn namespace(&self) -> &str {
		match self {
			Self::MissingField { namespace, .. }
			| Self::WrongType { namespace, .. }
			| Self::DuplicateCouple { namespace, .. }
			| Self::DuplicateGroup { namespace, .. }
			| Self::UnknownGroupReference { namespace, .. }
			| Self::EmptyCouples { namespace }
			| Self::GroupsCountMismatch { namespace, .. }
			| Self::NoWeightedCouples { namespace }
			| Self::InconsistentCouple { namespace, .. }
			| Self::CoupleGroupsSizeMismatch { namespace, .. }
			| Self::UserSettingsFactory { namespace, .. } => namespace,
		}
	}
}

/// Errors from the weight sampler.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SamplerError {
	#[error("no couple has enough free memory for the requested size")]
	NotEnoughMemory,
	#[error("couple not found for the drawn cumulative weight")]
	CoupleNotFound,
}

/// An unrecognized feedback tag was supplied to `set_feedback`.
#[derive(Debug, Error, Clone)]
#[error("unknown feedback '{feedback}' for couple '{couple_id}'")]
pub struct UnknownFeedback {
	pub couple_id: String,
	pub feedback: String,
}
