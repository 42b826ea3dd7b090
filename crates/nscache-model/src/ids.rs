//! Small newtype identifiers used to index into a [`crate::snapshot::NamespaceSnapshot`]
//! arena instead of carrying pointers between groups and couples.

use std::fmt;

/// A single storage replica's identity within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The string identifier of a couple, as assigned by the control service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoupleId(pub String);

impl fmt::Display for CoupleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for CoupleId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Opaque identifier for a named subdivision within a couple. Never interpreted,
/// only round-tripped from the payload (see `get_couple_groupset`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupsetId(pub String);

/// Index of a [`crate::group::Group`] within a snapshot's group arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupIndex(pub u32);

/// Index of a [`crate::couple::Couple`] within a snapshot's couple arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoupleIndex(pub u32);
