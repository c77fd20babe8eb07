use serde::{Deserialize, Serialize};

/// The key a group's links are ordered by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Lexicographic order of link names.
    Name,
    /// Order of the monotonically increasing creation-order tag.
    CreationOrder,
}

/// Direction of an ordered traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterOrder {
    /// Smallest key first.
    Increasing,
    /// Largest key first.
    Decreasing,
    /// No preference. Treated as [`Increasing`](Self::Increasing) so the
    /// result never depends on how the group stores its links.
    Native,
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::CreationOrder => write!(f, "creation order"),
        }
    }
}
