use serde::{Deserialize, Serialize};

/// Basic type of the object stored behind an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// A group: a node owning zero or more links.
    Group,
    /// A dataset placeholder.
    Dataset,
    /// A named (committed) datatype.
    NamedDatatype,
}

impl ObjectType {
    /// Returns `true` for groups.
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Dataset => write!(f, "dataset"),
            Self::NamedDatatype => write!(f, "named datatype"),
        }
    }
}
