//! The link record: a named edge from a group to a target.
//!
//! A [`Link`] is the elementary addressable entry of the namespace. Its
//! [`LinkTarget`] is a closed sum type, so every consumer that dereferences
//! a link matches all four kinds exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::TypeError;

/// Identifier of a link class.
///
/// Hard and soft links are built in and never dispatched through a class
/// registry. Class [`LinkClassId::EXTERNAL`] is the first user-defined
/// class and is reserved for external links; registerable user-defined
/// classes occupy `65..=255`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkClassId(u16);

impl LinkClassId {
    pub const HARD: LinkClassId = LinkClassId(0);
    pub const SOFT: LinkClassId = LinkClassId(1);
    pub const EXTERNAL: LinkClassId = LinkClassId(64);
    /// Smallest id usable by a registered user-defined class.
    pub const USER_MIN: u16 = 65;
    /// Largest id usable by a registered user-defined class.
    pub const USER_MAX: u16 = 255;

    /// Build a user-defined class id, rejecting the built-in range.
    pub fn user(id: u16) -> Result<Self, TypeError> {
        if !(Self::USER_MIN..=Self::USER_MAX).contains(&id) {
            return Err(TypeError::ReservedClassId(id));
        }
        Ok(Self(id))
    }

    /// The raw id value.
    pub const fn get(&self) -> u16 {
        self.0
    }

    /// Wrap a raw id without range checks (used when decoding stored links).
    pub const fn from_raw(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Debug for LinkClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkClassId({})", self.0)
    }
}

impl fmt::Display for LinkClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Character set of a link name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharSet {
    #[default]
    Ascii,
    Utf8,
}

/// What a link points to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    /// Hard link: the persistent address of an object header in the same
    /// container.
    Hard { addr: Address },
    /// Soft link: a path resolved lazily, possibly dangling.
    Soft { path: String },
    /// External link: an object path inside another container.
    External { file: String, path: String },
    /// User-defined link: opaque data interpreted by the class registered
    /// under `class`.
    UserDefined { class: LinkClassId, data: Vec<u8> },
}

/// The discriminant of a [`LinkTarget`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    Hard,
    Soft,
    External,
    UserDefined(LinkClassId),
}

impl LinkKind {
    /// The class id this kind dispatches to.
    pub fn class_id(&self) -> LinkClassId {
        match self {
            Self::Hard => LinkClassId::HARD,
            Self::Soft => LinkClassId::SOFT,
            Self::External => LinkClassId::EXTERNAL,
            Self::UserDefined(id) => *id,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Soft => write!(f, "soft"),
            Self::External => write!(f, "external"),
            Self::UserDefined(id) => write!(f, "user-defined({id})"),
        }
    }
}

/// A named link stored in a group.
///
/// Names are unique within one group. `creation_order` is only set when the
/// owning group tracks creation order; it is assigned by the group on
/// insertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Name of the link, unique within its group.
    pub name: String,
    /// Creation-order tag, if the owning group tracks it.
    pub creation_order: Option<u64>,
    /// Character set of `name`.
    pub charset: CharSet,
    /// What this link points to.
    pub target: LinkTarget,
}

impl Link {
    fn with_target(name: impl Into<String>, target: LinkTarget) -> Self {
        Self {
            name: name.into(),
            creation_order: None,
            charset: CharSet::Ascii,
            target,
        }
    }

    /// A hard link to `addr`.
    pub fn hard(name: impl Into<String>, addr: Address) -> Self {
        Self::with_target(name, LinkTarget::Hard { addr })
    }

    /// A soft link to `path`.
    pub fn soft(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_target(name, LinkTarget::Soft { path: path.into() })
    }

    /// An external link to `path` inside the container named `file`.
    pub fn external(
        name: impl Into<String>,
        file: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::with_target(
            name,
            LinkTarget::External {
                file: file.into(),
                path: path.into(),
            },
        )
    }

    /// A user-defined link of class `class` carrying `data`.
    pub fn user_defined(name: impl Into<String>, class: LinkClassId, data: Vec<u8>) -> Self {
        Self::with_target(name, LinkTarget::UserDefined { class, data })
    }

    /// The kind of this link.
    pub fn kind(&self) -> LinkKind {
        match &self.target {
            LinkTarget::Hard { .. } => LinkKind::Hard,
            LinkTarget::Soft { .. } => LinkKind::Soft,
            LinkTarget::External { .. } => LinkKind::External,
            LinkTarget::UserDefined { class, .. } => LinkKind::UserDefined(*class),
        }
    }

    /// Returns `true` if this is a hard link.
    pub fn is_hard(&self) -> bool {
        matches!(self.target, LinkTarget::Hard { .. })
    }

    /// The target address of a hard link.
    pub fn hard_target(&self) -> Option<Address> {
        match self.target {
            LinkTarget::Hard { addr } => Some(addr),
            _ => None,
        }
    }

    /// Size in bytes of the link's value, as reported by link queries.
    ///
    /// Soft and external values count their string terminators; external
    /// values also count a leading flags byte.
    pub fn value_size(&self) -> usize {
        match &self.target {
            LinkTarget::Hard { .. } => std::mem::size_of::<u64>(),
            LinkTarget::Soft { path } => path.len() + 1,
            LinkTarget::External { file, path } => 1 + file.len() + 1 + path.len() + 1,
            LinkTarget::UserDefined { data, .. } => data.len(),
        }
    }

    /// Validate a single link name (one path component).
    pub fn validate_name(name: &str) -> Result<(), TypeError> {
        let reason = if name.is_empty() {
            "must not be empty"
        } else if name.contains('/') {
            "must not contain '/'"
        } else if name == "." {
            "must not be '.'"
        } else {
            return Ok(());
        };
        Err(TypeError::InvalidLinkName {
            name: name.to_string(),
            reason: reason.into(),
        })
    }
}
