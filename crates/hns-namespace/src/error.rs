//! Error types for namespace operations.

use hns_store::StoreError;
use hns_types::{Address, LinkClassId, TypeError};
use thiserror::Error;

/// Errors that can occur during namespace operations.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// A named component does not exist and creation was not requested.
    #[error("not found: {name}")]
    NotFound { name: String },

    /// The object exists but is the wrong kind for this operation.
    #[error("wrong type for {name}: {reason}")]
    WrongType { name: String, reason: String },

    /// A link with this name already exists.
    #[error("already exists: {name}")]
    AlreadyExists { name: String },

    /// The soft/user-defined dereference budget ran out.
    #[error("too many link hops (limit {limit})")]
    TooManyLinkHops { limit: u32 },

    /// Group metadata is inconsistent.
    #[error("storage corrupt at {addr}: {reason}")]
    StorageCorrupt { addr: Address, reason: String },

    /// An allocation for a link table or path buffer failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A caller-supplied callback asked to abort.
    #[error("callback aborted: {0}")]
    CallbackAborted(String),

    /// An index-based lookup past the end of the group.
    #[error("index {index} out of bounds ({len} links)")]
    IndexOutOfBounds { index: u64, len: u64 },

    /// The group carries no link-info message.
    #[error("link info missing for group {0}")]
    LinkInfoMissing(Address),

    /// A path component is not a valid link name.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A mutating operation on a read-only container.
    #[error("container is read-only")]
    ReadOnly,

    /// No link class is registered under this id.
    #[error("unknown link class {0}")]
    UnknownLinkClass(LinkClassId),

    /// Creation order was requested from a group that does not track it.
    #[error("creation order not tracked by group {0}")]
    CreationOrderNotTracked(Address),

    /// The mount point or container is already involved in a mount.
    #[error("mount busy: {0}")]
    MountBusy(String),

    /// Nothing is mounted at this location.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// The operation is not meaningful for these arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The container has been closed.
    #[error("container is closed")]
    Closed,

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A storage collaborator failed.
    #[error(transparent)]
    Store(StoreError),
}

impl NamespaceError {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub(crate) fn wrong_type(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WrongType {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(addr: Address, reason: impl Into<String>) -> Self {
        Self::StorageCorrupt {
            addr,
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`NamespaceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for NamespaceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CorruptMessage { addr, kind, reason } => Self::StorageCorrupt {
                addr,
                reason: format!("{kind} message: {reason}"),
            },
            other => Self::Store(other),
        }
    }
}

impl From<TypeError> for NamespaceError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidLinkName { name, reason } => Self::InvalidName { name, reason },
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<std::collections::TryReserveError> for NamespaceError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::ResourceExhausted(err.to_string())
    }
}

/// Convenience type alias for namespace operations.
pub type NsResult<T> = std::result::Result<T, NamespaceError>;
