use hns_types::{Address, CharSet, Link, LinkClassId, LinkKind, LinkTarget};

/// What a link query reports about a link's target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetInfo {
    /// Hard links report the target address.
    Address(Address),
    /// Every other kind reports the size of its stored value.
    ValueSize(usize),
}

/// Metadata about one link, as handed to iteration callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub creation_order: Option<u64>,
    pub charset: CharSet,
    pub target: TargetInfo,
}

impl From<&Link> for LinkInfo {
    fn from(link: &Link) -> Self {
        let target = match &link.target {
            LinkTarget::Hard { addr } => TargetInfo::Address(*addr),
            _ => TargetInfo::ValueSize(link.value_size()),
        };
        Self {
            kind: link.kind(),
            creation_order: link.creation_order,
            charset: link.charset,
            target,
        }
    }
}

/// The stored value of a non-hard link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkValue {
    Soft { path: String },
    External { file: String, path: String },
    UserDefined { class: LinkClassId, data: Vec<u8> },
}

/// What an iteration callback wants next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IterStep {
    /// Keep going.
    Continue,
    /// Stop now and return this value from the iteration.
    Stop(i32),
    /// Stop now and fail the iteration with
    /// [`CallbackAborted`](crate::NamespaceError::CallbackAborted).
    Abort(String),
}
