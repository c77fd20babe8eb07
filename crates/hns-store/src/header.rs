//! Object-header messages and their stored encoding.
//!
//! An object header is an ordered list of typed messages. Groups carry a
//! [`LinkInfoMessage`] and a [`GroupInfoMessage`], and in compact form one
//! [`HeaderMessage::Link`] per link. Messages are kept encoded as JSON bytes
//! and decoded on every read, so a damaged message is reported as
//! [`StoreError::CorruptMessage`] instead of being silently skipped.

use std::fmt;

use hns_types::{Address, Link, ObjectType};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Discriminant of a header message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    LinkInfo,
    GroupInfo,
    Link,
    Pipeline,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkInfo => write!(f, "link-info"),
            Self::GroupInfo => write!(f, "group-info"),
            Self::Link => write!(f, "link"),
            Self::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Link bookkeeping for a group.
///
/// The heap and name index addresses are defined only while the group is in
/// dense form. The creation-order index exists only when creation order is
/// both tracked and indexed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfoMessage {
    pub track_creation_order: bool,
    pub index_creation_order: bool,
    /// Highest creation-order tag handed out so far.
    pub max_creation_order: u64,
    pub heap: Address,
    pub name_index: Address,
    pub corder_index: Address,
}

impl LinkInfoMessage {
    /// Link info for a fresh compact group.
    pub fn compact(track_creation_order: bool, index_creation_order: bool) -> Self {
        Self {
            track_creation_order,
            index_creation_order: track_creation_order && index_creation_order,
            max_creation_order: 0,
            heap: Address::UNDEFINED,
            name_index: Address::UNDEFINED,
            corder_index: Address::UNDEFINED,
        }
    }

    /// Returns `true` if the links live in the heap and indices.
    pub fn is_dense(&self) -> bool {
        !self.heap.is_undefined()
    }
}

/// Storage-form thresholds and size estimates for a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfoMessage {
    /// Largest link count kept in compact form.
    pub max_compact: u16,
    /// Dense groups shrinking below this count return to compact form.
    pub min_dense: u16,
    pub est_num_entries: u16,
    pub est_name_len: u16,
}

impl Default for GroupInfoMessage {
    fn default() -> Self {
        Self {
            max_compact: 8,
            min_dense: 6,
            est_num_entries: 4,
            est_name_len: 8,
        }
    }
}

/// One filter in an I/O pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub id: u16,
    pub name: String,
    pub params: Vec<u32>,
}

/// Filter pipeline applied to the dense-storage heap of a group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub filters: Vec<Filter>,
}

/// A decoded header message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderMessage {
    LinkInfo(LinkInfoMessage),
    GroupInfo(GroupInfoMessage),
    Link(Link),
    Pipeline(PipelineMessage),
}

impl HeaderMessage {
    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::LinkInfo(_) => MessageKind::LinkInfo,
            Self::GroupInfo(_) => MessageKind::GroupInfo,
            Self::Link(_) => MessageKind::Link,
            Self::Pipeline(_) => MessageKind::Pipeline,
        }
    }

    /// Encode to the stored byte form.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Size in bytes of the stored form.
    pub fn encoded_size(&self) -> StoreResult<usize> {
        Ok(self.encode()?.len())
    }
}

/// A message as it sits in the header: its kind plus encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub kind: MessageKind,
    pub bytes: Vec<u8>,
}

impl StoredMessage {
    /// Encode a message for storage.
    pub fn encode(msg: &HeaderMessage) -> StoreResult<Self> {
        Ok(Self {
            kind: msg.kind(),
            bytes: msg.encode()?,
        })
    }

    /// Decode the stored bytes. `addr` is only used for error reporting.
    pub fn decode(&self, addr: Address) -> StoreResult<HeaderMessage> {
        let msg: HeaderMessage =
            serde_json::from_slice(&self.bytes).map_err(|e| StoreError::CorruptMessage {
                addr,
                kind: self.kind,
                reason: e.to_string(),
            })?;
        if msg.kind() != self.kind {
            return Err(StoreError::CorruptMessage {
                addr,
                kind: self.kind,
                reason: format!("payload decodes as a {} message", msg.kind()),
            });
        }
        Ok(msg)
    }
}

/// An object header: the object's type, its hard-link count and its
/// messages in insertion order.
#[derive(Clone, Debug)]
pub struct ObjectHeader {
    pub obj_type: ObjectType,
    pub link_count: u32,
    pub messages: Vec<StoredMessage>,
}

impl ObjectHeader {
    /// An empty header with a zero link count.
    pub fn new(obj_type: ObjectType) -> Self {
        Self {
            obj_type,
            link_count: 0,
            messages: Vec::new(),
        }
    }

    /// Total encoded size of the header's messages.
    pub fn size(&self) -> usize {
        self.messages.iter().map(|m| m.bytes.len()).sum()
    }
}

/// Cached hint of the root group's link storage, kept in the superblock.
///
/// Readers may use it to reach the root's dense storage without reading the
/// root header. It can go stale when the root changes form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootHint {
    pub dense: bool,
    pub heap: Address,
    pub name_index: Address,
}

impl RootHint {
    /// The hint that matches `info`.
    pub fn from_link_info(info: &LinkInfoMessage) -> Self {
        Self {
            dense: info.is_dense(),
            heap: info.heap,
            name_index: info.name_index,
        }
    }

    /// Returns `true` if this hint agrees with `info`.
    pub fn matches(&self, info: &LinkInfoMessage) -> bool {
        *self == Self::from_link_info(info)
    }
}

/// Container-level bootstrap record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// Address of the root group's object header.
    pub root: Address,
    pub root_hint: Option<RootHint>,
}

/// Cache address reserved for the superblock.
pub const SUPERBLOCK_ADDR: Address = Address::new(0);
