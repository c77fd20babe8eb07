use std::path::Path;

use hns_store::{GroupInfoMessage, PipelineMessage, DEFAULT_METADATA_CACHE_BYTES};
use hns_types::CharSet;
use serde::{Deserialize, Serialize};

use crate::error::{NamespaceError, NsResult};

/// Container-wide namespace configuration.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Soft/user-defined link dereferences allowed per resolution.
    pub max_link_hops: u32,
    /// Largest link count a new group keeps in compact form.
    pub max_compact: u16,
    /// Dense groups shrinking below this count return to compact form.
    pub min_dense: u16,
    /// A link whose stored size exceeds this forces dense form.
    pub max_compact_link_bytes: usize,
    /// Track creation order in new groups.
    pub track_creation_order: bool,
    /// Index creation order in new groups (requires tracking).
    pub index_creation_order: bool,
    /// Flush and evict a group's cache entries when its descriptor goes away.
    pub evict_on_close: bool,
    /// Byte budget of the metadata cache.
    pub metadata_cache_bytes: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            max_link_hops: 16,
            max_compact: 8,
            min_dense: 6,
            max_compact_link_bytes: 65_535,
            track_creation_order: false,
            index_creation_order: false,
            evict_on_close: false,
            metadata_cache_bytes: DEFAULT_METADATA_CACHE_BYTES,
        }
    }
}

impl NamespaceConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> NsResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| NamespaceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> NsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NamespaceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> NsResult<String> {
        toml::to_string(self).map_err(|e| NamespaceError::Config(e.to_string()))
    }

    /// Check the thresholds are coherent.
    pub fn validate(&self) -> NsResult<()> {
        let limit = u32::from(self.max_compact) + 1;
        if self.max_compact > 0 && u32::from(self.min_dense) > limit {
            return Err(NamespaceError::Config(format!(
                "min_dense ({}) must not exceed max_compact + 1 ({limit})",
                self.min_dense
            )));
        }
        if self.index_creation_order && !self.track_creation_order {
            return Err(NamespaceError::Config(
                "index_creation_order requires track_creation_order".into(),
            ));
        }
        Ok(())
    }
}

/// Settings applied when creating one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupCreateProps {
    pub group_info: GroupInfoMessage,
    pub track_creation_order: bool,
    pub index_creation_order: bool,
    pub pipeline: PipelineMessage,
}

impl GroupCreateProps {
    /// Props derived from the container configuration.
    pub fn from_config(config: &NamespaceConfig) -> Self {
        Self {
            group_info: GroupInfoMessage {
                max_compact: config.max_compact,
                min_dense: config.min_dense,
                ..GroupInfoMessage::default()
            },
            track_creation_order: config.track_creation_order,
            index_creation_order: config.index_creation_order,
            pipeline: PipelineMessage::default(),
        }
    }

    /// Override the compact/dense thresholds.
    pub fn with_phase_change(mut self, max_compact: u16, min_dense: u16) -> Self {
        self.group_info.max_compact = max_compact;
        self.group_info.min_dense = min_dense;
        self
    }

    /// Turn on creation-order tracking, optionally indexed.
    pub fn with_creation_order(mut self, indexed: bool) -> Self {
        self.track_creation_order = true;
        self.index_creation_order = indexed;
        self
    }
}

impl Default for GroupCreateProps {
    fn default() -> Self {
        Self::from_config(&NamespaceConfig::default())
    }
}

/// Settings applied when creating one link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkCreateProps {
    /// Create missing groups along the path.
    pub create_intermediate_groups: bool,
    /// Character set of the new link's name.
    pub charset: CharSet,
}

impl LinkCreateProps {
    /// Props that create missing intermediate groups.
    pub fn intermediate() -> Self {
        Self {
            create_intermediate_groups: true,
            ..Self::default()
        }
    }
}

/// Access intent of an open container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl Access {
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}
