use std::sync::Arc;

use hns_store::{HeaderMessage, HeaderStore, MessageKind, Store};
use hns_types::{Address, Link};

use crate::error::NsResult;
use crate::storage::{LinkStorage, StorageForm};

/// Links stored as link messages in the group's object header.
pub struct CompactStorage {
    store: Arc<dyn Store>,
    addr: Address,
}

impl CompactStorage {
    pub fn new(store: Arc<dyn Store>, addr: Address) -> Self {
        Self { store, addr }
    }
}

impl LinkStorage for CompactStorage {
    fn form(&self) -> StorageForm {
        StorageForm::Compact
    }

    fn insert(&self, link: &Link) -> NsResult<()> {
        self.store
            .message_create(self.addr, &HeaderMessage::Link(link.clone()))?;
        Ok(())
    }

    fn lookup(&self, name: &str) -> NsResult<Option<Link>> {
        let mut found = None;
        self.store
            .message_iterate(self.addr, MessageKind::Link, &mut |msg| {
                if let HeaderMessage::Link(link) = msg {
                    if link.name == name {
                        found = Some(link.clone());
                        return Ok(false);
                    }
                }
                Ok(true)
            })?;
        Ok(found)
    }

    fn remove(&self, name: &str) -> NsResult<Option<Link>> {
        let Some(link) = self.lookup(name)? else {
            return Ok(None);
        };
        self.store.message_remove(self.addr, MessageKind::Link, &mut |msg| {
            matches!(msg, HeaderMessage::Link(l) if l.name == name)
        })?;
        Ok(Some(link))
    }

    fn len(&self) -> NsResult<u64> {
        Ok(self.store.message_count(self.addr, MessageKind::Link)? as u64)
    }

    fn links(&self) -> NsResult<Vec<Link>> {
        let mut out = Vec::new();
        out.try_reserve(self.store.message_count(self.addr, MessageKind::Link)?)?;
        self.store
            .message_iterate(self.addr, MessageKind::Link, &mut |msg| {
                if let HeaderMessage::Link(link) = msg {
                    out.push(link.clone());
                }
                Ok(true)
            })?;
        Ok(out)
    }
}
