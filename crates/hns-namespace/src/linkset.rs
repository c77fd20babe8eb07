//! Operations on the link set of one group, dispatched to whichever storage
//! form is active.
//!
//! This layer owns everything the two forms share: reading and validating
//! link info, duplicate-name checks, creation-order assignment, and the
//! automatic compact/dense conversions driven by the group-info thresholds.

use hns_store::{
    GroupInfoMessage, HeaderMessage, HeaderStore, HeapStore, IndexStore, LinkInfoMessage,
    MessageKind,
};
use hns_types::{Address, IndexType, IterOrder, Link, ObjectType};
use tracing::{debug, trace};

use crate::compact::CompactStorage;
use crate::container::Container;
use crate::dense::{self, DenseStorage};
use crate::error::{NamespaceError, NsResult};
use crate::storage::{LinkStorage, StorageForm};
use crate::table::LinkTable;

/// Read and validate a group's link info.
///
/// Fails with `WrongType` if the object is not a group and with
/// `LinkInfoMissing` if a group carries no link info.
pub(crate) fn link_info(c: &Container, addr: Address) -> NsResult<LinkInfoMessage> {
    let store = c.store();
    let obj_type = store.object_type(addr)?;
    if obj_type != ObjectType::Group {
        return Err(NamespaceError::wrong_type(
            addr.to_string(),
            format!("expected a group, found a {obj_type}"),
        ));
    }
    if !store.message_exists(addr, MessageKind::LinkInfo)? {
        return Err(NamespaceError::LinkInfoMissing(addr));
    }
    match store.message_read(addr, MessageKind::LinkInfo)? {
        HeaderMessage::LinkInfo(info) => Ok(info),
        other => Err(NamespaceError::corrupt(
            addr,
            format!("link-info slot holds a {} message", other.kind()),
        )),
    }
}

/// The group's thresholds, or the defaults if it carries none.
pub(crate) fn group_info(c: &Container, addr: Address) -> NsResult<GroupInfoMessage> {
    let store = c.store();
    if !store.message_exists(addr, MessageKind::GroupInfo)? {
        return Ok(GroupInfoMessage::default());
    }
    match store.message_read(addr, MessageKind::GroupInfo)? {
        HeaderMessage::GroupInfo(info) => Ok(info),
        other => Err(NamespaceError::corrupt(
            addr,
            format!("group-info slot holds a {} message", other.kind()),
        )),
    }
}

/// The active storage for a group, after checking that exactly one form is
/// present.
pub(crate) fn storage_for(
    c: &Container,
    addr: Address,
    info: &LinkInfoMessage,
) -> NsResult<Box<dyn LinkStorage>> {
    if info.is_dense() {
        if info.name_index.is_undefined() {
            return Err(NamespaceError::corrupt(addr, "dense group without a name index"));
        }
        if c.store().message_exists(addr, MessageKind::Link)? {
            return Err(NamespaceError::corrupt(
                addr,
                "link messages present in a dense group",
            ));
        }
        Ok(Box::new(DenseStorage::new(c.store_arc(), addr, info.clone())))
    } else {
        Ok(Box::new(CompactStorage::new(c.store_arc(), addr)))
    }
}

fn open_storage(c: &Container, addr: Address) -> NsResult<(LinkInfoMessage, Box<dyn LinkStorage>)> {
    let info = link_info(c, addr)?;
    let storage = storage_for(c, addr, &info)?;
    Ok((info, storage))
}

fn check_order(addr: Address, info: &LinkInfoMessage, index: IndexType) -> NsResult<()> {
    if index == IndexType::CreationOrder && !info.track_creation_order {
        return Err(NamespaceError::CreationOrderNotTracked(addr));
    }
    Ok(())
}

fn encoded_size(link: &Link) -> NsResult<usize> {
    Ok(HeaderMessage::Link(link.clone()).encoded_size()?)
}

/// The active storage form of a group.
pub(crate) fn form(c: &Container, addr: Address) -> NsResult<StorageForm> {
    let (_, storage) = open_storage(c, addr)?;
    Ok(storage.form())
}

/// Find a link by name.
pub(crate) fn lookup(c: &Container, addr: Address, name: &str) -> NsResult<Option<Link>> {
    let (_, storage) = open_storage(c, addr)?;
    storage.lookup(name)
}

/// Number of links in the group.
pub(crate) fn count(c: &Container, addr: Address) -> NsResult<u64> {
    let (_, storage) = open_storage(c, addr)?;
    storage.len()
}

/// An ordered snapshot of the group's links.
pub(crate) fn build_table(
    c: &Container,
    addr: Address,
    index: IndexType,
    order: IterOrder,
) -> NsResult<LinkTable> {
    let (info, storage) = open_storage(c, addr)?;
    check_order(addr, &info, index)?;
    storage.build_table(index, order)
}

/// The `n`th link in the given order.
pub(crate) fn lookup_by_index(
    c: &Container,
    addr: Address,
    index: IndexType,
    order: IterOrder,
    n: u64,
) -> NsResult<Link> {
    let (info, storage) = open_storage(c, addr)?;
    check_order(addr, &info, index)?;
    storage.lookup_by_index(index, order, n)
}

/// Insert a link, assigning its creation order and converting the group to
/// dense form first if the new link would cross a threshold. Returns the
/// link as stored.
pub(crate) fn insert(c: &Container, addr: Address, mut link: Link) -> NsResult<Link> {
    let (mut info, storage) = open_storage(c, addr)?;
    if storage.lookup(&link.name)?.is_some() {
        return Err(NamespaceError::AlreadyExists { name: link.name });
    }

    if info.track_creation_order {
        link.creation_order = Some(info.max_creation_order);
        info.max_creation_order += 1;
    } else {
        link.creation_order = None;
    }

    let storage = if storage.form() == StorageForm::Compact {
        let thresholds = group_info(c, addr)?;
        let count = storage.len()?;
        let size = encoded_size(&link)?;
        if count + 1 > u64::from(thresholds.max_compact) || size > c.config().max_compact_link_bytes
        {
            trace!(addr = %addr, count, size, "compact threshold crossed");
            convert_to_dense(c, addr)?;
            let dense_info = link_info(c, addr)?;
            info.heap = dense_info.heap;
            info.name_index = dense_info.name_index;
            info.corder_index = dense_info.corder_index;
            storage_for(c, addr, &info)?
        } else {
            storage
        }
    } else {
        storage
    };

    storage.insert(&link)?;
    if info.track_creation_order {
        c.store()
            .message_write(addr, &HeaderMessage::LinkInfo(info))?;
    }
    c.cache().mark_dirty(addr, addr);
    trace!(addr = %addr, name = %link.name, kind = %link.kind(), "link inserted");
    Ok(link)
}

/// Remove a link by name, converting a dense group back to compact form if
/// it shrinks below its threshold. Returns the removed link.
pub(crate) fn remove(c: &Container, addr: Address, name: &str) -> NsResult<Link> {
    let (info, storage) = open_storage(c, addr)?;
    let link = storage
        .remove(name)?
        .ok_or_else(|| NamespaceError::not_found(name))?;
    c.cache().mark_dirty(addr, addr);

    if info.is_dense() {
        let thresholds = group_info(c, addr)?;
        let remaining = storage.len()?;
        if thresholds.max_compact > 0
            && remaining < u64::from(thresholds.min_dense)
            && remaining <= u64::from(thresholds.max_compact)
        {
            trace!(addr = %addr, remaining, "dense threshold crossed");
            match convert_to_compact(c, addr) {
                Ok(_) => {}
                // A link too large for the header keeps the group dense.
                Err(NamespaceError::InvalidArgument(reason)) => {
                    trace!(addr = %addr, %reason, "staying dense");
                }
                Err(e) => return Err(e),
            }
        }
    }
    trace!(addr = %addr, name, "link removed");
    Ok(link)
}

/// Move a compact group's links into new dense storage.
///
/// Returns `false` if the group was already dense.
pub(crate) fn convert_to_dense(c: &Container, addr: Address) -> NsResult<bool> {
    c.ensure_writable()?;
    let info = link_info(c, addr)?;
    if info.is_dense() {
        return Ok(false);
    }
    c.cache().cork(addr);
    let result = move_to_dense(c, addr, info);
    c.cache().uncork(addr);
    let moved = result?;
    debug!(addr = %addr, links = moved, "group converted to dense storage");
    Ok(true)
}

fn move_to_dense(c: &Container, addr: Address, mut info: LinkInfoMessage) -> NsResult<usize> {
    let store = c.store();
    let links = CompactStorage::new(c.store_arc(), addr).links()?;

    info.heap = store.heap_create()?;
    info.name_index = store.index_create()?;
    if info.index_creation_order {
        info.corder_index = store.index_create()?;
    }
    let dense = DenseStorage::new(c.store_arc(), addr, info.clone());
    for link in &links {
        dense.insert(link)?;
    }
    store.message_remove(addr, MessageKind::Link, &mut |_| true)?;
    store.message_write(addr, &HeaderMessage::LinkInfo(info))?;
    c.cache().mark_dirty(addr, addr);
    Ok(links.len())
}

/// Move a dense group's links back into its header.
///
/// Returns `false` if the group was already compact. Fails with
/// `InvalidArgument` if a link is too large for compact storage.
pub(crate) fn convert_to_compact(c: &Container, addr: Address) -> NsResult<bool> {
    c.ensure_writable()?;
    let mut info = link_info(c, addr)?;
    if !info.is_dense() {
        return Ok(false);
    }
    let store = c.store();
    let dense = DenseStorage::new(c.store_arc(), addr, info.clone());
    let mut links = dense.links()?;
    for link in &links {
        if encoded_size(link)? > c.config().max_compact_link_bytes {
            return Err(NamespaceError::InvalidArgument(format!(
                "link {:?} is too large for compact storage",
                link.name
            )));
        }
    }
    // Header order is creation order.
    links.sort_by(|a, b| {
        a.creation_order
            .cmp(&b.creation_order)
            .then_with(|| a.name.cmp(&b.name))
    });

    c.cache().cork(addr);
    let result = (|| -> NsResult<()> {
        for link in &links {
            store.message_create(addr, &HeaderMessage::Link(link.clone()))?;
        }
        dense::delete_dense(store, &info)?;
        info.heap = Address::UNDEFINED;
        info.name_index = Address::UNDEFINED;
        info.corder_index = Address::UNDEFINED;
        store.message_write(addr, &HeaderMessage::LinkInfo(info.clone()))?;
        Ok(())
    })();
    c.cache().uncork(addr);
    result?;
    c.cache().mark_dirty(addr, addr);
    debug!(addr = %addr, links = links.len(), "group converted to compact storage");
    Ok(true)
}

/// Delete the dense storage behind a group, if any.
pub(crate) fn delete_storage(c: &Container, addr: Address) -> NsResult<()> {
    let info = link_info(c, addr)?;
    if info.is_dense() {
        dense::delete_dense(c.store(), &info)?;
    }
    Ok(())
}
