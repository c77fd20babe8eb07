//! One open container session.
//!
//! A [`Container`] ties a [`Store`] to the state that only exists while the
//! container is open: the open-object registry, the root descriptor, the
//! metadata cache, the mount table and the link-class registry. It is a
//! cheap, cloneable handle; all clones refer to the same session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use hns_store::{InMemoryStore, MetadataCache, Store};
use hns_types::{Address, ContainerId, ObjectType};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::{Access, NamespaceConfig};
use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::link_class::{ContainerCatalog, LinkClassRegistry};
use crate::location::Location;
use crate::mount::MountEntry;
use crate::object;
use crate::registry::{Descriptor, OpenRegistry, Release};
use crate::root;

/// Lifecycle state of a container session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Open,
    /// Close was requested but objects are still open, or the container is
    /// still mounted in a parent.
    ClosePending,
    Closed,
}

pub(crate) struct ContainerInner {
    id: ContainerId,
    name: String,
    store: Arc<dyn Store>,
    cache: MetadataCache,
    access: Access,
    config: NamespaceConfig,
    classes: Arc<LinkClassRegistry>,
    catalog: Option<Arc<dyn ContainerCatalog>>,
    pub(crate) registry: Mutex<OpenRegistry>,
    pub(crate) root: Mutex<Option<Arc<Descriptor>>>,
    pub(crate) mounts: Mutex<HashMap<Address, MountEntry>>,
    pub(crate) parent: Mutex<Option<Weak<ContainerInner>>>,
    state: Mutex<ContainerState>,
}

/// Handle to an open container session.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

/// Non-owning reference to a container session.
#[derive(Clone, Debug)]
pub struct WeakContainer(Weak<ContainerInner>);

impl WeakContainer {
    /// The container, if it is still alive.
    pub fn upgrade(&self) -> Option<Container> {
        self.0.upgrade().map(|inner| Container { inner })
    }
}

impl Container {
    /// Start building a container session named `name`.
    pub fn builder(name: impl Into<String>) -> ContainerBuilder {
        ContainerBuilder::new(name)
    }

    /// Create a fresh in-memory container with the default configuration.
    pub fn in_memory(name: impl Into<String>) -> NsResult<Self> {
        ContainerBuilder::new(name).create()
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    /// Identity of this session.
    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    /// Name used to find this container from external links.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn access(&self) -> Access {
        self.inner.access
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.inner.config
    }

    /// The storage collaborator.
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub(crate) fn store_arc(&self) -> Arc<dyn Store> {
        Arc::clone(&self.inner.store)
    }

    /// The metadata cache.
    pub fn cache(&self) -> &MetadataCache {
        &self.inner.cache
    }

    /// Registered user-defined link classes.
    pub fn link_classes(&self) -> &LinkClassRegistry {
        &self.inner.classes
    }

    /// Catalog used to resolve external links, if any.
    pub fn catalog(&self) -> Option<&Arc<dyn ContainerCatalog>> {
        self.inner.catalog.as_ref()
    }

    pub fn state(&self) -> ContainerState {
        *self.inner.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ContainerState::Closed
    }

    /// A non-owning reference to this session.
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer(Arc::downgrade(&self.inner))
    }

    /// Returns `true` if both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ensure_open(&self) -> NsResult<()> {
        if self.is_closed() {
            return Err(NamespaceError::Closed);
        }
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> NsResult<()> {
        self.ensure_open()?;
        if !self.inner.access.is_writable() {
            return Err(NamespaceError::ReadOnly);
        }
        Ok(())
    }

    /// Address of the root group.
    pub fn root_addr(&self) -> NsResult<Address> {
        self.ensure_open()?;
        self.inner
            .root
            .lock()
            .as_ref()
            .map(|d| d.addr())
            .ok_or(NamespaceError::Closed)
    }

    /// Location of this container's own root group.
    pub(crate) fn root_location(&self) -> NsResult<Location> {
        let addr = self.root_addr()?;
        Ok(Location::new(self.clone(), addr, Some("/".to_string())))
    }

    /// Location of the root of the top-level container this one is mounted
    /// under (or of its own root when it is not mounted).
    pub(crate) fn top_root_location(&self) -> NsResult<Location> {
        let mut top = self.clone();
        while let Some(parent) = top.parent() {
            top = parent;
        }
        top.root_location()
    }

    /// Open a handle to the root group.
    pub fn root(&self) -> NsResult<Group> {
        Group::open(self.root_location()?)
    }

    /// Number of open handles to the object at `addr`.
    pub fn ref_count(&self, addr: Address) -> usize {
        self.inner.registry.lock().ref_count(addr)
    }

    /// Returns `true` if any handle to `addr` is open.
    pub fn is_object_open(&self, addr: Address) -> bool {
        self.inner.registry.lock().is_open(addr)
    }

    /// Total open handles in this container, including those held by
    /// mounts.
    pub fn open_handles(&self) -> usize {
        self.inner.registry.lock().handles()
    }

    /// The shared descriptor for `addr`, if the object is open.
    pub fn descriptor(&self, addr: Address) -> Option<Arc<Descriptor>> {
        self.inner.registry.lock().get(addr).cloned()
    }

    pub(crate) fn acquire(&self, addr: Address, obj_type: ObjectType) -> NsResult<Arc<Descriptor>> {
        self.ensure_open()?;
        let desc = self.inner.registry.lock().acquire(addr, obj_type);
        trace!(addr = %addr, count = desc.ref_count(), "handle opened");
        Ok(desc)
    }

    /// Give back one handle to `desc`, tearing the descriptor down when it
    /// was the last.
    pub(crate) fn release(&self, desc: &Descriptor) -> NsResult<()> {
        let outcome = self.release_descriptor(desc.addr())?;
        if outcome == Release::Open(1) && desc.is_mount_point() {
            trace!(addr = %desc.addr(), "only the mount holds this group");
        }
        self.retry_pending_close()
    }

    fn release_descriptor(&self, addr: Address) -> NsResult<Release> {
        let outcome = self.inner.registry.lock().release(addr)?;
        match outcome {
            Release::Open(remaining) => trace!(addr = %addr, remaining, "handle closed"),
            Release::Pinned => trace!(addr = %addr, "last root handle closed"),
            Release::Last => self.teardown(addr)?,
        }
        Ok(outcome)
    }

    fn teardown(&self, addr: Address) -> NsResult<()> {
        if self.inner.config.evict_on_close {
            let flushed = self.inner.cache.flush_tagged(addr);
            let evicted = self.inner.cache.evict_tagged(addr)?;
            trace!(addr = %addr, flushed, evicted, "evicted on close");
        }
        let store = self.store();
        if store.header_exists(addr)? && store.link_count(addr)? == 0 {
            debug!(addr = %addr, "deleting unlinked object on last close");
            object::delete_object(self, addr)?;
        }
        debug!(addr = %addr, "descriptor torn down");
        Ok(())
    }

    fn retry_pending_close(&self) -> NsResult<()> {
        let mut top = self.clone();
        while let Some(parent) = top.parent() {
            top = parent;
        }
        if top.state() == ContainerState::ClosePending {
            top.try_close()?;
        }
        Ok(())
    }

    /// Request that the container close.
    ///
    /// The close completes immediately when nothing is open; otherwise it
    /// stays pending and completes when the last handle closes (see
    /// [`try_close`](Self::try_close)).
    pub fn close(&self) -> NsResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ContainerState::Closed => return Ok(()),
                ContainerState::Open => *state = ContainerState::ClosePending,
                ContainerState::ClosePending => {}
            }
        }
        if !self.try_close()? {
            debug!(container = %self.id(), "close pending");
        }
        Ok(())
    }

    /// Complete a pending close if nothing holds the container open.
    ///
    /// Returns `true` if the container is closed afterwards. A container
    /// stays open while it is mounted in a parent or while any object in it
    /// or in a container mounted beneath it is open.
    pub fn try_close(&self) -> NsResult<bool> {
        match self.state() {
            ContainerState::Closed => return Ok(true),
            ContainerState::Open => return Ok(false),
            ContainerState::ClosePending => {}
        }
        if self.parent().is_some() {
            debug!(container = %self.id(), "close deferred: still mounted");
            return Ok(false);
        }
        let busy = self.busy_handles();
        if busy > 0 {
            debug!(container = %self.id(), open = busy, "close deferred: objects still open");
            return Ok(false);
        }
        self.finish_close()?;
        Ok(true)
    }

    /// Open handles in this container and every container mounted beneath
    /// it, not counting the handles the mounts themselves hold.
    fn busy_handles(&self) -> usize {
        let own = self.inner.registry.lock().handles();
        let children: Vec<Container> = self
            .inner
            .mounts
            .lock()
            .values()
            .map(|m| m.child.clone())
            .collect();
        own.saturating_sub(children.len())
            + children.iter().map(|c| c.busy_handles()).sum::<usize>()
    }

    fn finish_close(&self) -> NsResult<()> {
        let entries: Vec<MountEntry> = self.inner.mounts.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.detach();
            self.release_descriptor(entry.desc.addr())?;
            entry.child.try_close()?;
        }
        let root = self.inner.root.lock().take();
        if let Some(root) = root {
            self.inner.registry.lock().remove(root.addr());
        }
        self.inner.registry.lock().clear();
        let flushed = self.inner.cache.flush_all();
        *self.inner.state.lock() = ContainerState::Closed;
        info!(container = %self.id(), name = %self.name(), flushed, "container closed");
        Ok(())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`Container`] sessions.
pub struct ContainerBuilder {
    name: String,
    store: Option<Arc<dyn Store>>,
    config: NamespaceConfig,
    access: Access,
    classes: Option<Arc<LinkClassRegistry>>,
    catalog: Option<Arc<dyn ContainerCatalog>>,
}

impl ContainerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
            config: NamespaceConfig::default(),
            access: Access::ReadWrite,
            classes: None,
            catalog: None,
        }
    }

    /// Use an existing store. Required for [`open`](Self::open).
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: NamespaceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Share a link-class registry with other containers.
    pub fn link_classes(mut self, classes: Arc<LinkClassRegistry>) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Catalog used to resolve external links.
    pub fn catalog(mut self, catalog: Arc<dyn ContainerCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Create a new container with a fresh root group.
    pub fn create(self) -> NsResult<Container> {
        if !self.access.is_writable() {
            return Err(NamespaceError::ReadOnly);
        }
        let store = self
            .store
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn Store>);
        let container = self.build(store)?;
        root::mkroot(&container, true)?;
        info!(container = %container.id(), name = %container.name(), "container created");
        Ok(container)
    }

    /// Open an existing container from its store.
    pub fn open(self) -> NsResult<Container> {
        let store = self.store.clone().ok_or_else(|| {
            NamespaceError::InvalidArgument("opening a container requires a store".into())
        })?;
        let container = self.build(store)?;
        root::mkroot(&container, false)?;
        info!(
            container = %container.id(),
            name = %container.name(),
            access = ?container.access(),
            "container opened"
        );
        Ok(container)
    }

    fn build(self, store: Arc<dyn Store>) -> NsResult<Container> {
        self.config.validate()?;
        let inner = ContainerInner {
            id: ContainerId::new(),
            name: self.name,
            store,
            cache: MetadataCache::with_capacity(self.config.metadata_cache_bytes),
            access: self.access,
            config: self.config,
            classes: self
                .classes
                .unwrap_or_else(|| Arc::new(LinkClassRegistry::new())),
            catalog: self.catalog,
            registry: Mutex::new(OpenRegistry::default()),
            root: Mutex::new(None),
            mounts: Mutex::new(HashMap::new()),
            parent: Mutex::new(None),
            state: Mutex::new(ContainerState::Open),
        };
        Ok(Container::from_inner(Arc::new(inner)))
    }
}
