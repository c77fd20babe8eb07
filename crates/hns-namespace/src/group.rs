//! Group handles.
//!
//! A [`Group`] is an open, counted handle to a group object. Every handle to
//! the same address in one container shares a single descriptor; the
//! descriptor goes away when the last handle closes, except for the root,
//! whose descriptor lives until the container closes.

use std::fmt;

use hns_store::{HeaderMessage, HeaderStore, LinkInfoMessage, MessageKind};
use hns_types::{Address, IndexType, IterOrder, ObjectType};
use tracing::{debug, trace};

use crate::config::{GroupCreateProps, LinkCreateProps};
use crate::container::Container;
use crate::error::{NamespaceError, NsResult};
use crate::linkset;
use crate::location::Location;
use crate::object::{Handle, Object};
use crate::storage::StorageForm;
use crate::traverse::{self, TraverseCtx, TraverseFlags};

/// Summary of a group's link storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupInfo {
    /// Active storage form.
    pub storage: StorageForm,
    /// Number of links in the group.
    pub nlinks: u64,
    /// Next creation-order tag the group will hand out.
    pub max_corder: u64,
    pub track_creation_order: bool,
    pub index_creation_order: bool,
    /// Another container is mounted on this group.
    pub mounted: bool,
}

/// An open handle to a group.
pub struct Group {
    handle: Handle,
}

impl Group {
    /// Open the group at `loc`.
    ///
    /// Fails with `WrongType` if the object is not a group and with
    /// `LinkInfoMissing` if it carries no link storage.
    pub fn open(loc: Location) -> NsResult<Self> {
        let c = loc.container.clone();
        c.ensure_open()?;
        let size = c.store().header_size(loc.addr)?;
        c.cache().protect(loc.addr, loc.addr, size);
        let checked = linkset::link_info(&c, loc.addr);
        c.cache().unprotect(loc.addr, false)?;
        checked?;

        let handle = Handle::open(loc, ObjectType::Group)?;
        trace!(
            addr = %handle.location().addr(),
            count = handle.descriptor().ref_count(),
            "group opened"
        );
        Ok(Self { handle })
    }

    pub fn location(&self) -> &Location {
        self.handle.location()
    }

    pub fn addr(&self) -> Address {
        self.handle.location().addr()
    }

    pub fn container(&self) -> &Container {
        self.handle.location().container()
    }

    /// The path this group was opened by, if known.
    pub fn path(&self) -> Option<&str> {
        self.handle.location().path()
    }

    /// Open handles to this group, this one included.
    pub fn ref_count(&self) -> usize {
        self.handle.descriptor().ref_count()
    }

    /// Returns `true` if another container is mounted on this group.
    pub fn is_mount_point(&self) -> bool {
        self.handle.descriptor().is_mount_point()
    }

    /// A second handle to this group.
    pub fn reopen(&self) -> NsResult<Group> {
        Ok(Self {
            handle: self.handle.reopen()?,
        })
    }

    /// Close this handle.
    pub fn close(mut self) -> NsResult<()> {
        self.handle.release()
    }

    pub(crate) fn traverse_ctx(&self) -> TraverseCtx {
        TraverseCtx::new(self.container().config().max_link_hops)
    }

    // -----------------------------------------------------------------
    // Group info
    // -----------------------------------------------------------------

    /// Link count, storage form and creation-order settings.
    pub fn info(&self) -> NsResult<GroupInfo> {
        let c = self.container();
        let addr = self.addr();
        let info = linkset::link_info(c, addr)?;
        let storage = linkset::storage_for(c, addr, &info)?;
        Ok(GroupInfo {
            storage: storage.form(),
            nlinks: storage.len()?,
            max_corder: info.max_creation_order,
            track_creation_order: info.track_creation_order,
            index_creation_order: info.index_creation_order,
            mounted: c.mounted_child(addr).is_some(),
        })
    }

    /// Info for the group at `path`.
    pub fn info_by_name(&self, path: &str) -> NsResult<GroupInfo> {
        let group = self.open_group(path)?;
        let info = group.info();
        group.close()?;
        info
    }

    /// Info for the group reached by this group's `n`th link.
    pub fn info_by_index(&self, index: IndexType, order: IterOrder, n: u64) -> NsResult<GroupInfo> {
        let link = linkset::lookup_by_index(self.container(), self.addr(), index, order, n)?;
        self.info_by_name(&link.name)
    }

    pub fn storage_form(&self) -> NsResult<StorageForm> {
        linkset::form(self.container(), self.addr())
    }

    /// Move this group's links into dense storage now.
    ///
    /// Returns `false` if the group was already dense.
    pub fn convert_to_dense(&self) -> NsResult<bool> {
        linkset::convert_to_dense(self.container(), self.addr())
    }

    /// Move this group's links back into its header now.
    ///
    /// Returns `false` if the group was already compact.
    pub fn convert_to_compact(&self) -> NsResult<bool> {
        linkset::convert_to_compact(self.container(), self.addr())
    }

    // -----------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------

    /// Create a group at `path` with the container's default settings.
    pub fn create_group(&self, path: &str) -> NsResult<Group> {
        let props = GroupCreateProps::from_config(self.container().config());
        self.create_group_with(path, &props, &LinkCreateProps::default())
    }

    /// Create a group at `path`.
    pub fn create_group_with(
        &self,
        path: &str,
        props: &GroupCreateProps,
        lcpl: &LinkCreateProps,
    ) -> NsResult<Group> {
        let loc = self.create_linked(path, lcpl, |c| create_group_header(c, props))?;
        debug!(path, addr = %loc.addr(), "group created");
        Group::open(loc)
    }

    /// Create a group with no link to it. It lives as long as a handle to
    /// it is open, unless a link is made to it first.
    pub fn create_group_anonymous(&self, props: &GroupCreateProps) -> NsResult<Group> {
        let c = self.container();
        c.ensure_writable()?;
        let addr = create_group_header(c, props)?;
        Group::open(Location::new(c.clone(), addr, None))
    }

    /// Create a leaf object of type `obj_type` at `path`.
    pub fn create_object(&self, path: &str, obj_type: ObjectType) -> NsResult<Object> {
        if obj_type == ObjectType::Group {
            return Err(NamespaceError::InvalidArgument(
                "groups are created with create_group".into(),
            ));
        }
        let loc = self.create_linked(path, &LinkCreateProps::default(), |c| {
            Ok(c.store().create_header(obj_type)?)
        })?;
        Object::open(loc)
    }

    // -----------------------------------------------------------------
    // Opening by path
    // -----------------------------------------------------------------

    /// Open the group at `path`, relative to this group unless absolute.
    pub fn open_group(&self, path: &str) -> NsResult<Group> {
        Group::open(self.resolve(path)?)
    }

    /// Open the object of any type at `path`.
    pub fn open_object(&self, path: &str) -> NsResult<Object> {
        Object::open(self.resolve(path)?)
    }

    /// Resolve `path` to the location of the object it names.
    pub fn resolve(&self, path: &str) -> NsResult<Location> {
        let mut ctx = self.traverse_ctx();
        self.locate(path, &mut ctx)?
            .ok_or_else(|| NamespaceError::not_found(path))
    }

    /// Resolve `path` within an existing hop budget.
    ///
    /// This is the entry point for user-defined link classes that resolve
    /// further paths while being traversed. Returns `None` if the path
    /// names a dangling link.
    pub fn locate(&self, path: &str, ctx: &mut TraverseCtx) -> NsResult<Option<Location>> {
        traverse::traverse(self.location(), path, TraverseFlags::empty(), ctx, |r| Ok(r.obj))
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("location", self.location())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Allocate a new, unlinked group header carrying `props`.
pub(crate) fn create_group_header(c: &Container, props: &GroupCreateProps) -> NsResult<Address> {
    let store = c.store();
    let addr = store.create_header(ObjectType::Group)?;
    store.message_create(
        addr,
        &HeaderMessage::LinkInfo(LinkInfoMessage::compact(
            props.track_creation_order,
            props.index_creation_order,
        )),
    )?;
    store.message_create(addr, &HeaderMessage::GroupInfo(props.group_info.clone()))?;
    if !props.pipeline.filters.is_empty() {
        store.message_create(addr, &HeaderMessage::Pipeline(props.pipeline.clone()))?;
    }
    c.cache().mark_dirty(addr, addr);
    if props.group_info.max_compact == 0 {
        linkset::convert_to_dense(c, addr)?;
    }
    Ok(addr)
}

/// Props for a group created on the way to another object: the parent's
/// thresholds, creation-order settings and pipeline, or the container
/// defaults for whatever the parent does not carry.
pub(crate) fn inherited_props(c: &Container, parent: Address) -> NsResult<GroupCreateProps> {
    let mut props = GroupCreateProps::from_config(c.config());
    let store = c.store();
    if store.message_exists(parent, MessageKind::GroupInfo)? {
        props.group_info = linkset::group_info(c, parent)?;
    }
    if store.message_exists(parent, MessageKind::LinkInfo)? {
        let info = linkset::link_info(c, parent)?;
        props.track_creation_order = info.track_creation_order;
        props.index_creation_order = info.index_creation_order;
    }
    if store.message_exists(parent, MessageKind::Pipeline)? {
        if let HeaderMessage::Pipeline(pipeline) = store.message_read(parent, MessageKind::Pipeline)? {
            props.pipeline = pipeline;
        }
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamespaceConfig;
    use hns_store::Filter;

    fn setup() -> (Container, Group) {
        let c = Container::in_memory("groups").unwrap();
        let root = c.root().unwrap();
        (c, root)
    }

    // ---- Test 1: Root is a compact, empty group ----
    #[test]
    fn root_starts_empty() {
        let (_c, root) = setup();
        let info = root.info().unwrap();
        assert_eq!(info.storage, StorageForm::Compact);
        assert_eq!(info.nlinks, 0);
        assert!(!info.mounted);
        assert_eq!(root.path(), Some("/"));
    }

    // ---- Test 2: Open then close restores the registry ----
    #[test]
    fn open_close_restores_counts() {
        let (c, root) = setup();
        let a = root.create_group("a").unwrap();
        let addr = a.addr();
        a.close().unwrap();
        let before = c.ref_count(addr);

        let again = root.open_group("/a").unwrap();
        let twice = root.open_group("a").unwrap();
        assert_eq!(twice.ref_count(), before + 2);
        again.close().unwrap();
        twice.close().unwrap();
        assert_eq!(c.ref_count(addr), before);
    }

    // ---- Test 3: Root descriptor survives its handles ----
    #[test]
    fn root_descriptor_is_pinned() {
        let (c, root) = setup();
        let addr = root.addr();
        root.close().unwrap();
        let desc = c.descriptor(addr).unwrap();
        assert!(desc.is_pinned());
        assert_eq!(desc.ref_count(), 0);
        let root = c.root().unwrap();
        assert_eq!(root.ref_count(), 1);
    }

    // ---- Test 4: Opening a non-group fails with WrongType ----
    #[test]
    fn open_non_group_is_wrong_type() {
        let (_c, root) = setup();
        root.create_object("d", ObjectType::Dataset).unwrap();
        let err = root.open_group("d").unwrap_err();
        assert!(matches!(err, NamespaceError::WrongType { .. }));
    }

    // ---- Test 5: A group header without link info is rejected ----
    #[test]
    fn missing_link_info_is_distinct() {
        let (c, root) = setup();
        let addr = c.store().create_header(ObjectType::Group).unwrap();
        root.link_object("bare", &Location::new(c.clone(), addr, None))
            .unwrap();
        let err = root.open_group("bare").unwrap_err();
        assert!(matches!(err, NamespaceError::LinkInfoMissing(a) if a == addr));
    }

    // ---- Test 6: Info is idempotent ----
    #[test]
    fn info_is_idempotent() {
        let (_c, root) = setup();
        root.create_group("a").unwrap();
        root.create_object("b", ObjectType::Dataset).unwrap();
        assert_eq!(root.info().unwrap(), root.info().unwrap());
        assert_eq!(root.info_by_name("a").unwrap(), root.info_by_name("/a").unwrap());
    }

    // ---- Test 7: Info by index follows the requested order ----
    #[test]
    fn info_by_index() {
        let (_c, root) = setup();
        let props = GroupCreateProps::default().with_phase_change(0, 0);
        root.create_group_with("z", &props, &LinkCreateProps::default())
            .unwrap();
        root.create_group("a").unwrap();
        let first = root
            .info_by_index(IndexType::Name, IterOrder::Increasing, 0)
            .unwrap();
        let last = root
            .info_by_index(IndexType::Name, IterOrder::Decreasing, 0)
            .unwrap();
        assert_eq!(first.storage, StorageForm::Compact);
        assert_eq!(last.storage, StorageForm::Dense);
        assert!(matches!(
            root.info_by_index(IndexType::Name, IterOrder::Increasing, 2),
            Err(NamespaceError::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }

    // ---- Test 8: Anonymous groups die with their last handle ----
    #[test]
    fn anonymous_group_lifecycle() {
        let (c, root) = setup();
        let anon = root
            .create_group_anonymous(&GroupCreateProps::default())
            .unwrap();
        let addr = anon.addr();
        assert_eq!(c.store().link_count(addr).unwrap(), 0);
        anon.close().unwrap();
        assert!(!c.store().header_exists(addr).unwrap());

        let kept = root
            .create_group_anonymous(&GroupCreateProps::default())
            .unwrap();
        root.link_object("kept", kept.location()).unwrap();
        let addr = kept.addr();
        kept.close().unwrap();
        assert!(c.store().header_exists(addr).unwrap());
        assert_eq!(root.open_group("kept").unwrap().addr(), addr);
    }

    // ---- Test 9: Intermediate groups inherit the parent's settings ----
    #[test]
    fn intermediate_groups_inherit() {
        let (_c, root) = setup();
        let mut props = GroupCreateProps::default()
            .with_phase_change(3, 2)
            .with_creation_order(true);
        props.pipeline.filters.push(Filter {
            id: 1,
            name: "deflate".into(),
            params: vec![6],
        });
        let parent = root
            .create_group_with("p", &props, &LinkCreateProps::default())
            .unwrap();
        let leaf = parent
            .create_group_with("x/y/leaf", &props, &LinkCreateProps::intermediate())
            .unwrap();
        leaf.close().unwrap();

        let x = parent.open_group("x").unwrap();
        let info = x.info().unwrap();
        assert!(info.track_creation_order);
        assert!(info.index_creation_order);
        let c = x.container();
        assert_eq!(linkset::group_info(c, x.addr()).unwrap().max_compact, 3);
        assert!(c
            .store()
            .message_exists(x.addr(), MessageKind::Pipeline)
            .unwrap());
    }

    // ---- Test 10: Group creation fails cleanly on a duplicate name ----
    #[test]
    fn duplicate_create_leaves_no_orphan() {
        let (c, root) = setup();
        root.create_group("a").unwrap();
        let store = c.store();
        let before = store.message_count(root.addr(), MessageKind::Link).unwrap();
        let err = root.create_group("a").unwrap_err();
        assert!(matches!(err, NamespaceError::AlreadyExists { .. }));
        assert_eq!(
            store.message_count(root.addr(), MessageKind::Link).unwrap(),
            before
        );
    }

    // ---- Test 11: Read-only containers refuse creation ----
    #[test]
    fn read_only_refuses_create() {
        let (c, root) = setup();
        root.create_group("a").unwrap();
        root.close().unwrap();
        c.close().unwrap();

        let ro = Container::builder("ro")
            .store(c.store_arc())
            .access(crate::config::Access::ReadOnly)
            .open()
            .unwrap();
        let root = ro.root().unwrap();
        assert!(root.open_group("a").is_ok());
        assert!(matches!(
            root.create_group("b").unwrap_err(),
            NamespaceError::ReadOnly
        ));
    }

    // ---- Test 12: Groups created dense when max_compact is zero ----
    #[test]
    fn zero_max_compact_creates_dense() {
        let config = NamespaceConfig {
            max_compact: 0,
            min_dense: 0,
            ..NamespaceConfig::default()
        };
        let c = Container::builder("dense").config(config).create().unwrap();
        let root = c.root().unwrap();
        assert_eq!(root.storage_form().unwrap(), StorageForm::Dense);
        let g = root.create_group("g").unwrap();
        assert_eq!(g.storage_form().unwrap(), StorageForm::Dense);
    }

    // ---- Test 13: Link messages inside a dense group are corruption ----
    #[test]
    fn link_messages_in_dense_group_are_corrupt() {
        let (c, root) = setup();
        let g = root.create_group("g").unwrap();
        g.link_soft("real", "/x").unwrap();
        g.convert_to_dense().unwrap();
        c.store()
            .message_create(g.addr(), &HeaderMessage::Link(hns_types::Link::soft("stray", "/x")))
            .unwrap();

        let err = g.lookup("real").unwrap_err();
        assert!(matches!(err, NamespaceError::StorageCorrupt { addr, .. } if addr == g.addr()));
        assert!(matches!(g.info(), Err(NamespaceError::StorageCorrupt { .. })));
        assert!(!err.is_not_found());
    }

    // ---- Test 14: Closing the last handle evicts tagged cache entries ----
    #[test]
    fn evict_on_close_drops_cache_entries() {
        let config = NamespaceConfig {
            evict_on_close: true,
            ..NamespaceConfig::default()
        };
        let c = Container::builder("evict").config(config).create().unwrap();
        let root = c.root().unwrap();
        let g = root.create_group("g").unwrap();
        let addr = g.addr();
        let again = root.open_group("g").unwrap();
        g.close().unwrap();
        assert!(c.cache().contains(addr));

        again.close().unwrap();
        assert!(!c.cache().contains(addr));
        assert!(c.cache().stats().evictions >= 1);

        // Without the setting the entry stays resident.
        let plain = Container::in_memory("keep").unwrap();
        let g = plain.root().unwrap().create_group("g").unwrap();
        let addr = g.addr();
        g.close().unwrap();
        assert!(plain.cache().contains(addr));
    }
}
