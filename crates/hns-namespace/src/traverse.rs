//! The path resolver.
//!
//! [`traverse`] walks a slash-separated path one component at a time from a
//! starting location, resolving soft, external, user-defined and mount
//! crossings along the way, and hands the final component to an operator.
//! The operator receives the resolved parent and target by value, so
//! whatever it does not keep is dropped exactly once.

use bitflags::bitflags;
use hns_types::{Link, LinkTarget};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{NamespaceError, NsResult};
use crate::group::{self, Group};
use crate::links;
use crate::linkset;
use crate::location::Location;
use crate::mount;
use crate::special;

bitflags! {
    /// Options that change how the last component of a path is resolved.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TraverseFlags: u32 {
        /// Do not follow a soft link in the last component.
        const STOP_AT_LAST_SOFT_LINK = 1 << 0;
        /// Do not follow an external or user-defined link in the last
        /// component.
        const STOP_AT_LAST_UD_LINK = 1 << 1;
        /// Do not cross into a container mounted on the last component.
        const STOP_AT_LAST_MOUNT_POINT = 1 << 2;
        /// Create missing intermediate groups.
        const CREATE_INTERMEDIATE_GROUPS = 1 << 3;
        /// Report dangling links as missing instead of failing.
        const EXISTENCE_ONLY = 1 << 4;
        /// Stop at every kind of special link in the last component.
        const STOP_AT_LAST = Self::STOP_AT_LAST_SOFT_LINK.bits()
            | Self::STOP_AT_LAST_UD_LINK.bits()
            | Self::STOP_AT_LAST_MOUNT_POINT.bits();
    }
}

/// Per-resolution state threaded through nested traversals.
///
/// The hop budget is shared by soft, external and user-defined
/// dereferences within one top-level resolution and is checked before
/// each one. Only the engine starts a budget; link classes get a borrowed
/// context and cannot copy or reset it.
#[derive(Debug)]
pub struct TraverseCtx {
    limit: u32,
    remaining: u32,
}

impl TraverseCtx {
    pub(crate) fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Dereferences still allowed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Spend one hop, or fail with `TooManyLinkHops` if none are left.
    pub fn take_hop(&mut self) -> NsResult<()> {
        if self.remaining == 0 {
            return Err(NamespaceError::TooManyLinkHops { limit: self.limit });
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// What the resolver hands to the operator for the last component.
#[derive(Debug)]
pub struct Resolved {
    /// The group holding the last component.
    pub parent: Location,
    /// The last component, or `"."` when the path named the start itself.
    pub name: String,
    /// The link, if one exists under `name`.
    pub link: Option<Link>,
    /// The object the link leads to, if it was followed and exists.
    pub obj: Option<Location>,
}

impl Group {
    /// Resolve `path` from this group with a fresh hop budget and call `op`
    /// with the result.
    ///
    /// See [`traverse`] for how the path is walked.
    pub fn traverse<R>(
        &self,
        path: &str,
        flags: TraverseFlags,
        op: impl FnOnce(Resolved) -> NsResult<R>,
    ) -> NsResult<R> {
        let mut ctx = self.traverse_ctx();
        traverse(self.location(), path, flags, &mut ctx, op)
    }
}

/// Resolve `path` from `start` and call `op` with the result.
///
/// Absolute paths start at the root of the top-level container. Empty
/// components and `.` are skipped. Missing intermediate components fail
/// with `NotFound` unless [`TraverseFlags::CREATE_INTERMEDIATE_GROUPS`] is
/// set.
pub(crate) fn traverse<R>(
    start: &Location,
    path: &str,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
    op: impl FnOnce(Resolved) -> NsResult<R>,
) -> NsResult<R> {
    start.container.ensure_open()?;
    let components: SmallVec<[&str; 8]> = path
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();

    let mut current = if path.starts_with('/') {
        start.container.top_root_location()?
    } else {
        start.duplicate()
    };

    let Some((last, intermediate)) = components.split_last() else {
        let obj = current.duplicate();
        return op(Resolved {
            parent: current,
            name: ".".to_string(),
            link: None,
            obj: Some(obj),
        });
    };

    for component in intermediate {
        current = step(current, component, flags, ctx)?;
    }

    let link = linkset::lookup(&current.container, current.addr, last)?;
    let obj = match &link {
        Some(link) => resolve_link(&current, last, link, flags, ctx, true)?,
        None => None,
    };
    op(Resolved {
        parent: current,
        name: (*last).to_string(),
        link,
        obj,
    })
}

/// Advance from `current` through the intermediate component `name`.
fn step(
    current: Location,
    name: &str,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
) -> NsResult<Location> {
    match linkset::lookup(&current.container, current.addr, name)? {
        Some(link) => resolve_link(&current, name, &link, flags, ctx, false)?
            .ok_or_else(|| NamespaceError::not_found(name)),
        None if flags.contains(TraverseFlags::CREATE_INTERMEDIATE_GROUPS) => {
            create_intermediate(&current, name)
        }
        None => Err(NamespaceError::not_found(name)),
    }
}

/// Turn `link`, found under `name` in `group`, into the location it leads
/// to. Returns `None` for a link the flags say to stop at, or for a
/// dangling link under [`TraverseFlags::EXISTENCE_ONLY`].
pub(crate) fn resolve_link(
    group: &Location,
    name: &str,
    link: &Link,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
    last: bool,
) -> NsResult<Option<Location>> {
    match &link.target {
        LinkTarget::Hard { addr } => {
            let loc = group.child(*addr, name);
            if last && flags.contains(TraverseFlags::STOP_AT_LAST_MOUNT_POINT) {
                Ok(Some(loc))
            } else {
                mount::cross_into(loc).map(Some)
            }
        }
        LinkTarget::Soft { path } => {
            if last && flags.contains(TraverseFlags::STOP_AT_LAST_SOFT_LINK) {
                return Ok(None);
            }
            special::follow_soft(group, path, flags, ctx)
        }
        LinkTarget::External { file, path } => {
            if last && flags.contains(TraverseFlags::STOP_AT_LAST_UD_LINK) {
                return Ok(None);
            }
            special::follow_external(group, file, path, flags, ctx)
        }
        LinkTarget::UserDefined { class, data } => {
            if last && flags.contains(TraverseFlags::STOP_AT_LAST_UD_LINK) {
                return Ok(None);
            }
            special::follow_user_defined(group, name, *class, data, flags, ctx)
        }
    }
}

/// Create and link a group named `name` in `parent`, inheriting the
/// parent's settings.
fn create_intermediate(parent: &Location, name: &str) -> NsResult<Location> {
    let c = &parent.container;
    c.ensure_writable()?;
    let props = group::inherited_props(c, parent.addr)?;
    let addr = group::create_group_header(c, &props)?;
    links::attach_new(parent, Link::hard(name, addr), addr)?;
    debug!(parent = %parent.addr, name, addr = %addr, "intermediate group created");
    Ok(parent.child(addr, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkCreateProps, NamespaceConfig};
    use crate::container::Container;
    use hns_types::ObjectType;

    fn setup() -> (Container, Group) {
        let c = Container::in_memory("traverse").unwrap();
        let root = c.root().unwrap();
        (c, root)
    }

    fn resolve_name(root: &Group, path: &str, flags: TraverseFlags) -> NsResult<String> {
        let mut ctx = root.traverse_ctx();
        traverse(root.location(), path, flags, &mut ctx, |r| Ok(r.name))
    }

    // ---- Test 1: Hop budget counts down and stops at zero ----
    #[test]
    fn hop_budget() {
        let mut ctx = TraverseCtx::new(2);
        ctx.take_hop().unwrap();
        ctx.take_hop().unwrap();
        assert_eq!(ctx.remaining(), 0);
        assert!(matches!(
            ctx.take_hop(),
            Err(NamespaceError::TooManyLinkHops { limit: 2 })
        ));
    }

    // ---- Test 2: Empty components and dots are skipped ----
    #[test]
    fn skips_empty_and_dot_components() {
        let (_c, root) = setup();
        root.create_group("a").unwrap();
        root.create_group("a/b").unwrap();
        assert_eq!(
            resolve_name(&root, "//a/./b/", TraverseFlags::empty()).unwrap(),
            "b"
        );
        assert_eq!(resolve_name(&root, "", TraverseFlags::empty()).unwrap(), ".");
        assert_eq!(resolve_name(&root, "/./", TraverseFlags::empty()).unwrap(), ".");
    }

    // ---- Test 3: The operator sees the missing last component ----
    #[test]
    fn missing_last_component_reaches_operator() {
        let (_c, root) = setup();
        let mut ctx = root.traverse_ctx();
        let (has_link, has_obj) = traverse(
            root.location(),
            "nope",
            TraverseFlags::empty(),
            &mut ctx,
            |r| Ok((r.link.is_some(), r.obj.is_some())),
        )
        .unwrap();
        assert!(!has_link && !has_obj);
    }

    // ---- Test 4: Missing intermediate is NotFound ----
    #[test]
    fn missing_intermediate_not_found() {
        let (_c, root) = setup();
        let err = resolve_name(&root, "x/y", TraverseFlags::empty()).unwrap_err();
        assert!(err.is_not_found());
    }

    // ---- Test 5: Intermediate groups are created on request ----
    #[test]
    fn creates_intermediate_groups() {
        let (_c, root) = setup();
        root.create_group_with(
            "x/y/z",
            &crate::config::GroupCreateProps::default(),
            &LinkCreateProps::intermediate(),
        )
        .unwrap();
        assert!(root.open_group("x/y").is_ok());
        assert!(root.open_group("/x/y/z").is_ok());
    }

    // ---- Test 6: Walking through a non-group is WrongType ----
    #[test]
    fn through_non_group_is_wrong_type() {
        let (_c, root) = setup();
        root.create_object("d", ObjectType::Dataset).unwrap();
        let err = resolve_name(&root, "d/x", TraverseFlags::empty()).unwrap_err();
        assert!(matches!(err, NamespaceError::WrongType { .. }));
    }

    // ---- Test 7: Stop flags keep the last soft link unresolved ----
    #[test]
    fn stop_at_last_soft_link() {
        let (_c, root) = setup();
        root.create_object("d", ObjectType::Dataset).unwrap();
        root.link_soft("s", "/d").unwrap();
        let mut ctx = root.traverse_ctx();
        let followed = traverse(
            root.location(),
            "s",
            TraverseFlags::empty(),
            &mut ctx,
            |r| Ok(r.obj.map(|l| l.addr())),
        )
        .unwrap();
        assert!(followed.is_some());
        let stopped = traverse(
            root.location(),
            "s",
            TraverseFlags::STOP_AT_LAST_SOFT_LINK,
            &mut ctx,
            |r| Ok(r.obj.map(|l| l.addr())),
        )
        .unwrap();
        assert!(stopped.is_none());
    }

    // ---- Test 8: Hop-budget boundary on soft link chains ----
    #[test]
    fn soft_chain_boundary() {
        let config = NamespaceConfig {
            max_link_hops: 4,
            ..NamespaceConfig::default()
        };
        let c = Container::builder("chain").config(config).create().unwrap();
        let root = c.root().unwrap();
        root.create_object("target", ObjectType::Dataset).unwrap();
        // s1 -> s2 -> ... -> s5 -> target
        for i in 1..=5 {
            let next = if i == 5 {
                "target".to_string()
            } else {
                format!("s{}", i + 1)
            };
            root.link_soft(&format!("s{i}"), &next).unwrap();
        }
        // Four hops: s2..s5.
        assert!(root.open_object("s2").is_ok());
        // Five hops: s1..s5.
        let err = root.open_object("s1").unwrap_err();
        assert!(matches!(err, NamespaceError::TooManyLinkHops { limit: 4 }));
    }

    // ---- Test 9: Each top-level traversal starts a full budget ----
    #[test]
    fn group_traverse_gets_fresh_budget() {
        let (_c, root) = setup();
        root.create_group("a").unwrap();
        root.link_soft("s", "a").unwrap();
        for _ in 0..3 {
            let (name, found) = root
                .traverse("s", TraverseFlags::empty(), |r| Ok((r.name, r.obj.is_some())))
                .unwrap();
            assert_eq!(name, "s");
            assert!(found);
        }
        let link = root
            .traverse("s", TraverseFlags::STOP_AT_LAST_SOFT_LINK, |r| Ok(r.link))
            .unwrap();
        assert_eq!(link.unwrap().kind(), hns_types::LinkKind::Soft);
    }
}
