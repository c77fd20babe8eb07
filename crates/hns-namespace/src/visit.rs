//! Link iteration and recursive visitation.
//!
//! [`Group::visit`] walks every link reachable from a group depth first.
//! Objects with more than one hard link are remembered by identity so a
//! cycle is reported once and never descended twice; objects with a single
//! link can only be reached one way and are not tracked.

use std::collections::HashSet;

use hns_store::HeaderStore;
use hns_types::{Address, ContainerId, IndexType, IterOrder, Link, ObjectType};
use tracing::trace;

use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::link::{IterStep, LinkInfo};
use crate::linkset;
use crate::mount;

type Visited = HashSet<(ContainerId, Address)>;

impl Group {
    /// Call `op` on this group's links in the given order, starting at
    /// position `*skip`.
    ///
    /// On return `*skip` is the position after the last link visited.
    /// Returns the value of the first [`IterStep::Stop`], or 0.
    pub fn iterate<F>(
        &self,
        index: IndexType,
        order: IterOrder,
        skip: &mut u64,
        mut op: F,
    ) -> NsResult<i32>
    where
        F: FnMut(&Group, &str, &LinkInfo) -> IterStep,
    {
        let table = linkset::build_table(self.container(), self.addr(), index, order)?;
        table.iterate(skip, |link| op(self, &link.name, &LinkInfo::from(link)))
    }

    /// Call `op` on every link reachable from this group, with the path of
    /// each link relative to this group.
    ///
    /// Groups that do not track creation order are walked in name order
    /// when creation order is requested. Returns the value of the first
    /// [`IterStep::Stop`], or 0 once everything was visited.
    pub fn visit<F>(&self, index: IndexType, order: IterOrder, mut op: F) -> NsResult<i32>
    where
        F: FnMut(&Group, &str, &LinkInfo) -> IterStep,
    {
        let mut visited = Visited::new();
        if self.container().store().link_count(self.addr())? > 1 {
            visited.insert(self.location().identity());
        }
        let mut path = String::new();
        let stopped = visit_group(self, index, order, &mut path, &mut visited, &mut op)?;
        Ok(stopped.unwrap_or(0))
    }

    /// [`visit`](Self::visit) starting at the group at `path`.
    pub fn visit_by_name<F>(&self, path: &str, index: IndexType, order: IterOrder, op: F) -> NsResult<i32>
    where
        F: FnMut(&Group, &str, &LinkInfo) -> IterStep,
    {
        let group = self.open_group(path)?;
        let result = group.visit(index, order, op);
        group.close()?;
        result
    }
}

fn effective_index(group: &Group, index: IndexType) -> NsResult<IndexType> {
    if index == IndexType::CreationOrder
        && !linkset::link_info(group.container(), group.addr())?.track_creation_order
    {
        return Ok(IndexType::Name);
    }
    Ok(index)
}

fn visit_group<F>(
    group: &Group,
    index: IndexType,
    order: IterOrder,
    path: &mut String,
    visited: &mut Visited,
    op: &mut F,
) -> NsResult<Option<i32>>
where
    F: FnMut(&Group, &str, &LinkInfo) -> IterStep,
{
    let effective = effective_index(group, index)?;
    let table = linkset::build_table(group.container(), group.addr(), effective, order)?;
    for link in &table {
        let base = path.len();
        path.try_reserve(link.name.len() + 1)?;
        if base > 0 {
            path.push('/');
        }
        path.push_str(&link.name);
        let result = visit_link(group, link, index, order, path, visited, op);
        path.truncate(base);
        if let Some(value) = result? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn visit_link<F>(
    group: &Group,
    link: &Link,
    index: IndexType,
    order: IterOrder,
    path: &mut String,
    visited: &mut Visited,
    op: &mut F,
) -> NsResult<Option<i32>>
where
    F: FnMut(&Group, &str, &LinkInfo) -> IterStep,
{
    match op(group, path, &LinkInfo::from(link)) {
        IterStep::Continue => {}
        IterStep::Stop(value) => return Ok(Some(value)),
        IterStep::Abort(reason) => return Err(NamespaceError::CallbackAborted(reason)),
    }
    let Some(addr) = link.hard_target() else {
        return Ok(None);
    };

    let loc = mount::cross_into(group.location().child(addr, &link.name))?;
    let store = loc.container().store();
    if store.object_type(loc.addr())? != ObjectType::Group {
        return Ok(None);
    }
    let id = loc.identity();
    if visited.contains(&id) {
        trace!(path = %path, addr = %loc.addr(), "already visited; not descending");
        return Ok(None);
    }
    if store.link_count(loc.addr())? > 1 {
        visited.insert(id);
    }

    let child = Group::open(loc)?;
    let result = visit_group(&child, index, order, path, visited, op);
    let closed = child.close();
    let stopped = result?;
    closed?;
    Ok(stopped)
}
