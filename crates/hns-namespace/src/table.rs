//! Link tables: an ordered snapshot of a group's links.
//!
//! A table is built for one operation and dropped afterwards. Mutating the
//! group after the table is built does not change the table.

use std::cmp::Ordering;

use hns_types::{IndexType, IterOrder, Link};

use crate::error::{NamespaceError, NsResult};
use crate::link::IterStep;

/// An ordered snapshot of a group's links.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkTable {
    links: Vec<Link>,
}

impl LinkTable {
    /// A table in the order the links were given.
    pub fn from_links(links: Vec<Link>) -> Self {
        Self { links }
    }

    /// Sort `links` by `index` in `order`.
    ///
    /// [`IterOrder::Native`] sorts like [`IterOrder::Increasing`], so the
    /// order never depends on the storage form. Links without a
    /// creation-order tag sort first under [`IndexType::CreationOrder`];
    /// callers check tracking before asking for that order.
    pub fn build(mut links: Vec<Link>, index: IndexType, order: IterOrder) -> Self {
        let cmp: fn(&Link, &Link) -> Ordering = match index {
            IndexType::Name => |a, b| a.name.as_bytes().cmp(b.name.as_bytes()),
            IndexType::CreationOrder => |a, b| a.creation_order.cmp(&b.creation_order),
        };
        match order {
            IterOrder::Increasing | IterOrder::Native => links.sort_by(cmp),
            IterOrder::Decreasing => links.sort_by(|a, b| cmp(b, a)),
        }
        Self { links }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The `n`th link, or `IndexOutOfBounds`.
    pub fn get(&self, n: u64) -> NsResult<&Link> {
        usize::try_from(n)
            .ok()
            .and_then(|i| self.links.get(i))
            .ok_or(NamespaceError::IndexOutOfBounds {
                index: n,
                len: self.links.len() as u64,
            })
    }

    /// Find a link by name.
    pub fn find(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Link> {
        self.links.iter()
    }

    pub fn into_links(self) -> Vec<Link> {
        self.links
    }

    /// Call `op` on every link from position `*skip` on.
    ///
    /// On return `*skip` is the position after the last link visited.
    /// Returns the value of the first [`IterStep::Stop`], or 0 if every
    /// link was visited.
    ///
    /// A non-zero `*skip` must name an existing link; a skip at or past the
    /// end fails with `IndexOutOfBounds`. A skip of 0 is always accepted, so
    /// an empty table iterates nothing.
    pub fn iterate(
        &self,
        skip: &mut u64,
        mut op: impl FnMut(&Link) -> IterStep,
    ) -> NsResult<i32> {
        let len = self.links.len() as u64;
        if *skip > 0 && *skip >= len {
            return Err(NamespaceError::IndexOutOfBounds { index: *skip, len });
        }
        let start = *skip as usize;
        for link in &self.links[start..] {
            *skip += 1;
            match op(link) {
                IterStep::Continue => {}
                IterStep::Stop(value) => return Ok(value),
                IterStep::Abort(reason) => return Err(NamespaceError::CallbackAborted(reason)),
            }
        }
        Ok(0)
    }
}

impl<'a> IntoIterator for &'a LinkTable {
    type Item = &'a Link;
    type IntoIter = std::slice::Iter<'a, Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.iter()
    }
}
