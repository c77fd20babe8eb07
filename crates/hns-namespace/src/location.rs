use std::fmt;

use hns_types::{Address, ContainerId};

use crate::container::Container;

/// A capability to reach one object: its container, its address and, when
/// known, the path it was reached by.
///
/// A location does not own the object. Several locations may name the same
/// address through different hard links. Locations are deliberately not
/// `Clone`; use [`duplicate`](Self::duplicate) where a second copy is really
/// wanted.
pub struct Location {
    pub(crate) container: Container,
    pub(crate) addr: Address,
    pub(crate) path: Option<String>,
}

impl Location {
    pub(crate) fn new(container: Container, addr: Address, path: Option<String>) -> Self {
        Self {
            container,
            addr,
            path,
        }
    }

    /// The container the object lives in.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The object's address.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// The path this location was reached by, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Identity of the object: container instance plus address.
    pub fn identity(&self) -> (ContainerId, Address) {
        (self.container.id(), self.addr)
    }

    /// Returns `true` if both locations name the same object.
    pub fn same_object(&self, other: &Location) -> bool {
        self.identity() == other.identity()
    }

    /// An explicit second copy of this location.
    pub fn duplicate(&self) -> Location {
        Location {
            container: self.container.clone(),
            addr: self.addr,
            path: self.path.clone(),
        }
    }

    /// Location of an object reached from this one through link `name`.
    pub(crate) fn child(&self, addr: Address, name: &str) -> Location {
        let path = self.path.as_deref().map(|p| join_path(p, name));
        Location::new(self.container.clone(), addr, path)
    }
}

/// Append `name` to `base` with exactly one separator.
pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("container", &self.container.id())
            .field("addr", &self.addr)
            .field("path", &self.path)
            .finish()
    }
}
