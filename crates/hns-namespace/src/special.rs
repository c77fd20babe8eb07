//! Dereferencing of soft, external and user-defined links.
//!
//! Each dereference spends one hop from the caller's [`TraverseCtx`] before
//! anything else happens. Only [`TraverseFlags::EXISTENCE_ONLY`] carries
//! over into the nested resolution; the stop-at-last options apply to the
//! outer path only.

use hns_types::LinkClassId;
use tracing::trace;

use crate::error::{NamespaceError, NsResult};
use crate::group::Group;
use crate::location::Location;
use crate::traverse::{traverse, TraverseCtx, TraverseFlags};

fn nested_flags(flags: TraverseFlags) -> TraverseFlags {
    flags & TraverseFlags::EXISTENCE_ONLY
}

/// Resolve `path` from `start` as the target of a link. A missing target is
/// `NotFound`, or `None` when only existence was asked for.
fn resolve_target(
    start: &Location,
    path: &str,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
) -> NsResult<Option<Location>> {
    let existence_only = flags.contains(TraverseFlags::EXISTENCE_ONLY);
    match traverse(start, path, nested_flags(flags), ctx, |r| Ok(r.obj)) {
        Ok(Some(loc)) => Ok(Some(loc)),
        Ok(None) if existence_only => Ok(None),
        Ok(None) => Err(NamespaceError::not_found(path)),
        Err(e) if existence_only && e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Follow a soft link stored in `group`. Relative paths resolve from the
/// group holding the link.
pub(crate) fn follow_soft(
    group: &Location,
    path: &str,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
) -> NsResult<Option<Location>> {
    ctx.take_hop()?;
    trace!(path, remaining = ctx.remaining(), "following soft link");
    resolve_target(group, path, flags, ctx)
}

/// Follow an external link: find `file` in the container catalog and
/// resolve `path` from its root.
pub(crate) fn follow_external(
    group: &Location,
    file: &str,
    path: &str,
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
) -> NsResult<Option<Location>> {
    ctx.take_hop()?;
    trace!(file, path, remaining = ctx.remaining(), "following external link");
    let target = group
        .container
        .catalog()
        .and_then(|catalog| catalog.lookup(file));
    let Some(target) = target else {
        if flags.contains(TraverseFlags::EXISTENCE_ONLY) {
            return Ok(None);
        }
        return Err(NamespaceError::not_found(format!("{file}:{path}")));
    };
    let root = target.root_location()?;
    resolve_target(&root, path, flags, ctx)
}

/// Follow a user-defined link through its registered class.
///
/// The class sees a temporary handle to `group`, closed exactly once
/// whatever the class returns.
pub(crate) fn follow_user_defined(
    group: &Location,
    name: &str,
    class: LinkClassId,
    data: &[u8],
    flags: TraverseFlags,
    ctx: &mut TraverseCtx,
) -> NsResult<Option<Location>> {
    ctx.take_hop()?;
    let handler = group
        .container
        .link_classes()
        .get(class)
        .ok_or(NamespaceError::UnknownLinkClass(class))?;
    trace!(name, class = %class, remaining = ctx.remaining(), "following user-defined link");

    let temp = Group::open(group.duplicate())?;
    let found = handler.traverse(name, &temp, data, ctx);
    let closed = temp.close();
    let found = found?;
    closed?;

    match found {
        Some(loc) => Ok(Some(loc)),
        None if flags.contains(TraverseFlags::EXISTENCE_ONLY) => Ok(None),
        None => Err(NamespaceError::not_found(name)),
    }
}
