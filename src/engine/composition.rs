//! Composition - Parent/child wiring and scoped id tables.
//!
//! Ownership is tree-shaped: a parent owns its children, a child only keeps a
//! non-owning handle to its parent.
//!
//! Ids are scoped to the nearest component boundary. Each instance built by
//! `construct()` roots its own scope; its initializer registers ids there with
//! [`register_id`]. A child built inline can carry an exposed id
//! ([`expose_id`]) which [`assign_children`] merges into the scope the child was
//! built in. A nested component type's internal ids stay in its own table.
//!
//! # Example
//!
//! ```ignore
//! let label = create_element()?;
//! set_parent(label, this)?;
//! expose_id(label, "label")?;
//! assign_children(this, &[label])?;
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use super::registry::{self, with_instance, with_instance_mut};
use crate::error::{ElementError, Result};
use crate::types::{InstanceId, LifecycleState};

// =============================================================================
// Parenting
// =============================================================================

/// Set the non-owning back-reference from `child` to `parent`.
pub fn set_parent(child: InstanceId, parent: InstanceId) -> Result<()> {
    if !registry::is_alive(parent) {
        return Err(ElementError::UnknownInstance(parent));
    }
    if let Some(existing) = with_instance(child, |record| record.parent)? {
        return Err(ElementError::AlreadyParented {
            child,
            parent: existing,
        });
    }

    // Walk up from the parent; meeting the child means a cycle
    let mut cursor = Some(parent);
    while let Some(current) = cursor {
        if current == child {
            return Err(ElementError::CyclicParent { child, parent });
        }
        cursor = with_instance(current, |record| record.parent)?;
    }

    with_instance_mut(child, |record| {
        record.parent = Some(parent);
        record.floating = false;
    })?;
    trace!(%child, %parent, "parented");
    Ok(())
}

pub fn parent(instance: InstanceId) -> Result<Option<InstanceId>> {
    with_instance(instance, |record| record.parent)
}

/// Children in construction order.
pub fn children(instance: InstanceId) -> Result<Vec<InstanceId>> {
    with_instance(instance, |record| record.children.clone())
}

// =============================================================================
// Child Assignment
// =============================================================================

/// Store already-parented children in order and merge their exposed ids.
///
/// All checks run before anything is committed, so a rejected call leaves the
/// parent, its siblings and every id table untouched.
pub fn assign_children(instance: InstanceId, children: &[InstanceId]) -> Result<()> {
    let existing: HashSet<InstanceId> =
        with_instance(instance, |record| record.children.iter().copied().collect())?;

    let mut merges: Vec<(InstanceId, String, InstanceId)> = Vec::new();
    for &child in children {
        let (parent, exposed, scope) = with_instance(child, |record| {
            (
                record.parent,
                record.exposed_id.clone(),
                record.enclosing_scope,
            )
        })?;
        if parent != Some(instance) {
            return Err(ElementError::NotParented {
                child,
                parent: instance,
            });
        }
        if existing.contains(&child) {
            continue;
        }
        if let Some(id) = exposed {
            let scope = match scope {
                Some(scope) if registry::is_alive(scope) => scope,
                _ => instance,
            };
            let taken = with_instance(scope, |record| record.ids.contains_key(&id))?
                || merges.iter().any(|(s, name, _)| *s == scope && *name == id);
            if taken {
                return Err(ElementError::DuplicateId { scope, id });
            }
            merges.push((scope, id, child));
        }
    }

    with_instance_mut(instance, |record| {
        for &child in children {
            if !record.children.contains(&child) {
                record.children.push(child);
            }
        }
    })?;
    for (scope, id, child) in merges {
        with_instance_mut(scope, |record| {
            record.ids.insert(id.clone(), child);
        })?;
        note_id_scope(child, scope)?;
        trace!(%scope, id, %child, "merged exposed id");
    }

    Ok(())
}

// =============================================================================
// Ids
// =============================================================================

/// Register `name → target` in the id table rooted at `scope`.
pub fn register_id(scope: InstanceId, name: &str, target: InstanceId) -> Result<()> {
    if !registry::is_alive(target) {
        return Err(ElementError::UnknownInstance(target));
    }
    with_instance_mut(scope, |record| {
        if record.ids.contains_key(name) {
            return Err(ElementError::DuplicateId {
                scope,
                id: name.to_string(),
            });
        }
        record.ids.insert(name.to_string(), target);
        Ok(())
    })??;
    note_id_scope(target, scope)?;
    trace!(%scope, id = name, %target, "registered id");
    Ok(())
}

/// Remember that `scope` names `target`, so releasing `target` can unlink it.
fn note_id_scope(target: InstanceId, scope: InstanceId) -> Result<()> {
    with_instance_mut(target, |record| {
        if !record.id_scopes.contains(&scope) {
            record.id_scopes.push(scope);
        }
    })
}

/// Give `instance` an identifier in the scope it was built in.
///
/// Takes effect when the instance is passed to [`assign_children`].
pub fn expose_id(instance: InstanceId, name: &str) -> Result<()> {
    with_instance_mut(instance, |record| {
        record.exposed_id = Some(name.to_string());
    })
}

/// Identifier `instance` exposes to its enclosing scope, if any.
pub fn exposed_id(instance: InstanceId) -> Result<Option<String>> {
    with_instance(instance, |record| record.exposed_id.clone())
}

/// Read-only copy of the id table rooted at `instance`.
pub fn ids(instance: InstanceId) -> Result<IndexMap<String, InstanceId>> {
    let (state, table) = with_instance(instance, |record| (record.state, record.ids.clone()))?;
    if state != LifecycleState::Completed {
        registry::premature_access(instance, "ids")?;
    }
    Ok(table)
}

/// Look up one id in the table rooted at `instance`.
pub fn lookup_id(instance: InstanceId, name: &str) -> Result<Option<InstanceId>> {
    let (state, found) =
        with_instance(instance, |record| (record.state, record.ids.get(name).copied()))?;
    if state != LifecycleState::Completed {
        registry::premature_access(instance, name)?;
    }
    Ok(found)
}
