//! Lifecycle - Two-phase construction.
//!
//! ```text
//! Constructing ──► Initialized ──► Completed (terminal)
//! ```
//!
//! While `Constructing`, properties, ids, children and bindings are wired but
//! no binding runs, since its dependencies may belong to siblings that do not
//! exist yet. [`complete`] is the single entry point out of that phase:
//!
//! 1. every not-yet-completed instance in the subtree becomes `Initialized`,
//!    children before parents
//! 2. every binding targeting the subtree that has never run is evaluated
//!    once, in registration order
//! 3. the subtree becomes `Completed`, children before parents
//!
//! If step 2 fails nothing is marked `Completed`; the error is returned and
//! the subtree stays `Initialized`.

use std::collections::HashSet;

use tracing::debug;

use super::binding;
use super::registry::{with_instance, with_instance_mut};
use crate::error::Result;
use crate::types::{InstanceId, LifecycleState};

/// Finish construction of `instance` and its whole subtree.
///
/// Calling it on an already completed instance is a no-op.
pub fn complete(instance: InstanceId) -> Result<()> {
    if state(instance)? == LifecycleState::Completed {
        return Ok(());
    }

    let mut pending = Vec::new();
    collect_incomplete(instance, &mut pending)?;

    for &node in &pending {
        set_state(node, LifecycleState::Initialized)?;
    }
    debug!(%instance, subtree = pending.len(), "initialized");

    let members: HashSet<InstanceId> = pending.iter().copied().collect();
    let bindings = binding::pending_for(&members);
    for id in &bindings {
        binding::evaluate_first(*id)?;
    }

    for &node in &pending {
        set_state(node, LifecycleState::Completed)?;
    }
    debug!(%instance, bindings = bindings.len(), "completed");

    Ok(())
}

/// Current lifecycle state.
pub fn state(instance: InstanceId) -> Result<LifecycleState> {
    with_instance(instance, |record| record.state)
}

pub fn is_completed(instance: InstanceId) -> bool {
    matches!(state(instance), Ok(LifecycleState::Completed))
}

/// Post-order walk collecting every instance that is not completed yet.
fn collect_incomplete(instance: InstanceId, out: &mut Vec<InstanceId>) -> Result<()> {
    let (children, state) = with_instance(instance, |record| (record.children.clone(), record.state))?;
    for child in children {
        collect_incomplete(child, out)?;
    }
    if state != LifecycleState::Completed {
        out.push(instance);
    }
    Ok(())
}

fn set_state(instance: InstanceId, state: LifecycleState) -> Result<()> {
    with_instance_mut(instance, |record| record.state = state)
}
