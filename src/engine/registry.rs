//! Instance Registry - Allocation and teardown of component instances.
//!
//! Manages the lifecycle of instance records:
//! - Handle allocation (monotonic, never reused)
//! - Id scope stack for nested component construction
//! - Internal-access depth (initializers and evaluators read freely)
//! - Recursive release with destroy callbacks

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::binding;
use super::events::Channel;
use super::properties::Property;
use crate::config::{self, AccessPolicy};
use crate::error::{ElementError, Result};
use crate::types::{InstanceId, LifecycleState, ListenerId, Value, ELEMENT_TYPE_NAME};

// =============================================================================
// Instance Record
// =============================================================================

/// Everything the runtime knows about one live instance.
pub(crate) struct InstanceRecord {
    /// Type names, most derived first, always ending with `Element`.
    pub lineage: Rc<[Rc<str>]>,
    pub state: LifecycleState,
    pub properties: IndexMap<String, Property>,
    pub channels: IndexMap<String, Channel>,
    /// Non-owning back-reference.
    pub parent: Option<InstanceId>,
    /// Owned, in construction order.
    pub children: Vec<InstanceId>,
    /// Id table of the component scope rooted at this instance.
    pub ids: IndexMap<String, InstanceId>,
    /// This instance's identifier in its enclosing scope.
    pub exposed_id: Option<String>,
    /// Component scope that was being built when this instance was allocated.
    pub enclosing_scope: Option<InstanceId>,
    /// Instances produced by instantiation and stored in one of our properties.
    pub adopted: Vec<InstanceId>,
    /// Holder whose `adopted` list contains this instance.
    pub adopter: Option<InstanceId>,
    /// Scopes whose id table names this instance.
    pub id_scopes: Vec<InstanceId>,
    /// Produced by `instantiate()` and not yet owned by anyone.
    pub floating: bool,
}

impl InstanceRecord {
    fn new(lineage: Rc<[Rc<str>]>, enclosing_scope: Option<InstanceId>) -> Self {
        Self {
            lineage,
            state: LifecycleState::Constructing,
            properties: IndexMap::new(),
            channels: IndexMap::new(),
            parent: None,
            children: Vec::new(),
            ids: IndexMap::new(),
            exposed_id: None,
            enclosing_scope,
            adopted: Vec::new(),
            adopter: None,
            id_scopes: Vec::new(),
            floating: false,
        }
    }
}

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Live instances.
    static INSTANCES: RefCell<HashMap<InstanceId, InstanceRecord>> = RefCell::new(HashMap::new());

    /// Next handle to allocate.
    static NEXT_INDEX: Cell<usize> = const { Cell::new(0) };

    /// Counter for listener handles.
    static NEXT_LISTENER: Cell<usize> = const { Cell::new(0) };

    /// Stack of component scopes for nested construction.
    static SCOPE_STACK: RefCell<Vec<InstanceId>> = const { RefCell::new(Vec::new()) };

    /// Nesting depth of initializer / evaluator / accessor calls.
    static INTERNAL_DEPTH: Cell<usize> = const { Cell::new(0) };

    /// Destroy callbacks registered per instance.
    static DESTROY_CALLBACKS: RefCell<HashMap<InstanceId, Vec<Box<dyn FnOnce()>>>> = RefCell::new(HashMap::new());
}

// =============================================================================
// Record Access
// =============================================================================

/// Run `f` against an instance record.
///
/// Never call user code from inside `f`: the registry stays borrowed.
pub(crate) fn with_instance<R>(
    instance: InstanceId,
    f: impl FnOnce(&InstanceRecord) -> R,
) -> Result<R> {
    INSTANCES.with(|instances| {
        let instances = instances.borrow();
        instances
            .get(&instance)
            .map(f)
            .ok_or(ElementError::UnknownInstance(instance))
    })
}

/// Mutable counterpart of [`with_instance`].
pub(crate) fn with_instance_mut<R>(
    instance: InstanceId,
    f: impl FnOnce(&mut InstanceRecord) -> R,
) -> Result<R> {
    INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        instances
            .get_mut(&instance)
            .map(f)
            .ok_or(ElementError::UnknownInstance(instance))
    })
}

// =============================================================================
// Scope Stack
// =============================================================================

/// Component scope currently being built (None at top level).
pub fn current_scope() -> Option<InstanceId> {
    SCOPE_STACK.with(|stack| stack.borrow().last().copied())
}

pub(crate) fn push_scope(instance: InstanceId) {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(instance));
}

pub(crate) fn pop_scope() {
    SCOPE_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

// =============================================================================
// Internal Access
// =============================================================================

/// Marks the current call stack as runtime-internal until dropped.
///
/// Reads made while a guard is alive never fail the premature-access check.
pub(crate) struct InternalAccess(());

impl Drop for InternalAccess {
    fn drop(&mut self) {
        INTERNAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub(crate) fn enter_internal() -> InternalAccess {
    INTERNAL_DEPTH.with(|depth| depth.set(depth.get() + 1));
    InternalAccess(())
}

/// True while an initializer, evaluator, listener or accessor is running.
pub fn is_internal() -> bool {
    INTERNAL_DEPTH.with(|depth| depth.get() > 0)
}

/// Decide what a premature read does.
///
/// Returns `Ok(true)` when the caller should serve the default instead of
/// the stored state, `Ok(false)` when the read may proceed normally.
pub(crate) fn premature_access(instance: InstanceId, what: &str) -> Result<bool> {
    if is_internal() {
        return Ok(false);
    }
    match config::config().access_policy {
        AccessPolicy::Strict => Err(ElementError::PrematureAccess {
            instance,
            what: what.to_string(),
        }),
        AccessPolicy::DefaultValue => Ok(true),
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// Allocate a record for a new instance in the `Constructing` state.
///
/// The enclosing scope is captured at allocation time, so an instance built
/// inside a component's initializer registers its exposed id there.
pub(crate) fn allocate_instance(lineage: &[Rc<str>]) -> InstanceId {
    let instance = NEXT_INDEX.with(|next| {
        let index = next.get();
        next.set(index + 1);
        InstanceId(index)
    });

    let mut names: Vec<Rc<str>> = lineage.to_vec();
    if names.last().map(|name| &**name) != Some(ELEMENT_TYPE_NAME) {
        names.push(Rc::from(ELEMENT_TYPE_NAME));
    }

    let record = InstanceRecord::new(names.into(), current_scope());
    INSTANCES.with(|instances| {
        instances.borrow_mut().insert(instance, record);
    });

    let type_name = lineage.first().map(|name| &**name).unwrap_or(ELEMENT_TYPE_NAME);
    debug!(%instance, type_name, "allocated instance");
    instance
}

pub(crate) fn next_listener_id() -> ListenerId {
    NEXT_LISTENER.with(|next| {
        let id = next.get();
        next.set(id + 1);
        ListenerId(id)
    })
}

/// Mark an instance as produced by instantiation and not yet owned.
pub(crate) fn mark_floating(instance: InstanceId) -> Result<()> {
    with_instance_mut(instance, |record| record.floating = true)
}

/// Hand a floating instance to the holder whose property now stores it.
pub(crate) fn adopt(holder: InstanceId, instance: InstanceId) -> Result<()> {
    if holder == instance {
        return Ok(());
    }
    let floating = with_instance_mut(instance, |record| {
        let floating = std::mem::take(&mut record.floating);
        if floating {
            record.adopter = Some(holder);
        }
        floating
    })
    .unwrap_or(false);
    if floating {
        with_instance_mut(holder, |record| record.adopted.push(instance))?;
        debug!(%holder, %instance, "adopted instantiated component");
    }
    Ok(())
}

/// Drop `holder`'s ownership of an adopted instance no property holds anymore.
///
/// Returns true when the caller should release it.
pub(crate) fn disown(holder: InstanceId, instance: InstanceId) -> Result<bool> {
    with_instance_mut(holder, |record| {
        let held = Value::Instance(instance);
        if record.properties.values().any(|p| p.value == held) {
            return false;
        }
        match record.adopted.iter().position(|a| *a == instance) {
            Some(index) => {
                record.adopted.remove(index);
                true
            }
            None => false,
        }
    })
}

// =============================================================================
// Release
// =============================================================================

/// Release an instance.
///
/// Also recursively releases all children and adopted instances!
pub fn release(instance: InstanceId) {
    let owned = INSTANCES.with(|instances| {
        instances.borrow().get(&instance).map(|record| {
            let mut owned = record.children.clone();
            owned.extend(record.adopted.iter().copied());
            owned
        })
    });
    let Some(owned) = owned else { return };

    // FIRST: release everything we own (recursive!)
    for child in owned {
        release(child);
    }

    // Run destroy callbacks while the record is still readable
    run_destroy_callbacks(instance);

    // Bindings writing into this instance stop listening to their sources
    binding::detach_instance(instance);

    let removed = INSTANCES.with(|instances| instances.borrow_mut().remove(&instance));
    let Some(record) = removed else {
        warn!(%instance, "instance vanished during release");
        return;
    };

    // Unlink through the back-references only
    INSTANCES.with(|instances| {
        let mut instances = instances.borrow_mut();
        if let Some(parent) = record.parent {
            if let Some(parent) = instances.get_mut(&parent) {
                parent.children.retain(|c| *c != instance);
            }
        }
        if let Some(adopter) = record.adopter {
            if let Some(adopter) = instances.get_mut(&adopter) {
                adopter.adopted.retain(|a| *a != instance);
            }
        }
        for scope in &record.id_scopes {
            if let Some(scope) = instances.get_mut(scope) {
                scope.ids.retain(|_, target| *target != instance);
            }
        }
    });

    debug!(%instance, "released instance");
}

/// Release an instance whose construction failed, with everything built for it.
///
/// Children that were parented but never assigned are not in `children`, so
/// this also takes every live instance allocated in its scope or pointing at
/// it as parent.
pub(crate) fn release_unfinished(instance: InstanceId) {
    let mut built: Vec<InstanceId> = INSTANCES.with(|instances| {
        instances
            .borrow()
            .iter()
            .filter(|(id, record)| {
                **id != instance
                    && (record.enclosing_scope == Some(instance) || record.parent == Some(instance))
            })
            .map(|(id, _)| *id)
            .collect()
    });
    built.sort();

    for id in built.into_iter().rev() {
        release_unfinished(id);
    }
    release(instance);
}

// =============================================================================
// Destroy Callbacks
// =============================================================================

/// Register a callback to run when `instance` is released.
pub fn on_destroy(instance: InstanceId, callback: impl FnOnce() + 'static) {
    DESTROY_CALLBACKS.with(|callbacks| {
        callbacks
            .borrow_mut()
            .entry(instance)
            .or_default()
            .push(Box::new(callback));
    });
}

fn run_destroy_callbacks(instance: InstanceId) {
    let callbacks = DESTROY_CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(&instance));
    if let Some(callbacks) = callbacks {
        for callback in callbacks {
            callback();
        }
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// Check if a handle still refers to a live instance.
pub fn is_alive(instance: InstanceId) -> bool {
    INSTANCES.with(|instances| instances.borrow().contains_key(&instance))
}

/// Most derived type name of an instance.
pub fn type_name(instance: InstanceId) -> Result<String> {
    with_instance(instance, |record| record.lineage[0].to_string())
}

/// Type names from most derived to `Element`.
pub fn lineage(instance: InstanceId) -> Result<Vec<String>> {
    with_instance(instance, |record| {
        record.lineage.iter().map(|name| name.to_string()).collect()
    })
}

/// Does the instance's lineage contain `type_name`?
pub fn is_a(instance: InstanceId, type_name: &str) -> Result<bool> {
    with_instance(instance, |record| {
        record.lineage.iter().any(|name| &**name == type_name)
    })
}

/// Get the count of live instances.
pub fn instance_count() -> usize {
    INSTANCES.with(|instances| instances.borrow().len())
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Reset all runtime state on this thread (for testing).
pub fn reset_runtime() {
    INSTANCES.with(|instances| instances.borrow_mut().clear());
    NEXT_INDEX.with(|next| next.set(0));
    NEXT_LISTENER.with(|next| next.set(0));
    SCOPE_STACK.with(|stack| stack.borrow_mut().clear());
    INTERNAL_DEPTH.with(|depth| depth.set(0));
    DESTROY_CALLBACKS.with(|callbacks| callbacks.borrow_mut().clear());
    binding::reset_bindings();
    config::reset_config();
}
