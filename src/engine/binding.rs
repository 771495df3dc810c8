//! Binding Engine - Explicit-dependency bindings between properties.
//!
//! A binding is an evaluator plus the list of `(instance, property)` pairs it
//! depends on. The list is taken at face value: nothing is inferred from what
//! the evaluator actually reads.
//!
//! # Lifecycle
//!
//! 1. `bind()` resolves every dependency eagerly and subscribes to its notify
//!    channel. The binding is NOT evaluated while its target is still being
//!    constructed.
//! 2. Completion evaluates every pending binding once, in registration order.
//! 3. Afterwards each dependency firing re-evaluates synchronously and writes
//!    the result through the property registry, which may cascade.
//!
//! # Re-entrancy
//!
//! A binding never runs inside itself. A trigger that arrives while the
//! binding is evaluating is suppressed and queues one re-run after the
//! current evaluation. Triggers arriving during that re-run are dropped, so a
//! binding that (indirectly) feeds its own dependencies always terminates.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::events;
use super::properties::{self, WriteOrigin};
use super::registry::{self, with_instance};
use crate::error::{ElementError, Result};
use crate::types::{BindingId, InstanceId, LifecycleState, ListenerId, Value};

// =============================================================================
// Types
// =============================================================================

/// Computes a bound property's value. Closes over whatever it reads.
pub type Evaluator = Rc<dyn Fn() -> Result<Value>>;

/// One entry of a binding's dependency list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub instance: InstanceId,
    pub property: String,
}

impl Dependency {
    pub fn new(instance: InstanceId, property: impl Into<String>) -> Self {
        Self {
            instance,
            property: property.into(),
        }
    }
}

impl<S: Into<String>> From<(InstanceId, S)> for Dependency {
    fn from((instance, property): (InstanceId, S)) -> Self {
        Dependency::new(instance, property)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance, self.property)
    }
}

/// Per-binding evaluation state.
#[derive(Default)]
struct EvaluationGuard {
    evaluating: Cell<bool>,
    pending: Cell<bool>,
    rerunning: Cell<bool>,
}

/// Clears the evaluating flags however the evaluation ends.
struct EvaluatingScope<'a>(&'a EvaluationGuard);

impl Drop for EvaluatingScope<'_> {
    fn drop(&mut self) {
        self.0.evaluating.set(false);
        self.0.rerunning.set(false);
        self.0.pending.set(false);
    }
}

struct BindingRecord {
    target: InstanceId,
    property: String,
    evaluator: Evaluator,
    dependencies: Vec<Dependency>,
    /// (source instance, channel, listener) per dependency.
    subscriptions: Vec<(InstanceId, String, ListenerId)>,
    evaluated: bool,
    guard: Rc<EvaluationGuard>,
}

// =============================================================================
// State
// =============================================================================

thread_local! {
    /// Ordered by id, which is registration order.
    static BINDINGS: RefCell<BTreeMap<BindingId, BindingRecord>> = const { RefCell::new(BTreeMap::new()) };

    static NEXT_BINDING: Cell<usize> = const { Cell::new(0) };
}

// =============================================================================
// Registration
// =============================================================================

/// Bind `target.property` to `evaluator` over an explicit dependency list.
///
/// Replaces any existing binding on that property. If the target instance is
/// past construction the binding is evaluated immediately, and if that fails
/// the new binding is removed again before the error is returned. Otherwise
/// its first evaluation happens at completion.
///
/// # Example
///
/// ```ignore
/// bind(panel, "y", move || {
///     Ok(Value::Int(get(item, "x")?.as_int().unwrap_or(0) * 2))
/// }, [(item, "x")])?;
/// ```
pub fn bind<D>(
    target: InstanceId,
    property: &str,
    evaluator: impl Fn() -> Result<Value> + 'static,
    dependencies: impl IntoIterator<Item = D>,
) -> Result<BindingId>
where
    D: Into<Dependency>,
{
    if !properties::has_property(target, property)? {
        return Err(ElementError::UnknownProperty {
            instance: target,
            property: property.to_string(),
        });
    }

    // Resolve eagerly: every dependency must name an existing property now
    let dependencies: Vec<Dependency> = dependencies.into_iter().map(Into::into).collect();
    let mut channels = Vec::with_capacity(dependencies.len());
    for dependency in &dependencies {
        let channel = properties::notify_channel(dependency.instance, &dependency.property)
            .map_err(|_| ElementError::DependencyMissing {
                instance: dependency.instance,
                property: dependency.property.clone(),
            })?;
        channels.push(channel);
    }

    unbind(target, property)?;

    let id = NEXT_BINDING.with(|next| {
        let id = next.get();
        next.set(id + 1);
        BindingId(id)
    });

    let mut subscriptions = Vec::with_capacity(dependencies.len());
    for (dependency, channel) in dependencies.iter().zip(channels) {
        let listener = events::add_listener(
            dependency.instance,
            &channel,
            Rc::new(move |_: &[Value]| on_dependency_changed(id)),
        )?;
        subscriptions.push((dependency.instance, channel, listener));
    }

    BINDINGS.with(|bindings| {
        bindings.borrow_mut().insert(
            id,
            BindingRecord {
                target,
                property: property.to_string(),
                evaluator: Rc::new(evaluator),
                dependencies,
                subscriptions,
                evaluated: false,
                guard: Rc::new(EvaluationGuard::default()),
            },
        );
    });
    properties::attach_binding(target, property, id)?;

    trace!(%target, property, ?id, "bound");

    // Past construction nobody else will give this binding its first run
    let state = with_instance(target, |record| record.state)?;
    if state != LifecycleState::Constructing {
        if let Err(err) = evaluate(id) {
            debug!(%target, property, ?id, error = %err, "first evaluation failed, unbinding");
            remove(id);
            return Err(err);
        }
    }

    Ok(id)
}

/// Remove the binding on `target.property`. Returns false if there was none.
pub fn unbind(target: InstanceId, property: &str) -> Result<bool> {
    let Some(id) = properties::binding_of(target, property)? else {
        return Ok(false);
    };
    remove(id);
    Ok(true)
}

fn remove(id: BindingId) {
    let record = BINDINGS.with(|bindings| bindings.borrow_mut().remove(&id));
    let Some(record) = record else { return };

    for (source, channel, listener) in &record.subscriptions {
        // Sources may already be gone
        let _ = events::off(*source, channel, *listener);
    }
    properties::detach_binding(record.target, &record.property, id);
    trace!(target = %record.target, property = %record.property, ?id, "unbound");
}

/// Does `target.property` currently carry a binding?
pub fn has_binding(target: InstanceId, property: &str) -> Result<bool> {
    Ok(properties::binding_of(target, property)?.is_some())
}

/// Dependency list of the binding on `target.property`, if any.
pub fn dependencies(target: InstanceId, property: &str) -> Result<Option<Vec<Dependency>>> {
    let Some(id) = properties::binding_of(target, property)? else {
        return Ok(None);
    };
    Ok(BINDINGS.with(|bindings| {
        bindings
            .borrow()
            .get(&id)
            .map(|record| record.dependencies.clone())
    }))
}

pub fn binding_count() -> usize {
    BINDINGS.with(|bindings| bindings.borrow().len())
}

// =============================================================================
// Evaluation
// =============================================================================

fn on_dependency_changed(id: BindingId) -> Result<()> {
    let evaluated = BINDINGS.with(|bindings| bindings.borrow().get(&id).map(|b| b.evaluated));
    match evaluated {
        // First evaluation belongs to completion
        Some(true) => evaluate(id),
        _ => Ok(()),
    }
}

/// Evaluate a binding and write its result, honoring the re-entrancy guard.
pub(crate) fn evaluate(id: BindingId) -> Result<()> {
    let snapshot = BINDINGS.with(|bindings| {
        bindings.borrow().get(&id).map(|b| {
            (
                b.target,
                b.property.clone(),
                b.evaluator.clone(),
                b.guard.clone(),
            )
        })
    });
    let Some((target, property, evaluator, guard)) = snapshot else {
        return Ok(());
    };

    if guard.evaluating.get() {
        if !guard.rerunning.get() {
            guard.pending.set(true);
        }
        debug!(%target, property = %property, ?id, "suppressed re-entrant evaluation");
        return Ok(());
    }

    guard.evaluating.set(true);
    let _scope = EvaluatingScope(&guard);

    run_once(id, target, &property, &evaluator)?;

    if guard.pending.replace(false) {
        guard.rerunning.set(true);
        run_once(id, target, &property, &evaluator)?;
    }

    Ok(())
}

fn run_once(id: BindingId, target: InstanceId, property: &str, evaluator: &Evaluator) -> Result<()> {
    let value = {
        let _internal = registry::enter_internal();
        evaluator()?
    };

    let still_bound = BINDINGS.with(|bindings| match bindings.borrow_mut().get_mut(&id) {
        Some(record) => {
            record.evaluated = true;
            true
        }
        None => false,
    });
    if !still_bound {
        // The evaluator unbound itself
        return Ok(());
    }
    properties::mark_evaluated(target, property)?;

    trace!(%target, property, ?value, "evaluated");
    let _internal = registry::enter_internal();
    properties::write(target, property, value, WriteOrigin::Binding)
}

// =============================================================================
// Completion Support
// =============================================================================

/// Bindings targeting any of `instances` that have never been evaluated,
/// in registration order.
pub(crate) fn pending_for(instances: &HashSet<InstanceId>) -> Vec<BindingId> {
    BINDINGS.with(|bindings| {
        bindings
            .borrow()
            .iter()
            .filter(|(_, b)| !b.evaluated && instances.contains(&b.target))
            .map(|(id, _)| *id)
            .collect()
    })
}

/// Run the first evaluation of a pending binding (skipped if already done).
pub(crate) fn evaluate_first(id: BindingId) -> Result<()> {
    let pending = BINDINGS.with(|bindings| bindings.borrow().get(&id).map(|b| !b.evaluated));
    match pending {
        Some(true) => evaluate(id),
        _ => Ok(()),
    }
}

/// Drop every binding that writes into `instance`.
pub(crate) fn detach_instance(instance: InstanceId) {
    let ids: Vec<BindingId> = BINDINGS.with(|bindings| {
        bindings
            .borrow()
            .iter()
            .filter(|(_, b)| b.target == instance)
            .map(|(id, _)| *id)
            .collect()
    });
    for id in ids {
        remove(id);
    }
}

/// Reset all binding state (for testing).
pub fn reset_bindings() {
    BINDINGS.with(|bindings| bindings.borrow_mut().clear());
    NEXT_BINDING.with(|next| next.set(0));
}
