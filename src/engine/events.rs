//! Events - Named notification channels per instance.
//!
//! Every instance owns an ordered set of channels. Two kinds exist:
//! - property notify channels (`xChanged`), created by `declare()` and fired
//!   with the new value
//! - declared events (`add_event()`), fired by `emit()` with typed arguments
//!
//! Listeners run synchronously, in registration order, with no registry
//! borrow held. If a listener fails the remaining listeners still run and the
//! first error is returned to whoever fired the channel.
//!
//! # Example
//!
//! ```ignore
//! use elements_runtime::{add_event, emit, on, EventParam, TypeTag, Value};
//!
//! add_event(button, "clicked", vec![EventParam::new(TypeTag::Int, "times")])?;
//! let listener = on(button, "clicked", |args| {
//!     println!("clicked {:?}", args[0]);
//!     Ok(())
//! })?;
//! emit(button, "clicked", &[Value::Int(2)])?;
//! ```

use std::rc::Rc;

use tracing::trace;

use super::properties::check_value;
use super::registry::{self, with_instance, with_instance_mut};
use crate::error::{ElementError, Result};
use crate::types::{InstanceId, ListenerId, TypeTag, Value};

// =============================================================================
// Types
// =============================================================================

/// Channel listener. Receives the fired arguments.
pub type Listener = Rc<dyn Fn(&[Value]) -> Result<()>>;

/// Typed event parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    pub type_tag: TypeTag,
    pub name: String,
}

impl EventParam {
    pub fn new(type_tag: impl Into<TypeTag>, name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.into(),
        }
    }
}

impl<T: Into<TypeTag>, N: Into<String>> From<(T, N)> for EventParam {
    fn from((type_tag, name): (T, N)) -> Self {
        EventParam::new(type_tag, name)
    }
}

pub(crate) struct Channel {
    pub params: Vec<EventParam>,
    listeners: Vec<(ListenerId, Listener)>,
}

impl Channel {
    pub(crate) fn new(params: Vec<EventParam>) -> Self {
        Self {
            params,
            listeners: Vec::new(),
        }
    }
}

// =============================================================================
// Declaration
// =============================================================================

/// Declare an event with typed parameters.
pub fn add_event(
    instance: InstanceId,
    name: &str,
    params: impl IntoIterator<Item = impl Into<EventParam>>,
) -> Result<()> {
    let params = params.into_iter().map(Into::into).collect();
    open_channel(instance, name, params)
}

pub(crate) fn open_channel(
    instance: InstanceId,
    name: &str,
    params: Vec<EventParam>,
) -> Result<()> {
    with_instance_mut(instance, |record| {
        if record.channels.contains_key(name) {
            return Err(ElementError::DuplicateEvent {
                instance,
                event: name.to_string(),
            });
        }
        record.channels.insert(name.to_string(), Channel::new(params));
        Ok(())
    })?
}

/// Names of every channel on an instance (events and notify channels).
pub fn event_names(instance: InstanceId) -> Result<Vec<String>> {
    with_instance(instance, |record| record.channels.keys().cloned().collect())
}

/// Does the instance own a channel called `name`?
pub fn has_event(instance: InstanceId, name: &str) -> Result<bool> {
    with_instance(instance, |record| record.channels.contains_key(name))
}

// =============================================================================
// Listeners
// =============================================================================

/// Subscribe to a channel.
pub fn on(
    instance: InstanceId,
    event: &str,
    listener: impl Fn(&[Value]) -> Result<()> + 'static,
) -> Result<ListenerId> {
    add_listener(instance, event, Rc::new(listener))
}

pub(crate) fn add_listener(
    instance: InstanceId,
    event: &str,
    listener: Listener,
) -> Result<ListenerId> {
    let id = registry::next_listener_id();
    with_instance_mut(instance, |record| -> Result<ListenerId> {
        let channel = record
            .channels
            .get_mut(event)
            .ok_or_else(|| ElementError::UnknownEvent {
                instance,
                event: event.to_string(),
            })?;
        channel.listeners.push((id, listener));
        Ok(id)
    })?
}

/// Remove a listener. Returns false if it was not registered.
pub fn off(instance: InstanceId, event: &str, listener: ListenerId) -> Result<bool> {
    with_instance_mut(instance, |record| -> Result<bool> {
        let channel = record
            .channels
            .get_mut(event)
            .ok_or_else(|| ElementError::UnknownEvent {
                instance,
                event: event.to_string(),
            })?;
        let before = channel.listeners.len();
        channel.listeners.retain(|(id, _)| *id != listener);
        Ok(channel.listeners.len() != before)
    })?
}

/// Number of listeners on a channel.
pub fn listener_count(instance: InstanceId, event: &str) -> Result<usize> {
    with_instance(instance, |record| {
        record
            .channels
            .get(event)
            .map(|channel| channel.listeners.len())
            .ok_or_else(|| ElementError::UnknownEvent {
                instance,
                event: event.to_string(),
            })
    })?
}

// =============================================================================
// Dispatch
// =============================================================================

/// Emit a declared event after checking arity and argument types.
pub fn emit(instance: InstanceId, event: &str, args: &[Value]) -> Result<()> {
    let params = with_instance(instance, |record| {
        record.channels.get(event).map(|channel| channel.params.clone())
    })?
    .ok_or_else(|| ElementError::UnknownEvent {
        instance,
        event: event.to_string(),
    })?;

    if params.len() != args.len() {
        return Err(ElementError::ArgumentCount {
            event: event.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        check_value(&param.type_tag, arg, &format!("{}({})", event, param.name))?;
    }

    fire(instance, event, args)
}

/// Invoke every listener of a channel, synchronously and in order.
///
/// The listener list is snapshotted first, so listeners may subscribe,
/// unsubscribe or fire other channels while running.
pub(crate) fn fire(instance: InstanceId, event: &str, args: &[Value]) -> Result<()> {
    let listeners: Vec<Listener> = with_instance(instance, |record| {
        record
            .channels
            .get(event)
            .map(|channel| channel.listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    })?;

    trace!(%instance, event, listeners = listeners.len(), "fire");

    let _internal = registry::enter_internal();
    let mut first_error = None;
    for listener in listeners {
        if let Err(err) = listener(args) {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::construct;
    use crate::engine::ComponentType;
    use std::cell::RefCell;

    fn element() -> InstanceId {
        registry::reset_runtime();
        construct(&ComponentType::element()).unwrap()
    }

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let instance = element();
        add_event(instance, "moved", [(TypeTag::Int, "x"), (TypeTag::Int, "y")]).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        on(instance, "moved", move |args| {
            log.borrow_mut().push(("first", args.to_vec()));
            Ok(())
        })
        .unwrap();
        let log = seen.clone();
        on(instance, "moved", move |args| {
            log.borrow_mut().push(("second", args.to_vec()));
            Ok(())
        })
        .unwrap();

        emit(instance, "moved", &[Value::Int(1), Value::Int(2)]).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].1, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_emit_checks_arguments() {
        let instance = element();
        add_event(instance, "moved", [(TypeTag::Int, "x")]).unwrap();

        assert!(matches!(
            emit(instance, "moved", &[]),
            Err(ElementError::ArgumentCount { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            emit(instance, "moved", &[Value::from("left")]),
            Err(ElementError::TypeMismatch { .. })
        ));
        assert!(matches!(
            emit(instance, "jumped", &[]),
            Err(ElementError::UnknownEvent { .. })
        ));
    }

    #[test]
    fn test_duplicate_event() {
        let instance = element();
        add_event(instance, "done", Vec::<EventParam>::new()).unwrap();
        assert!(matches!(
            add_event(instance, "done", Vec::<EventParam>::new()),
            Err(ElementError::DuplicateEvent { .. })
        ));
    }

    #[test]
    fn test_off_removes_listener() {
        let instance = element();
        add_event(instance, "done", Vec::<EventParam>::new()).unwrap();

        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        let id = on(instance, "done", move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();

        emit(instance, "done", &[]).unwrap();
        assert!(off(instance, "done", id).unwrap());
        assert!(!off(instance, "done", id).unwrap());
        emit(instance, "done", &[]).unwrap();

        assert_eq!(*hits.borrow(), 1);
        assert_eq!(listener_count(instance, "done").unwrap(), 0);
    }

    #[test]
    fn test_failing_listener_does_not_starve_others() {
        let instance = element();
        add_event(instance, "done", Vec::<EventParam>::new()).unwrap();

        let reached = Rc::new(RefCell::new(false));
        on(instance, "done", |_| Err(ElementError::custom("boom"))).unwrap();
        let flag = reached.clone();
        on(instance, "done", move |_| {
            *flag.borrow_mut() = true;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            emit(instance, "done", &[]),
            Err(ElementError::custom("boom"))
        );
        assert!(*reached.borrow());
    }
}
