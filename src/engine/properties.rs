//! Property Registry - Typed, observable slots on instances.
//!
//! Each property has a declared [`TypeTag`], a current value, a notify
//! channel and optionally a binding. All writes go through [`set`] (the
//! binding engine uses the same path), so notification is never skipped:
//! - type check first, the stored value is untouched on mismatch
//! - store, then fire the notify channel only if the value changed
//! - listeners run synchronously before `set` returns
//!
//! # Example
//!
//! ```ignore
//! use elements_runtime::{declare, get, set, subscribe, PropertyOptions, TypeTag};
//!
//! declare(item, "x", PropertyOptions::new(TypeTag::Int))?;
//! subscribe(item, "x", |value| {
//!     println!("x is now {:?}", value);
//!     Ok(())
//! })?;
//! set(item, "x", 20.into())?; // prints once
//! set(item, "x", 20.into())?; // unchanged, no notification
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::binding;
use super::events::{self, EventParam};
use super::registry::{self, with_instance, with_instance_mut};
use crate::config::{self, AssignmentPolicy};
use crate::error::{ElementError, Result};
use crate::types::{BindingId, InstanceId, ListenerId, PropertyFlags, TypeTag, Value};

// =============================================================================
// Accessors
// =============================================================================

/// Custom read accessor.
pub type Getter = Rc<dyn Fn() -> Result<Value>>;

/// Custom write accessor. Receives an already type-checked value and is
/// responsible for storage and for calling [`notify`].
pub type Setter = Rc<dyn Fn(Value) -> Result<()>>;

// =============================================================================
// Declaration Options
// =============================================================================

/// What the compiler emits per property: `{type: ..., notify: ...}`.
#[derive(Clone)]
pub struct PropertyOptions {
    pub type_tag: TypeTag,
    /// Notify channel name. Defaults to `<name>Changed`.
    pub notify: Option<String>,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

impl PropertyOptions {
    pub fn new(type_tag: impl Into<TypeTag>) -> Self {
        Self {
            type_tag: type_tag.into(),
            notify: None,
            getter: None,
            setter: None,
        }
    }

    pub fn notify(mut self, channel: impl Into<String>) -> Self {
        self.notify = Some(channel.into());
        self
    }

    pub fn getter(mut self, getter: impl Fn() -> Result<Value> + 'static) -> Self {
        self.getter = Some(Rc::new(getter));
        self
    }

    pub fn setter(mut self, setter: impl Fn(Value) -> Result<()> + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }
}

impl fmt::Debug for PropertyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyOptions")
            .field("type_tag", &self.type_tag)
            .field("notify", &self.notify)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// Notify channel name the compiler derives from a property name.
pub fn notify_channel_name(property: &str) -> String {
    format!("{}Changed", property)
}

// =============================================================================
// Property Record
// =============================================================================

pub(crate) struct Property {
    pub type_tag: TypeTag,
    pub notify: String,
    pub value: Value,
    pub binding: Option<BindingId>,
    pub flags: PropertyFlags,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

/// Who is writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOrigin {
    External,
    Binding,
}

// =============================================================================
// Type Checking
// =============================================================================

/// Check that `value` satisfies `tag`. `target` names the slot in errors.
pub(crate) fn check_value(tag: &TypeTag, value: &Value, target: &str) -> Result<()> {
    let accepted = match (tag, value) {
        (TypeTag::Var, _) => true,
        (TypeTag::Bool, Value::Bool(_)) => true,
        (TypeTag::Int, Value::Int(_)) => true,
        (TypeTag::Double, Value::Double(_)) => true,
        (TypeTag::String, Value::String(_)) => true,
        (TypeTag::Component, Value::Component(_) | Value::Null) => true,
        (TypeTag::Element(_), Value::Null) => true,
        (TypeTag::Element(name), Value::Instance(instance)) => registry::is_a(*instance, name)?,
        _ => false,
    };

    if accepted {
        Ok(())
    } else {
        Err(ElementError::TypeMismatch {
            target: target.to_string(),
            expected: tag.name().to_string(),
            found: value.kind().to_string(),
        })
    }
}

// =============================================================================
// Declaration
// =============================================================================

/// Declare a property, default-initialized per its type tag.
///
/// Also opens the notify channel, which carries the new value.
pub fn declare(instance: InstanceId, name: &str, options: PropertyOptions) -> Result<()> {
    let exists = with_instance(instance, |record| record.properties.contains_key(name))?;
    if exists {
        return Err(ElementError::DuplicateProperty {
            instance,
            property: name.to_string(),
        });
    }

    let notify = options
        .notify
        .clone()
        .unwrap_or_else(|| notify_channel_name(name));
    events::open_channel(
        instance,
        &notify,
        vec![EventParam::new(options.type_tag.clone(), name)],
    )?;

    let mut flags = PropertyFlags::empty();
    flags.set(PropertyFlags::CUSTOM_GET, options.getter.is_some());
    flags.set(PropertyFlags::CUSTOM_SET, options.setter.is_some());

    let property = Property {
        value: options.type_tag.default_value(),
        type_tag: options.type_tag,
        notify,
        binding: None,
        flags,
        getter: options.getter,
        setter: options.setter,
    };

    with_instance_mut(instance, |record| {
        record.properties.insert(name.to_string(), property);
    })?;

    trace!(%instance, property = name, "declared");
    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Read the current value.
///
/// Reading a bound property whose binding has not produced a value yet is a
/// premature access (see [`crate::config::AccessPolicy`]).
pub fn get(instance: InstanceId, name: &str) -> Result<Value> {
    let (value, flags, getter, type_tag) = with_instance(instance, |record| {
        record.properties.get(name).map(|p| {
            (
                p.value.clone(),
                p.flags,
                p.getter.clone(),
                p.type_tag.clone(),
            )
        })
    })?
    .ok_or_else(|| unknown(instance, name))?;

    if flags.contains(PropertyFlags::BOUND)
        && !flags.contains(PropertyFlags::EVALUATED)
        && registry::premature_access(instance, name)?
    {
        return Ok(type_tag.default_value());
    }

    if let Some(getter) = getter {
        let _internal = registry::enter_internal();
        return getter();
    }

    Ok(value)
}

/// Read the stored value, bypassing custom getters and access checks.
///
/// This is what a custom getter/setter pair uses as its backing store.
pub fn stored(instance: InstanceId, name: &str) -> Result<Value> {
    with_instance(instance, |record| record.properties.get(name).map(|p| p.value.clone()))?
        .ok_or_else(|| unknown(instance, name))
}

/// Declared type of a property.
pub fn type_tag(instance: InstanceId, name: &str) -> Result<TypeTag> {
    with_instance(instance, |record| {
        record.properties.get(name).map(|p| p.type_tag.clone())
    })?
    .ok_or_else(|| unknown(instance, name))
}

/// Notify channel of a property.
pub fn notify_channel(instance: InstanceId, name: &str) -> Result<String> {
    with_instance(instance, |record| record.properties.get(name).map(|p| p.notify.clone()))?
        .ok_or_else(|| unknown(instance, name))
}

pub fn has_property(instance: InstanceId, name: &str) -> Result<bool> {
    with_instance(instance, |record| record.properties.contains_key(name))
}

/// Property names in declaration order.
pub fn property_names(instance: InstanceId) -> Result<Vec<String>> {
    with_instance(instance, |record| record.properties.keys().cloned().collect())
}

pub fn property_flags(instance: InstanceId, name: &str) -> Result<PropertyFlags> {
    with_instance(instance, |record| record.properties.get(name).map(|p| p.flags))?
        .ok_or_else(|| unknown(instance, name))
}

// =============================================================================
// Writes
// =============================================================================

/// Assign a value.
///
/// With [`AssignmentPolicy::KeepBinding`] (default) a bound property keeps its
/// binding and the next dependency firing overwrites the manual value. With
/// [`AssignmentPolicy::DetachBinding`] the binding is removed first.
pub fn set(instance: InstanceId, name: &str, value: Value) -> Result<()> {
    write(instance, name, value, WriteOrigin::External)
}

pub(crate) fn write(
    instance: InstanceId,
    name: &str,
    value: Value,
    origin: WriteOrigin,
) -> Result<()> {
    let (type_tag, setter, bound) = with_instance(instance, |record| {
        record
            .properties
            .get(name)
            .map(|p| (p.type_tag.clone(), p.setter.clone(), p.binding.is_some()))
    })?
    .ok_or_else(|| unknown(instance, name))?;

    check_value(&type_tag, &value, name)?;

    if origin == WriteOrigin::External
        && bound
        && config::config().assignment_policy == AssignmentPolicy::DetachBinding
    {
        binding::unbind(instance, name)?;
    }

    if let Some(setter) = setter {
        let _internal = registry::enter_internal();
        return setter(value);
    }

    store(instance, name, value)
}

/// Store a value without going through a custom setter, firing on change.
///
/// Custom setters call this for their backing storage. An instantiated
/// component this instance owned through the old value is released once no
/// property holds it anymore.
pub fn store(instance: InstanceId, name: &str, value: Value) -> Result<()> {
    let changed = with_instance_mut(instance, |record| {
        record.properties.get_mut(name).map(|p| {
            if p.value == value {
                None
            } else {
                let previous = std::mem::replace(&mut p.value, value.clone());
                Some((p.notify.clone(), previous))
            }
        })
    })?
    .ok_or_else(|| unknown(instance, name))?;

    let Some((channel, previous)) = changed else {
        return Ok(());
    };

    if let Value::Instance(held) = &value {
        registry::adopt(instance, *held)?;
    }
    if let Value::Instance(old) = previous {
        if registry::disown(instance, old)? {
            registry::release(old);
        }
    }

    trace!(%instance, property = name, "changed");
    events::fire(instance, &channel, &[value])
}

/// Fire a property's notify channel with its current value.
///
/// For custom setters that keep their state elsewhere.
pub fn notify(instance: InstanceId, name: &str) -> Result<()> {
    let (channel, value) = with_instance(instance, |record| {
        record
            .properties
            .get(name)
            .map(|p| (p.notify.clone(), p.value.clone()))
    })?
    .ok_or_else(|| unknown(instance, name))?;
    events::fire(instance, &channel, &[value])
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscribe to a property's notify channel. The listener gets the new value.
pub fn subscribe(
    instance: InstanceId,
    name: &str,
    listener: impl Fn(&Value) -> Result<()> + 'static,
) -> Result<ListenerId> {
    let channel = notify_channel(instance, name)?;
    events::on(instance, &channel, move |args| {
        listener(args.first().unwrap_or(&Value::Null))
    })
}

/// Remove a subscription. Returns false if it was not registered.
pub fn unsubscribe(instance: InstanceId, name: &str, listener: ListenerId) -> Result<bool> {
    let channel = notify_channel(instance, name)?;
    events::off(instance, &channel, listener)
}

// =============================================================================
// Binding Bookkeeping
// =============================================================================

pub(crate) fn attach_binding(instance: InstanceId, name: &str, id: BindingId) -> Result<()> {
    with_instance_mut(instance, |record| {
        record.properties.get_mut(name).map(|p| {
            p.binding = Some(id);
            p.flags.insert(PropertyFlags::BOUND);
            p.flags.remove(PropertyFlags::EVALUATED);
        })
    })?
    .ok_or_else(|| unknown(instance, name))
}

pub(crate) fn detach_binding(instance: InstanceId, name: &str, id: BindingId) {
    let _ = with_instance_mut(instance, |record| {
        if let Some(p) = record.properties.get_mut(name) {
            if p.binding == Some(id) {
                p.binding = None;
                p.flags.remove(PropertyFlags::BOUND | PropertyFlags::EVALUATED);
            }
        }
    });
}

pub(crate) fn mark_evaluated(instance: InstanceId, name: &str) -> Result<()> {
    with_instance_mut(instance, |record| {
        if let Some(p) = record.properties.get_mut(name) {
            p.flags.insert(PropertyFlags::EVALUATED);
        }
    })
}

pub(crate) fn binding_of(instance: InstanceId, name: &str) -> Result<Option<BindingId>> {
    with_instance(instance, |record| record.properties.get(name).map(|p| p.binding))?
        .ok_or_else(|| unknown(instance, name))
}

fn unknown(instance: InstanceId, name: &str) -> ElementError {
    ElementError::UnknownProperty {
        instance,
        property: name.to_string(),
    }
}
