//! Core types for elements-runtime.
//!
//! These types define the foundation that everything builds on.
//! Values flow through the property registry, type tags decide what a
//! property accepts, and handles identify live instances.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::engine::ComponentType;

// =============================================================================
// Handles
// =============================================================================

/// Handle to a live component instance.
///
/// Instances are NOT objects you hold. They are keys into the thread-local
/// instance registry, so copying a handle never extends a lifetime and a
/// child's handle to its parent is a non-owning back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) usize);

impl InstanceId {
    /// Raw registry index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by `on()` / `subscribe()`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) usize);

/// Handle to a registered binding.
///
/// Ids are allocated monotonically, so ordering by id is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub(crate) usize);

// =============================================================================
// Type Tags
// =============================================================================

/// Declared type of a property or event parameter.
///
/// The compiler emits these as strings (`'int'`, `'component'`, `'Element'`, ...).
/// Anything that is not a primitive keyword names an instance-reference type,
/// checked against the instance's lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Int,
    Double,
    String,
    /// Untyped: accepts any value.
    Var,
    /// Holds a [`ComponentType`] (the template, not an instance).
    Component,
    /// Reference to an instance whose lineage contains the named type.
    Element(Rc<str>),
}

impl TypeTag {
    /// Generic instance-reference tag accepting any instance.
    pub fn element() -> Self {
        TypeTag::Element(Rc::from(ELEMENT_TYPE_NAME))
    }

    /// Parse a compiler-emitted type name.
    ///
    /// An empty name means the declaration carried no type and maps to `Var`.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "bool" | "boolean" => TypeTag::Bool,
            "int" | "integer" => TypeTag::Int,
            "double" | "float" | "real" | "number" => TypeTag::Double,
            "string" => TypeTag::String,
            "" | "var" | "variant" => TypeTag::Var,
            "component" => TypeTag::Component,
            other => TypeTag::Element(Rc::from(other)),
        }
    }

    /// Name as the compiler would write it.
    pub fn name(&self) -> &str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Var => "var",
            TypeTag::Component => "component",
            TypeTag::Element(name) => name,
        }
    }

    /// Value a freshly declared property holds.
    pub fn default_value(&self) -> Value {
        match self {
            TypeTag::Bool => Value::Bool(false),
            TypeTag::Int => Value::Int(0),
            TypeTag::Double => Value::Double(0.0),
            TypeTag::String => Value::String(String::new()),
            TypeTag::Var | TypeTag::Component | TypeTag::Element(_) => Value::Null,
        }
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        TypeTag::parse(name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Root of every lineage. `TypeTag::Element("Element")` accepts any instance.
pub const ELEMENT_TYPE_NAME: &str = "Element";

// =============================================================================
// Values
// =============================================================================

/// Type-erased property value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Instance(InstanceId),
    Component(ComponentType),
}

impl Value {
    /// Kind name used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Instance(_) => "instance",
            Value::Component(_) => "component",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; ints widen to doubles.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<InstanceId> {
        match self {
            Value::Instance(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentType> {
        match self {
            Value::Component(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Change detection equality.
///
/// Instances and component types compare by identity. NaN equals NaN so a
/// binding that keeps producing NaN does not fire on every evaluation.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a == b,
            (Value::Component(a), Value::Component(b)) => a.is_same(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<InstanceId> for Value {
    fn from(value: InstanceId) -> Self {
        Value::Instance(value)
    }
}

impl From<ComponentType> for Value {
    fn from(value: ComponentType) -> Self {
        Value::Component(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Construction phase of an instance. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Properties, children, ids and bindings are being wired.
    #[default]
    Constructing,
    /// Own construction and the whole subtree finished; bindings not yet run.
    Initialized,
    /// Every binding in the subtree has been evaluated at least once.
    Completed,
}

// =============================================================================
// Property Flags
// =============================================================================

bitflags! {
    /// Per-property state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyFlags: u8 {
        /// A binding currently writes this property.
        const BOUND = 1 << 0;
        /// The binding has produced at least one value.
        const EVALUATED = 1 << 1;
        /// Reads go through a custom getter.
        const CUSTOM_GET = 1 << 2;
        /// Writes go through a custom setter.
        const CUSTOM_SET = 1 << 3;
    }
}
