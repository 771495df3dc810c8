//! Component Types - Factories that build instances.
//!
//! A [`ComponentType`] is the compiled form of a component definition: a name,
//! an optional base type, and an initializer that declares properties, ids,
//! children and bindings on a fresh instance. Types are values: a property
//! declared `component` stores one, and a binding can instantiate it later.
//!
//! # Construction
//!
//! - [`construct`] is phase one only. The instance is allocated, base
//!   initializers run before derived ones, and the result stays
//!   `Constructing` until someone calls `complete()`. If an initializer fails,
//!   the instance and everything built for it so far is released.
//! - [`instantiate`] is construct + complete. Nothing half-built escapes: if
//!   either phase fails the instance is released before the error returns.
//!
//! # Example
//!
//! ```ignore
//! use elements_runtime::{ComponentType, declare, instantiate, register_id, set, PropertyOptions};
//!
//! let counter = ComponentType::new("Counter", |this| {
//!     register_id(this, "counter", this)?;
//!     declare(this, "count", PropertyOptions::new("int"))?;
//!     set(this, "count", 20.into())
//! });
//!
//! let instance = instantiate(&counter)?;
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::lifecycle;
use super::properties;
use super::registry;
use crate::error::{ElementError, Result};
use crate::types::{InstanceId, Value, ELEMENT_TYPE_NAME};

/// Runs against the instance under construction.
pub type Initializer = Rc<dyn Fn(InstanceId) -> Result<()>>;

struct ComponentTypeInner {
    name: Rc<str>,
    base: Option<ComponentType>,
    initializer: Option<Initializer>,
}

/// Cloneable handle to a component template. Equality is identity.
#[derive(Clone)]
pub struct ComponentType {
    inner: Rc<ComponentTypeInner>,
}

impl ComponentType {
    /// The root type: no properties, no initializer.
    pub fn element() -> Self {
        Self {
            inner: Rc::new(ComponentTypeInner {
                name: Rc::from(ELEMENT_TYPE_NAME),
                base: None,
                initializer: None,
            }),
        }
    }

    /// A type deriving directly from `Element`.
    pub fn new(
        name: impl Into<Rc<str>>,
        initializer: impl Fn(InstanceId) -> Result<()> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ComponentTypeInner {
                name: name.into(),
                base: None,
                initializer: Some(Rc::new(initializer)),
            }),
        }
    }

    /// A type extending `base`. The base initializer runs first.
    pub fn derive(
        name: impl Into<Rc<str>>,
        base: &ComponentType,
        initializer: impl Fn(InstanceId) -> Result<()> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ComponentTypeInner {
                name: name.into(),
                base: Some(base.clone()),
                initializer: Some(Rc::new(initializer)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn base(&self) -> Option<&ComponentType> {
        self.inner.base.as_ref()
    }

    /// Type names from this type up to `Element`.
    pub fn lineage(&self) -> Vec<Rc<str>> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(ty) = current {
            names.push(ty.inner.name.clone());
            current = ty.base();
        }
        if names.last().map(|name| &**name) != Some(ELEMENT_TYPE_NAME) {
            names.push(Rc::from(ELEMENT_TYPE_NAME));
        }
        names
    }

    /// Identity comparison.
    pub fn is_same(&self, other: &ComponentType) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn run_initializers(&self, instance: InstanceId) -> Result<()> {
        if let Some(base) = self.base() {
            base.run_initializers(instance)?;
        }
        match &self.inner.initializer {
            Some(initializer) => initializer(instance),
            None => Ok(()),
        }
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name())
            .field("base", &self.base().map(|base| base.name().to_string()))
            .finish()
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Phase one: allocate and run initializers. The instance stays `Constructing`.
///
/// The new instance is the id scope for everything its initializers build.
pub fn construct(ty: &ComponentType) -> Result<InstanceId> {
    let instance = registry::allocate_instance(&ty.lineage());

    registry::push_scope(instance);
    let result = {
        let _internal = registry::enter_internal();
        ty.run_initializers(instance)
    };
    registry::pop_scope();

    if let Err(err) = result {
        debug!(%instance, type_name = ty.name(), error = %err, "construction failed");
        registry::release_unfinished(instance);
        return Err(err);
    }

    Ok(instance)
}

/// Shorthand for constructing a plain `Element`.
pub fn create_element() -> Result<InstanceId> {
    construct(&ComponentType::element())
}

/// Construct and complete a fresh instance of `ty`.
///
/// Completion of the new instance has already run when this returns. The
/// instance floats until it is stored in a property (its holder then owns
/// it) or parented.
pub fn instantiate(ty: &ComponentType) -> Result<InstanceId> {
    let instance = construct(ty)?;

    if let Err(err) = lifecycle::complete(instance) {
        debug!(%instance, type_name = ty.name(), error = %err, "completion failed");
        registry::release_unfinished(instance);
        return Err(err);
    }

    registry::mark_floating(instance)?;
    Ok(instance)
}

/// Instantiate the component type held by `instance.property`.
pub fn instantiate_property(instance: InstanceId, property: &str) -> Result<InstanceId> {
    match properties::get(instance, property)? {
        Value::Component(ty) => instantiate(&ty),
        _ => Err(ElementError::NotAComponent {
            instance,
            property: property.to_string(),
        }),
    }
}
