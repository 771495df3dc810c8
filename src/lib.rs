//! # elements-runtime
//!
//! Reactive component object model for compiled declarative components.
//!
//! A compiler turns component definitions into calls against this runtime:
//! declare typed properties, bind properties to evaluators over explicit
//! dependency lists, compose instances into parent/child trees with scoped id
//! tables, and signal completion once a subtree is wired.
//!
//! ## Architecture
//!
//! Single-threaded and synchronous. All state is thread-local; every write,
//! notification and binding re-evaluation finishes before the call that
//! started it returns.
//!
//! ```text
//! set(T.x) → xChanged → binding(P.y) → evaluator() → set(P.y) → yChanged → ...
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use elements_runtime::*;
//!
//! let t = create_element()?;
//! let p = create_element()?;
//! declare(t, "x", PropertyOptions::new("int"))?;
//! declare(p, "y", PropertyOptions::new("int"))?;
//! bind(p, "y", move || Ok(Value::Int(get(t, "x")?.as_int().unwrap_or(0) * 2)), [(t, "x")])?;
//! complete(t)?;
//! complete(p)?;
//!
//! set(t, "x", Value::Int(20))?;
//! assert_eq!(get(p, "y")?, Value::Int(40));
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Handles, type tags, values, lifecycle states
//! - [`engine`] - Registry, properties, events, bindings, composition, lifecycle
//! - [`config`] - Access and assignment policies
//! - [`error`] - Error taxonomy

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::{
    config, configure, reset_config, AccessPolicy, AssignmentPolicy, RuntimeConfig,
    ACCESS_POLICY_ENV, ASSIGNMENT_POLICY_ENV,
};

pub use error::{ElementError, Result};

pub use engine::{
    // Registry
    current_scope, instance_count, is_a, is_alive, is_internal, lineage, on_destroy, release,
    reset_runtime, type_name,
    // Properties
    declare, get, has_property, notify, notify_channel, notify_channel_name, property_flags,
    property_names, set, store, stored, subscribe, type_tag, unsubscribe, Getter,
    PropertyOptions, Setter,
    // Events
    add_event, emit, event_names, has_event, listener_count, off, on, EventParam, Listener,
    // Bindings
    bind, binding_count, dependencies, has_binding, reset_bindings, unbind, Dependency,
    Evaluator,
    // Components
    construct, create_element, instantiate, instantiate_property, ComponentType, Initializer,
    // Composition
    assign_children, children, expose_id, exposed_id, ids, lookup_id, parent, register_id,
    set_parent,
    // Lifecycle
    complete, is_completed, state,
};
