//! Runtime Engine - Instances, properties, bindings, composition, lifecycle.
//!
//! The engine manages the core data structures:
//! - Registry: Instance allocation, id scope stack, teardown
//! - Properties: Typed slots with notify channels
//! - Events: Named channels and their listeners
//! - Binding: Explicit-dependency bindings with a re-entrancy guard
//! - Component: Component types and instantiation
//! - Composition: Parent/child wiring and scoped id tables
//! - Lifecycle: Two-phase construction and completion
//!
//! # Architecture
//!
//! Instances are NOT objects. They are handles into thread-local tables:
//!
//! ```text
//! #0: ParserTest06 (parent=None, props=[ElemProp], ids={},        Completed)
//! #1: Element      (parent=#0,   props=[y],        ids={},        Completed)
//! #2: T            (parent=None, props=[x],        ids={twenty},  Completed)  adopted by #1
//! ```
//!
//! Every call that runs user code (initializers, evaluators, listeners,
//! accessors, destroy callbacks) releases its borrow of these tables first,
//! so user code may freely call back into the engine.

mod registry;
mod properties;
mod events;
mod binding;
mod component;
mod composition;
mod lifecycle;

pub use registry::{
    current_scope, instance_count, is_a, is_alive, is_internal, lineage, on_destroy, release,
    reset_runtime, type_name,
};
pub use properties::*;
pub use events::*;
pub use binding::*;
pub use component::*;
pub use composition::*;
pub use lifecycle::*;
