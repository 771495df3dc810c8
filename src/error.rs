//! Error taxonomy for the runtime.
//!
//! Every failure is returned synchronously to the caller of the operation
//! that detected it. Nothing is swallowed.

use thiserror::Error;

use crate::types::InstanceId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    #[error("property '{property}' is already declared on {instance}")]
    DuplicateProperty { instance: InstanceId, property: String },

    #[error("{instance} has no property '{property}'")]
    UnknownProperty { instance: InstanceId, property: String },

    #[error("type mismatch on '{target}': expected {expected}, found {found}")]
    TypeMismatch {
        target: String,
        expected: String,
        found: String,
    },

    #[error("binding dependency {instance}.{property} does not resolve to a property")]
    DependencyMissing { instance: InstanceId, property: String },

    #[error("{child} already has parent {parent}")]
    AlreadyParented { child: InstanceId, parent: InstanceId },

    #[error("{instance} read '{what}' before completion")]
    PrematureAccess { instance: InstanceId, what: String },

    #[error("{0} is not a live instance")]
    UnknownInstance(InstanceId),

    #[error("{child} was not parented to {parent} before child assignment")]
    NotParented { child: InstanceId, parent: InstanceId },

    #[error("parenting {child} under {parent} would create a cycle")]
    CyclicParent { child: InstanceId, parent: InstanceId },

    #[error("id '{id}' is already registered in the scope of {scope}")]
    DuplicateId { scope: InstanceId, id: String },

    #[error("event '{event}' is already declared on {instance}")]
    DuplicateEvent { instance: InstanceId, event: String },

    #[error("{instance} has no event '{event}'")]
    UnknownEvent { instance: InstanceId, event: String },

    #[error("event '{event}' expects {expected} argument(s), got {found}")]
    ArgumentCount {
        event: String,
        expected: usize,
        found: usize,
    },

    #[error("property {instance}.{property} does not hold a component type")]
    NotAComponent { instance: InstanceId, property: String },

    /// Raised by user code (initializers, evaluators, accessors, listeners).
    #[error("{0}")]
    Custom(String),
}

impl ElementError {
    /// Failure reported from inside user-supplied code.
    pub fn custom(message: impl Into<String>) -> Self {
        ElementError::Custom(message.into())
    }
}

pub type Result<T, E = ElementError> = std::result::Result<T, E>;
