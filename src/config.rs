//! Runtime configuration.
//!
//! Two policies are configurable per thread:
//! - [`AccessPolicy`] - what an external read of a not-yet-evaluated bound
//!   property (or an id lookup before completion) does
//! - [`AssignmentPolicy`] - what an external `set` does to an active binding
//!
//! # Example
//!
//! ```ignore
//! use elements_runtime::{configure, RuntimeConfig, AccessPolicy};
//!
//! configure(RuntimeConfig {
//!     access_policy: AccessPolicy::DefaultValue,
//!     ..RuntimeConfig::from_env()
//! });
//! ```

use std::cell::Cell;

use tracing::warn;

/// Environment variable read by [`RuntimeConfig::from_env`] (`strict` | `default`).
pub const ACCESS_POLICY_ENV: &str = "ELEMENTS_ACCESS_POLICY";

/// Environment variable read by [`RuntimeConfig::from_env`] (`keep` | `detach`).
pub const ASSIGNMENT_POLICY_ENV: &str = "ELEMENTS_ASSIGNMENT_POLICY";

/// Premature access handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    /// Fail with `PrematureAccess`.
    #[default]
    Strict,
    /// Return the declared type's default value (ids: the table as it stands).
    DefaultValue,
}

impl AccessPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(AccessPolicy::Strict),
            "default" | "default-value" | "default_value" => Some(AccessPolicy::DefaultValue),
            _ => None,
        }
    }
}

/// External assignment to a property that carries a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentPolicy {
    /// The manual value stands until the next dependency firing overwrites it.
    #[default]
    KeepBinding,
    /// The binding is removed before the manual value is stored.
    DetachBinding,
}

impl AssignmentPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" | "keep-binding" | "keep_binding" => Some(AssignmentPolicy::KeepBinding),
            "detach" | "detach-binding" | "detach_binding" => {
                Some(AssignmentPolicy::DetachBinding)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    pub access_policy: AccessPolicy,
    pub assignment_policy: AssignmentPolicy,
}

impl RuntimeConfig {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ACCESS_POLICY_ENV) {
            match AccessPolicy::parse(&raw) {
                Some(policy) => config.access_policy = policy,
                None => warn!(value = %raw, "ignoring unknown {}", ACCESS_POLICY_ENV),
            }
        }

        if let Ok(raw) = std::env::var(ASSIGNMENT_POLICY_ENV) {
            match AssignmentPolicy::parse(&raw) {
                Some(policy) => config.assignment_policy = policy,
                None => warn!(value = %raw, "ignoring unknown {}", ASSIGNMENT_POLICY_ENV),
            }
        }

        config
    }
}

thread_local! {
    static CONFIG: Cell<RuntimeConfig> = Cell::new(RuntimeConfig::default());
}

/// Replace the configuration for this thread.
pub fn configure(config: RuntimeConfig) {
    CONFIG.with(|c| c.set(config));
}

/// Current configuration for this thread.
pub fn config() -> RuntimeConfig {
    CONFIG.with(|c| c.get())
}

/// Reset to defaults (for testing).
pub fn reset_config() {
    configure(RuntimeConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.access_policy, AccessPolicy::Strict);
        assert_eq!(config.assignment_policy, AssignmentPolicy::KeepBinding);
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                (ACCESS_POLICY_ENV, Some("default")),
                (ASSIGNMENT_POLICY_ENV, Some("Detach")),
            ],
            || {
                let config = RuntimeConfig::from_env();
                assert_eq!(config.access_policy, AccessPolicy::DefaultValue);
                assert_eq!(config.assignment_policy, AssignmentPolicy::DetachBinding);
            },
        );
    }

    #[test]
    fn test_from_env_ignores_unknown_values() {
        temp_env::with_vars(
            [
                (ACCESS_POLICY_ENV, Some("lenient")),
                (ASSIGNMENT_POLICY_ENV, None),
            ],
            || {
                assert_eq!(RuntimeConfig::from_env(), RuntimeConfig::default());
            },
        );
    }

    #[test]
    fn test_configure_is_per_thread() {
        reset_config();
        configure(RuntimeConfig {
            access_policy: AccessPolicy::DefaultValue,
            ..RuntimeConfig::default()
        });
        assert_eq!(config().access_policy, AccessPolicy::DefaultValue);

        let other = std::thread::spawn(|| config().access_policy).join().unwrap();
        assert_eq!(other, AccessPolicy::Strict);

        reset_config();
    }
}
