//! Controller configuration
//!
//! Values come from the process environment through the `EnvSource` trait so
//! tests can supply them without touching global state.

use std::time::Duration;

use crate::{Error, Result, ERROR_REQUEUE_SECS, FIELD_MANAGER, SYNC_PERIOD_SECS};

/// Environment variable overriding the periodic sync interval (seconds)
pub const SYNC_PERIOD_ENV: &str = "IAM_SYNC_PERIOD_SECS";
/// Environment variable overriding the error requeue interval (seconds)
pub const ERROR_REQUEUE_ENV: &str = "IAM_ERROR_REQUEUE_SECS";
/// Environment variable naming the namespace the controller runs in
pub const CONTROLLER_NAMESPACE_ENV: &str = "CONTROLLER_NAMESPACE";
/// Environment variable overriding the status field manager
pub const FIELD_MANAGER_ENV: &str = "IAM_FIELD_MANAGER";

/// Namespace assumed when the controller namespace is not configured
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "default";

/// Trait for reading environment variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Look up a variable, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from the process environment
#[derive(Clone, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Runtime settings for every IAM controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Requeue interval after a pass that completed without error
    pub sync_period: Duration,
    /// Requeue interval after a pass that returned an error
    pub error_requeue: Duration,
    /// Namespace the controller runs in; holds the management config map
    pub controller_namespace: String,
    /// Field manager for status patches
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(SYNC_PERIOD_SECS),
            error_requeue: Duration::from_secs(ERROR_REQUEUE_SECS),
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            field_manager: FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Build the configuration from environment variables, falling back to defaults
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            sync_period: seconds(env, SYNC_PERIOD_ENV)?.unwrap_or(defaults.sync_period),
            error_requeue: seconds(env, ERROR_REQUEUE_ENV)?.unwrap_or(defaults.error_requeue),
            controller_namespace: non_empty(env, CONTROLLER_NAMESPACE_ENV)
                .unwrap_or(defaults.controller_namespace),
            field_manager: non_empty(env, FIELD_MANAGER_ENV).unwrap_or(defaults.field_manager),
        })
    }
}

fn non_empty(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn seconds(env: &dyn EnvSource, key: &str) -> Result<Option<Duration>> {
    let Some(raw) = non_empty(env, key) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(Error::validation(key, "must be greater than zero")),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(e) => Err(Error::validation(key, format!("invalid seconds '{raw}': {e}"))),
    }
}
