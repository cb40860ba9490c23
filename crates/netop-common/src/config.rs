//! Controller configuration loaded once at startup
//!
//! Values come from the process environment through the [`EnvSource`] trait,
//! so tests can inject them without touching global state. The resulting
//! [`ControllerConfig`] is handed to the reconciler's constructor and never
//! re-read for the lifetime of the controller.

use std::time::Duration;

use crate::Error;

/// Requeue delay while a resource has not converged
pub const REQUEUE_TIME_ENV: &str = "CONTROLLER_REQUEUE_TIME_SECONDS";
/// Delay before retrying a failed reconciliation
pub const ERROR_BACKOFF_ENV: &str = "CONTROLLER_ERROR_BACKOFF_SECONDS";
/// Deadline for a single reconciliation attempt
pub const RECONCILE_TIMEOUT_ENV: &str = "CONTROLLER_RECONCILE_TIMEOUT_SECONDS";
/// Maximum number of resources reconciled concurrently
pub const CONCURRENCY_ENV: &str = "CONTROLLER_CONCURRENCY";

const DEFAULT_REQUEUE_SECS: u64 = 5;
const DEFAULT_ERROR_BACKOFF_SECS: u64 = 5;
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONCURRENCY: u16 = 4;

/// Source of configuration values
///
/// Abstracts reading environment variables, enabling unit tests without
/// manipulating the process environment.
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Look up a variable, returning None when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Immutable controller settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay before reconciling again while the resource is not Ready
    pub requeue_after: Duration,
    /// Delay before retrying after a reconciliation error
    pub error_backoff: Duration,
    /// Upper bound on a single reconciliation attempt
    pub reconcile_timeout: Duration,
    /// Maximum number of concurrent reconciliations (distinct resources)
    pub concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_source(&OsEnv)
    }

    /// Load configuration from the given source, applying defaults for unset keys
    pub fn from_source(env: &dyn EnvSource) -> Result<Self, Error> {
        let requeue_secs = positive(env, REQUEUE_TIME_ENV, DEFAULT_REQUEUE_SECS)?;
        let backoff_secs = positive(env, ERROR_BACKOFF_ENV, DEFAULT_ERROR_BACKOFF_SECS)?;
        let timeout_secs = positive(env, RECONCILE_TIMEOUT_ENV, DEFAULT_RECONCILE_TIMEOUT_SECS)?;
        let concurrency = positive(env, CONCURRENCY_ENV, u64::from(DEFAULT_CONCURRENCY))?;
        let concurrency = u16::try_from(concurrency)
            .map_err(|_| Error::config(CONCURRENCY_ENV, format!("{concurrency} is too large")))?;

        Ok(Self {
            requeue_after: Duration::from_secs(requeue_secs),
            error_backoff: Duration::from_secs(backoff_secs),
            reconcile_timeout: Duration::from_secs(timeout_secs),
            concurrency,
        })
    }

    /// Override the requeue delay
    pub fn with_requeue_after(mut self, requeue_after: Duration) -> Self {
        self.requeue_after = requeue_after;
        self
    }
}

/// Parse a strictly positive integer, falling back to `default` when unset
fn positive(env: &dyn EnvSource, key: &str, default: u64) -> Result<u64, Error> {
    let Some(raw) = env.var(key) else {
        return Ok(default);
    };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::config(key, format!("expected a positive integer, got {raw:?}")))?;
    if value == 0 {
        return Err(Error::config(key, "must be greater than zero"));
    }
    Ok(value)
}
