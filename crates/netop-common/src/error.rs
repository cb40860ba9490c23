//! Error types for the network operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the resource they concern (as `<namespace>/<name>`) where
//! one is known, so logs and status reasons point at the right object.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for network operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Optimistic concurrency conflict: the object changed since it was read
    #[error("conflict updating {resource}: {message}")]
    Conflict {
        /// Resource whose write was rejected
        resource: String,
        /// Message returned by the API server
        message: String,
    },

    /// The dependent NetworkAttachmentDefinition does not exist
    #[error("network attachment definition {namespace}/{name} not found")]
    AttachmentNotFound {
        /// Name of the attachment
        name: String,
        /// Namespace the attachment was expected in
        namespace: String,
    },

    /// State synchronization failed for a managed component
    #[error("sync error [{state}] for {resource}: {message}")]
    Sync {
        /// Resource being synchronized
        resource: String,
        /// Component state that failed
        state: String,
        /// Description of what failed
        message: String,
    },

    /// Validation error for CRD specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.ipam")
        field: Option<String>,
    },

    /// Invalid process configuration
    #[error("configuration error for {key}: {message}")]
    Config {
        /// Configuration key (environment variable name)
        key: String,
        /// Description of what's invalid
        message: String,
    },

    /// The state manager could not be constructed
    #[error("failed to create state manager for {crd}: {message}")]
    StateManagerInit {
        /// CRD kind the manager was requested for
        crd: String,
        /// Description of what failed
        message: String,
    },

    /// A reconciliation attempt exceeded its deadline
    #[error("reconciliation of {resource} timed out after {seconds}s")]
    Timeout {
        /// Resource being reconciled
        resource: String,
        /// Deadline that was exceeded
        seconds: u64,
    },

    /// A reconciliation attempt was aborted by shutdown
    #[error("reconciliation of {resource} cancelled")]
    Cancelled {
        /// Resource being reconciled
        resource: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "watcher")
        context: String,
    },
}

impl From<kube::Error> for Error {
    fn from(source: kube::Error) -> Self {
        Self::from_kube(UNKNOWN_CONTEXT, source)
    }
}

impl Error {
    /// Convert a kube error, splitting out optimistic concurrency conflicts
    ///
    /// HTTP 409 becomes [`Error::Conflict`] so callers can tell a stale write
    /// apart from other API failures.
    pub fn from_kube(resource: impl Into<String>, source: kube::Error) -> Self {
        match source {
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                resource: resource.into(),
                message: ae.message,
            },
            source => Self::Kube { source },
        }
    }

    /// Create a conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create an error for a missing NetworkAttachmentDefinition
    pub fn attachment_not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::AttachmentNotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a sync error for a component state
    pub fn sync(
        resource: impl Into<String>,
        state: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Sync {
            resource: resource.into(),
            state: state.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without resource context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a configuration error
    pub fn config(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a state manager initialization error
    pub fn state_manager_init(crd: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StateManagerInit {
            crd: crd.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(resource: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            resource: resource.into(),
            seconds,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(resource: impl Into<String>) -> Self {
        Self::Cancelled {
            resource: resource.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, configuration and initialization errors
    /// need a fix before a retry can succeed. Conflicts, timeouts and
    /// cancellations always are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 429
            ),
            Error::Conflict { .. } => true,
            Error::AttachmentNotFound { .. } => true,
            Error::Sync { .. } => true,
            Error::Validation { .. } => false,
            Error::Config { .. } => false,
            Error::StateManagerInit { .. } => false,
            Error::Timeout { .. } => true,
            Error::Cancelled { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the resource this error concerns, if known
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Conflict { resource, .. }
            | Error::Sync { resource, .. }
            | Error::Validation { resource, .. }
            | Error::Timeout { resource, .. }
            | Error::Cancelled { resource } => Some(resource),
            _ => None,
        }
    }

    /// Short machine-readable label for metrics
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::Conflict { .. } => "conflict",
            Error::AttachmentNotFound { .. } => "attachment_not_found",
            Error::Sync { .. } => "sync",
            Error::Validation { .. } => "validation",
            Error::Config { .. } => "config",
            Error::StateManagerInit { .. } => "state_manager_init",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled { .. } => "cancelled",
            Error::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: a stale status write is reported as a distinguished conflict
    ///
    /// The status write carries the resourceVersion that was read. When
    /// somebody else updated the object in between, the API server answers
    /// 409 and the controller must retry with fresh state.
    #[test]
    fn story_stale_write_becomes_conflict() {
        let err = Error::from_kube("ns1/net-a", api_error(409, "Conflict"));
        match &err {
            Error::Conflict { resource, message } => {
                assert_eq!(resource, "ns1/net-a");
                assert!(message.contains("Conflict"));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(err.resource(), Some("ns1/net-a"));
    }

    #[test]
    fn other_api_errors_stay_kube_errors() {
        let err: Error = api_error(500, "InternalError").into();
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.is_retryable());

        let err: Error = api_error(403, "Forbidden").into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn throttling_is_retryable() {
        let err: Error = api_error(429, "TooManyRequests").into();
        assert!(err.is_retryable());
    }

    /// Story: configuration and init faults are not worth retrying
    #[test]
    fn story_startup_faults_are_permanent() {
        assert!(!Error::config("CONTROLLER_REQUEUE_TIME_SECONDS", "not a number").is_retryable());
        assert!(!Error::state_manager_init("Foo", "unknown kind").is_retryable());
        assert!(!Error::validation("bad ipam").is_retryable());
    }

    #[test]
    fn reconcile_aborts_are_retryable() {
        let timeout = Error::timeout("ns1/net-a", 30);
        assert!(timeout.is_retryable());
        assert!(timeout.to_string().contains("30s"));

        let cancelled = Error::cancelled("ns1/net-a");
        assert!(cancelled.is_retryable());
        assert_eq!(cancelled.resource(), Some("ns1/net-a"));
    }

    #[test]
    fn sync_error_message_includes_state_and_resource() {
        let err = Error::sync("ns1/net-a", "state-network-attachment", "device busy");
        let msg = err.to_string();
        assert!(msg.contains("state-network-attachment"));
        assert!(msg.contains("ns1/net-a"));
        assert!(msg.contains("device busy"));
    }

    #[test]
    fn attachment_not_found_names_the_object() {
        let err = Error::attachment_not_found("net-a", "ns2");
        assert_eq!(
            err.to_string(),
            "network attachment definition ns2/net-a not found"
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind_label(), "attachment_not_found");
    }

    #[test]
    fn validation_for_field_keeps_field_path() {
        let err = Error::validation_for_field("ns1/net-a", "spec.ipam", "invalid JSON");
        match &err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("spec.ipam")),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(Error::validation("x").resource(), Some(UNKNOWN_CONTEXT));
    }
}
