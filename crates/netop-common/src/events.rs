//! Events emitted when a network changes state
//!
//! Publishing is best effort. A rejected Event is logged and dropped; the
//! reconciliation that raised it carries on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for Events about a referenced object
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `reason` and `action` against `resource_ref`, with an optional note
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Identity stamped on every Event: the field manager plus the pod, if known
fn reporter(controller_name: &str, instance: Option<String>) -> Reporter {
    Reporter {
        controller: controller_name.to_string(),
        instance,
    }
}

/// Publishes through the API server
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `controller_name` identifies the writer on each Event
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = reporter(controller_name, std::env::var("POD_NAME").ok());
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "dropping event");
        }
    }
}

/// Discards everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _: &ObjectReference, _: EventType, _: &str, _: &str, _: Option<String>) {}
}

/// Event reasons, one per status transition
pub mod reasons {
    /// Every managed component reports ready
    pub const NETWORK_READY: &str = "NetworkReady";
    /// Convergence is still in progress
    pub const NETWORK_NOT_READY: &str = "NetworkNotReady";
    /// The state manager reported an error
    pub const SYNC_FAILED: &str = "SyncFailed";
}

/// Event actions
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
}
