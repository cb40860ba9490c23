//! IPoIBNetwork reconciliation loop
//!
//! One attempt: fetch the network by identity, hand it to the state manager,
//! fold the outcome into status, then requeue after the configured delay
//! unless the network's own component reports Ready.
//!
//! A network that no longer exists ends the attempt quietly; dependents are
//! left to the garbage collector.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use netop_common::crd::{IPoIBNetwork, IPoIBNetworkStatus, NetworkAttachmentDefinition};
use netop_common::events::{EventPublisher, KubeEventPublisher};
use netop_common::error::UNKNOWN_CONTEXT;
use netop_common::{metrics, ControllerConfig, Error, FIELD_MANAGER};
use netop_state::{StateManager, SyncState};

use crate::locks::KeyLocks;
use crate::status;
use crate::CONTROLLER_NAME;

// =============================================================================
// Cluster store
// =============================================================================

/// Cluster operations the loop depends on
///
/// Mocked in tests; [`IPoIBKubeClientImpl`] talks to the API server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IPoIBKubeClient: Send + Sync {
    /// Get an IPoIBNetwork, None when it does not exist
    async fn get_network(&self, name: &str, namespace: &str)
        -> Result<Option<IPoIBNetwork>, Error>;

    /// Get a NetworkAttachmentDefinition, None when it does not exist
    async fn get_network_attachment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<NetworkAttachmentDefinition>, Error>;

    /// Write the status of an IPoIBNetwork
    ///
    /// With a `resource_version` the write is conditional: it fails with
    /// [`Error::Conflict`] when the object changed since it was read.
    async fn patch_network_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &IPoIBNetworkStatus,
    ) -> Result<(), Error>;
}

/// API server backed [`IPoIBKubeClient`]
pub struct IPoIBKubeClientImpl {
    client: Client,
}

impl IPoIBKubeClientImpl {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IPoIBKubeClient for IPoIBKubeClientImpl {
    async fn get_network(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<IPoIBNetwork>, Error> {
        let api: Api<IPoIBNetwork> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(format!("{namespace}/{name}"), e))
    }

    async fn get_network_attachment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<NetworkAttachmentDefinition>, Error> {
        let api: Api<NetworkAttachmentDefinition> =
            Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(format!("{namespace}/{name}"), e))
    }

    async fn patch_network_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &IPoIBNetworkStatus,
    ) -> Result<(), Error> {
        let api: Api<IPoIBNetwork> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = status_patch(resource_version, status);

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| Error::from_kube(format!("{namespace}/{name}"), e))?;

        Ok(())
    }
}

/// Merge patch body for a status write
///
/// The API server rejects a merge patch whose `metadata.resourceVersion` is
/// stale, which turns the write into a compare-and-swap.
fn status_patch(
    resource_version: Option<String>,
    status: &IPoIBNetworkStatus,
) -> serde_json::Value {
    // Unset fields must be nulled explicitly or the merge keeps the old value
    let status_json = serde_json::json!({
        "state": status.state,
        "reason": status.reason,
        "attachmentRef": status.attachment_ref,
    });
    match resource_version {
        Some(rv) => serde_json::json!({
            "metadata": { "resourceVersion": rv },
            "status": status_json,
        }),
        None => serde_json::json!({ "status": status_json }),
    }
}

// =============================================================================
// Requests and outcomes
// =============================================================================

/// Identity of the network to reconcile
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
}

impl ReconcileRequest {
    /// Create a request for `namespace/name`
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&IPoIBNetwork> for ReconcileRequest {
    fn from(network: &IPoIBNetwork) -> Self {
        Self::new(network.name_any(), network.namespace().unwrap_or_default())
    }
}

impl From<&ObjectRef<IPoIBNetwork>> for ReconcileRequest {
    fn from(obj: &ObjectRef<IPoIBNetwork>) -> Self {
        Self::new(obj.name.clone(), obj.namespace.clone().unwrap_or_default())
    }
}

/// What the work queue should do after a successful attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged or gone; wait for the next change
    Done,
    /// Not converged yet; try again after the delay
    RequeueAfter(Duration),
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Done => Action::await_change(),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared state for every reconciliation
pub struct Context {
    /// Cluster store
    pub kube: Arc<dyn IPoIBKubeClient>,
    /// Converges dependents of a network
    pub state_manager: Arc<dyn StateManager>,
    /// Settings loaded once at startup
    pub config: ControllerConfig,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-identity serialization
    pub locks: KeyLocks,
    /// Cancelled when the process shuts down
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a context from explicit dependencies
    pub fn new(
        kube: Arc<dyn IPoIBKubeClient>,
        state_manager: Arc<dyn StateManager>,
        config: ControllerConfig,
        events: Arc<dyn EventPublisher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            kube,
            state_manager,
            config,
            events,
            locks: KeyLocks::new(),
            shutdown,
        }
    }

    /// Create a context backed by the API server
    pub fn from_client(
        client: Client,
        state_manager: Arc<dyn StateManager>,
        config: ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER));
        Self::new(
            Arc::new(IPoIBKubeClientImpl::new(client)),
            state_manager,
            config,
            events,
            shutdown,
        )
    }

    /// Create a context for tests with default configuration and no events
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn IPoIBKubeClient>,
        state_manager: Arc<dyn StateManager>,
    ) -> Self {
        Self::new(
            kube,
            state_manager,
            ControllerConfig::default(),
            Arc::new(netop_common::events::NoopEventPublisher),
            CancellationToken::new(),
        )
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile the network identified by `request`
///
/// The attempt holds the identity's lock, is bounded by the configured
/// timeout and aborts when shutdown begins. Aborted attempts fail with a
/// retryable error and never count as converged.
#[instrument(skip(request, ctx), fields(network = %request))]
pub async fn reconcile_request(
    request: &ReconcileRequest,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let started = Instant::now();
    let timeout = ctx.config.reconcile_timeout;

    let attempt = async {
        let _guard = ctx.locks.acquire(request).await;
        reconcile_once(request, ctx).await
    };

    let result = tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => Err(Error::cancelled(request.to_string())),
        res = tokio::time::timeout(timeout, attempt) => {
            res.unwrap_or_else(|_| Err(Error::timeout(request.to_string(), timeout.as_secs())))
        }
    };

    metrics::record_reconcile(
        CONTROLLER_NAME,
        started.elapsed().as_secs_f64(),
        result.is_ok(),
    );
    result
}

async fn reconcile_once(
    request: &ReconcileRequest,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let Some(network) = ctx
        .kube
        .get_network(&request.name, &request.namespace)
        .await?
    else {
        debug!("network not found, assuming it was deleted");
        return Ok(ReconcileOutcome::Done);
    };

    debug!(target_namespace = %network.spec.network_namespace, "syncing network state");
    let outcome = ctx.state_manager.sync_state(&network, None).await;
    if let Some(e) = &outcome.error {
        warn!(error = %e, "state manager reported an error");
    }

    status::update_status(&network, &outcome.results, outcome.error.as_ref(), ctx).await?;

    // Only the network's own component decides; the aggregate is informational
    let overall = outcome.results.overall_status();
    match outcome.results.primary_status() {
        SyncState::Ready => {
            info!(?overall, "network ready");
            Ok(ReconcileOutcome::Done)
        }
        state => {
            debug!(
                ?state,
                ?overall,
                delay = ?ctx.config.requeue_after,
                "network not ready, requeueing"
            );
            metrics::record_requeue(CONTROLLER_NAME);
            Ok(ReconcileOutcome::RequeueAfter(ctx.config.requeue_after))
        }
    }
}

/// Entry point for `kube::runtime::Controller`
///
/// The watched object only supplies the identity; the attempt re-reads the
/// network so the status write is conditioned on the latest version.
pub async fn reconcile(network: Arc<IPoIBNetwork>, ctx: Arc<Context>) -> Result<Action, Error> {
    let request = ReconcileRequest::from(network.as_ref());
    reconcile_request(&request, &ctx).await.map(Action::from)
}

/// Error policy: log, count and retry after the configured backoff
pub fn error_policy(network: Arc<IPoIBNetwork>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        network = %network.key(),
        resource = error.resource().unwrap_or(UNKNOWN_CONTEXT),
        error = %error,
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    metrics::record_error(CONTROLLER_NAME, error.kind_label());
    Action::requeue(ctx.config.error_backoff)
}
