//! Watch registration for the IPoIBNetwork controller
//!
//! The primary kind triggers its own identity. Every kind reported by the
//! state manager's `watch_sources` triggers the network that owns the
//! changed object, found through its back-reference:
//! - a controller ownerReference of kind IPoIBNetwork (same namespace)
//! - otherwise the owner annotation `<namespace>/<name>`, used when the
//!   dependent lives in another namespace
//!
//! Objects with neither trigger nothing. Dedup of queued identities and
//! per-object serialization are the controller runtime's.

use std::sync::Arc;
use std::time::Duration;

use kube::api::DynamicObject;
use kube::core::ApiResource;
use kube::runtime::controller::Config as ControllerRuntimeConfig;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use netop_common::crd::IPoIBNetwork;
use netop_common::{ControllerConfig, Error, IPOIB_NETWORK_CRD_NAME, OWNER_ANNOTATION};

use crate::controller::Context;

/// Watcher timeout (seconds), kept below the client read timeout so idle
/// watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Window for coalescing bursts of events for one identity
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Identity of the network that owns `obj`, if any
pub fn owner_request(obj: &DynamicObject) -> Option<ObjectRef<IPoIBNetwork>> {
    let kind = IPoIBNetwork::kind(&());
    let api_version = IPoIBNetwork::api_version(&());

    let controller = obj
        .owner_references()
        .iter()
        .find(|o| o.controller == Some(true) && o.kind == kind && o.api_version == api_version);
    if let Some(owner) = controller {
        let namespace = obj.namespace()?;
        return Some(ObjectRef::new(&owner.name).within(&namespace));
    }

    let (namespace, name) = obj.annotations().get(OWNER_ANNOTATION)?.split_once('/')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some(ObjectRef::new(name).within(namespace))
}

/// Build the controller over the primary kind and each watch source
pub fn build_controller(
    client: Client,
    watch_sources: &[ApiResource],
    config: &ControllerConfig,
) -> Controller<IPoIBNetwork> {
    let networks: Api<IPoIBNetwork> = Api::all(client.clone());
    let runtime_config = ControllerRuntimeConfig::default()
        .concurrency(config.concurrency)
        .debounce(DEBOUNCE);

    let mut controller = Controller::new(
        networks,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .with_config(runtime_config);

    for source in watch_sources {
        info!(kind = %source.kind, group = %source.group, "watching dependent kind");
        let api: Api<DynamicObject> = Api::all_with(client.clone(), source);
        controller = controller.watches_with(
            api,
            source.clone(),
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
            |obj| {
                let owner = owner_request(&obj);
                if owner.is_none() {
                    debug!(object = %obj.name_any(), "dependent has no IPoIBNetwork owner");
                }
                owner
            },
        );
    }

    controller
}

/// Wire the controller and its context
///
/// The state manager is constructed first; if that fails nothing is
/// registered and the error is returned so startup can abort.
pub fn setup(
    client: Client,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> Result<(Controller<IPoIBNetwork>, Arc<Context>), Error> {
    let state_manager = netop_state::new_manager(IPOIB_NETWORK_CRD_NAME, client.clone())?;
    let watch_sources = state_manager.watch_sources();

    let controller = build_controller(client.clone(), &watch_sources, &config);
    let ctx = Arc::new(Context::from_client(
        client,
        state_manager,
        config,
        shutdown,
    ));
    Ok((controller, ctx))
}
