//! IPoIBNetwork status reporting
//!
//! Status is derived only from the latest sync pass: state from the primary
//! component, reason from the sync error, and the attachment link when the
//! network is Ready and its NetworkAttachmentDefinition can be read.

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

use netop_common::crd::{IPoIBNetwork, IPoIBNetworkStatus, State};
use netop_common::events::{actions, reasons};
use netop_common::Error;
use netop_state::SyncResults;

use crate::controller::Context;

/// Status implied by a sync pass, before the attachment lookup
pub fn compute_status(results: &SyncResults, sync_error: Option<&Error>) -> IPoIBNetworkStatus {
    IPoIBNetworkStatus {
        state: results.primary_status().into(),
        reason: sync_error.map(|e| e.to_string()),
        attachment_ref: None,
    }
}

/// Fold a sync pass into the network's status and persist it
///
/// A failed attachment lookup does not stop the write; it is returned once
/// the write succeeded. A failed write always wins over the lookup error.
/// Nothing is written when the status is unchanged.
pub async fn update_status(
    network: &IPoIBNetwork,
    results: &SyncResults,
    sync_error: Option<&Error>,
    ctx: &Context,
) -> Result<(), Error> {
    let name = network.name_any();
    let namespace = network.namespace().unwrap_or_default();

    let mut status = compute_status(results, sync_error);
    let mut lookup_error = None;

    if status.state == State::Ready {
        let target_ns = network.spec.network_namespace.as_str();
        match ctx.kube.get_network_attachment(&name, target_ns).await {
            Ok(Some(nad)) => status.attachment_ref = Some(nad.link()),
            Ok(None) => {
                let e = Error::attachment_not_found(name.as_str(), target_ns);
                warn!(error = %e, "network attachment lookup failed");
                lookup_error = Some(e);
            }
            Err(e) => {
                warn!(error = %e, "network attachment lookup failed");
                lookup_error = Some(e);
            }
        }
    }

    if network.status.as_ref() == Some(&status) {
        debug!("status unchanged, skipping write");
    } else {
        ctx.kube
            .patch_network_status(&name, &namespace, network.resource_version(), &status)
            .await?;
        debug!(state = %status.state, "status updated");
        publish_transition(network, &status, ctx).await;
    }

    match lookup_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Emit an Event when the state changed
async fn publish_transition(network: &IPoIBNetwork, status: &IPoIBNetworkStatus, ctx: &Context) {
    let previous = network.status.as_ref().map(|s| s.state);
    if previous == Some(status.state) {
        return;
    }

    let (type_, reason) = match (status.state, &status.reason) {
        (State::Ready, _) => (EventType::Normal, reasons::NETWORK_READY),
        (_, Some(_)) => (EventType::Warning, reasons::SYNC_FAILED),
        _ => (EventType::Normal, reasons::NETWORK_NOT_READY),
    };
    let note = status
        .reason
        .clone()
        .or_else(|| Some(format!("network is {}", status.state)));

    ctx.events
        .publish(
            &network.object_ref(&()),
            type_,
            reason,
            actions::RECONCILE,
            note,
        )
        .await;
}
