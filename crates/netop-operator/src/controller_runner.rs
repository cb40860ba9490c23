//! Controller runner - builds the controller futures the binary drives

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use kube::Client;
use tokio_util::sync::CancellationToken;

use netop_common::ControllerConfig;
use netop_ipoib::{error_policy, reconcile};

/// Build the IPoIBNetwork controller future
///
/// Fails when the state manager cannot be constructed, before any watch is
/// started.
pub fn build_ipoib_controllers(
    client: Client,
    config: ControllerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<Vec<Pin<Box<dyn Future<Output = ()> + Send>>>> {
    let (controller, ctx) = netop_ipoib::setup(client, config, shutdown)?;

    tracing::info!(
        concurrency = ctx.config.concurrency,
        requeue_after = ?ctx.config.requeue_after,
        "- IPoIBNetwork controller"
    );

    Ok(vec![Box::pin(
        controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("IPoIBNetwork")),
    )])
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
