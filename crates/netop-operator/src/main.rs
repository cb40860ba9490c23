//! Network operator - reconciles IPoIBNetwork resources into NetworkAttachmentDefinitions

mod controller_runner;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use netop_common::crd::IPoIBNetwork;
use netop_common::telemetry::{init_telemetry, TelemetryConfig};
use netop_common::ControllerConfig;

/// Network operator - declarative secondary networks for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "network-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches IPoIBNetwork resources and the NetworkAttachmentDefinitions
    /// created for them.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's rustls transport needs a process-level provider before any client exists
    install_crypto_provider()?;

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&IPoIBNetwork::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Install aws-lc-rs as the process-wide rustls crypto provider
fn install_crypto_provider() -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))
}

async fn run_controller() -> anyhow::Result<()> {
    // Read once; the controller never re-reads the environment
    let config = ControllerConfig::from_env()?;
    tracing::info!(?config, "Loaded controller configuration");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    tracing::info!("Starting controllers:");
    let controllers =
        controller_runner::build_ipoib_controllers(client, config, shutdown.clone())?;

    futures::future::join_all(controllers).await;
    shutdown.cancel();

    tracing::info!("Controllers stopped");
    Ok(())
}

/// Cancel in-flight reconciliations on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received, cancelling in-flight reconciliations");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn controller_is_the_default_mode() {
        let cli = Cli::parse_from(["network-operator"]);
        assert!(!cli.crd);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["network-operator", "controller"]);
        assert!(matches!(cli.command, Some(Commands::Controller)));
    }

    /// Story: the controller can build a TLS client once startup ran
    #[tokio::test]
    async fn story_tls_client_builds_after_provider_install() {
        // A second install in the same test binary reports an error, which is fine here
        let _ = install_crypto_provider();

        let config = kube::Config::new("https://127.0.0.1:6443".parse().unwrap());
        assert!(Client::try_from(config).is_ok());
    }

    #[test]
    fn crd_manifest_describes_ipoib_networks() {
        let crd = IPoIBNetwork::crd();
        assert_eq!(crd.spec.group, "mellanox.com");
        assert_eq!(crd.spec.names.kind, "IPoIBNetwork");
        assert_eq!(crd.spec.scope, "Namespaced");
        let yaml = serde_yaml::to_string(&crd).unwrap();
        assert!(yaml.contains("networkNamespace"));
        assert!(yaml.contains("attachmentRef"));
    }
}
