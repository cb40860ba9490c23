//! State manager: runs the component states of one CRD kind in order

use std::sync::Arc;

use async_trait::async_trait;
use kube::core::ApiResource;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use netop_common::crd::{IPoIBNetwork, IPoIBNetworkSpec};
use netop_common::{Error, IPOIB_NETWORK_CRD_NAME};
use tracing::{debug, instrument, warn};

use crate::network_attachment::NetworkAttachmentState;
use crate::results::{StateResult, SyncOutcome, SyncResults, SyncState};

/// Converges the objects managed on behalf of a custom resource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateManager: Send + Sync {
    /// Bring every managed object in line with `network`
    ///
    /// `prior` is the spec the previous pass converged to, when known.
    /// Failures are reported inside the outcome, never as a panic.
    async fn sync_state(
        &self,
        network: &IPoIBNetwork,
        prior: Option<IPoIBNetworkSpec>,
    ) -> SyncOutcome;

    /// Object kinds whose changes should reconcile their owning resource
    fn watch_sources(&self) -> Vec<ApiResource>;
}

/// One managed component
#[cfg_attr(test, automock)]
#[async_trait]
pub trait State: Send + Sync {
    /// Stable name reported in results (e.g. "state-network-attachment")
    fn name(&self) -> &'static str;

    /// Converge this component and report how far it got
    async fn sync(&self, network: &IPoIBNetwork) -> Result<SyncState, Error>;

    /// Object kind this component creates
    fn watch_source(&self) -> ApiResource;
}

/// Runs component states in registration order
///
/// The pass stops at the first component that fails; components after it
/// are not run and do not appear in the results.
pub struct Manager {
    states: Vec<Arc<dyn State>>,
}

impl Manager {
    /// Create a manager over an ordered list of states
    pub fn new(crd_kind: &str, states: Vec<Arc<dyn State>>) -> Result<Self, Error> {
        if states.is_empty() {
            return Err(Error::state_manager_init(
                crd_kind,
                "no component states registered",
            ));
        }
        Ok(Self { states })
    }
}

#[async_trait]
impl StateManager for Manager {
    #[instrument(skip(self, network, prior), fields(network = %network.key()))]
    async fn sync_state(
        &self,
        network: &IPoIBNetwork,
        prior: Option<IPoIBNetworkSpec>,
    ) -> SyncOutcome {
        if prior.as_ref() == Some(&network.spec) {
            debug!("spec unchanged since last pass");
        }

        let mut states = Vec::with_capacity(self.states.len());
        for state in &self.states {
            match state.sync(network).await {
                Ok(status) => {
                    debug!(state = state.name(), ?status, "state synced");
                    states.push(StateResult::new(state.name(), status));
                }
                Err(e) => {
                    // Errors that need a spec fix surface as Error, the rest as NotReady
                    let status = if e.is_retryable() {
                        SyncState::NotReady
                    } else {
                        SyncState::Error
                    };
                    warn!(state = state.name(), error = %e, "state sync failed");
                    states.push(StateResult::failed(state.name(), status, &e));
                    let err = Error::sync(network.key(), state.name(), e.to_string());
                    return SyncOutcome::failed(SyncResults::from_states(states), err);
                }
            }
        }
        SyncOutcome::ok(SyncResults::from_states(states))
    }

    fn watch_sources(&self) -> Vec<ApiResource> {
        let mut sources: Vec<ApiResource> = Vec::with_capacity(self.states.len());
        for state in &self.states {
            let source = state.watch_source();
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources
    }
}

/// Build the state manager registered for `crd_kind`
///
/// Unknown kinds are an initialization error; the caller is expected to
/// abort startup.
pub fn new_manager(crd_kind: &str, client: Client) -> Result<Arc<dyn StateManager>, Error> {
    let states: Vec<Arc<dyn State>> = match crd_kind {
        IPOIB_NETWORK_CRD_NAME => vec![Arc::new(NetworkAttachmentState::new(client))],
        other => {
            return Err(Error::state_manager_init(
                other,
                "no state manager registered for this kind",
            ))
        }
    };
    Ok(Arc::new(Manager::new(crd_kind, states)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netop_common::crd::NetworkAttachmentDefinition;
    use std::sync::Mutex;

    fn network() -> IPoIBNetwork {
        let mut network = IPoIBNetwork::new(
            "net-a",
            IPoIBNetworkSpec {
                network_namespace: "ns2".to_string(),
                master: Some("ibs3".to_string()),
                ipam: None,
            },
        );
        network.metadata.namespace = Some("ns1".to_string());
        network
    }

    fn nad_resource() -> ApiResource {
        ApiResource::erase::<NetworkAttachmentDefinition>(&())
    }

    fn state(name: &'static str, result: Result<SyncState, Error>) -> MockState {
        let mut state = MockState::new();
        state.expect_name().return_const(name);
        state.expect_sync().times(1).return_once(move |_| result);
        state.expect_watch_source().returning(nad_resource);
        state
    }

    /// Story: every component converges and each reports in order
    #[tokio::test]
    async fn story_all_states_ready() {
        let manager = Manager::new(
            IPOIB_NETWORK_CRD_NAME,
            vec![
                Arc::new(state("first", Ok(SyncState::Ready))),
                Arc::new(state("second", Ok(SyncState::Ready))),
            ],
        )
        .unwrap();

        let outcome = manager.sync_state(&network(), None).await;

        assert!(outcome.error.is_none());
        let names: Vec<_> = outcome
            .results
            .states
            .iter()
            .map(|s| s.state_name.as_str())
            .collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(outcome.results.primary_status(), SyncState::Ready);
        assert_eq!(outcome.results.overall_status(), SyncState::Ready);
    }

    /// Story: a failing component stops the pass and the later ones never run
    #[tokio::test]
    async fn story_first_failure_stops_the_pass() {
        let calls = Arc::new(Mutex::new(0));
        let mut never = MockState::new();
        never.expect_name().return_const("never");
        let counter = calls.clone();
        never.expect_sync().returning(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(SyncState::Ready)
        });

        let manager = Manager::new(
            IPOIB_NETWORK_CRD_NAME,
            vec![
                Arc::new(state(
                    "first",
                    Err(Error::internal_with_context("apply", "device busy")),
                )),
                Arc::new(never),
            ],
        )
        .unwrap();

        let outcome = manager.sync_state(&network(), None).await;

        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(outcome.results.states.len(), 1);
        assert_eq!(outcome.results.primary_status(), SyncState::NotReady);
        let err = outcome.error.expect("pass should fail");
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("ns1/net-a"));
        assert!(msg.contains("device busy"));
    }

    #[tokio::test]
    async fn permanent_failure_reports_error_state() {
        let manager = Manager::new(
            IPOIB_NETWORK_CRD_NAME,
            vec![Arc::new(state(
                "first",
                Err(Error::validation_for_field("ns1/net-a", "spec.ipam", "invalid JSON")),
            ))],
        )
        .unwrap();

        let outcome = manager.sync_state(&network(), Some(network().spec)).await;

        assert_eq!(outcome.results.primary_status(), SyncState::Error);
        assert!(outcome.results.states[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("invalid JSON")));
        assert!(outcome.error.is_some());
    }

    #[test]
    fn watch_sources_are_deduplicated() {
        let mut a = MockState::new();
        a.expect_watch_source().returning(nad_resource);
        let mut b = MockState::new();
        b.expect_watch_source().returning(nad_resource);

        let manager =
            Manager::new(IPOIB_NETWORK_CRD_NAME, vec![Arc::new(a), Arc::new(b)]).unwrap();
        let sources = manager.watch_sources();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].kind, "NetworkAttachmentDefinition");
        assert_eq!(sources[0].plural, "network-attachment-definitions");
    }

    #[test]
    fn manager_without_states_is_an_init_error() {
        let err = Manager::new("IPoIBNetwork", Vec::new()).err().unwrap();
        assert!(matches!(err, Error::StateManagerInit { .. }));
    }

    fn offline_client() -> Client {
        // Install the crypto provider for rustls (ignore error if already installed)
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let config = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
        Client::try_from(config).unwrap()
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let err = new_manager("MacvlanNetwork", offline_client()).err().unwrap();
        match err {
            Error::StateManagerInit { crd, .. } => assert_eq!(crd, "MacvlanNetwork"),
            other => panic!("expected StateManagerInit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ipoib_kind_watches_network_attachments() {
        let manager = new_manager(IPOIB_NETWORK_CRD_NAME, offline_client()).unwrap();
        assert_eq!(manager.watch_sources(), vec![nad_resource()]);
    }
}
