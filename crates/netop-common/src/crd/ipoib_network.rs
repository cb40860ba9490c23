//! IPoIBNetwork CRD
//!
//! An IPoIBNetwork describes an IP-over-InfiniBand secondary network. The
//! controller only reads `spec.networkNamespace`; the remaining spec fields are
//! passed through to the state manager untouched.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_network_namespace() -> String {
    "default".to_string()
}

/// IPoIBNetwork defines an IPoIB network attachment.
///
/// Example:
/// ```yaml
/// apiVersion: mellanox.com/v1alpha1
/// kind: IPoIBNetwork
/// metadata:
///   name: net-a
///   namespace: ns1
/// spec:
///   networkNamespace: ns2
///   master: ibs3
///   ipam: '{"type": "whereabouts", "range": "192.168.5.225/28"}'
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "mellanox.com",
    version = "v1alpha1",
    kind = "IPoIBNetwork",
    namespaced,
    status = "IPoIBNetworkStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IPoIBNetworkSpec {
    /// Namespace the NetworkAttachmentDefinition is created in
    #[serde(default = "default_network_namespace")]
    pub network_namespace: String,

    /// Name of the host InfiniBand interface to attach to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,

    /// IPAM configuration as a JSON document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<String>,
}

/// Observed state summary written by the controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IPoIBNetworkStatus {
    /// Convergence state of the network
    #[serde(default)]
    pub state: State,

    /// Message from the last failed synchronization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Link to the NetworkAttachmentDefinition, set once the network is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
}

/// Convergence state of a custom resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum State {
    /// Every managed object matches the desired state
    Ready,
    /// Convergence is still in progress
    #[default]
    NotReady,
    /// The resource is intentionally not acted upon
    Ignore,
    /// Managed objects are being recreated from scratch
    Reset,
    /// Synchronization failed in a way that needs attention
    Error,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "notReady"),
            Self::Ignore => write!(f, "ignore"),
            Self::Reset => write!(f, "reset"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl IPoIBNetwork {
    /// `<namespace>/<name>` key used in logs and errors
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Current status state, NotReady when no status was written yet
    pub fn state(&self) -> State {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}
