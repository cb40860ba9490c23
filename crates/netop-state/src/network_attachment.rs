//! NetworkAttachmentDefinition component of an IPoIBNetwork
//!
//! Renders the ipoib CNI config from the network spec and applies it with
//! server-side apply, so repeated passes are no-ops on the API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams};
use kube::core::ApiResource;
use kube::{Api, Client, Resource, ResourceExt};
use netop_common::crd::{
    IPoIBNetwork, NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec,
};
use netop_common::{Error, FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_VALUE, OWNER_ANNOTATION};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::manager::State;
use crate::results::SyncState;

/// Name reported for this component
pub const NETWORK_ATTACHMENT_STATE: &str = "state-network-attachment";

/// CNI spec version written into the rendered config
pub const CNI_VERSION: &str = "0.3.1";

/// CNI plugin type
pub const CNI_TYPE: &str = "ipoib";

/// Render the NetworkAttachmentDefinition for `network`
///
/// The attachment is named after the network and lives in
/// `spec.networkNamespace`. A controller owner reference is set only when
/// that is the network's own namespace; the owner annotation is always set
/// so cross-namespace attachments can still be mapped back.
pub fn build_network_attachment(
    network: &IPoIBNetwork,
) -> Result<NetworkAttachmentDefinition, Error> {
    let name = network.name_any();
    let namespace = network.spec.network_namespace.clone();

    let ipam = match network
        .spec
        .ipam
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
            Error::validation_for_field(network.key(), "spec.ipam", format!("invalid JSON: {e}"))
        })?,
        None => json!({}),
    };
    if !ipam.is_object() {
        return Err(Error::validation_for_field(
            network.key(),
            "spec.ipam",
            "must be a JSON object",
        ));
    }

    let mut config = json!({
        "cniVersion": CNI_VERSION,
        "name": name,
        "type": CNI_TYPE,
        "ipam": ipam,
    });
    if let Some(master) = network.spec.master.as_deref().filter(|m| !m.is_empty()) {
        config["master"] = json!(master);
    }

    let owner_references = if network.namespace().as_deref() == Some(namespace.as_str()) {
        network.controller_owner_ref(&()).map(|r| vec![r])
    } else {
        None
    };

    let metadata = ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_VALUE.to_string(),
        )])),
        annotations: Some(BTreeMap::from([(
            OWNER_ANNOTATION.to_string(),
            network.key(),
        )])),
        owner_references,
        ..Default::default()
    };

    Ok(NetworkAttachmentDefinition {
        metadata,
        spec: NetworkAttachmentDefinitionSpec {
            config: config.to_string(),
        },
    })
}

/// Applies the NetworkAttachmentDefinition of a network
pub struct NetworkAttachmentState {
    client: Client,
}

impl NetworkAttachmentState {
    /// Create the component over a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl State for NetworkAttachmentState {
    fn name(&self) -> &'static str {
        NETWORK_ATTACHMENT_STATE
    }

    #[instrument(skip(self, network), fields(network = %network.key()))]
    async fn sync(&self, network: &IPoIBNetwork) -> Result<SyncState, Error> {
        let nad = build_network_attachment(network)?;
        let namespace = network.spec.network_namespace.as_str();
        let name = nad.name_any();

        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&nad))
            .await
            .map_err(|e| Error::from_kube(format!("{namespace}/{name}"), e))?;

        debug!(attachment = %format!("{namespace}/{name}"), "network attachment applied");
        Ok(SyncState::Ready)
    }

    fn watch_source(&self) -> ApiResource {
        ApiResource::erase::<NetworkAttachmentDefinition>(&())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netop_common::crd::IPoIBNetworkSpec;

    fn network(namespace: &str, target: &str, ipam: Option<&str>) -> IPoIBNetwork {
        let mut network = IPoIBNetwork::new(
            "net-a",
            IPoIBNetworkSpec {
                network_namespace: target.to_string(),
                master: Some("ibs3".to_string()),
                ipam: ipam.map(str::to_string),
            },
        );
        network.metadata.namespace = Some(namespace.to_string());
        network.metadata.uid = Some("4c1d-uid".to_string());
        network
    }

    fn config_of(nad: &NetworkAttachmentDefinition) -> Value {
        serde_json::from_str(&nad.spec.config).unwrap()
    }

    #[test]
    fn renders_ipoib_cni_config() {
        let nad = build_network_attachment(&network(
            "ns1",
            "ns2",
            Some(r#"{"type": "whereabouts", "range": "192.168.5.225/28"}"#),
        ))
        .unwrap();

        assert_eq!(nad.metadata.name.as_deref(), Some("net-a"));
        assert_eq!(nad.metadata.namespace.as_deref(), Some("ns2"));

        let config = config_of(&nad);
        assert_eq!(config["cniVersion"], CNI_VERSION);
        assert_eq!(config["type"], "ipoib");
        assert_eq!(config["name"], "net-a");
        assert_eq!(config["master"], "ibs3");
        assert_eq!(config["ipam"]["type"], "whereabouts");
    }

    #[test]
    fn missing_ipam_renders_empty_object_and_no_master() {
        let mut network = network("ns1", "ns1", None);
        network.spec.master = None;

        let config = config_of(&build_network_attachment(&network).unwrap());

        assert_eq!(config["ipam"], json!({}));
        assert!(config.get("master").is_none());
    }

    /// Story: an attachment in the network's own namespace is garbage collected with it
    #[test]
    fn story_same_namespace_gets_controller_owner_reference() {
        let nad = build_network_attachment(&network("ns1", "ns1", None)).unwrap();

        let owners = nad.metadata.owner_references.expect("owner reference");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "IPoIBNetwork");
        assert_eq!(owners[0].name, "net-a");
        assert_eq!(owners[0].controller, Some(true));
    }

    /// Story: a cross-namespace attachment is traced back through the annotation
    ///
    /// Owner references cannot cross namespaces, so only the annotation links
    /// the attachment in ns2 back to ns1/net-a.
    #[test]
    fn story_cross_namespace_uses_owner_annotation() {
        let nad = build_network_attachment(&network("ns1", "ns2", None)).unwrap();

        assert!(nad.metadata.owner_references.is_none());
        let annotations = nad.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(OWNER_ANNOTATION).map(String::as_str),
            Some("ns1/net-a")
        );
        assert_eq!(
            nad.metadata
                .labels
                .unwrap()
                .get(MANAGED_BY_LABEL)
                .map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );
    }

    #[test]
    fn malformed_ipam_is_a_validation_error() {
        let err = build_network_attachment(&network("ns1", "ns2", Some("{not json"))).unwrap_err();
        match err {
            Error::Validation { field, resource, .. } => {
                assert_eq!(field.as_deref(), Some("spec.ipam"));
                assert_eq!(resource, "ns1/net-a");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn non_object_ipam_is_rejected() {
        let err = build_network_attachment(&network("ns1", "ns2", Some("[1, 2]"))).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn applied_object_carries_type_meta() {
        let nad = build_network_attachment(&network("ns1", "ns2", None)).unwrap();
        let json = serde_json::to_value(&nad).unwrap();
        assert_eq!(json["apiVersion"], "k8s.cni.cncf.io/v1");
        assert_eq!(json["kind"], "NetworkAttachmentDefinition");
    }
}
