//! NetworkAttachmentDefinition (k8s.cni.cncf.io/v1)
//!
//! Owned by Multus; this operator creates them as dependents of its network
//! CRDs and only needs the CNI config string.

use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Multus NetworkAttachmentDefinition
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    shortname = "net-attach-def",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachmentDefinitionSpec {
    /// CNI configuration as a JSON document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config: String,
}

impl NetworkAttachmentDefinition {
    /// Cross-reference link recorded in owner status
    ///
    /// Format: `<apiVersion>/namespaces/<namespace>/<kind>/<name>`
    pub fn link(&self) -> String {
        format!(
            "{}/namespaces/{}/{}/{}",
            Self::api_version(&()),
            self.namespace().unwrap_or_default(),
            Self::kind(&()),
            self.name_any()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_includes_api_version_namespace_kind_and_name() {
        let mut nad = NetworkAttachmentDefinition::new("net-a", Default::default());
        nad.metadata.namespace = Some("ns2".to_string());
        assert_eq!(
            nad.link(),
            "k8s.cni.cncf.io/v1/namespaces/ns2/NetworkAttachmentDefinition/net-a"
        );
    }

    #[test]
    fn plural_matches_multus() {
        assert_eq!(
            NetworkAttachmentDefinition::plural(&()),
            "network-attachment-definitions"
        );
    }
}
