//! Custom Resource Definitions used by the network operator

mod ipoib_network;
mod network_attachment;

pub use ipoib_network::{IPoIBNetwork, IPoIBNetworkSpec, IPoIBNetworkStatus, State};
pub use network_attachment::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec};
