//! Common types for the network operator: CRDs, errors, configuration and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use config::ControllerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "netop-controller";

/// CRD kind name used to select the state manager for IPoIBNetwork resources
pub const IPOIB_NETWORK_CRD_NAME: &str = "IPoIBNetwork";

/// Annotation carrying the `<namespace>/<name>` of the owning custom resource.
///
/// Owner references cannot point across namespaces, so dependents created
/// outside the owner's namespace are attributed through this annotation.
pub const OWNER_ANNOTATION: &str = "netop.mellanox.com/owner";

/// Label marking objects managed by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on managed objects
pub const MANAGED_BY_VALUE: &str = "network-operator";
