//! IPoIBNetwork controller
//!
//! Drives IPoIBNetwork resources toward their spec through the state manager
//! and reports convergence in the resource status:
//! - [`controller`]: the reconciliation loop and its requeue decision
//! - [`status`]: status derivation and the conditional status write
//! - [`locks`]: per-identity serialization of reconciliation attempts
//! - [`watch`]: primary and dependent watches feeding the work queue

#![deny(missing_docs)]

pub mod controller;
pub mod locks;
pub mod status;
pub mod watch;

pub use controller::{
    error_policy, reconcile, reconcile_request, Context, IPoIBKubeClient, IPoIBKubeClientImpl,
    ReconcileOutcome, ReconcileRequest,
};
pub use locks::KeyLocks;
pub use watch::{build_controller, owner_request, setup};

/// Name used for metrics labels, events and logs
pub const CONTROLLER_NAME: &str = "ipoibnetwork";
