//! State synchronization for network operator custom resources
//!
//! The reconciler treats synchronization as an opaque collaborator reached
//! through the [`StateManager`] trait: one call converges the managed objects
//! of a resource and reports a [`SyncOutcome`], another lists the object kinds
//! whose changes should trigger reconciliation of their owner.
//!
//! [`new_manager`] builds the manager registered for a CRD kind. The built-in
//! manager runs an ordered list of component [`State`]s.

#![deny(missing_docs)]

mod manager;
mod network_attachment;
mod results;

pub use manager::{new_manager, Manager, State, StateManager};
pub use network_attachment::{
    build_network_attachment, NetworkAttachmentState, CNI_TYPE, CNI_VERSION,
    NETWORK_ATTACHMENT_STATE,
};
pub use results::{StateResult, SyncOutcome, SyncResults, SyncState};
