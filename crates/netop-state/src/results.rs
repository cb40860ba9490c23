//! Results reported by a synchronization pass

use netop_common::crd::State;
use netop_common::Error;

/// Convergence state of one managed component
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// The component matches the desired state
    Ready,
    /// The component is still converging
    #[default]
    NotReady,
    /// The component does not apply to this resource
    Ignore,
    /// The component is being recreated
    Reset,
    /// The component failed and needs attention
    Error,
}

impl From<SyncState> for State {
    fn from(state: SyncState) -> Self {
        match state {
            SyncState::Ready => State::Ready,
            SyncState::NotReady => State::NotReady,
            SyncState::Ignore => State::Ignore,
            SyncState::Reset => State::Reset,
            SyncState::Error => State::Error,
        }
    }
}

/// Result for a single component
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateResult {
    /// Name of the component state (e.g. "state-network-attachment")
    pub state_name: String,
    /// Reported convergence state
    pub status: SyncState,
    /// Error message when the component failed
    pub error_message: Option<String>,
}

impl StateResult {
    /// Result for a component that synced without error
    pub fn new(state_name: impl Into<String>, status: SyncState) -> Self {
        Self {
            state_name: state_name.into(),
            status,
            error_message: None,
        }
    }

    /// Result for a component that failed with `error`
    pub fn failed(state_name: impl Into<String>, status: SyncState, error: &Error) -> Self {
        Self {
            state_name: state_name.into(),
            status,
            error_message: Some(error.to_string()),
        }
    }
}

/// Per-component results of one synchronization pass, in execution order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncResults {
    /// One entry per component that ran
    pub states: Vec<StateResult>,
}

impl SyncResults {
    /// Results from a list of component results
    pub fn from_states(states: Vec<StateResult>) -> Self {
        Self { states }
    }

    /// Shorthand for a single-component result
    pub fn single(state_name: impl Into<String>, status: SyncState) -> Self {
        Self::from_states(vec![StateResult::new(state_name, status)])
    }

    /// Status of the resource's own component (the first entry)
    ///
    /// When no component reported, the resource is treated as not ready so
    /// it keeps being requeued.
    pub fn primary_status(&self) -> SyncState {
        self.states
            .first()
            .map(|s| s.status)
            .unwrap_or(SyncState::NotReady)
    }

    /// Aggregate status across all components
    ///
    /// Error if any component errored, Ready only when every component is
    /// Ready (or ignored), NotReady otherwise.
    pub fn overall_status(&self) -> SyncState {
        if self.states.iter().any(|s| s.status == SyncState::Error) {
            return SyncState::Error;
        }
        let converged = !self.states.is_empty()
            && self
                .states
                .iter()
                .all(|s| matches!(s.status, SyncState::Ready | SyncState::Ignore));
        if converged {
            SyncState::Ready
        } else {
            SyncState::NotReady
        }
    }
}

/// Outcome of `StateManager::sync_state`
///
/// A pass may fail part-way: the results of the components that ran are
/// reported together with the error that stopped it.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Results of the components that ran
    pub results: SyncResults,
    /// Error that stopped the pass, if any
    pub error: Option<Error>,
}

impl SyncOutcome {
    /// Outcome of a pass that completed without error
    pub fn ok(results: SyncResults) -> Self {
        Self {
            results,
            error: None,
        }
    }

    /// Outcome of a pass that stopped with `error`
    pub fn failed(results: SyncResults, error: Error) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }
}
