use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    Inactive,
    Activating,
    Active,
    Standby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingState {
    NotStreaming,
    Streaming,
}

/// Host-driven lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Activate,
    Deactivate,
    EnterStandby,
    Resume,
    Shutdown,
}

impl Lifecycle {
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Activate => "activate",
            Lifecycle::Deactivate => "deactivate",
            Lifecycle::EnterStandby => "enter_standby",
            Lifecycle::Resume => "resume",
            Lifecycle::Shutdown => "shutdown",
        }
    }
}

/// Settled state after `op` succeeds from `state`, or `None` when the call is
/// not accepted from there and leaves the state unchanged. `Activating` is
/// only observable while an activation is in progress.
pub fn transition(state: ActivationState, op: Lifecycle) -> Option<ActivationState> {
    use ActivationState::*;
    match (state, op) {
        (Inactive, Lifecycle::Activate) => Some(Active),
        (Active | Standby | Inactive, Lifecycle::Deactivate) => Some(Inactive),
        (Active, Lifecycle::EnterStandby) => Some(Standby),
        (Standby, Lifecycle::Resume) => Some(Active),
        (_, Lifecycle::Shutdown) => Some(Inactive),
        _ => None,
    }
}

/// Activation state published for lock-free reads.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ActivationState) -> Self {
        Self(AtomicU8::new(Self::encode(state)))
    }

    pub(crate) fn load(&self) -> ActivationState {
        match self.0.load(Ordering::Acquire) {
            1 => ActivationState::Activating,
            2 => ActivationState::Active,
            3 => ActivationState::Standby,
            _ => ActivationState::Inactive,
        }
    }

    pub(crate) fn store(&self, state: ActivationState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    fn encode(state: ActivationState) -> u8 {
        match state {
            ActivationState::Inactive => 0,
            ActivationState::Activating => 1,
            ActivationState::Active => 2,
            ActivationState::Standby => 3,
        }
    }
}
