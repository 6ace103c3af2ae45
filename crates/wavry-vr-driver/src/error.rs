//! Error types for the tracked-device coordinator.

use thiserror::Error;
use wavry_vr::VrError;

use crate::state::ActivationState;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Activation result code in the shape the host runtime expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    None,
    AlreadyActive,
    DriverFailed,
    NotInitialized,
    ShutDown,
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// A required collaborator could not be allocated during activation.
    #[error("initialization failed at {stage}: {source}")]
    Initialization {
        stage: &'static str,
        #[source]
        source: VrError,
    },

    /// Lifecycle call made from a state that does not accept it.
    #[error("{op} is invalid while {state:?}")]
    InvalidStateTransition {
        op: &'static str,
        state: ActivationState,
    },

    #[error("no client connected")]
    ClientNotConnected,

    /// Recoverable fault on the streaming path.
    #[error("stream fault: {0}")]
    Stream(#[source] VrError),

    #[error("driver has been shut down")]
    ShutDown,

    #[error("configuration error: {0}")]
    Config(String),
}

impl DriverError {
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    pub(crate) fn init(stage: &'static str, source: VrError) -> Self {
        Self::Initialization { stage, source }
    }

    /// Host-facing code for an activation failure.
    pub fn init_code(&self) -> InitError {
        match self {
            Self::InvalidStateTransition { state, .. } if *state != ActivationState::Inactive => {
                InitError::AlreadyActive
            }
            Self::InvalidStateTransition { .. } => InitError::NotInitialized,
            Self::ShutDown => InitError::ShutDown,
            Self::Initialization { .. }
            | Self::ClientNotConnected
            | Self::Stream(_)
            | Self::Config(_) => InitError::DriverFailed,
        }
    }
}

/// Folds an activation result into the host's result code.
pub fn activation_code(result: &DriverResult<()>) -> InitError {
    match result {
        Ok(()) => InitError::None,
        Err(err) => err.init_code(),
    }
}
