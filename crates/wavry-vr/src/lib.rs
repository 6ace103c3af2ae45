#![forbid(unsafe_code)]

pub mod collaborators;
pub mod pose_history;
pub mod status;
pub mod types;
pub mod views;

pub use collaborators::{
    Clock, ClientConnection, CollaboratorFactory, ControllerProxy, DriverHost, Encoder,
    PoseHistory, RenderBackend, SystemClock, TrackerProxy, VsyncSource, VsyncTarget,
};
pub use pose_history::RingPoseHistory;
pub use status::{driver_status, set_driver_status};
pub use types::{
    AdapterIdentity, ClientStatistics, ControllerInput, ControllerTracking, DeviceClass, DeviceMotion,
    DisplayProperties, DriverPose, FrameTiming, GamepadAxis, GamepadButton, Hand, Pose,
    PoseSample, PoseVelocity, StreamConfig, TrackingInfo, TrackingResult, VideoCodec, VideoFrame,
};
pub use views::{DistortionCoordinates, Eye, Fov, Matrix34, ProjectionRaw, ViewsConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VrError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("adapter error: {0}")]
    Adapter(String),
    #[error("encoder error: {0}")]
    Encoder(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("host error: {0}")]
    Host(String),
}

pub type VrResult<T> = Result<T, VrError>;
