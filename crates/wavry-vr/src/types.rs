use std::time::Duration;

use bytes::Bytes;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    Hevc,
    Av1,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub refresh_rate_hz: f32,
}

/// Class the host runtime files a tracked device under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Hmd,
    TrackingReference,
    Controller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f32; 4],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn from_glam(position: Vec3, orientation: Quat) -> Self {
        Self {
            position: position.to_array(),
            orientation: orientation.to_array(),
        }
    }

    pub fn position_vec(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn orientation_quat(&self) -> Quat {
        Quat::from_array(self.orientation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseVelocity {
    pub linear: [f32; 3],
    pub angular: [f32; 3],
}

/// Rigid transform plus its first derivatives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMotion {
    pub pose: Pose,
    pub velocity: PoseVelocity,
}

/// A motion sample stamped in the driver clock domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub timestamp: Duration,
    pub motion: DeviceMotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingResult {
    Uninitialized,
    RunningOk,
}

/// The pose answer handed back to the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverPose {
    pub pose: Pose,
    pub velocity: PoseVelocity,
    pub pose_is_valid: bool,
    pub device_is_connected: bool,
    pub tracking_result: TrackingResult,
}

impl DriverPose {
    /// Well-formed pose reported before any tracking data exists.
    pub fn untracked() -> Self {
        Self {
            pose: Pose::IDENTITY,
            velocity: PoseVelocity::default(),
            pose_is_valid: false,
            device_is_connected: true,
            tracking_result: TrackingResult::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GamepadAxis {
    pub axis: u32,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamepadButton {
    pub button: u32,
    pub pressed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerInput {
    pub axes: Vec<GamepadAxis>,
    pub buttons: Vec<GamepadButton>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerTracking {
    pub motion: DeviceMotion,
    pub input: ControllerInput,
}

/// Inbound tracking packet, already deserialized by the transport and
/// stamped in the driver clock domain.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingInfo {
    pub target_timestamp: Duration,
    pub head: Option<DeviceMotion>,
    /// Indexed by [`Hand::index`].
    pub controllers: [Option<ControllerTracking>; 2],
}

impl TrackingInfo {
    pub fn controller(&self, hand: Hand) -> Option<&ControllerTracking> {
        self.controllers[hand.index()].as_ref()
    }
}

/// Frame-production signal handed to the encoder on each vsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub frame_index: u64,
    pub vsync_time: Duration,
    /// True when a pose sample landed since the previous frame.
    pub fresh_pose: bool,
    /// Target timestamp of the newest tracking sample, if any.
    pub pose_timestamp: Option<Duration>,
}

/// Per-frame timing report from the client, already deserialized by the
/// transport. `target_timestamp` names the tracking sample the frame was
/// rendered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStatistics {
    pub target_timestamp: Duration,
    /// Tracking sample to photons, as measured by the client.
    pub total_pipeline_latency: Duration,
    pub video_decode: Duration,
    pub video_decoder_queue: Duration,
    pub rendering: Duration,
    pub vsync_queue: Duration,
    pub frames_dropped: u32,
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub timestamp_us: u64,
    pub frame_id: u64,
    pub keyframe: bool,
    pub data: Bytes,
}

/// Opaque identifier of the local rendering adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AdapterIdentity {
    pub name: String,
    pub luid: u64,
}

/// Fixed display parameters registered with the host on activation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayProperties {
    pub render_width: u32,
    pub render_height: u32,
    pub refresh_rate_hz: f32,
    pub seconds_from_vsync_to_photons: f32,
}
