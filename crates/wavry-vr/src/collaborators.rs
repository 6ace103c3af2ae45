//! Interfaces of the collaborators a tracked device coordinates.
//!
//! Every trait here is implemented outside the coordinator. Implementations
//! are shared across threads, so all methods take `&self` and are expected to
//! return quickly.

use std::sync::Arc;
use std::time::Duration;

use crate::types::{
    AdapterIdentity, ControllerTracking, DeviceMotion, DisplayProperties, DriverPose,
    FrameTiming, Hand, PoseSample, StreamConfig, VideoFrame,
};
use crate::views::ViewsConfig;
use crate::VrResult;

/// Timestamp-indexed buffer of past device poses.
pub trait PoseHistory: Send + Sync {
    fn push(&self, sample: PoseSample);

    /// Newest sample taken at or before `timestamp`.
    fn sample_at(&self, timestamp: Duration) -> Option<PoseSample>;

    fn latest(&self) -> Option<PoseSample>;
}

/// Network session to the remote rendering client.
pub trait ClientConnection: Send + Sync {
    fn is_connected(&self) -> bool;

    fn send_stream_config(&self, config: &StreamConfig) -> VrResult<()>;

    fn send_video(&self, frame: VideoFrame) -> VrResult<()>;
}

/// Video encoder owned by an active device.
pub trait Encoder: Send + Sync {
    /// Begin routing encoded output to `sink`.
    fn start(&self, sink: Arc<dyn ClientConnection>) -> VrResult<()>;

    fn stop(&self);

    /// A display refresh boundary passed while streaming; a frame is due.
    fn present_frame(&self, timing: FrameTiming);

    /// The host finished a frame tick while streaming.
    fn on_host_frame(&self, _host_frame: u64) {}

    /// Force the next encoded frame to be a keyframe. Implementations
    /// coalesce repeated requests.
    fn request_idr(&self);

    /// Release encoder resources. Called exactly once per instance.
    ///
    /// No other call reaches the encoder once `shutdown` starts. An
    /// `on_host_frame` or `request_idr` already in flight on another thread
    /// may still land after `stop`; implementations must ignore it.
    fn shutdown(&self);
}

/// Receiver of display refresh ticks.
pub trait VsyncTarget: Send + Sync {
    fn on_vsync(&self);
}

/// Periodic timer signalling display refresh boundaries.
pub trait VsyncSource: Send {
    fn start(&mut self, target: Arc<dyn VsyncTarget>) -> VrResult<()>;

    /// Stop ticking. Once this returns no further `on_vsync` calls are made.
    fn stop(&mut self);
}

/// Builds the per-activation collaborators.
pub trait CollaboratorFactory: Send + Sync {
    fn resolve_adapter(&self, preferred: Option<&str>) -> VrResult<AdapterIdentity>;

    fn create_encoder(
        &self,
        adapter: &AdapterIdentity,
        config: &StreamConfig,
    ) -> VrResult<Arc<dyn Encoder>>;

    fn create_vsync(&self, refresh_rate_hz: f32) -> VrResult<Box<dyn VsyncSource>>;
}

/// Controller device mirroring one hand into the host runtime.
pub trait ControllerProxy: Send + Sync {
    fn hand(&self) -> Hand;

    fn is_active(&self) -> bool;

    fn update(&self, tracking: &ControllerTracking, target_timestamp: Duration);
}

/// Secondary tracker device that mirrors the HMD motion.
pub trait TrackerProxy: Send + Sync {
    fn update(&self, motion: &DeviceMotion);
}

/// Platform-specific direct-mode rendering path.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn initialize(&self, adapter: &AdapterIdentity) -> VrResult<()>;

    fn shutdown(&self);
}

/// Services the host runtime offers a driver.
pub trait DriverHost: Send + Sync {
    fn register_display(&self, device_index: u32, properties: &DisplayProperties)
        -> VrResult<()>;

    fn pose_updated(&self, device_index: u32, pose: &DriverPose);

    fn vsync_event(&self) {}

    fn eye_geometry_changed(&self, _device_index: u32, _views: &ViewsConfig) {}
}

/// Monotonic time source shared by pose history and prediction.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
