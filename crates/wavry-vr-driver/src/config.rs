//! Driver configuration supplied at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wavry_vr::{DeviceClass, DisplayProperties, StreamConfig, VideoCodec};

use crate::error::{DriverError, DriverResult};

pub const DEFAULT_SERIAL_NUMBER: &str = "WAVRY-HMD-0001";

/// Largest accepted prediction clamp and pose time offset, in milliseconds.
pub const MAX_PREDICTION_MS: f32 = 1000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub identity: IdentityConfig,
    pub display: DisplayConfig,
    pub tracking: TrackingConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub serial_number: String,
    pub device_class: DeviceClass,
    /// Preferred rendering adapter; `None` lets the factory pick.
    pub adapter_name: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            serial_number: DEFAULT_SERIAL_NUMBER.to_string(),
            device_class: DeviceClass::Hmd,
            adapter_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Combined width of both eyes side by side.
    pub render_width: u32,
    pub render_height: u32,
    pub window_x: i32,
    pub window_y: i32,
    pub refresh_rate_hz: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            render_width: 4128,
            render_height: 2208,
            window_x: 0,
            window_y: 0,
            refresh_rate_hz: 90.0,
        }
    }
}

impl DisplayConfig {
    pub fn eye_width(&self) -> u32 {
        self.render_width / 2
    }

    pub fn properties(&self) -> DisplayProperties {
        DisplayProperties {
            render_width: self.render_width,
            render_height: self.render_height,
            refresh_rate_hz: self.refresh_rate_hz,
            seconds_from_vsync_to_photons: 1.0 / self.refresh_rate_hz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Added to "now" when querying pose history. Negative looks into the past.
    pub pose_time_offset_ms: f32,
    /// Upper bound on velocity extrapolation.
    pub max_prediction_ms: f32,
    /// Replace the pose time offset with the one derived from client
    /// latency reports.
    pub adaptive_pose_offset: bool,
    /// Frames of latency the host runtime predicts ahead on its own.
    pub host_pipeline_frames: f32,
    /// Frames kept for latency averaging.
    pub latency_history: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pose_time_offset_ms: 0.0,
            max_prediction_ms: 100.0,
            adaptive_pose_offset: true,
            host_pipeline_frames: 2.0,
            latency_history: 256,
        }
    }
}

impl TrackingConfig {
    pub fn max_prediction(&self) -> Duration {
        Duration::try_from_secs_f32(self.max_prediction_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Start streaming as soon as the client reports ready.
    pub start_on_client_ready: bool,
    pub codec: VideoCodec,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            start_on_client_ready: true,
            codec: VideoCodec::Hevc,
        }
    }
}

impl DriverConfig {
    pub fn from_json_str(input: &str) -> DriverResult<Self> {
        let config: DriverConfig = serde_json::from_str(input).map_err(DriverError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> DriverResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| DriverError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&input)
    }

    pub fn validate(&self) -> DriverResult<()> {
        let display = &self.display;
        if display.render_width == 0 || display.render_width % 2 != 0 {
            return Err(DriverError::config(format!(
                "render_width must be a positive even number, got {}",
                display.render_width
            )));
        }
        if display.render_height == 0 {
            return Err(DriverError::config("render_height must be positive"));
        }
        if !(display.refresh_rate_hz > 0.0 && display.refresh_rate_hz <= 1000.0) {
            return Err(DriverError::config(format!(
                "refresh_rate_hz out of range: {}",
                display.refresh_rate_hz
            )));
        }
        let tracking = &self.tracking;
        if !(tracking.pose_time_offset_ms.abs() <= MAX_PREDICTION_MS) {
            return Err(DriverError::config(format!(
                "pose_time_offset_ms must be within +/-{MAX_PREDICTION_MS}, got {}",
                tracking.pose_time_offset_ms
            )));
        }
        if !(tracking.max_prediction_ms >= 0.0 && tracking.max_prediction_ms <= MAX_PREDICTION_MS) {
            return Err(DriverError::config(format!(
                "max_prediction_ms must be in [0, {MAX_PREDICTION_MS}], got {}",
                tracking.max_prediction_ms
            )));
        }
        if !(tracking.host_pipeline_frames >= 0.0 && tracking.host_pipeline_frames <= 10.0) {
            return Err(DriverError::config(format!(
                "host_pipeline_frames out of range: {}",
                tracking.host_pipeline_frames
            )));
        }
        if tracking.latency_history == 0 {
            return Err(DriverError::config("latency_history must be positive"));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            codec: self.streaming.codec,
            width: self.display.render_width,
            height: self.display.render_height,
            refresh_rate_hz: self.display.refresh_rate_hz,
        }
    }
}
