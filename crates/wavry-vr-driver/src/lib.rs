//! Tracked-device coordinator for the Wavry VR driver.
//!
//! A [`StreamingDevice`] represents one HMD (or tracking reference) inside the
//! host VR runtime. It answers the host's per-frame pose and display queries,
//! paces the encoder off the vsync timer while a client is streaming, and
//! relays inbound tracking packets to pose history and controller proxies.
//!
//! The network transport, encoder, vsync timer and controller internals are
//! collaborators behind the traits in [`wavry_vr`].

#![forbid(unsafe_code)]

pub mod component;
pub mod config;
pub mod debug;
pub mod device;
pub mod display;
pub mod error;
pub mod identity;
pub mod latency;
mod pacer;
pub mod prediction;
pub mod state;
pub mod stats;

pub use component::{
    Component, ComponentKind, DIRECT_MODE_COMPONENT_VERSION, DISPLAY_COMPONENT_VERSION,
};
pub use config::DriverConfig;
pub use device::{StreamingDevice, StreamingDeviceBuilder, INVALID_DEVICE_INDEX};
pub use display::{DisplayComponent, HmdDisplay, Viewport, WindowBounds};
pub use error::{activation_code, DriverError, DriverResult, InitError};
pub use identity::DeviceIdentity;
pub use latency::{LatencySnapshot, LatencyStats};
pub use state::{ActivationState, Lifecycle, StreamingState};
pub use stats::StatsSnapshot;
