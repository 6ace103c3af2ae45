//! Display component: render geometry answered from the published views.
//!
//! All queries read one [`ViewsConfig`] snapshot through an [`ArcSwap`], so a
//! query racing [`HmdDisplay::set_views_config`] sees either the old or the
//! new geometry in full.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use wavry_vr::{DistortionCoordinates, Eye, ProjectionRaw, ViewsConfig};

use crate::config::DisplayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry queries the host runtime issues against a virtual display.
pub trait DisplayComponent: Send + Sync {
    fn window_bounds(&self) -> WindowBounds;

    fn is_display_on_desktop(&self) -> bool;

    fn is_display_real_display(&self) -> bool;

    /// Per-eye render target size.
    fn recommended_render_target_size(&self) -> (u32, u32);

    fn eye_output_viewport(&self, eye: Eye) -> Viewport;

    fn projection_raw(&self, eye: Eye) -> ProjectionRaw;

    fn compute_distortion(&self, eye: Eye, u: f32, v: f32) -> DistortionCoordinates;
}

pub struct HmdDisplay {
    config: DisplayConfig,
    views: ArcSwap<ViewsConfig>,
    received: AtomicBool,
}

impl HmdDisplay {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            views: ArcSwap::from_pointee(ViewsConfig::default()),
            received: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Current views snapshot.
    pub fn views(&self) -> Arc<ViewsConfig> {
        self.views.load_full()
    }

    /// Whether the client has supplied a views config yet.
    pub fn has_client_views(&self) -> bool {
        self.received.load(Ordering::Acquire)
    }

    /// Publishes `views`. Invalid geometry is dropped and `false` returned.
    pub fn set_views_config(&self, views: ViewsConfig) -> bool {
        if !views.is_valid() {
            return false;
        }
        self.views.store(Arc::new(views));
        self.received.store(true, Ordering::Release);
        true
    }
}

impl DisplayComponent for HmdDisplay {
    fn window_bounds(&self) -> WindowBounds {
        WindowBounds {
            x: self.config.window_x,
            y: self.config.window_y,
            width: self.config.render_width,
            height: self.config.render_height,
        }
    }

    fn is_display_on_desktop(&self) -> bool {
        false
    }

    fn is_display_real_display(&self) -> bool {
        false
    }

    fn recommended_render_target_size(&self) -> (u32, u32) {
        (self.config.eye_width(), self.config.render_height)
    }

    fn eye_output_viewport(&self, eye: Eye) -> Viewport {
        let width = self.config.eye_width();
        Viewport {
            x: width * eye.index() as u32,
            y: 0,
            width,
            height: self.config.render_height,
        }
    }

    fn projection_raw(&self, eye: Eye) -> ProjectionRaw {
        self.views.load().fov(eye).projection_raw()
    }

    fn compute_distortion(&self, _eye: Eye, u: f32, v: f32) -> DistortionCoordinates {
        DistortionCoordinates::identity(u, v)
    }
}
