//! Per-eye view geometry shared by the client and the display component.

use std::f32::consts::FRAC_PI_4;

use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Interpupillary distance assumed until the client reports its own.
pub const DEFAULT_IPD_M: f32 = 0.063;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Field of view as angles in radians from the view axis.
///
/// `left` and `down` are negative for a view that straddles the axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fov {
    pub left: f32,
    pub right: f32,
    pub up: f32,
    pub down: f32,
}

impl Fov {
    pub const fn symmetric(half_angle: f32) -> Self {
        Self {
            left: -half_angle,
            right: half_angle,
            up: half_angle,
            down: -half_angle,
        }
    }

    /// Raw projection tangents in host convention (y grows downwards).
    pub fn projection_raw(&self) -> ProjectionRaw {
        ProjectionRaw {
            left: self.left.tan(),
            right: self.right.tan(),
            top: -self.up.tan(),
            bottom: -self.down.tan(),
        }
    }

    fn is_valid(&self) -> bool {
        let limit = std::f32::consts::FRAC_PI_2;
        [self.left, self.right, self.up, self.down]
            .iter()
            .all(|a| a.is_finite() && a.abs() < limit)
            && self.left < self.right
            && self.down < self.up
    }
}

impl Default for Fov {
    fn default() -> Self {
        Self::symmetric(FRAC_PI_4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectionRaw {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Row-major 3x4 rigid transform, the layout the host expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix34(pub [[f32; 4]; 3]);

impl Matrix34 {
    pub const IDENTITY: Matrix34 = Matrix34([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]);

    pub fn from_affine(transform: Affine3A) -> Self {
        let m = transform.matrix3;
        let t = transform.translation;
        Matrix34([
            [m.x_axis.x, m.y_axis.x, m.z_axis.x, t.x],
            [m.x_axis.y, m.y_axis.y, m.z_axis.y, t.y],
            [m.x_axis.z, m.y_axis.z, m.z_axis.z, t.z],
        ])
    }

    pub fn translation(&self) -> [f32; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }
}

impl Default for Matrix34 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Eye-to-head transforms and FOV for both eyes, indexed by [`Eye::index`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewsConfig {
    pub eye_to_head: [Matrix34; 2],
    pub fov: [Fov; 2],
}

impl ViewsConfig {
    /// Builds the config for eyes offset along x by half the IPD each.
    pub fn from_ipd(ipd_m: f32, fov: [Fov; 2]) -> Self {
        let half = ipd_m / 2.0;
        let eye = |x: f32| {
            Matrix34::from_affine(Affine3A::from_rotation_translation(
                Quat::IDENTITY,
                Vec3::new(x, 0.0, 0.0),
            ))
        };
        Self {
            eye_to_head: [eye(-half), eye(half)],
            fov,
        }
    }

    pub fn fov(&self, eye: Eye) -> Fov {
        self.fov[eye.index()]
    }

    pub fn eye_to_head(&self, eye: Eye) -> Matrix34 {
        self.eye_to_head[eye.index()]
    }

    pub fn ipd_m(&self) -> f32 {
        self.eye_to_head[1].translation()[0] - self.eye_to_head[0].translation()[0]
    }

    /// Whether every angle is finite and forms a non-empty frustum.
    pub fn is_valid(&self) -> bool {
        self.fov.iter().all(Fov::is_valid)
            && self
                .eye_to_head
                .iter()
                .all(|m| m.0.iter().flatten().all(|v| v.is_finite()))
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self::from_ipd(DEFAULT_IPD_M, [Fov::default(); 2])
    }
}

/// Per-channel distortion output for one `(u, v)` sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionCoordinates {
    pub red: [f32; 2],
    pub green: [f32; 2],
    pub blue: [f32; 2],
}

impl DistortionCoordinates {
    pub fn identity(u: f32, v: f32) -> Self {
        Self {
            red: [u, v],
            green: [u, v],
            blue: [u, v],
        }
    }
}
