//! Velocity extrapolation of historical pose samples.

use std::time::Duration;

use glam::{Quat, Vec3};
use wavry_vr::{DeviceMotion, Pose, PoseSample};

/// Signed offset in seconds from `sample` to `target`, clamped to `max`.
pub fn prediction_interval(sample: Duration, target: Duration, max: Duration) -> f32 {
    let max_s = max.as_secs_f32();
    let dt = if target >= sample {
        (target - sample).as_secs_f32()
    } else {
        -(sample - target).as_secs_f32()
    };
    dt.clamp(-max_s, max_s)
}

/// Extrapolates `motion` by `dt` seconds using its linear and angular velocity.
pub fn extrapolate(motion: &DeviceMotion, dt: f32) -> DeviceMotion {
    if dt == 0.0 {
        return *motion;
    }
    let linear = Vec3::from_array(motion.velocity.linear);
    let angular = Vec3::from_array(motion.velocity.angular);

    let position = motion.pose.position_vec() + linear * dt;
    let rotation = Quat::from_scaled_axis(angular * dt) * motion.pose.orientation_quat();

    DeviceMotion {
        pose: Pose::from_glam(position, rotation.normalize()),
        velocity: motion.velocity,
    }
}

pub fn predict(sample: &PoseSample, target: Duration, max: Duration) -> DeviceMotion {
    let dt = prediction_interval(sample.timestamp, target, max);
    extrapolate(&sample.motion, dt)
}
