//! Scalar bundles shared by the sensing and planning pipeline.

use serde::{Deserialize, Serialize};

/// A pair of orthogonal scalars: translation and rotation.
///
/// Unit depends on context — displacement [m, rad], velocity [m/s, rad/s]
/// or acceleration [m/s², rad/s²].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    /// Translational component.
    pub trans: f32,
    /// Rotational component.
    pub rot: f32,
}

impl Polar {
    /// Both components zero.
    pub const ZERO: Self = Self { trans: 0.0, rot: 0.0 };
}

/// Planar pose in the frame established at run start [m, m, rad].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

/// One curvature sample recorded during exploration.
///
/// `delta_distance` is at least the mapping resolution (0.01 m);
/// `delta_yaw` is the yaw integrated over that window [rad].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    /// Distance traveled over the window [m].
    pub delta_distance: f32,
    /// Yaw accumulated over the window [rad].
    pub delta_yaw: f32,
}

/// PID gain triple: proportional, integral, derivative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGain {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGain {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}
