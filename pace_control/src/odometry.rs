//! Odometry: encoder + IMU fusion into velocity, displacement and pose.
//!
//! The encoder counters are free-running 16-bit values; [`wheel_delta`]
//! recovers the signed per-tick step with the shorter-arc rule, so any true
//! delta below half the counter range survives a wrap exactly. Translational
//! velocity is smoothed over four samples to suppress encoder quantization
//! at 1 kHz.

use pace_common::consts::{
    ANGLE_PER_PULSE, ENCODER_AVERAGE_SAMPLES, TICK_INTERVAL, WHEEL_RADIUS,
};
use pace_common::types::{Polar, Pose};

use crate::filter::MovingAverage;

// ─── Encoder delta recovery ─────────────────────────────────────────

/// Signed counter step between two raw 16-bit readings.
///
/// Unsigned wrap, reinterpreted as signed: a magnitude of half the range or
/// more flips sign by a full-range correction, so the shorter arc wins.
#[inline]
pub fn wheel_delta(curr: u16, prev: u16) -> i32 {
    curr.wrapping_sub(prev) as i16 as i32
}

/// Per-wheel angle deltas from the raw counters.
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    last: [u16; 2],
    diff: [f32; 2],
}

impl Encoder {
    pub const fn new() -> Self {
        Self {
            last: [0; 2],
            diff: [0.0; 2],
        }
    }

    /// Re-latch the current counters; the next update starts from here.
    pub fn reset(&mut self, counters: [u16; 2]) {
        self.last = counters;
        self.diff = [0.0; 2];
    }

    /// Convert fresh counters into wheel angle deltas [rad].
    pub fn update(&mut self, counters: [u16; 2]) {
        for i in 0..2 {
            let delta = wheel_delta(counters[i], self.last[i]);
            self.diff[i] = delta as f32 * ANGLE_PER_PULSE;
            self.last[i] = counters[i];
        }
    }

    /// Last wheel angle deltas `[right, left]` [rad].
    #[inline]
    pub fn diff(&self) -> [f32; 2] {
        self.diff
    }
}

// ─── Odometry ───────────────────────────────────────────────────────

/// Fused motion estimate, refreshed once per tick.
#[derive(Debug, Default, Clone)]
pub struct Odometry {
    /// Translation advanced this tick [m].
    delta_trans: f32,
    trans_velo_avg: MovingAverage<ENCODER_AVERAGE_SAMPLES>,

    acc: Polar,
    vel: Polar,
    dis: Polar,
    pose: Pose,
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every estimate and restart the velocity average.
    pub fn reset(&mut self) {
        self.delta_trans = 0.0;
        self.acc = Polar::ZERO;
        self.vel = Polar::ZERO;
        self.dis = Polar::ZERO;
        self.pose = Pose::default();
        self.trans_velo_avg.reset();
    }

    /// Fuse one tick of sensor data.
    ///
    /// `wheel_delta_right` / `wheel_delta_left` are wheel angle deltas
    /// [rad], `accel_y` the measured lateral acceleration [m/s²],
    /// `yaw_rate` the measured yaw rate [rad/s].
    pub fn update(
        &mut self,
        wheel_delta_right: f32,
        wheel_delta_left: f32,
        accel_y: f32,
        yaw_rate: f32,
    ) {
        self.delta_trans = (wheel_delta_right + wheel_delta_left) * WHEEL_RADIUS / 2.0;
        self.trans_velo_avg.update(self.delta_trans / TICK_INTERVAL);

        // Rotational acceleration needs last tick's rate; order matters.
        self.acc.trans = accel_y;
        self.acc.rot = (yaw_rate - self.vel.rot) / TICK_INTERVAL;
        self.vel.trans = self.trans_velo_avg.get();
        self.vel.rot = yaw_rate;
        self.dis.trans += self.delta_trans;
        self.dis.rot += yaw_rate * TICK_INTERVAL;

        self.pose.theta = self.dis.rot;
        self.pose.x += (self.vel.trans * TICK_INTERVAL) * self.pose.theta.cos();
        self.pose.y += (self.vel.trans * TICK_INTERVAL) * self.pose.theta.sin();
    }

    /// Translation advanced during the last tick [m].
    #[inline]
    pub fn delta_trans(&self) -> f32 {
        self.delta_trans
    }

    /// Acceleration estimate [m/s², rad/s²].
    #[inline]
    pub fn acceleration(&self) -> Polar {
        self.acc
    }

    /// Velocity estimate [m/s, rad/s].
    #[inline]
    pub fn velocity(&self) -> Polar {
        self.vel
    }

    /// Accumulated displacement [m, rad].
    #[inline]
    pub fn displacement(&self) -> Polar {
        self.dis
    }

    /// Pose in the run-start frame.
    #[inline]
    pub fn pose(&self) -> Pose {
        self.pose
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
