//! Wheel servo: (linear, angular) velocity command into per-wheel duty.
//!
//! Two PIDs run per tick with `dt = 1.0` — the time base is folded into
//! the gains. Their outputs mix into right/left voltages, clamp to the
//! lesser of the motor limit and the battery, and divide down to duty.
//! A non-finite voltage or a sustained tracking failure latches the
//! emergency flag; the motor task reads it and short-brakes. Only a fresh
//! [`Servo::reset`] clears the latch.
//!
//! The velocity feed-forward path is wired but held inert by its zero
//! gains; it only contributes when a non-zero gain is configured.

use pace_common::consts::{
    FEED_FORWARD_ANGULAR_GAIN, FEED_FORWARD_LINEAR_GAIN, GEAR_RATIO, MOTOR_BACK_EMF,
    MOTOR_LIMIT_VOLTAGE, SERVO_ERROR_ANGULAR_GAIN, SERVO_ERROR_ANGULAR_TIME_MS,
    SERVO_ERROR_LINEAR_GAIN, SERVO_ERROR_LINEAR_TIME_MS, TREAD_WIDTH, WHEEL_RADIUS,
};
use pace_common::types::PidGain;

use crate::pid::Pid;

/// Motor rad/s to rpm through the gearbox.
const RAD_PER_SEC_TO_RPM: f32 = (60.0 * GEAR_RATIO) / (2.0 * core::f32::consts::PI);

/// Per-wheel control pair `[right, left]`.
pub type ControlAmount = [f32; 2];

/// Velocity servo with emergency latch.
#[derive(Debug, Clone, Default)]
pub struct Servo {
    pid_linear: Pid,
    pid_angular: Pid,

    target_linear: f32,
    target_angular: f32,

    feedforward: ControlAmount,
    feedback: ControlAmount,
    voltage: ControlAmount,
    duty: ControlAmount,

    /// Consecutive ticks of linear tracking failure [ms].
    error_linear_ticks: u32,
    /// Consecutive ticks of angular tracking failure [ms].
    error_angular_ticks: u32,
    emergency: bool,
}

impl Servo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install loop gains; clears both controllers.
    pub fn set_gain(&mut self, linear: PidGain, angular: PidGain) {
        self.pid_linear.set_gain(linear);
        self.pid_angular.set_gain(angular);
    }

    /// Set the velocity command [m/s, rad/s].
    pub fn set_target(&mut self, linear: f32, angular: f32) {
        self.target_linear = linear;
        self.target_angular = angular;
    }

    /// Clear controllers, targets, fault timers and the emergency latch.
    pub fn reset(&mut self) {
        self.pid_linear.reset();
        self.pid_angular.reset();
        self.target_linear = 0.0;
        self.target_angular = 0.0;
        self.feedforward = [0.0; 2];
        self.feedback = [0.0; 2];
        self.voltage = [0.0; 2];
        self.duty = [0.0; 2];
        self.error_linear_ticks = 0;
        self.error_angular_ticks = 0;
        self.emergency = false;
    }

    /// One tick: feedback, mixing, saturation, duty, fault timers.
    pub fn update(&mut self, battery_voltage: f32, measure_linear: f32, measure_angular: f32) {
        // Feed-forward: back-EMF of the requested wheel speeds. Inert
        // while the gains are zero.
        if FEED_FORWARD_LINEAR_GAIN != 0.0 || FEED_FORWARD_ANGULAR_GAIN != 0.0 {
            let a = self.target_linear / WHEEL_RADIUS * FEED_FORWARD_LINEAR_GAIN;
            let b = (TREAD_WIDTH * self.target_angular) / (2.0 * WHEEL_RADIUS)
                * FEED_FORWARD_ANGULAR_GAIN;
            self.feedforward = [
                MOTOR_BACK_EMF * RAD_PER_SEC_TO_RPM * (a + b),
                MOTOR_BACK_EMF * RAD_PER_SEC_TO_RPM * (a - b),
            ];
        } else {
            self.feedforward = [0.0; 2];
        }

        // Feedback: per-tick PIDs, dt folded into the gains.
        self.feedback = [
            self.pid_linear.update(self.target_linear, measure_linear, 1.0),
            self.pid_angular.update(self.target_angular, measure_angular, 1.0),
        ];

        self.voltage = [
            self.feedforward[0] + self.feedback[0] + self.feedback[1],
            self.feedforward[1] + self.feedback[0] - self.feedback[1],
        ];

        if !self.voltage[0].is_finite() || !self.voltage[1].is_finite() {
            self.emergency = true;
            return;
        }

        let ceiling = MOTOR_LIMIT_VOLTAGE.min(battery_voltage);
        for v in self.voltage.iter_mut() {
            *v = v.abs().min(ceiling).copysign(*v);
        }

        self.duty = [
            self.voltage[0] / battery_voltage,
            self.voltage[1] / battery_voltage,
        ];

        // Tracking-failure timers: measured speed stuck far below target.
        if measure_linear.abs() < (self.target_linear * SERVO_ERROR_LINEAR_GAIN).abs() {
            self.error_linear_ticks += 1;
            if self.error_linear_ticks >= SERVO_ERROR_LINEAR_TIME_MS {
                self.emergency = true;
            }
        } else {
            self.error_linear_ticks = 0;
        }
        if measure_angular.abs() < (self.target_angular * SERVO_ERROR_ANGULAR_GAIN).abs() {
            self.error_angular_ticks += 1;
            if self.error_angular_ticks >= SERVO_ERROR_ANGULAR_TIME_MS {
                self.emergency = true;
            }
        } else {
            self.error_angular_ticks = 0;
        }
    }

    /// Commanded motor voltages `[right, left]` [V].
    #[inline]
    pub fn motor_voltage(&self) -> ControlAmount {
        self.voltage
    }

    /// Commanded duty `[right, left]` in `[-1, +1]`.
    #[inline]
    pub fn motor_duty(&self) -> ControlAmount {
        self.duty
    }

    /// Feed-forward contribution `[right, left]` [V].
    #[inline]
    pub fn feed_forward(&self) -> ControlAmount {
        self.feedforward
    }

    /// Feedback contribution `[linear, angular]` [V].
    #[inline]
    pub fn feed_back(&self) -> ControlAmount {
        self.feedback
    }

    /// Latch the emergency flag (external fault).
    pub fn emergency_stop(&mut self) {
        self.emergency = true;
    }

    /// Emergency latched?
    #[inline]
    pub fn is_emergency(&self) -> bool {
        self.emergency
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VBAT: f32 = 12.0;

    fn servo() -> Servo {
        let mut s = Servo::new();
        s.set_gain(PidGain::new(5.0, 0.01, 0.0), PidGain::new(0.3, 0.05, 0.0));
        s
    }

    #[test]
    fn forward_command_drives_both_wheels_forward() {
        let mut s = servo();
        s.set_target(1.0, 0.0);
        s.update(VBAT, 0.9, 0.0);
        let duty = s.motor_duty();
        assert!(duty[0] > 0.0);
        assert!(duty[1] > 0.0);
        assert!((duty[0] - duty[1]).abs() < 1e-6);
    }

    #[test]
    fn turn_command_differentiates_the_wheels() {
        let mut s = servo();
        s.set_target(0.0, 1.0);
        s.update(VBAT, 0.0, 0.9);
        let v = s.motor_voltage();
        assert!(v[0] > 0.0);
        assert!(v[1] < 0.0);
    }

    #[test]
    fn voltage_saturates_at_battery_and_limit() {
        let mut s = Servo::new();
        s.set_gain(PidGain::new(1000.0, 0.0, 0.0), PidGain::new(0.0, 0.0, 0.0));
        s.set_target(10.0, 0.0);

        s.update(10.0, 0.0, 0.0);
        assert!(s.motor_voltage()[0].abs() <= 10.0 + 1e-6);
        assert!(s.motor_duty()[0].abs() <= 1.0 + 1e-6);

        // With a full battery the motor limit caps instead.
        s.reset();
        s.set_gain(PidGain::new(1000.0, 0.0, 0.0), PidGain::new(0.0, 0.0, 0.0));
        s.set_target(10.0, 0.0);
        s.update(24.0, 0.0, 0.0);
        assert!(s.motor_voltage()[0].abs() <= MOTOR_LIMIT_VOLTAGE + 1e-6);
    }

    #[test]
    fn non_finite_voltage_latches_emergency() {
        let mut s = servo();
        s.set_target(f32::NAN, 0.0);
        s.update(VBAT, 0.0, 0.0);
        assert!(s.is_emergency());
    }

    #[test]
    fn stall_latches_after_the_fault_window() {
        let mut s = servo();
        s.set_target(1.0, 0.0);
        // Measured speed stuck at zero against a 1 m/s target.
        for _ in 0..SERVO_ERROR_LINEAR_TIME_MS - 1 {
            s.update(VBAT, 0.0, 0.0);
        }
        assert!(!s.is_emergency());
        s.update(VBAT, 0.0, 0.0);
        assert!(s.is_emergency());
    }

    #[test]
    fn healthy_tracking_keeps_the_timer_clear() {
        let mut s = servo();
        s.set_target(1.0, 0.0);
        for _ in 0..2000 {
            s.update(VBAT, 0.95, 0.0);
        }
        assert!(!s.is_emergency());
    }

    #[test]
    fn emergency_latch_survives_updates_until_reset() {
        let mut s = servo();
        s.emergency_stop();
        assert!(s.is_emergency());
        s.update(VBAT, 1.0, 0.0);
        assert!(s.is_emergency());
        s.reset();
        assert!(!s.is_emergency());
    }

    #[test]
    fn feed_forward_is_inert_with_zero_gains() {
        let mut s = servo();
        s.set_target(2.0, 3.0);
        s.update(VBAT, 2.0, 3.0);
        assert_eq!(s.feed_forward(), [0.0, 0.0]);
    }
}
