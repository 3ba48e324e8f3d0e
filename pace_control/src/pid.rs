//! PID controller with trapezoidal integration.
//!
//! The three component outputs stay readable after each update because the
//! run log records them individually. The wheel servo loops run with
//! `dt = 1.0` (gains folded per tick); the line-following loop passes the
//! real tick period.

use pace_common::types::PidGain;

/// PID controller over `f32` with trapezoidal integral.
#[derive(Debug, Clone, Default)]
pub struct Pid {
    gain: PidGain,

    p: f32,
    i: f32,
    d: f32,

    prev_error: f32,
    sum_error: f32,
}

impl Pid {
    pub fn new(gain: PidGain) -> Self {
        Self {
            gain,
            ..Default::default()
        }
    }

    /// Install new gains and clear all state.
    pub fn set_gain(&mut self, gain: PidGain) {
        self.gain = gain;
        self.reset();
    }

    /// Clear integral, previous error and component outputs.
    pub fn reset(&mut self) {
        self.p = 0.0;
        self.i = 0.0;
        self.d = 0.0;
        self.prev_error = 0.0;
        self.sum_error = 0.0;
    }

    /// One controller step. `dt` is the integration step the gains were
    /// tuned against, not necessarily wall time.
    pub fn update(&mut self, target: f32, current: f32, dt: f32) -> f32 {
        let error = target - current;
        self.sum_error += (error + self.prev_error) * dt / 2.0;
        self.p = self.gain.kp * error;
        self.i = self.gain.ki * self.sum_error;
        self.d = self.gain.kd * (error - self.prev_error) / dt;
        self.prev_error = error;
        self.p + self.i + self.d
    }

    /// Last total output.
    #[inline]
    pub fn output(&self) -> f32 {
        self.p + self.i + self.d
    }

    /// Last proportional component.
    #[inline]
    pub fn proportional(&self) -> f32 {
        self.p
    }

    /// Last integral component.
    #[inline]
    pub fn integral(&self) -> f32 {
        self.i
    }

    /// Last derivative component.
    #[inline]
    pub fn derivative(&self) -> f32 {
        self.d
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_proportional() {
        let mut pid = Pid::new(PidGain::new(10.0, 0.0, 0.0));
        let out = pid.update(1.0, 0.0, 1.0);
        assert!((out - 10.0).abs() < 1e-6);
    }

    #[test]
    fn trapezoidal_integral_over_constant_error() {
        let mut pid = Pid::new(PidGain::new(0.0, 2.0, 0.0));
        let n = 10;
        for _ in 0..n {
            pid.update(1.0, 0.0, 1.0);
        }
        // First step integrates half a trapezoid: sum = n − 0.5.
        let expected = 2.0 * (n as f32 - 0.5);
        assert!((pid.integral() - expected).abs() < 1e-5);
        // Within one step of the rectangle rule Ki·n·e.
        assert!((pid.integral() - 2.0 * n as f32).abs() <= 2.0);
    }

    #[test]
    fn derivative_sees_error_change() {
        let mut pid = Pid::new(PidGain::new(0.0, 0.0, 1.0));
        pid.update(0.0, 0.0, 1.0);
        let out = pid.update(1.0, 0.0, 1.0);
        assert!((out - 1.0).abs() < 1e-6);
        // Constant error afterwards → derivative decays to zero.
        let out = pid.update(1.0, 0.0, 1.0);
        assert!(out.abs() < 1e-6);
    }

    #[test]
    fn dt_scales_integral_and_derivative() {
        let mut fine = Pid::new(PidGain::new(0.0, 1.0, 1.0));
        fine.update(0.0, 0.0, 1e-3);
        let out = fine.update(1.0, 0.0, 1e-3);
        // d = (1 − 0)/1e-3 = 1000 dominates.
        assert!(out > 999.0);
    }

    #[test]
    fn reset_clears_components_and_state() {
        let mut pid = Pid::new(PidGain::new(1.0, 1.0, 1.0));
        for _ in 0..5 {
            pid.update(3.0, 1.0, 1.0);
        }
        pid.reset();
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.proportional(), 0.0);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.derivative(), 0.0);
        // Next update behaves like the first ever.
        let out = pid.update(1.0, 0.0, 1.0);
        let mut fresh = Pid::new(PidGain::new(1.0, 1.0, 1.0));
        assert_eq!(out, fresh.update(1.0, 0.0, 1.0));
    }

    #[test]
    fn set_gain_resets_state() {
        let mut pid = Pid::new(PidGain::new(0.0, 5.0, 0.0));
        for _ in 0..10 {
            pid.update(1.0, 0.0, 1.0);
        }
        pid.set_gain(PidGain::new(1.0, 0.0, 0.0));
        assert_eq!(pid.integral(), 0.0);
    }
}
