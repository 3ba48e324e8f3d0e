//! Compile-time hardware and tuning constants.
//!
//! One flat module, the same way the board firmware keeps them in a single
//! header. Units are in the names or the comments; everything the 1 kHz
//! pipeline needs is `const` so the compiler folds it into the loop.

use core::f32::consts::PI;

// ─── Chassis ────────────────────────────────────────────────────────

/// 3.3 V rail as measured [V] — ADC reference.
pub const REGULATOR_VOLTAGE: f32 = 3.298;
/// Vehicle mass [kg].
pub const MACHINE_WEIGHT: f32 = 110.0e-3;
/// Wheel diameter [m].
pub const WHEEL_DIAMETER: f32 = 23.0e-3;
/// Wheel radius [m].
pub const WHEEL_RADIUS: f32 = WHEEL_DIAMETER / 2.0;
/// Gear ratio [spur/pinion].
pub const GEAR_RATIO: f32 = 42.0 / 11.0;
/// Track width between wheel centers [m].
pub const TREAD_WIDTH: f32 = 101.0e-3;

// ─── Battery & power monitoring ─────────────────────────────────────

/// Battery voltage divider gain on the ADC input.
pub const BATTERY_VOLTAGE_ADC_GAIN: f32 = 4.0;
/// Minimum usable battery voltage [V] (3S, 3.5 V/cell).
pub const BATTERY_VOLTAGE_LIMIT_MIN: f32 = 10.50;
/// Maximum battery voltage [V] (3S, 4.2 V/cell).
pub const BATTERY_VOLTAGE_LIMIT_MAX: f32 = 12.60;
/// Battery voltage moving-average depth [samples].
pub const BATTERY_AVERAGE_SAMPLES: usize = 16;
/// Consecutive under-voltage time that counts as a battery fault [ms].
pub const BATTERY_ERROR_TIME_MS: u32 = 5000;
/// Consecutive power-ADC failure time that counts as a fault [ms].
pub const POWER_ADC_ERROR_TIME_MS: u32 = 5000;

// ─── Motors ─────────────────────────────────────────────────────────

/// Motor torque constant [N·m/A].
pub const TORQUE_CONSTANT: f32 = 4.83e-3;
/// Motor back-EMF constant [V/rpm].
pub const MOTOR_BACK_EMF: f32 = 1.0 / 1980.0;
/// Winding resistance [Ω].
pub const MOTOR_RESISTANCE: f32 = 1.94;
/// Voltage ceiling applied to either motor [V].
pub const MOTOR_LIMIT_VOLTAGE: f32 = 12.6;
/// Current-sense divider resistor [Ω].
pub const MOTOR_CURRENT_DIV_RESISTOR: f32 = 4.99e3;
/// Current-sense mid-rail offset [V].
pub const MOTOR_CURRENT_OFFSET: f32 = REGULATOR_VOLTAGE / 2.0;
/// Downforce fan voltage ceiling [V].
pub const SUCTION_LIMIT_VOLTAGE: f32 = 3.7;

// ─── Encoders ───────────────────────────────────────────────────────

/// Quadrature pulses per wheel revolution (4 × 1024 CPR through the gears).
pub const WHEEL_PULSE_PER_REV: f32 = GEAR_RATIO * (4.0 * 1024.0);
/// Wheel angle per encoder pulse [rad].
pub const ANGLE_PER_PULSE: f32 = 2.0 * PI / WHEEL_PULSE_PER_REV;
/// Translational velocity moving-average depth [samples].
pub const ENCODER_AVERAGE_SAMPLES: usize = 4;

// ─── Servo ──────────────────────────────────────────────────────────

/// Feed-forward gain, translation. Zero keeps the hook inert.
pub const FEED_FORWARD_LINEAR_GAIN: f32 = 0.0;
/// Feed-forward gain, rotation. Zero keeps the hook inert.
pub const FEED_FORWARD_ANGULAR_GAIN: f32 = 0.0;
/// Stall detection: measured speed below this fraction of target counts as error.
pub const SERVO_ERROR_LINEAR_GAIN: f32 = 0.5;
/// Stall detection window, translation [ms].
pub const SERVO_ERROR_LINEAR_TIME_MS: u32 = 500;
/// Stall detection: measured yaw rate below this fraction of target counts as error.
pub const SERVO_ERROR_ANGULAR_GAIN: f32 = 0.5;
/// Stall detection window, rotation [ms].
pub const SERVO_ERROR_ANGULAR_TIME_MS: u32 = 500;

// ─── Periodic tick ──────────────────────────────────────────────────

/// Control/sensing tick period [s].
pub const TICK_INTERVAL: f32 = 1.0e-3;
/// Control/sensing tick period [ns], for the dispatcher.
pub const TICK_INTERVAL_NS: i64 = 1_000_000;

// ─── Line sensor ────────────────────────────────────────────────────

/// Number of front line-sensor channels.
pub const LINE_SENSOR_NUM: usize = 16;
/// Calibration sweep duration [ms].
pub const LINE_CALIBRATION_TIME_MS: u32 = 5000;
/// Lateral-error moving-average depth [samples].
pub const LINE_ERROR_AVERAGE_SAMPLES: usize = 4;
/// Channels simultaneously above threshold that count as a crossing line.
pub const LINE_CROSS_DETECT_NUM: u8 = 8;
/// Sensor bar to axle distance [m].
pub const LINE_DISTANCE_FROM_CENTER: f32 = 81.04e-3;
/// Line sensor bar to side-marker sensor distance [m].
pub const LINE_DISTANCE_FROM_MARKER: f32 = 49.63e-3;
/// Travel without any reflectance before the line counts as lost [m].
pub const LINE_BROWNOUT_IGNORE_DISTANCE: f32 = 0.1;
/// Per-channel detection threshold as a fraction of the calibrated max.
pub const LINE_DETECT_THRESHOLD: f32 = 0.6;

// ─── Marker sensors ─────────────────────────────────────────────────

/// Number of side-marker channels (right = start/goal, left = curve).
pub const MARKER_SENSOR_NUM: usize = 2;
/// Minimum marker width for a valid passage [m].
pub const MARKER_DETECT_DISTANCE: f32 = 0.010;
/// Marker raw-value moving-average depth [samples].
pub const MARKER_AVERAGE_SAMPLES: usize = 4;
/// Detection threshold as a fraction of the calibrated max.
pub const MARKER_DETECT_THRESHOLD: f32 = 0.5;
/// Extra ignore margin after a crossing line [m].
pub const MARKER_IGNORE_OFFSET: f32 = 0.05;

// ─── Course mapping ─────────────────────────────────────────────────

/// Longest recordable course [m].
pub const MAPPING_LIMIT_LENGTH: f32 = 60.0;
/// Curvature sample resolution [m].
pub const MAPPING_DISTANCE: f32 = 0.01;
/// Radius ceiling for near-straight segments [m].
pub const MAPPING_MAX_RADIUS: f32 = 5.0;
/// Yaw floor guarding the radius division [rad].
pub const MAPPING_MIN_ANGLE: f32 = 1.0e-5;
/// Curvature sample capacity (course length / resolution).
pub const MAPPING_MAX_POINTS: usize = (MAPPING_LIMIT_LENGTH / MAPPING_DISTANCE) as usize;

// ─── Position correction ────────────────────────────────────────────

/// Landmark match window, curve markers [m].
pub const CORRECTION_ALLOW_ERROR_CURVE: f32 = 0.1;
/// Landmark match window, crossing lines [m].
pub const CORRECTION_ALLOW_ERROR_CROSS: f32 = 0.1;
/// Landmark list capacity per kind (course length / 10 cm).
pub const CORRECTION_MAX_POINTS: usize = (MAPPING_LIMIT_LENGTH / 0.1) as usize;

// ─── Operator panel ─────────────────────────────────────────────────

/// Short press threshold [ms].
pub const BUTTON_SHORT_PRESS_MS: u32 = 100;
/// Long press threshold [ms].
pub const BUTTON_LONG_PRESS_MS: u32 = 1000;
/// Buzzer tone [Hz].
pub const BUZZER_FREQUENCY_HZ: u16 = 4000;
/// Confirmation beep duration [ms].
pub const BUZZER_ENTER_MS: u16 = 100;
/// Cancellation beep duration [ms].
pub const BUZZER_CANCEL_MS: u16 = 25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_cover_the_course() {
        assert_eq!(MAPPING_MAX_POINTS, 6000);
        assert_eq!(CORRECTION_MAX_POINTS, 600);
    }

    #[test]
    fn angle_per_pulse_is_small_and_positive() {
        assert!(ANGLE_PER_PULSE > 0.0);
        assert!(ANGLE_PER_PULSE < 1.0e-3);
    }
}
