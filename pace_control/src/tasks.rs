//! Per-tick task bodies.
//!
//! Each function is the body of one periodic task: it fetches its devices,
//! updates its components in the shared [`Context`], and reports whether
//! the tick's conversions succeeded. The threaded runner in the firmware
//! binary calls these on every tick notification; tests call them
//! directly, one tick at a time.

use pace_hal::{Imu, LineSenseAdc, MarkerSenseAdc, MotorDriver, PowerSenseAdc, WheelEncoders};

use crate::context::Context;
use crate::odometry::Encoder;

/// Motion sensing: encoders + IMU into the odometry.
///
/// A failed IMU or encoder transfer drops the sample; the odometry's
/// velocity average absorbs a zero for the translation term so stale
/// motion does not linger.
pub fn motion_sensing_tick(
    ctx: &Context,
    encoder: &mut Encoder,
    encoders: &mut dyn WheelEncoders,
    imu: &mut dyn Imu,
) -> bool {
    let counters = match encoders.counters() {
        Ok(c) => c,
        Err(_) => {
            ctx.odometry.lock().update(0.0, 0.0, 0.0, 0.0);
            return false;
        }
    };
    encoder.update(counters);
    if imu.fetch().is_err() {
        ctx.odometry.lock().update(0.0, 0.0, 0.0, 0.0);
        return false;
    }
    let diff = encoder.diff();
    ctx.odometry
        .lock()
        .update(diff[0], diff[1], imu.accel_y(), imu.yaw_rate());
    true
}

/// Line sensing: line array + side markers against the current travel.
pub fn line_sensing_tick(
    ctx: &Context,
    line_adc: &mut dyn LineSenseAdc,
    marker_adc: &mut dyn MarkerSenseAdc,
) -> bool {
    let distance = ctx.odometry.lock().displacement().trans;
    let line_ok = ctx.line.lock().update(line_adc, distance);
    let marker_ok = ctx.marker.lock().update(marker_adc, distance);
    line_ok && marker_ok
}

/// Power monitoring.
pub fn power_tick(ctx: &Context, adc: &mut dyn PowerSenseAdc) -> bool {
    ctx.power.lock().update(adc)
}

/// Motion output: servo update and motor duty, brake on emergency.
pub fn motion_output_tick(ctx: &Context, motor: &mut dyn MotorDriver) {
    let battery_voltage = ctx.power.lock().battery_voltage();
    let velocity = ctx.odometry.lock().velocity();
    let mut servo = ctx.servo.lock();
    servo.update(battery_voltage, velocity.trans, velocity.rot);
    if servo.is_emergency() {
        motor.brake();
    } else {
        motor.set_duty(servo.motor_duty());
    }
}

/// Reset every sensing component for a fresh run.
///
/// Returns `false` when the encoder counters cannot be latched.
pub fn reset_sensors(
    ctx: &Context,
    encoder: &mut Encoder,
    encoders: &mut dyn WheelEncoders,
    imu: &mut dyn Imu,
) -> bool {
    let Ok(counters) = encoders.counters() else {
        return false;
    };
    encoder.reset(counters);
    imu.reset();
    ctx.odometry.lock().reset();
    ctx.line.lock().reset();
    ctx.marker.lock().reset();
    ctx.power.lock().reset();
    ctx.servo.lock().reset();
    true
}

/// Gyro/accelerometer offset calibration.
///
/// Discards half the window to let the device settle, then averages
/// `samples` raw readings into the per-axis offsets. `wait_tick` blocks
/// for the next periodic notification and returns `false` on timeout,
/// which aborts the calibration.
pub fn calibrate_imu<F>(imu: &mut dyn Imu, samples: u32, mut wait_tick: F) -> bool
where
    F: FnMut() -> bool,
{
    imu.reset();
    for _ in 0..samples / 2 {
        if !wait_tick() || imu.fetch().is_err() {
            imu.reset();
            return false;
        }
    }

    let mut acc = [0i64; 6];
    for _ in 0..samples {
        if !wait_tick() || imu.fetch().is_err() {
            imu.reset();
            return false;
        }
        let gyro = imu.gyro_raw();
        let accel = imu.accel_raw();
        for i in 0..3 {
            acc[i] += gyro[i] as i64;
            acc[i + 3] += accel[i] as i64;
        }
    }

    let mut offset = [0i16; 6];
    for i in 0..6 {
        offset[i] = (acc[i] / samples as i64) as i16;
    }
    imu.set_offset(offset);
    true
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pace_common::consts::ANGLE_PER_PULSE;
    use pace_hal::sim::SimBoard;

    #[test]
    fn motion_sensing_feeds_odometry() {
        let ctx = Context::new();
        let (mut board, handle) = SimBoard::new();
        let mut encoder = Encoder::new();
        assert!(reset_sensors(&ctx, &mut encoder, &mut board.encoders, &mut board.imu));

        handle.advance_wheels(ANGLE_PER_PULSE * 100.0, ANGLE_PER_PULSE * 100.0);
        handle.set_motion(0.5, 0.0);
        assert!(motion_sensing_tick(&ctx, &mut encoder, &mut board.encoders, &mut board.imu));

        let odo = ctx.odometry.lock();
        assert!(odo.displacement().trans > 0.0);
        assert!((odo.velocity().rot - 0.5).abs() < 0.01);
    }

    #[test]
    fn imu_failure_drops_the_sample() {
        let ctx = Context::new();
        let (mut board, handle) = SimBoard::new();
        let mut encoder = Encoder::new();
        reset_sensors(&ctx, &mut encoder, &mut board.encoders, &mut board.imu);

        handle.set_failures(false, false, false, true);
        handle.advance_wheels(ANGLE_PER_PULSE * 100.0, ANGLE_PER_PULSE * 100.0);
        assert!(!motion_sensing_tick(&ctx, &mut encoder, &mut board.encoders, &mut board.imu));
        assert_eq!(ctx.odometry.lock().displacement().trans, 0.0);
    }

    #[test]
    fn motion_output_brakes_on_emergency() {
        let ctx = Context::new();
        let (mut board, handle) = SimBoard::new();
        board.motor.enable();

        ctx.servo.lock().emergency_stop();
        motion_output_tick(&ctx, &mut board.motor);
        assert!(handle.is_braked());
    }

    #[test]
    fn imu_calibration_cancels_constant_bias() {
        let (mut board, handle) = SimBoard::new();
        handle.set_imu_bias([5, -3, 120], [7, 40, -9]);
        assert!(calibrate_imu(&mut board.imu, 100, || true));

        board.imu.fetch().unwrap();
        assert_eq!(board.imu.gyro_raw(), [0, 0, 0]);
        assert_eq!(board.imu.accel_raw(), [0, 0, 0]);
        assert!(board.imu.yaw_rate().abs() < 1e-6);
    }

    #[test]
    fn imu_calibration_aborts_on_missed_tick() {
        let (mut board, _handle) = SimBoard::new();
        let mut ticks = 0;
        assert!(!calibrate_imu(&mut board.imu, 100, || {
            ticks += 1;
            ticks < 10
        }));
    }
}
