//! Deterministic simulation backend.
//!
//! All devices share one [`SimState`] behind a mutex. Test code (or the
//! hosted firmware binary) drives the input side through a [`SimHandle`]
//! and reads the actuator side back for assertions. Nothing here sleeps:
//! a "fetch" latches whatever the handle last scripted, so a test advances
//! the world exactly one tick at a time.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use pace_common::consts::{ANGLE_PER_PULSE, BATTERY_VOLTAGE_ADC_GAIN, REGULATOR_VOLTAGE};

use crate::{
    FetchError, Imu, LineSenseAdc, MarkerSenseAdc, MotorDriver, Operator, PowerSenseAdc,
    SuctionFan, WheelEncoders, LINE_CHANNELS, MARKER_CHANNELS, POWER_CHANNELS,
    POWER_ORDER_BATTERY,
};

/// Full-scale 12-bit ADC count.
const ADC_MAX: f32 = 4095.0;

/// Gyro sensitivity at ±4000 dps [rad/s per LSB].
pub const GYRO_SCALE: f32 = 0.140 * core::f32::consts::PI / 180.0;
/// Accelerometer sensitivity at ±8 g [m/s² per LSB].
pub const ACCEL_SCALE: f32 = 0.244e-3 * 9.80665;

// ─── Shared state ───────────────────────────────────────────────────

/// Everything the simulated board knows, inputs and outputs.
#[derive(Debug)]
struct SimState {
    // ── Scripted inputs ──
    line_raw: [u16; LINE_CHANNELS],
    marker_raw: [u16; MARKER_CHANNELS],
    power_raw: [u16; POWER_CHANNELS],
    /// Wheel angle accumulators [rad], turned into counter values on fetch.
    wheel_angle: [f64; 2],
    yaw_rate: f32,
    accel_y: f32,
    gyro_bias: [i16; 3],
    accel_bias: [i16; 3],
    /// Queued button presses [ms held].
    presses: VecDeque<u32>,
    /// Per-device failure injection.
    fail_line: bool,
    fail_marker: bool,
    fail_power: bool,
    fail_imu: bool,

    // ── Actuator outputs ──
    motor_enabled: bool,
    motor_braked: bool,
    duty: [f32; 2],
    fan_enabled: bool,
    fan_duty: f32,
    indicator: u8,
    last_buzzer: Option<(u16, u16)>,
}

impl SimState {
    fn new() -> Self {
        Self {
            line_raw: [0; LINE_CHANNELS],
            marker_raw: [0; MARKER_CHANNELS],
            power_raw: [0; POWER_CHANNELS],
            wheel_angle: [0.0; 2],
            yaw_rate: 0.0,
            accel_y: 0.0,
            gyro_bias: [0; 3],
            accel_bias: [0; 3],
            presses: VecDeque::new(),
            fail_line: false,
            fail_marker: false,
            fail_power: false,
            fail_imu: false,
            motor_enabled: false,
            motor_braked: false,
            duty: [0.0; 2],
            fan_enabled: false,
            fan_duty: 0.0,
            indicator: 0,
            last_buzzer: None,
        }
    }
}

type Shared = Arc<Mutex<SimState>>;

// ─── Handle ─────────────────────────────────────────────────────────

/// Scripting and inspection handle onto the simulated board.
#[derive(Clone)]
pub struct SimHandle {
    state: Shared,
}

impl SimHandle {
    /// Set every line channel to the same raw count.
    pub fn set_line_uniform(&self, raw: u16) {
        self.state.lock().line_raw = [raw; LINE_CHANNELS];
    }

    /// Set individual line channels.
    pub fn set_line_raw(&self, raw: [u16; LINE_CHANNELS]) {
        self.state.lock().line_raw = raw;
    }

    /// Set the side-marker channels `[right, left]`.
    pub fn set_marker_raw(&self, raw: [u16; MARKER_CHANNELS]) {
        self.state.lock().marker_raw = raw;
    }

    /// Script the battery voltage [V]; currents read mid-rail (zero).
    pub fn set_battery_voltage(&self, volts: f32) {
        let divided = volts / BATTERY_VOLTAGE_ADC_GAIN;
        let count = (divided / REGULATOR_VOLTAGE * ADC_MAX).clamp(0.0, ADC_MAX) as u16;
        let mut s = self.state.lock();
        s.power_raw = [(ADC_MAX / 2.0) as u16, (ADC_MAX / 2.0) as u16, 0];
        s.power_raw[POWER_ORDER_BATTERY] = count;
    }

    /// Advance both wheels by the given angles [rad].
    pub fn advance_wheels(&self, right: f32, left: f32) {
        let mut s = self.state.lock();
        s.wheel_angle[0] += right as f64;
        s.wheel_angle[1] += left as f64;
    }

    /// Script the IMU yaw rate [rad/s] and lateral acceleration [m/s²].
    pub fn set_motion(&self, yaw_rate: f32, accel_y: f32) {
        let mut s = self.state.lock();
        s.yaw_rate = yaw_rate;
        s.accel_y = accel_y;
    }

    /// Inject constant raw-word bias onto the IMU channels.
    pub fn set_imu_bias(&self, gyro: [i16; 3], accel: [i16; 3]) {
        let mut s = self.state.lock();
        s.gyro_bias = gyro;
        s.accel_bias = accel;
    }

    /// Queue a button press of the given held duration [ms].
    pub fn push_press(&self, held_ms: u32) {
        self.state.lock().presses.push_back(held_ms);
    }

    /// Inject or clear fetch failures per device.
    pub fn set_failures(&self, line: bool, marker: bool, power: bool, imu: bool) {
        let mut s = self.state.lock();
        s.fail_line = line;
        s.fail_marker = marker;
        s.fail_power = power;
        s.fail_imu = imu;
    }

    /// Last commanded motor duty `[right, left]`.
    pub fn duty(&self) -> [f32; 2] {
        self.state.lock().duty
    }

    /// Whether the driver is currently short-braking.
    pub fn is_braked(&self) -> bool {
        self.state.lock().motor_braked
    }

    /// Whether the H-bridge enable line is up.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().motor_enabled
    }

    /// Fan state `(enabled, duty)`.
    pub fn fan(&self) -> (bool, f32) {
        let s = self.state.lock();
        (s.fan_enabled, s.fan_duty)
    }

    /// Current indicator LED bits.
    pub fn indicator(&self) -> u8 {
        self.state.lock().indicator
    }
}

// ─── Board ──────────────────────────────────────────────────────────

/// The complete simulated board: one device struct per trait.
pub struct SimBoard {
    pub encoders: SimEncoders,
    pub imu: SimImu,
    pub line_adc: SimLineAdc,
    pub marker_adc: SimMarkerAdc,
    pub power_adc: SimPowerAdc,
    pub motor: SimMotor,
    pub fan: SimFan,
    pub operator: SimOperator,
}

impl SimBoard {
    /// Build a board and the handle that scripts it.
    pub fn new() -> (Self, SimHandle) {
        let state: Shared = Arc::new(Mutex::new(SimState::new()));
        let board = Self {
            encoders: SimEncoders { state: state.clone() },
            imu: SimImu { state: state.clone(), latched: ImuLatch::default(), offset: [0; 6] },
            line_adc: SimLineAdc { state: state.clone(), latched: [0; LINE_CHANNELS] },
            marker_adc: SimMarkerAdc { state: state.clone(), latched: [0; MARKER_CHANNELS] },
            power_adc: SimPowerAdc { state: state.clone(), latched: [0; POWER_CHANNELS] },
            motor: SimMotor { state: state.clone() },
            fan: SimFan { state: state.clone() },
            operator: SimOperator { state: state.clone() },
        };
        (board, SimHandle { state })
    }
}

// ─── Devices ────────────────────────────────────────────────────────

pub struct SimEncoders {
    state: Shared,
}

impl WheelEncoders for SimEncoders {
    fn counters(&mut self) -> Result<[u16; 2], FetchError> {
        let s = self.state.lock();
        let mut out = [0u16; 2];
        for (i, angle) in s.wheel_angle.iter().enumerate() {
            let pulses = (angle / ANGLE_PER_PULSE as f64).round() as i64;
            out[i] = (pulses.rem_euclid(1 << 16)) as u16;
        }
        Ok(out)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ImuLatch {
    gyro: [i16; 3],
    accel: [i16; 3],
}

pub struct SimImu {
    state: Shared,
    latched: ImuLatch,
    offset: [i16; 6],
}

impl Imu for SimImu {
    fn fetch(&mut self) -> Result<(), FetchError> {
        let s = self.state.lock();
        if s.fail_imu {
            return Err(FetchError);
        }
        let gz = (s.yaw_rate / GYRO_SCALE) as i32 + s.gyro_bias[2] as i32;
        let ay = (s.accel_y / ACCEL_SCALE) as i32 + s.accel_bias[1] as i32;
        self.latched.gyro = [s.gyro_bias[0], s.gyro_bias[1], gz.clamp(-32768, 32767) as i16];
        self.latched.accel = [s.accel_bias[0], ay.clamp(-32768, 32767) as i16, s.accel_bias[2]];
        Ok(())
    }

    fn gyro_raw(&self) -> [i16; 3] {
        [
            self.latched.gyro[0].wrapping_sub(self.offset[0]),
            self.latched.gyro[1].wrapping_sub(self.offset[1]),
            self.latched.gyro[2].wrapping_sub(self.offset[2]),
        ]
    }

    fn accel_raw(&self) -> [i16; 3] {
        [
            self.latched.accel[0].wrapping_sub(self.offset[3]),
            self.latched.accel[1].wrapping_sub(self.offset[4]),
            self.latched.accel[2].wrapping_sub(self.offset[5]),
        ]
    }

    fn accel_y(&self) -> f32 {
        self.accel_raw()[1] as f32 * ACCEL_SCALE
    }

    fn yaw_rate(&self) -> f32 {
        self.gyro_raw()[2] as f32 * GYRO_SCALE
    }

    fn set_offset(&mut self, offset: [i16; 6]) {
        self.offset = offset;
    }

    fn reset(&mut self) {
        self.offset = [0; 6];
        self.latched = ImuLatch::default();
    }
}

pub struct SimLineAdc {
    state: Shared,
    latched: [u16; LINE_CHANNELS],
}

impl LineSenseAdc for SimLineAdc {
    fn fetch(&mut self) -> Result<(), FetchError> {
        let s = self.state.lock();
        if s.fail_line {
            return Err(FetchError);
        }
        self.latched = s.line_raw;
        Ok(())
    }

    fn raw(&self, order: usize) -> u16 {
        self.latched[order] & 0x0fff
    }
}

pub struct SimMarkerAdc {
    state: Shared,
    latched: [u16; MARKER_CHANNELS],
}

impl MarkerSenseAdc for SimMarkerAdc {
    fn fetch(&mut self) -> Result<(), FetchError> {
        let s = self.state.lock();
        if s.fail_marker {
            return Err(FetchError);
        }
        self.latched = s.marker_raw;
        Ok(())
    }

    fn raw(&self, order: usize) -> u16 {
        self.latched[order] & 0x0fff
    }
}

pub struct SimPowerAdc {
    state: Shared,
    latched: [u16; POWER_CHANNELS],
}

impl PowerSenseAdc for SimPowerAdc {
    fn fetch(&mut self) -> Result<(), FetchError> {
        let s = self.state.lock();
        if s.fail_power {
            return Err(FetchError);
        }
        self.latched = s.power_raw;
        Ok(())
    }

    fn raw(&self, order: usize) -> u16 {
        self.latched[order] & 0x0fff
    }
}

pub struct SimMotor {
    state: Shared,
}

impl MotorDriver for SimMotor {
    fn enable(&mut self) {
        self.state.lock().motor_enabled = true;
    }

    fn disable(&mut self) {
        self.state.lock().motor_enabled = false;
    }

    fn set_duty(&mut self, duty: [f32; 2]) {
        let mut s = self.state.lock();
        s.duty = duty;
        s.motor_braked = false;
    }

    fn brake(&mut self) {
        let mut s = self.state.lock();
        s.duty = [0.0; 2];
        s.motor_braked = true;
    }

    fn fault(&mut self) -> bool {
        false
    }
}

pub struct SimFan {
    state: Shared,
}

impl SuctionFan for SimFan {
    fn enable(&mut self) {
        self.state.lock().fan_enabled = true;
    }

    fn disable(&mut self) {
        let mut s = self.state.lock();
        s.fan_enabled = false;
        s.fan_duty = 0.0;
    }

    fn set_duty(&mut self, duty: f32) {
        self.state.lock().fan_duty = duty.clamp(0.0, 1.0);
    }
}

pub struct SimOperator {
    state: Shared,
}

impl Operator for SimOperator {
    fn set_indicator(&self, bits: u8, mask: u8) {
        let mut s = self.state.lock();
        s.indicator = (s.indicator & !mask) | (bits & mask);
    }

    fn set_buzzer(&self, freq_hz: u16, duration_ms: u16) {
        self.state.lock().last_buzzer = Some((freq_hz, duration_ms));
    }

    fn wait_press(&self, _timeout_ms: u32) -> u32 {
        // Queue-driven: the next scripted press, or timeout immediately.
        self.state.lock().presses.pop_front().unwrap_or(0)
    }

    fn fatal(&self) -> ! {
        error!("operator fatal latched — simulated board halting");
        std::process::exit(1);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoders_wrap_like_hardware_counters() {
        let (mut board, handle) = SimBoard::new();
        let start = board.encoders.counters().unwrap();
        assert_eq!(start, [0, 0]);

        // One full counter range of forward motion wraps back around.
        handle.advance_wheels(ANGLE_PER_PULSE * 65536.0, 0.0);
        let wrapped = board.encoders.counters().unwrap();
        assert_eq!(wrapped[0], 0);
    }

    #[test]
    fn imu_round_trips_motion_through_raw_words() {
        let (mut board, handle) = SimBoard::new();
        handle.set_motion(1.0, 2.0);
        board.imu.fetch().unwrap();
        assert!((board.imu.yaw_rate() - 1.0).abs() < GYRO_SCALE);
        assert!((board.imu.accel_y() - 2.0).abs() < ACCEL_SCALE);
    }

    #[test]
    fn imu_offsets_cancel_bias() {
        let (mut board, handle) = SimBoard::new();
        handle.set_imu_bias([0, 0, 100], [0, 50, 0]);
        board.imu.fetch().unwrap();
        board.imu.set_offset([0, 0, 100, 0, 50, 0]);
        assert_eq!(board.imu.gyro_raw()[2], 0);
        assert_eq!(board.imu.accel_raw()[1], 0);
    }

    #[test]
    fn failure_injection_surfaces_as_fetch_error() {
        let (mut board, handle) = SimBoard::new();
        handle.set_failures(true, false, false, true);
        assert_eq!(board.line_adc.fetch(), Err(FetchError));
        assert_eq!(board.imu.fetch(), Err(FetchError));
        assert!(board.marker_adc.fetch().is_ok());
    }

    #[test]
    fn battery_scripting_lands_near_requested_voltage() {
        let (mut board, handle) = SimBoard::new();
        handle.set_battery_voltage(12.0);
        board.power_adc.fetch().unwrap();
        let count = board.power_adc.raw(POWER_ORDER_BATTERY);
        let volts = count as f32 / ADC_MAX * REGULATOR_VOLTAGE * BATTERY_VOLTAGE_ADC_GAIN;
        assert!((volts - 12.0).abs() < 0.02);
    }

    #[test]
    fn motor_brake_zeroes_duty() {
        let (mut board, handle) = SimBoard::new();
        board.motor.enable();
        board.motor.set_duty([0.5, -0.5]);
        assert_eq!(handle.duty(), [0.5, -0.5]);
        board.motor.brake();
        assert!(handle.is_braked());
        assert_eq!(handle.duty(), [0.0, 0.0]);
    }

    #[test]
    fn operator_presses_are_queue_driven() {
        let (board, handle) = SimBoard::new();
        handle.push_press(150);
        assert_eq!(board.operator.wait_press(0), 150);
        assert_eq!(board.operator.wait_press(0), 0);
    }
}
