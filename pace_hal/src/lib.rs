//! # pace_hal
//!
//! Hardware interface traits for the pace-core pipeline, plus a pluggable
//! simulation backend.
//!
//! The traits deliberately mirror the shape of the board drivers they stand
//! for: every sampling device is "fetch a fresh conversion, then read raw
//! channels", and a failed transfer surfaces as a kind-less [`FetchError`]
//! that the sensing layer counts and otherwise swallows. Conversion from
//! raw counts to physical units stays on whichever side owns the scale
//! factor: ADCs hand out 12-bit counts, the IMU hands out already-scaled
//! rates because the range configuration lives in its driver.
//!
//! ## Lifecycle
//!
//! 1. Construct a backend (simulation or a real board crate).
//! 2. Hand each device to the task that owns it.
//! 3. Devices are fetched once per 1 ms tick; none of the calls block
//!    longer than the transfer timeout.

use thiserror::Error;

pub mod sim;

/// Number of line-sensor ADC channels.
pub const LINE_CHANNELS: usize = 16;
/// Number of side-marker ADC channels.
pub const MARKER_CHANNELS: usize = 2;
/// Number of power-monitor ADC channels.
pub const POWER_CHANNELS: usize = 3;

/// Power ADC channel order: right motor current.
pub const POWER_ORDER_CURRENT_RIGHT: usize = 0;
/// Power ADC channel order: left motor current.
pub const POWER_ORDER_CURRENT_LEFT: usize = 1;
/// Power ADC channel order: battery voltage (divided).
pub const POWER_ORDER_BATTERY: usize = 2;

// ─── Errors ─────────────────────────────────────────────────────────

/// A single transfer failed (DMA timeout, bus error).
///
/// Deliberately carries no classification: the caller's only recovery is to
/// skip the sample and count the failure toward a fault timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hardware transfer failed")]
pub struct FetchError;

/// Backend construction / bring-up error.
#[derive(Debug, Error)]
pub enum HalError {
    /// Device initialization failed.
    #[error("initialization failed: {0}")]
    InitFailed(String),
}

// ─── Sampling devices ───────────────────────────────────────────────

/// Free-running 16-bit quadrature counters, one per wheel.
///
/// The contract is that forward motion increases both counters; a backend
/// whose right encoder counts backwards inverts it before handing the value
/// out. Wrap handling is the reader's job.
pub trait WheelEncoders: Send {
    /// Latch and return both counters `[right, left]`.
    fn counters(&mut self) -> Result<[u16; 2], FetchError>;
}

/// 6-DoF inertial unit: 3-axis gyro + 3-axis accelerometer.
///
/// One burst read per tick refreshes every channel. Raw getters expose the
/// signed sensor words for offset calibration; the scaled getters apply the
/// configured range (±4000 dps gyro, ±8 g accel) and subtract the stored
/// offsets.
pub trait Imu: Send {
    /// Burst-read all channels.
    fn fetch(&mut self) -> Result<(), FetchError>;

    /// Raw gyro words `[x, y, z]`, offsets applied.
    fn gyro_raw(&self) -> [i16; 3];
    /// Raw accelerometer words `[x, y, z]`, offsets applied.
    fn accel_raw(&self) -> [i16; 3];

    /// Lateral (y) acceleration [m/s²].
    fn accel_y(&self) -> f32;
    /// Yaw rate about z [rad/s].
    fn yaw_rate(&self) -> f32;

    /// Store per-axis integer offsets `[gx, gy, gz, ax, ay, az]`
    /// subtracted on every subsequent read.
    fn set_offset(&mut self, offset: [i16; 6]);
    /// Clear offsets and any internal filter state.
    fn reset(&mut self);
}

/// 16-channel 12-bit line-sensor ADC.
pub trait LineSenseAdc: Send {
    /// Convert all channels for this tick.
    fn fetch(&mut self) -> Result<(), FetchError>;
    /// Raw 12-bit count of channel `order` from the last fetch.
    fn raw(&self, order: usize) -> u16;
}

/// 2-channel 12-bit side-marker ADC.
pub trait MarkerSenseAdc: Send {
    /// Convert both channels for this tick.
    fn fetch(&mut self) -> Result<(), FetchError>;
    /// Raw 12-bit count of channel `order` from the last fetch.
    fn raw(&self, order: usize) -> u16;
}

/// 3-channel power-monitor ADC (motor currents + battery voltage).
pub trait PowerSenseAdc: Send {
    /// Convert all channels for this tick.
    fn fetch(&mut self) -> Result<(), FetchError>;
    /// Raw 12-bit count of channel `order` from the last fetch.
    fn raw(&self, order: usize) -> u16;
}

// ─── Actuators ──────────────────────────────────────────────────────

/// Dual H-bridge motor driver.
///
/// Duty is signed in `[-1, +1]`, `+` forward. `brake` shorts both motors
/// by forcing both PWM comparator outputs low at once.
pub trait MotorDriver: Send {
    /// Release the enable line.
    fn enable(&mut self);
    /// Gate the H-bridges off.
    fn disable(&mut self);
    /// Apply `[right, left]` duty.
    fn set_duty(&mut self, duty: [f32; 2]);
    /// Short-brake both motors.
    fn brake(&mut self);
    /// Driver fault input (active condition already decoded).
    fn fault(&mut self) -> bool;
}

/// Downforce fan.
pub trait SuctionFan: Send {
    fn enable(&mut self);
    fn disable(&mut self);
    /// Apply unsigned duty in `[0, 1]`.
    fn set_duty(&mut self, duty: f32);
}

// ─── Operator panel ─────────────────────────────────────────────────

/// Button, indicator LEDs and buzzer, reduced to an abstract surface.
pub trait Operator: Send + Sync {
    /// Set the indicator LEDs selected by `mask` to `bits`.
    fn set_indicator(&self, bits: u8, mask: u8);
    /// Queue a tone.
    fn set_buzzer(&self, freq_hz: u16, duration_ms: u16);
    /// Block until a debounced press-and-release, up to `timeout_ms`.
    /// Returns the held duration in ms, 0 on timeout.
    fn wait_press(&self, timeout_ms: u32) -> u32;
    /// Non-blocking: is the button currently held?
    fn is_pressed(&self) -> bool {
        self.wait_press(0) > 0
    }
    /// Latch a flashing fault indication. Never returns.
    fn fatal(&self) -> !;
}
