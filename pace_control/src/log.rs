//! Packed run-log record.
//!
//! One record per log interval, appended to the store's log region. The
//! wire image is 96 bytes little-endian; the layout is frozen so the dump
//! tooling can decode logs from any firmware build.

use static_assertions::assert_eq_size;

/// Encoded size of one record [bytes].
pub const LOG_RECORD_SIZE: usize = 96;

/// One log sample, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C, packed)]
pub struct LogRecord {
    /// Milliseconds since the start marker.
    pub time_ms: u32,
    /// `LineState` discriminant.
    pub line_state: u8,
    /// `RunState` discriminant.
    pub run_state: u8,

    /// Commanded linear velocity [m/s].
    pub command_velocity: f32,
    /// Estimated linear velocity [m/s].
    pub estimate_velocity: f32,
    /// Velocity-table position (index × resolution) [m].
    pub expect_translate: f32,
    /// Odometric travel [m].
    pub estimate_translate: f32,
    /// Landmark-corrected travel [m].
    pub corrected_translate: f32,
    /// Line lateral error.
    pub error_angle: f32,
    /// Commanded angular velocity [rad/s].
    pub command_angular_velocity: f32,
    /// Line PID proportional component.
    pub command_angular_p: f32,
    /// Line PID integral component.
    pub command_angular_i: f32,
    /// Line PID derivative component.
    pub command_angular_d: f32,
    /// Estimated angular velocity [rad/s].
    pub estimate_angular_velocity: f32,
    /// Integrated heading [rad].
    pub estimate_rotate: f32,
    /// Battery voltage [V].
    pub battery_voltage: f32,
    /// Right motor voltage command [V].
    pub motor_voltage_right: f32,
    /// Left motor voltage command [V].
    pub motor_voltage_left: f32,
    /// Right motor current [A].
    pub motor_current_right: f32,
    /// Left motor current [A].
    pub motor_current_left: f32,
    /// Pose x [m].
    pub x: f32,
    /// Pose y [m].
    pub y: f32,
    /// Pose heading [rad].
    pub theta: f32,
    /// Active velocity clamp [m/s].
    pub limit_velocity: f32,
    /// Active acceleration command [m/s²].
    pub acceleration: f32,

    /// Right `MarkerState` discriminant.
    pub marker_right: u8,
    /// Left `MarkerState` discriminant.
    pub marker_left: u8,
}

assert_eq_size!(LogRecord, [u8; LOG_RECORD_SIZE]);

impl LogRecord {
    /// Encode into the little-endian wire image.
    pub fn encode(&self) -> [u8; LOG_RECORD_SIZE] {
        let mut buf = [0u8; LOG_RECORD_SIZE];
        let mut pos = 0usize;

        let mut put = |bytes: &[u8], pos: &mut usize| {
            buf[*pos..*pos + bytes.len()].copy_from_slice(bytes);
            *pos += bytes.len();
        };

        put(&self.time_ms.to_le_bytes(), &mut pos);
        put(&[self.line_state, self.run_state], &mut pos);
        for f in self.floats() {
            put(&f.to_le_bytes(), &mut pos);
        }
        put(&[self.marker_right, self.marker_left], &mut pos);
        buf
    }

    /// Decode a wire image.
    pub fn decode(buf: &[u8; LOG_RECORD_SIZE]) -> Self {
        let f32_at = |pos: usize| f32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
        // Fields are initialized in source order, which is wire order.
        let mut pos = 6;
        let mut next = || {
            let v = f32_at(pos);
            pos += 4;
            v
        };

        Self {
            time_ms: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            line_state: buf[4],
            run_state: buf[5],
            command_velocity: next(),
            estimate_velocity: next(),
            expect_translate: next(),
            estimate_translate: next(),
            corrected_translate: next(),
            error_angle: next(),
            command_angular_velocity: next(),
            command_angular_p: next(),
            command_angular_i: next(),
            command_angular_d: next(),
            estimate_angular_velocity: next(),
            estimate_rotate: next(),
            battery_voltage: next(),
            motor_voltage_right: next(),
            motor_voltage_left: next(),
            motor_current_right: next(),
            motor_current_left: next(),
            x: next(),
            y: next(),
            theta: next(),
            limit_velocity: next(),
            acceleration: next(),
            marker_right: buf[94],
            marker_left: buf[95],
        }
    }

    /// The float fields in wire order.
    fn floats(&self) -> [f32; 22] {
        [
            self.command_velocity,
            self.estimate_velocity,
            self.expect_translate,
            self.estimate_translate,
            self.corrected_translate,
            self.error_angle,
            self.command_angular_velocity,
            self.command_angular_p,
            self.command_angular_i,
            self.command_angular_d,
            self.estimate_angular_velocity,
            self.estimate_rotate,
            self.battery_voltage,
            self.motor_voltage_right,
            self.motor_voltage_left,
            self.motor_current_right,
            self.motor_current_left,
            self.x,
            self.y,
            self.theta,
            self.limit_velocity,
            self.acceleration,
        ]
    }

    /// CSV header matching [`LogRecord::csv_row`].
    pub const fn csv_header() -> &'static str {
        "Time, Line State, Run State, Command Velocity, Estimate Velocity, \
         Expect Translate, Estimate Translate, Corrected Translate, Error Angle, \
         Command Angular Velocity, Command Angular Velocity (P), \
         Command Angular Velocity (I), Command Angular Velocity (D), \
         Estimate Angular Velocity, Estimate Rotate, Battery Voltage, \
         Motor Voltage Right, Motor Voltage Left, Motor Current Right, \
         Motor Current Left, X, Y, Theta, Limit Velocity, Acceleration, \
         Marker Right State, Marker Left State"
    }

    /// One CSV row of this record.
    pub fn csv_row(&self) -> String {
        let mut row = format!("{}, {}, {}", { self.time_ms }, self.line_state, self.run_state);
        for f in self.floats() {
            row.push_str(&format!(", {f}"));
        }
        row.push_str(&format!(", {}, {}", self.marker_right, self.marker_left));
        row
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            time_ms: 123_456,
            line_state: 2,
            run_state: 3,
            command_velocity: 1.5,
            estimate_velocity: 1.48,
            expect_translate: 2.34,
            estimate_translate: 2.30,
            corrected_translate: 2.35,
            error_angle: -0.12,
            command_angular_velocity: 0.8,
            command_angular_p: 0.5,
            command_angular_i: 0.2,
            command_angular_d: 0.1,
            estimate_angular_velocity: 0.75,
            estimate_rotate: 3.1,
            battery_voltage: 11.9,
            motor_voltage_right: 4.5,
            motor_voltage_left: 4.1,
            motor_current_right: 0.6,
            motor_current_left: 0.55,
            x: 1.2,
            y: -0.4,
            theta: 0.05,
            limit_velocity: 2.0,
            acceleration: 8.0,
            marker_right: 1,
            marker_left: 3,
        }
    }

    #[test]
    fn wire_image_is_96_bytes() {
        assert_eq!(core::mem::size_of::<LogRecord>(), LOG_RECORD_SIZE);
        assert_eq!(sample().encode().len(), LOG_RECORD_SIZE);
    }

    #[test]
    fn encode_decode_round_trips() {
        let record = sample();
        let back = LogRecord::decode(&record.encode());
        assert_eq!(back, record);
    }

    #[test]
    fn layout_pins_known_offsets() {
        let buf = sample().encode();
        assert_eq!(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 123_456);
        assert_eq!(buf[4], 2); // line state
        assert_eq!(buf[5], 3); // run state
        // First float right after the state bytes.
        assert_eq!(
            f32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            1.5
        );
        assert_eq!(buf[94], 1);
        assert_eq!(buf[95], 3);
    }

    #[test]
    fn csv_row_has_one_field_per_column() {
        let header_cols = LogRecord::csv_header().split(',').count();
        let row_cols = sample().csv_row().split(',').count();
        assert_eq!(header_cols, row_cols);
        assert_eq!(header_cols, 27);
    }
}
