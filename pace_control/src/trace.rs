//! Top-level run state machine.
//!
//! Owns the course recorder, the velocity mapper and the position
//! corrector, and wires the sensing components to the wheel servo. One
//! [`TraceController::step`] call per tick, after the sensing stages have
//! refreshed:
//!
//! ```text
//! Resetting ─1 s─► StartWaiting ─start strip─► Started ─► GoalWaiting
//!                                                              │ goal strip
//! Stopped ◄─|v| < 0.01─ StopWaiting ◄─────────────────────── Goaled
//!                            ▲
//!      Emergency ────────────┘   (from any state: button, line lost,
//!                                 battery fault, servo fault)
//! ```
//!
//! During `GoalWaiting` an exploration lap records curvature and
//! landmarks; a fast lap indexes the pre-generated velocity table and
//! snaps its distance to re-observed landmarks. Braking after goal or
//! emergency uses `a = −v²/(2·stop_distance)`, which pins the stopping
//! point regardless of entry speed.

use thiserror::Error;
use tracing::{info, warn};

use pace_common::config::{RadiusSpeedLimit, RunParameters};
use pace_common::consts::{BATTERY_ERROR_TIME_MS, BUZZER_FREQUENCY_HZ, MAPPING_DISTANCE, TICK_INTERVAL};
use pace_common::state::{RunMode, RunState};
use pace_hal::{Operator, SuctionFan};
use pace_store::records::{write_course, write_log_len, write_log_chunk};
use pace_store::{CourseRecord, Store};

use crate::corrector::{LandmarkKind, PositionCorrector};
use crate::line::LineTracker;
use crate::log::{LogRecord, LOG_RECORD_SIZE};
use crate::mapping::{CurveRecorder, VelocityMapper};
use crate::marker::MarkerTracker;
use crate::odometry::Odometry;
use crate::pid::Pid;
use crate::power::PowerMonitor;
use crate::servo::Servo;

/// Standstill threshold ending the braking phase [m/s].
const STOP_VELOCITY: f32 = 0.01;
/// Sensor settling time before arming [ticks].
const RESET_TICKS: u32 = 1000;

// ─── Errors ─────────────────────────────────────────────────────────

/// Host-side run preparation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
    /// Fast mode requested without a finished exploration recording.
    #[error("no finished exploration recording")]
    NotExplored,
    /// Fast mode requested without a generated velocity table.
    #[error("no generated velocity table")]
    NotGenerated,
}

// ─── Per-tick I/O bundle ────────────────────────────────────────────

/// Borrowed component handles for one tick.
///
/// The caller locks each component for the duration of the step; within a
/// tick the pipeline is serial, so the locks never contend with the
/// sensing stages.
pub struct TraceIo<'a> {
    pub odometry: &'a mut Odometry,
    pub line: &'a LineTracker,
    pub marker: &'a mut MarkerTracker,
    pub power: &'a PowerMonitor,
    pub servo: &'a mut Servo,
    pub fan: &'a mut dyn SuctionFan,
    pub operator: &'a dyn Operator,
    pub store: &'a mut dyn Store,
}

// ─── Controller ─────────────────────────────────────────────────────

/// The run state machine and velocity integrator.
pub struct TraceController {
    param: RunParameters,
    state: RunState,
    reset_count: u32,
    emergency: bool,

    recorder: CurveRecorder,
    mapper: VelocityMapper,
    corrector: PositionCorrector,

    line_pid: Pid,
    limit_velocity: f32,
    velocity: f32,
    acceleration: f32,
    angular_velocity: f32,

    /// Ticks since `begin` [ms].
    tick_ms: u32,
    log_interval_count: u32,
    log_offset: u32,
    log_start_ms: u32,
    log_enabled: bool,
}

impl TraceController {
    pub fn new(param: RunParameters) -> Self {
        Self {
            param,
            state: RunState::Resetting,
            reset_count: 0,
            emergency: false,
            recorder: CurveRecorder::new(),
            mapper: VelocityMapper::new(),
            corrector: PositionCorrector::new(),
            line_pid: Pid::new(param.line_pid),
            limit_velocity: 0.0,
            velocity: 0.0,
            acceleration: 0.0,
            angular_velocity: 0.0,
            tick_ms: 0,
            log_interval_count: 0,
            log_offset: 0,
            log_start_ms: 0,
            log_enabled: false,
        }
    }

    // ── Host-side preparation ──

    /// Restore a persisted exploration recording.
    pub fn load_course(&mut self, record: &CourseRecord) {
        self.recorder.load_record(record);
    }

    /// Generate the fast-lap velocity table from the recording on hand.
    pub fn generate_profile(
        &mut self,
        limits: &[RadiusSpeedLimit],
        start_velocity: f32,
        accel: f32,
        decel: f32,
        look_ahead: usize,
    ) -> Result<(), TraceError> {
        if !self.recorder.is_explored() {
            return Err(TraceError::NotExplored);
        }
        if !self
            .mapper
            .generate(&self.recorder, limits, start_velocity, accel, decel, look_ahead)
        {
            return Err(TraceError::NotExplored);
        }
        Ok(())
    }

    /// Arm a run. Fails fast when the mode's preconditions are missing so
    /// the motors never spin up on a half-configured lap.
    pub fn begin(&mut self, param: RunParameters) -> Result<(), TraceError> {
        match param.mode {
            RunMode::Explore => {
                self.recorder.reset();
                // A new recording invalidates any table generated before.
                self.mapper.reset_generated();
            }
            RunMode::Fast => {
                if !self.recorder.is_explored() {
                    return Err(TraceError::NotExplored);
                }
                if !self.mapper.is_generated() {
                    return Err(TraceError::NotGenerated);
                }
                self.mapper.reset_index();
                self.corrector
                    .load(self.recorder.cross_lines(), self.recorder.curve_markers());
            }
        }

        self.param = param;
        self.line_pid.set_gain(param.line_pid);
        self.state = RunState::Resetting;
        self.reset_count = 0;
        self.emergency = false;
        self.limit_velocity = 0.0;
        self.velocity = 0.0;
        self.acceleration = 0.0;
        self.angular_velocity = 0.0;
        self.tick_ms = 0;
        self.log_interval_count = 0;
        self.log_offset = 0;
        self.log_start_ms = 0;
        self.log_enabled = false;
        info!(mode = ?param.mode, "run armed");
        Ok(())
    }

    // ── Per-tick entry point ──

    /// One control tick. Returns `false` once the run has stopped.
    pub fn step(&mut self, io: &mut TraceIo<'_>) -> bool {
        if self.state == RunState::Stopped {
            return false;
        }
        self.tick_ms += 1;

        // Latch this tick's landmark pulses first: opening the ignore
        // window rewrites both marker states and would eat a curve pulse
        // landing on the same tick as the crossing.
        let curve_passed = io.marker.is_curvature();
        let cross_passed = io.line.is_cross_passed();

        // A completed crossing saturates the side sensors; open their
        // ignore window before the next marker update.
        if cross_passed {
            io.marker.set_ignore(io.odometry.displacement().trans);
        }

        self.update_state(io, curve_passed, cross_passed);
        self.update_motion(io);
        self.update_log(io);

        self.state != RunState::Stopped
    }

    // ── State machine ──

    fn check_emergency(&self, io: &TraceIo<'_>) -> bool {
        io.operator.is_pressed()
            || io.line.is_none()
            || io.power.battery_error_time() > BATTERY_ERROR_TIME_MS
            || io.servo.is_emergency()
    }

    fn update_state(&mut self, io: &mut TraceIo<'_>, curve_passed: bool, cross_passed: bool) {
        if !self.emergency && self.check_emergency(io) {
            self.state = RunState::Emergency;
        }
        match self.state {
            RunState::Resetting => {
                self.on_resetting(io);
                self.reset_count += 1;
                if self.reset_count >= RESET_TICKS {
                    self.state = RunState::StartWaiting;
                }
            }
            RunState::StartWaiting => {
                self.limit_velocity = self.param.limit_velocity;
                self.acceleration = self.param.acceleration;
                if io.marker.is_started() {
                    self.state = RunState::Started;
                }
            }
            RunState::Started => {
                self.on_started(io);
                self.state = RunState::GoalWaiting;
            }
            RunState::GoalWaiting => {
                self.on_goal_waiting(io, curve_passed, cross_passed);
                if io.marker.is_goaled() {
                    self.state = RunState::Goaled;
                }
            }
            RunState::Goaled => {
                self.on_goaled(io);
                self.state = RunState::StopWaiting;
            }
            RunState::Emergency => {
                self.on_emergency(io);
                self.state = RunState::StopWaiting;
            }
            RunState::StopWaiting => {
                if self.velocity.abs() < STOP_VELOCITY {
                    self.on_stopped(io);
                    self.state = RunState::Stopped;
                }
            }
            RunState::Stopped => {}
        }
    }

    fn on_resetting(&mut self, io: &mut TraceIo<'_>) {
        io.fan.enable();
        self.limit_velocity = 0.0;
        self.velocity = 0.0;
        self.acceleration = 0.0;
        // Angular command stays live: the suction fan torques the chassis.

        self.log_interval_count = 0;
        self.log_offset = 0;
        self.log_enabled = false;
    }

    fn on_started(&mut self, io: &mut TraceIo<'_>) {
        io.operator.set_buzzer(BUZZER_FREQUENCY_HZ, 50);
        io.operator.set_indicator(0x60, 0x60);

        // Distances are measured from the start strip.
        io.odometry.reset();

        self.log_enabled = true;
        self.log_start_ms = self.tick_ms;
        info!("start strip passed");
    }

    fn on_goal_waiting(&mut self, io: &mut TraceIo<'_>, curve_passed: bool, cross_passed: bool) {
        let delta = io.odometry.delta_trans();
        match self.param.mode {
            RunMode::Explore => {
                // Record geometry against the raw odometric distance.
                let total = io.odometry.displacement().trans;
                self.recorder.update(delta, io.odometry.velocity().rot);
                if curve_passed {
                    self.recorder.add_landmark(LandmarkKind::CurveMarker, total);
                } else if cross_passed {
                    self.recorder.add_landmark(LandmarkKind::CrossLine, total);
                }
            }
            RunMode::Fast => {
                self.mapper.advance(delta);
                let total = self.mapper.total_distance();
                // Curve markers are surveyed more tightly than crossing
                // lines, so they win when both fire on one tick.
                if curve_passed {
                    let corrected = self.corrector.correct(LandmarkKind::CurveMarker, total);
                    self.mapper.correct_distance(corrected);
                } else if cross_passed {
                    let corrected = self.corrector.correct(LandmarkKind::CrossLine, total);
                    self.mapper.correct_distance(corrected);
                }
                self.mapper.update_index();

                let now = self.mapper.velocity();
                let next = self.mapper.next_velocity();
                if next < now {
                    self.limit_velocity = now.abs();
                    self.acceleration = -self.param.deceleration;
                } else {
                    self.limit_velocity = next.abs();
                    self.acceleration = self.param.acceleration;
                }
            }
        }
    }

    fn on_goaled(&mut self, io: &mut TraceIo<'_>) {
        io.operator.set_buzzer(BUZZER_FREQUENCY_HZ, 50);
        io.operator.set_indicator(0x00, 0x60);

        if self.param.mode == RunMode::Explore {
            self.recorder.mark_explored();
            self.mapper.reset_generated();
            // Failed persistence downgrades to warn-and-continue; the
            // recording stays usable in RAM for this boot.
            if let Err(e) = write_course(io.store, &self.recorder.to_record()) {
                warn!(error = %e, "course persist failed, recording kept in RAM");
            }
        }

        self.acceleration = Self::stop_deceleration(self.velocity, self.param.stop_distance);
        info!(
            distance = io.odometry.displacement().trans,
            "goal strip passed"
        );
    }

    fn on_emergency(&mut self, io: &mut TraceIo<'_>) {
        self.emergency = true;
        io.servo.emergency_stop();
        self.acceleration = Self::stop_deceleration(self.velocity, self.param.stop_distance);
        warn!(
            state = ?self.state,
            velocity = self.velocity,
            "emergency latched, braking"
        );
    }

    fn on_stopped(&mut self, io: &mut TraceIo<'_>) {
        self.limit_velocity = 0.0;
        self.angular_velocity = 0.0;
        io.fan.disable();

        if self.log_enabled {
            if let Err(e) = write_log_len(io.store, self.log_offset) {
                warn!(error = %e, "log length persist failed");
            }
        }
        info!(
            mode = ?self.param.mode,
            distance = io.odometry.displacement().trans,
            samples = self.recorder.samples().len(),
            cross_lines = self.recorder.cross_lines().len(),
            curve_markers = self.recorder.curve_markers().len(),
            emergency = self.emergency,
            log_bytes = self.log_offset,
            "run stopped"
        );
    }

    /// Acceleration that stops `velocity` within `distance`.
    fn stop_deceleration(velocity: f32, distance: f32) -> f32 {
        -(velocity * velocity) / (2.0 * distance)
    }

    // ── Motion command ──

    fn update_motion(&mut self, io: &mut TraceIo<'_>) {
        if self.param.suction_voltage > 0.0 {
            io.fan
                .set_duty(self.param.suction_voltage / io.power.battery_voltage());
        }

        self.velocity += self.acceleration * TICK_INTERVAL;
        if self.velocity.abs() > self.limit_velocity {
            self.velocity = self.limit_velocity.copysign(self.velocity);
        }

        // Line loop runs on real time, unlike the per-tick servo loops.
        self.angular_velocity = self.line_pid.update(0.0, io.line.error(), TICK_INTERVAL);
        io.servo.set_target(self.velocity, self.angular_velocity);
    }

    // ── Logging ──

    fn update_log(&mut self, io: &mut TraceIo<'_>) {
        if !self.log_enabled {
            return;
        }
        self.log_interval_count += 1;
        if self.log_interval_count < self.param.log_interval_ms {
            return;
        }
        self.log_interval_count = 0;

        let vel = io.odometry.velocity();
        let dis = io.odometry.displacement();
        let pose = io.odometry.pose();
        let voltage = io.servo.motor_voltage();
        let current = io.power.motor_current();
        let marker_states = io.marker.states();

        let record = LogRecord {
            time_ms: self.tick_ms - self.log_start_ms,
            line_state: io.line.state() as u8,
            run_state: self.state as u8,
            command_velocity: self.velocity,
            estimate_velocity: vel.trans,
            expect_translate: self.mapper.index() as f32 * MAPPING_DISTANCE,
            estimate_translate: dis.trans,
            corrected_translate: self.mapper.total_distance(),
            error_angle: io.line.error(),
            command_angular_velocity: self.line_pid.output(),
            command_angular_p: self.line_pid.proportional(),
            command_angular_i: self.line_pid.integral(),
            command_angular_d: self.line_pid.derivative(),
            estimate_angular_velocity: vel.rot,
            estimate_rotate: dis.rot,
            battery_voltage: io.power.battery_voltage(),
            motor_voltage_right: voltage[0],
            motor_voltage_left: voltage[1],
            motor_current_right: current[0],
            motor_current_left: current[1],
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            limit_velocity: self.limit_velocity,
            acceleration: self.acceleration,
            marker_right: marker_states[0] as u8,
            marker_left: marker_states[1] as u8,
        };

        if write_log_chunk(io.store, self.log_offset, &record.encode()).is_ok() {
            self.log_offset += LOG_RECORD_SIZE as u32;
        } else {
            // Log region full; keep running, stop recording.
            warn!(bytes = self.log_offset, "log region exhausted");
            self.log_enabled = false;
        }
    }

    // ── Accessors ──

    /// Current run state.
    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Emergency latched during this run?
    #[inline]
    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Commanded linear velocity [m/s].
    #[inline]
    pub fn command_velocity(&self) -> f32 {
        self.velocity
    }

    /// Commanded angular velocity [rad/s].
    #[inline]
    pub fn command_angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// Bytes of log recorded so far.
    #[inline]
    pub fn log_bytes(&self) -> u32 {
        self.log_offset
    }

    /// The course recorder.
    #[inline]
    pub fn recorder(&self) -> &CurveRecorder {
        &self.recorder
    }

    /// The velocity mapper.
    #[inline]
    pub fn mapper(&self) -> &VelocityMapper {
        &self.mapper
    }
}
