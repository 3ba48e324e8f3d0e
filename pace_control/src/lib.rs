//! # pace_control
//!
//! The 1 kHz closed-loop core of the pace line tracer: odometry fusion,
//! line and marker tracking, power monitoring, wheel servo control, course
//! mapping with velocity-profile generation, landmark position correction,
//! and the top-level run state machine that wires them together.
//!
//! ## Pipeline
//!
//! Every millisecond, in dependency order:
//!
//! 1. Sensing — encoders + IMU into [`odometry::Odometry`], line ADC into
//!    [`line::LineTracker`], marker ADC into [`marker::MarkerTracker`],
//!    power ADC into [`power::PowerMonitor`].
//! 2. Planning — [`trace::TraceController::step`] advances the run state
//!    machine and computes the (linear, angular) velocity command.
//! 3. Actuation — [`servo::Servo::update`] turns the command into per-wheel
//!    duty for the motor driver.
//!
//! Stages never race: each runs to completion inside its tick. Shared
//! component state lives in [`context::Context`], one mutex per component,
//! with short non-recursive readers.
//!
//! ## Zero-allocation loop
//!
//! Course samples, landmark lists and the velocity table are fixed-capacity
//! `heapless` vectors sized for the longest supported course; nothing inside
//! the tick path allocates.

pub mod context;
pub mod corrector;
pub mod filter;
pub mod line;
pub mod log;
pub mod mapping;
pub mod marker;
pub mod odometry;
pub mod pid;
pub mod power;
pub mod servo;
pub mod tasks;
pub mod tick;
pub mod trace;
