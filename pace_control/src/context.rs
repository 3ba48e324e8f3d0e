//! Shared component context.
//!
//! Every stateful pipeline component is constructed once at boot and
//! handed to the tasks through this context, one mutex per component.
//! Readers are short and non-recursive; within a tick the stages run
//! serially, so the locks order themselves naturally.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::line::LineTracker;
use crate::marker::MarkerTracker;
use crate::odometry::Odometry;
use crate::power::PowerMonitor;
use crate::servo::Servo;

/// Process-wide component handles.
pub struct Context {
    pub odometry: Mutex<Odometry>,
    pub line: Mutex<LineTracker>,
    pub marker: Mutex<MarkerTracker>,
    pub power: Mutex<PowerMonitor>,
    pub servo: Mutex<Servo>,
}

impl Context {
    /// Construct all components in their reset state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            odometry: Mutex::new(Odometry::new()),
            line: Mutex::new(LineTracker::new()),
            marker: Mutex::new(MarkerTracker::new()),
            power: Mutex::new(PowerMonitor::new()),
            servo: Mutex::new(Servo::new()),
        })
    }
}
