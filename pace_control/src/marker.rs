//! Side-marker tracker: debounced passage detection on the two marker
//! channels.
//!
//! Side 0 (right) carries the start/goal strips, side 1 (left) the curve
//! strips. A passage only counts once the robot has traveled the minimum
//! marker width while the channel was lit, which rejects specks and seam
//! glints. A crossing line saturates both sides, so the line tracker's
//! cross pulse puts both trackers into `Ignoring` for the sensor-offset
//! distance.

use pace_common::consts::{
    LINE_DISTANCE_FROM_MARKER, MARKER_AVERAGE_SAMPLES, MARKER_DETECT_DISTANCE,
    MARKER_DETECT_THRESHOLD, MARKER_IGNORE_OFFSET, MARKER_SENSOR_NUM,
};
use pace_common::state::MarkerState;
use pace_hal::MarkerSenseAdc;

use crate::filter::MovingAverage;

/// Right / start-goal side index.
pub const SIDE_RIGHT: usize = 0;
/// Left / curve side index.
pub const SIDE_LEFT: usize = 1;

/// Two independent per-side passage detectors.
#[derive(Debug, Clone)]
pub struct MarkerTracker {
    average: [MovingAverage<MARKER_AVERAGE_SAMPLES>; MARKER_SENSOR_NUM],
    state: [MarkerState; MARKER_SENSOR_NUM],
    threshold: [f32; MARKER_SENSOR_NUM],
    count: [u32; MARKER_SENSOR_NUM],
    /// Where the strip was first seen [m].
    detect_distance: [f32; MARKER_SENSOR_NUM],
    /// Where the ignore window opened [m].
    ignore_distance: f32,
}

impl MarkerTracker {
    pub fn new() -> Self {
        Self {
            average: [MovingAverage::new(), MovingAverage::new()],
            state: [MarkerState::Waiting; MARKER_SENSOR_NUM],
            threshold: [f32::MAX; MARKER_SENSOR_NUM],
            count: [0; MARKER_SENSOR_NUM],
            detect_distance: [0.0; MARKER_SENSOR_NUM],
            ignore_distance: 0.0,
        }
    }

    /// Derive detection thresholds from the calibrated channel maxima.
    pub fn set_calibration(&mut self, max: [u16; MARKER_SENSOR_NUM]) {
        for order in 0..MARKER_SENSOR_NUM {
            self.threshold[order] = max[order] as f32 * MARKER_DETECT_THRESHOLD;
        }
    }

    /// Back to `Waiting` with zero counts.
    pub fn reset(&mut self) {
        self.ignore_distance = 0.0;
        for order in 0..MARKER_SENSOR_NUM {
            self.state[order] = MarkerState::Waiting;
            self.count[order] = 0;
            self.detect_distance[order] = 0.0;
            self.average[order].reset();
        }
    }

    /// One tick: fetch the ADC and advance both side machines.
    ///
    /// `distance` is the current odometric travel [m]. Returns `false` on
    /// a failed conversion; states hold their previous values.
    pub fn update(&mut self, adc: &mut dyn MarkerSenseAdc, distance: f32) -> bool {
        if adc.fetch().is_err() {
            return false;
        }
        for order in 0..MARKER_SENSOR_NUM {
            self.average[order].update(adc.raw(order) as f32);
            let detected = self.average[order].get() > self.threshold[order];

            self.state[order] = match self.state[order] {
                MarkerState::Ignoring => {
                    // Hold until the crossing has fully cleared the side sensors.
                    if (distance - self.ignore_distance).abs()
                        > LINE_DISTANCE_FROM_MARKER + MARKER_IGNORE_OFFSET
                    {
                        MarkerState::Waiting
                    } else {
                        MarkerState::Ignoring
                    }
                }
                MarkerState::Waiting => {
                    if detected {
                        self.detect_distance[order] = distance;
                        MarkerState::Passing
                    } else {
                        MarkerState::Waiting
                    }
                }
                MarkerState::Passing => {
                    if detected {
                        MarkerState::Passing
                    } else if (distance - self.detect_distance[order]).abs()
                        < MARKER_DETECT_DISTANCE
                    {
                        // Too narrow to be a strip.
                        MarkerState::Waiting
                    } else {
                        self.count[order] += 1;
                        MarkerState::Passed
                    }
                }
                MarkerState::Passed => MarkerState::Waiting,
            };
        }
        true
    }

    /// Suppress both sides for the crossing transit starting at `distance`.
    pub fn set_ignore(&mut self, distance: f32) {
        self.ignore_distance = distance;
        for state in self.state.iter_mut() {
            *state = MarkerState::Ignoring;
        }
    }

    /// Per-side states `[right, left]`.
    #[inline]
    pub fn states(&self) -> [MarkerState; MARKER_SENSOR_NUM] {
        self.state
    }

    /// Per-side passage counts `[right, left]`.
    #[inline]
    pub fn counts(&self) -> [u32; MARKER_SENSOR_NUM] {
        self.count
    }

    /// Start strip passed at least once?
    #[inline]
    pub fn is_started(&self) -> bool {
        self.count[SIDE_RIGHT] > 0
    }

    /// Goal strip passed (second right-side passage)?
    #[inline]
    pub fn is_goaled(&self) -> bool {
        self.count[SIDE_RIGHT] > 1
    }

    /// Curve strip passed this tick (pulse)?
    #[inline]
    pub fn is_curvature(&self) -> bool {
        self.state[SIDE_LEFT] == MarkerState::Passed
    }
}

impl Default for MarkerTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
