//! Line tracker: 16-channel reflectance array into a signed lateral error
//! and a coarse line-presence state.
//!
//! Channels 0..8 are the right half, 8..16 the left half, mirrored about
//! the centerline; the error is the weighted difference of the halves, so
//! a perfectly centered line reads zero and a rightward offset reads
//! positive. The state machine classifies full-width reflectance as a
//! crossing and sustained darkness as a lost line, with a travel-distance
//! brown-out window so a paint gap does not kill the run.

use pace_common::consts::{
    LINE_BROWNOUT_IGNORE_DISTANCE, LINE_CROSS_DETECT_NUM, LINE_DETECT_THRESHOLD,
    LINE_ERROR_AVERAGE_SAMPLES, LINE_SENSOR_NUM, MARKER_SENSOR_NUM,
};
use pace_common::state::LineState;
use pace_hal::{LineSenseAdc, MarkerSenseAdc};
use pace_store::CalibrationRecord;

use crate::filter::MovingAverage;

// ─── Tracker ────────────────────────────────────────────────────────

/// Line detector state machine and error estimator.
#[derive(Debug, Clone)]
pub struct LineTracker {
    min: [u16; LINE_SENSOR_NUM],
    max: [u16; LINE_SENSOR_NUM],
    coeff: [f32; LINE_SENSOR_NUM],

    state: LineState,
    detect_count: u8,
    /// Distance at which all channels went dark [m].
    brownout_distance: f32,
    error_average: MovingAverage<LINE_ERROR_AVERAGE_SAMPLES>,
}

impl LineTracker {
    pub fn new() -> Self {
        Self {
            min: [0; LINE_SENSOR_NUM],
            max: [u16::MAX; LINE_SENSOR_NUM],
            coeff: [0.0; LINE_SENSOR_NUM],
            state: LineState::Normal,
            detect_count: 0,
            brownout_distance: 0.0,
            error_average: MovingAverage::new(),
        }
    }

    /// Install channel calibration.
    pub fn set_calibration(
        &mut self,
        min: [u16; LINE_SENSOR_NUM],
        max: [u16; LINE_SENSOR_NUM],
        coeff: [f32; LINE_SENSOR_NUM],
    ) {
        self.min = min;
        self.max = max;
        self.coeff = coeff;
    }

    /// Back to `Normal` with a clean error history.
    pub fn reset(&mut self) {
        self.state = LineState::Normal;
        self.detect_count = 0;
        self.error_average.reset();
    }

    /// One tick: fetch the ADC, refresh error and state.
    ///
    /// `distance` is the current odometric travel [m], used by the
    /// brown-out window. Returns `false` on a failed conversion; the error
    /// average absorbs a zero and the tick otherwise proceeds.
    pub fn update(&mut self, adc: &mut dyn LineSenseAdc, distance: f32) -> bool {
        if adc.fetch().is_err() {
            self.error_average.update(0.0);
            return false;
        }

        // Normalize channels and count detections.
        let mut value = [0.0f32; LINE_SENSOR_NUM];
        self.detect_count = 0;
        for order in 0..LINE_SENSOR_NUM {
            let raw = adc.raw(order).clamp(self.min[order], self.max[order]);
            if raw as f32 > self.max[order] as f32 * LINE_DETECT_THRESHOLD {
                self.detect_count += 1;
            }
            value[order] = self.coeff[order] * (raw - self.min[order]) as f32;
        }

        // Collapse the array into one signed lateral error.
        let mut diff = 0.0f32;
        for order in 0..LINE_SENSOR_NUM / 2 {
            diff += (value[order] - value[order + 8]) * (order + 1) as f32 / 8.0;
        }

        if self.detect_count == 0 {
            match self.state {
                LineState::Normal | LineState::CrossPassing | LineState::CrossPassed => {
                    self.state = LineState::NoneDetecting;
                    self.brownout_distance = distance;
                }
                LineState::NoneDetecting => {
                    if (distance - self.brownout_distance).abs() >= LINE_BROWNOUT_IGNORE_DISTANCE {
                        self.state = LineState::None;
                    }
                }
                LineState::None => {}
            }
        } else if self.detect_count >= LINE_CROSS_DETECT_NUM {
            self.state = LineState::CrossPassing;
        } else {
            if self.state == LineState::CrossPassing {
                self.state = LineState::CrossPassed;
            } else {
                self.state = LineState::Normal;
            }
            self.error_average.update(diff);
        }
        true
    }

    /// Current detector state.
    #[inline]
    pub fn state(&self) -> LineState {
        self.state
    }

    /// Channels above threshold on the last tick.
    #[inline]
    pub fn detect_count(&self) -> u8 {
        self.detect_count
    }

    /// Averaged lateral error; zero while a crossing transits.
    pub fn error(&self) -> f32 {
        match self.state {
            LineState::CrossPassing => 0.0,
            _ => self.error_average.get(),
        }
    }

    /// Line lost beyond the brown-out window?
    #[inline]
    pub fn is_none(&self) -> bool {
        self.state == LineState::None
    }

    /// Crossing completed this tick (pulse)?
    #[inline]
    pub fn is_cross_passed(&self) -> bool {
        self.state == LineState::CrossPassed
    }
}

impl Default for LineTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Calibrator ─────────────────────────────────────────────────────

/// Min/max sweep calibrator for the line and marker channels.
///
/// Feed it every tick while the operator sweeps the sensor bar across the
/// line; `finish` derives the normalization coefficients.
#[derive(Debug, Clone)]
pub struct Calibrator {
    line_min: [u16; LINE_SENSOR_NUM],
    line_max: [u16; LINE_SENSOR_NUM],
    marker_max: [u16; MARKER_SENSOR_NUM],
    samples: u32,
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            line_min: [u16::MAX; LINE_SENSOR_NUM],
            line_max: [0; LINE_SENSOR_NUM],
            marker_max: [0; MARKER_SENSOR_NUM],
            samples: 0,
        }
    }

    /// Ingest one tick of raw channels. Returns `false` on a failed
    /// conversion (the sample is skipped).
    pub fn update(&mut self, line: &mut dyn LineSenseAdc, marker: &mut dyn MarkerSenseAdc) -> bool {
        if line.fetch().is_err() || marker.fetch().is_err() {
            return false;
        }
        for order in 0..LINE_SENSOR_NUM {
            let raw = line.raw(order);
            self.line_min[order] = self.line_min[order].min(raw);
            self.line_max[order] = self.line_max[order].max(raw);
        }
        for order in 0..MARKER_SENSOR_NUM {
            self.marker_max[order] = self.marker_max[order].max(marker.raw(order));
        }
        self.samples += 1;
        true
    }

    /// Samples ingested so far.
    #[inline]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Derive the calibration record. `None` until every channel saw real
    /// contrast (max strictly above min).
    pub fn finish(&self) -> Option<CalibrationRecord> {
        if self.samples == 0 {
            return None;
        }
        let mut coeff = [0.0f32; LINE_SENSOR_NUM];
        for order in 0..LINE_SENSOR_NUM {
            if self.line_max[order] <= self.line_min[order] {
                return None;
            }
            coeff[order] = 1.0 / (self.line_max[order] - self.line_min[order]) as f32;
        }
        if self.marker_max.iter().any(|&m| m == 0) {
            return None;
        }
        Some(CalibrationRecord {
            line_min: self.line_min,
            line_max: self.line_max,
            line_coeff: coeff,
            marker_max: self.marker_max,
        })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pace_hal::sim::SimBoard;

    const MIN: u16 = 100;
    const MAX: u16 = 3000;

    fn calibrated_tracker() -> LineTracker {
        let mut tracker = LineTracker::new();
        let coeff = 1.0 / (MAX - MIN) as f32;
        tracker.set_calibration([MIN; 16], [MAX; 16], [coeff; 16]);
        tracker
    }

    /// Raw frame with the line centered under `bright` channels.
    fn frame(bright: &[usize]) -> [u16; 16] {
        let mut raw = [MIN; 16];
        for &i in bright {
            raw[i] = MAX;
        }
        raw
    }

    #[test]
    fn centered_line_reads_zero_error() {
        let (mut board, handle) = SimBoard::new();
        let mut tracker = calibrated_tracker();
        // Innermost channel of each half lit equally.
        handle.set_line_raw(frame(&[0, 8]));
        assert!(tracker.update(&mut board.line_adc, 0.0));
        assert_eq!(tracker.state(), LineState::Normal);
        assert!(tracker.error().abs() < 1e-6);
    }

    #[test]
    fn mirrored_frames_negate_the_error() {
        let (mut board, handle) = SimBoard::new();

        let mut right = calibrated_tracker();
        handle.set_line_raw(frame(&[3]));
        for _ in 0..4 {
            right.update(&mut board.line_adc, 0.0);
        }

        let mut left = calibrated_tracker();
        handle.set_line_raw(frame(&[3 + 8]));
        for _ in 0..4 {
            left.update(&mut board.line_adc, 0.0);
        }

        assert!(right.error() > 0.0);
        assert!((right.error() + left.error()).abs() < 1e-5);
    }

    #[test]
    fn cross_passed_is_a_one_tick_pulse() {
        let (mut board, handle) = SimBoard::new();
        let mut tracker = calibrated_tracker();

        handle.set_line_uniform(MAX); // all 16 channels lit
        for _ in 0..20 {
            tracker.update(&mut board.line_adc, 0.0);
            assert_eq!(tracker.state(), LineState::CrossPassing);
            assert_eq!(tracker.error(), 0.0);
        }

        handle.set_line_raw(frame(&[0, 8]));
        tracker.update(&mut board.line_adc, 0.0);
        assert_eq!(tracker.state(), LineState::CrossPassed);
        assert!(tracker.is_cross_passed());

        tracker.update(&mut board.line_adc, 0.0);
        assert_eq!(tracker.state(), LineState::Normal);
    }

    #[test]
    fn brownout_window_defers_line_loss() {
        let (mut board, handle) = SimBoard::new();
        let mut tracker = calibrated_tracker();

        handle.set_line_raw(frame(&[0, 8]));
        tracker.update(&mut board.line_adc, 0.0);

        handle.set_line_uniform(MIN); // everything dark
        tracker.update(&mut board.line_adc, 1.00);
        assert_eq!(tracker.state(), LineState::NoneDetecting);
        tracker.update(&mut board.line_adc, 1.05);
        assert_eq!(tracker.state(), LineState::NoneDetecting);
        assert!(!tracker.is_none());

        tracker.update(&mut board.line_adc, 1.00 + LINE_BROWNOUT_IGNORE_DISTANCE);
        assert!(tracker.is_none());
    }

    #[test]
    fn reappearing_line_cancels_brownout() {
        let (mut board, handle) = SimBoard::new();
        let mut tracker = calibrated_tracker();

        handle.set_line_uniform(MIN);
        tracker.update(&mut board.line_adc, 0.50);
        assert_eq!(tracker.state(), LineState::NoneDetecting);

        handle.set_line_raw(frame(&[0, 8]));
        tracker.update(&mut board.line_adc, 0.55);
        assert_eq!(tracker.state(), LineState::Normal);
    }

    #[test]
    fn failed_fetch_feeds_zero_and_reports_false() {
        let (mut board, handle) = SimBoard::new();
        let mut tracker = calibrated_tracker();

        handle.set_line_raw(frame(&[3]));
        for _ in 0..4 {
            tracker.update(&mut board.line_adc, 0.0);
        }
        let before = tracker.error();
        assert!(before > 0.0);

        handle.set_failures(true, false, false, false);
        assert!(!tracker.update(&mut board.line_adc, 0.0));
        // One zero diluted the four-sample window.
        assert!(tracker.error() < before);
    }

    #[test]
    fn calibrator_derives_coefficients_from_sweep() {
        let (mut board, handle) = SimBoard::new();
        let mut calibrator = Calibrator::new();

        handle.set_line_uniform(200);
        handle.set_marker_raw([150, 150]);
        calibrator.update(&mut board.line_adc, &mut board.marker_adc);
        handle.set_line_uniform(3200);
        handle.set_marker_raw([2900, 3000]);
        calibrator.update(&mut board.line_adc, &mut board.marker_adc);

        let record = calibrator.finish().unwrap();
        assert_eq!(record.line_min, [200; 16]);
        assert_eq!(record.line_max, [3200; 16]);
        assert_eq!(record.marker_max, [2900, 3000]);
        assert!((record.line_coeff[0] - 1.0 / 3000.0).abs() < 1e-9);
        assert!(record.is_valid());
    }

    #[test]
    fn calibrator_without_contrast_yields_nothing() {
        let (mut board, handle) = SimBoard::new();
        let mut calibrator = Calibrator::new();
        handle.set_line_uniform(500);
        handle.set_marker_raw([500, 500]);
        calibrator.update(&mut board.line_adc, &mut board.marker_adc);
        assert!(calibrator.finish().is_none());
    }
}
