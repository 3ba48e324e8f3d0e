//! Landmark-based position correction for the fast lap.
//!
//! During exploration the course recorder logs where each crossing line and
//! curve marker was seen. On the fast lap a forward cursor per kind walks
//! that list: when a live observation lands within the match window of the
//! next recorded landmark, the odometric distance snaps to the recorded
//! value and the landmark is consumed. Cursors never rewind, so a missed
//! strip cannot drag the distance backwards.

use heapless::Vec;

use pace_common::consts::{
    CORRECTION_ALLOW_ERROR_CROSS, CORRECTION_ALLOW_ERROR_CURVE, CORRECTION_MAX_POINTS,
};

/// Landmark kinds with separate recorded lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkKind {
    /// Left-side curve marker strip.
    CurveMarker,
    /// Full-width crossing line.
    CrossLine,
}

impl LandmarkKind {
    /// Match window for the kind [m].
    #[inline]
    pub const fn allow_error(self) -> f32 {
        match self {
            Self::CurveMarker => CORRECTION_ALLOW_ERROR_CURVE,
            Self::CrossLine => CORRECTION_ALLOW_ERROR_CROSS,
        }
    }
}

/// Forward-cursor matcher over the recorded landmark lists.
#[derive(Debug, Clone, Default)]
pub struct PositionCorrector {
    curve_markers: Vec<f32, CORRECTION_MAX_POINTS>,
    cross_lines: Vec<f32, CORRECTION_MAX_POINTS>,
    curve_index: usize,
    cross_index: usize,
}

impl PositionCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the recorded lists (clears the cursors).
    ///
    /// Entries beyond capacity are dropped; recorded lists are produced
    /// under the same bound so this only triggers on foreign data.
    pub fn load(&mut self, cross_lines: &[f32], curve_markers: &[f32]) {
        self.cross_lines.clear();
        self.curve_markers.clear();
        for &d in cross_lines.iter().take(CORRECTION_MAX_POINTS) {
            let _ = self.cross_lines.push(d);
        }
        for &d in curve_markers.iter().take(CORRECTION_MAX_POINTS) {
            let _ = self.curve_markers.push(d);
        }
        self.reset_index();
    }

    /// Rewind both cursors for a new run.
    pub fn reset_index(&mut self) {
        self.curve_index = 0;
        self.cross_index = 0;
    }

    /// Snap `distance` to the next matching recorded landmark of `kind`.
    ///
    /// Returns the recorded position on a match (consuming the landmark),
    /// the measured distance unchanged otherwise.
    pub fn correct(&mut self, kind: LandmarkKind, distance: f32) -> f32 {
        let allow = kind.allow_error();
        let (list, index) = match kind {
            LandmarkKind::CurveMarker => (&self.curve_markers, &mut self.curve_index),
            LandmarkKind::CrossLine => (&self.cross_lines, &mut self.cross_index),
        };
        for i in *index..list.len() {
            if (list[i] - distance).abs() < allow {
                *index = i + 1;
                return list[i];
            }
        }
        distance
    }

    /// Recorded list for `kind`.
    pub fn landmarks(&self, kind: LandmarkKind) -> &[f32] {
        match kind {
            LandmarkKind::CurveMarker => &self.curve_markers,
            LandmarkKind::CrossLine => &self.cross_lines,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> PositionCorrector {
        let mut c = PositionCorrector::new();
        c.load(&[], &[1.000, 2.500, 4.000]);
        c
    }

    #[test]
    fn observation_snaps_to_recorded_landmark() {
        let mut c = corrector();
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 1.00), 1.000);
        // The matched landmark is consumed; the next pulse matches 2.500.
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 2.46), 2.500);
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 4.05), 4.000);
    }

    #[test]
    fn unmatched_observation_passes_through() {
        let mut c = corrector();
        // 1.3 m is outside the ±0.1 m window of every landmark.
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 1.3), 1.3);
    }

    #[test]
    fn cursor_skips_missed_landmarks_forward() {
        let mut c = corrector();
        // 2.50 matches the second landmark; the first falls behind the cursor.
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 2.50), 2.500);
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 1.00), 1.00);
        // An observation near 4.000 still matches in order.
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 3.999), 4.000);
    }

    #[test]
    fn corrections_are_non_decreasing_within_a_run() {
        let mut c = corrector();
        let mut last = 0.0f32;
        for d in [0.95, 1.02, 2.45, 2.55, 3.95, 4.05] {
            let corrected = c.correct(LandmarkKind::CurveMarker, d);
            assert!(corrected >= last);
            last = corrected;
        }
    }

    #[test]
    fn kinds_keep_independent_cursors() {
        let mut c = PositionCorrector::new();
        c.load(&[0.500], &[1.000]);
        assert_eq!(c.correct(LandmarkKind::CrossLine, 0.52), 0.500);
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 0.98), 1.000);
    }

    #[test]
    fn reset_index_restarts_matching() {
        let mut c = corrector();
        c.correct(LandmarkKind::CurveMarker, 1.0);
        c.correct(LandmarkKind::CurveMarker, 2.5);
        c.reset_index();
        assert_eq!(c.correct(LandmarkKind::CurveMarker, 1.05), 1.000);
    }
}
