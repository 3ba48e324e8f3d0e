//! Course mapping: curvature recording and velocity-profile generation.
//!
//! [`CurveRecorder`] runs during the exploration lap, committing one
//! (Δdistance, Δyaw) sample per centimeter of travel plus the landmark
//! positions the controller hands it. [`VelocityMapper`] turns a finished
//! recording into a distance-indexed target-speed table: per-sample radius
//! caps from the configured limit table, then a backward deceleration pass
//! and a forward acceleration pass so every adjacent pair of entries is
//! kinematically reachable. The fast lap only indexes the table — it is
//! never recomputed mid-run.

use heapless::Vec;
use tracing::{debug, info, warn};

use pace_common::config::RadiusSpeedLimit;
use pace_common::consts::{
    CORRECTION_MAX_POINTS, MAPPING_DISTANCE, MAPPING_MAX_POINTS, MAPPING_MAX_RADIUS,
    MAPPING_MIN_ANGLE, TICK_INTERVAL,
};
use pace_common::types::CurveSample;
use pace_store::CourseRecord;

use crate::corrector::LandmarkKind;

// ─── Recorder ───────────────────────────────────────────────────────

/// Course geometry recorder for the exploration lap.
#[derive(Debug, Clone, Default)]
pub struct CurveRecorder {
    /// Distance accumulated toward the next sample [m].
    acc_distance: f32,
    /// Yaw accumulated toward the next sample [rad].
    acc_yaw: f32,
    samples: Vec<CurveSample, MAPPING_MAX_POINTS>,
    cross_lines: Vec<f32, CORRECTION_MAX_POINTS>,
    curve_markers: Vec<f32, CORRECTION_MAX_POINTS>,
    explored: bool,
}

impl CurveRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything recorded and re-arm.
    pub fn reset(&mut self) {
        self.acc_distance = 0.0;
        self.acc_yaw = 0.0;
        self.samples.clear();
        self.cross_lines.clear();
        self.curve_markers.clear();
        self.explored = false;
    }

    /// One exploration tick: accumulate travel and yaw rate, committing a
    /// sample each time the accumulated distance reaches the resolution.
    pub fn update(&mut self, delta_distance: f32, yaw_rate: f32) {
        self.acc_distance += delta_distance;
        self.acc_yaw += yaw_rate * TICK_INTERVAL;
        if self.acc_distance >= MAPPING_DISTANCE {
            if self
                .samples
                .push(CurveSample {
                    delta_distance: self.acc_distance,
                    delta_yaw: self.acc_yaw,
                })
                .is_err()
            {
                // Course longer than the supported maximum; tail dropped.
                warn!(samples = self.samples.len(), "curve sample capacity exhausted");
            }
            self.acc_distance = 0.0;
            self.acc_yaw = 0.0;
        }
    }

    /// Record a landmark observation at `distance` [m].
    pub fn add_landmark(&mut self, kind: LandmarkKind, distance: f32) {
        let list = match kind {
            LandmarkKind::CurveMarker => &mut self.curve_markers,
            LandmarkKind::CrossLine => &mut self.cross_lines,
        };
        if list.push(distance).is_err() {
            warn!(?kind, distance, "landmark capacity exhausted");
        }
    }

    /// Freeze the recording; generation and persistence require this.
    pub fn mark_explored(&mut self) {
        self.explored = true;
        info!(
            samples = self.samples.len(),
            cross_lines = self.cross_lines.len(),
            curve_markers = self.curve_markers.len(),
            "exploration recording frozen"
        );
    }

    /// Finished recording available?
    #[inline]
    pub fn is_explored(&self) -> bool {
        self.explored
    }

    /// Committed curvature samples.
    #[inline]
    pub fn samples(&self) -> &[CurveSample] {
        &self.samples
    }

    /// Recorded crossing-line positions [m].
    #[inline]
    pub fn cross_lines(&self) -> &[f32] {
        &self.cross_lines
    }

    /// Recorded curve-marker positions [m].
    #[inline]
    pub fn curve_markers(&self) -> &[f32] {
        &self.curve_markers
    }

    /// Copy out a persistence record.
    pub fn to_record(&self) -> CourseRecord {
        CourseRecord {
            samples: self.samples.to_vec(),
            cross_lines: self.cross_lines.to_vec(),
            curve_markers: self.curve_markers.to_vec(),
        }
    }

    /// Restore a persisted recording (marks the recorder explored).
    pub fn load_record(&mut self, record: &CourseRecord) {
        self.reset();
        for s in record.samples.iter().take(MAPPING_MAX_POINTS) {
            let _ = self.samples.push(*s);
        }
        for &d in record.cross_lines.iter().take(CORRECTION_MAX_POINTS) {
            let _ = self.cross_lines.push(d);
        }
        for &d in record.curve_markers.iter().take(CORRECTION_MAX_POINTS) {
            let _ = self.curve_markers.push(d);
        }
        self.explored = true;
    }
}

// ─── Mapper ─────────────────────────────────────────────────────────

/// Distance-indexed target-velocity table and its fast-lap cursor.
#[derive(Debug, Clone, Default)]
pub struct VelocityMapper {
    table: Vec<f32, MAPPING_MAX_POINTS>,
    /// Segment lengths copied from the recording at generation time [m].
    distances: Vec<f32, MAPPING_MAX_POINTS>,
    generated: bool,

    // Fast-lap cursor.
    index: usize,
    /// Corrected cumulative travel [m].
    acc_distance: f32,
    /// Travel at which the cursor advances next [m].
    next_change_distance: f32,
}

impl VelocityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize the table from a finished recording.
    ///
    /// `limits` caps each sample by local radius, `start_velocity` seeds
    /// entry 0, and the two passes bound adjacent entries by `decel` /
    /// `accel`. `look_ahead` shifts the table left by that many segments,
    /// padding the tail with the final value. Fails without a finished
    /// recording or with an empty limit table.
    pub fn generate(
        &mut self,
        recorder: &CurveRecorder,
        limits: &[RadiusSpeedLimit],
        start_velocity: f32,
        accel: f32,
        decel: f32,
        look_ahead: usize,
    ) -> bool {
        if !recorder.is_explored() || limits.is_empty() {
            return false;
        }
        let samples = recorder.samples();
        if samples.is_empty() {
            return false;
        }

        self.table.clear();
        self.distances.clear();
        for s in samples {
            let _ = self.distances.push(s.delta_distance);
        }

        let top_velocity = limits[limits.len() - 1].max_velocity;

        // Raw caps by local radius; entry 0 is the lap entry speed.
        let _ = self.table.push(start_velocity);
        for s in samples.iter().skip(1) {
            let theta = s.delta_yaw.abs().max(MAPPING_MIN_ANGLE);
            let radius = (s.delta_distance / theta).min(MAPPING_MAX_RADIUS);
            let cap = limits
                .iter()
                .find(|l| radius <= l.min_radius)
                .map(|l| l.max_velocity)
                .unwrap_or(top_velocity);
            let _ = self.table.push(cap);
        }

        let n = self.table.len();

        // Backward pass: bound entry speeds into slower segments by the
        // available braking distance.
        for i in (1..n).rev() {
            if self.table[i] < self.table[i - 1] {
                let s = (self.table[i - 1].powi(2) - self.table[i].powi(2)) / (2.0 * decel);
                if s > samples[i].delta_distance {
                    self.table[i - 1] =
                        (self.table[i] + samples[i].delta_distance * decel).min(top_velocity);
                }
            }
        }
        // Forward pass: bound exit speeds by the available acceleration
        // distance, respecting the entry speeds fixed above.
        for i in 0..n - 1 {
            if self.table[i] < self.table[i + 1] {
                let s = (self.table[i + 1].powi(2) - self.table[i].powi(2)) / (2.0 * accel);
                if s > samples[i + 1].delta_distance {
                    self.table[i + 1] =
                        (self.table[i] + samples[i + 1].delta_distance * accel).min(top_velocity);
                }
            }
        }

        // Look-ahead shift, padded with the terminal speed.
        if look_ahead > 0 && n > 0 {
            let last = self.table[n - 1];
            let shift = look_ahead.min(n);
            for i in 0..n - shift {
                self.table[i] = self.table[i + shift];
            }
            for i in n - shift..n {
                self.table[i] = last;
            }
        }

        self.generated = true;
        debug!(entries = n, look_ahead, "velocity table generated");
        true
    }

    /// Table available?
    #[inline]
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Drop the table (a new exploration invalidates it).
    pub fn reset_generated(&mut self) {
        self.generated = false;
        self.table.clear();
        self.distances.clear();
    }

    /// Rewind the fast-lap cursor.
    pub fn reset_index(&mut self) {
        self.index = 0;
        self.acc_distance = 0.0;
        self.next_change_distance = 0.0;
    }

    /// Accumulate one tick of travel [m].
    pub fn advance(&mut self, delta_distance: f32) {
        self.acc_distance += delta_distance;
    }

    /// Snap the cumulative travel to a corrected value [m].
    pub fn correct_distance(&mut self, distance: f32) {
        self.acc_distance = distance;
    }

    /// Advance the table cursor past any segment boundaries crossed.
    pub fn update_index(&mut self) {
        if self.acc_distance >= self.next_change_distance {
            if let Some(&segment) = self.distances.get(self.index) {
                self.next_change_distance += segment;
                if self.index + 1 < self.distances.len() {
                    self.index += 1;
                }
            }
        }
    }

    /// Corrected cumulative travel [m].
    #[inline]
    pub fn total_distance(&self) -> f32 {
        self.acc_distance
    }

    /// Current cursor index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Target speed for the current segment [m/s].
    pub fn velocity(&self) -> f32 {
        self.table.get(self.index).copied().unwrap_or(0.0)
    }

    /// Target speed for the next segment (terminal entry at the end) [m/s].
    pub fn next_velocity(&self) -> f32 {
        let next = (self.index + 1).min(self.table.len().saturating_sub(1));
        self.table.get(next).copied().unwrap_or(0.0)
    }

    /// The generated table.
    #[inline]
    pub fn table(&self) -> &[f32] {
        &self.table
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
