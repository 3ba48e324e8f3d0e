//! Typed records over the raw byte layout.
//!
//! Calibration and course data are written as single contiguous images so
//! each record update is one atomic store operation. Reads re-validate
//! everything: a fresh (all-zero) device or a truncated record surfaces as
//! [`StoreError::Corrupt`], never as plausible garbage.

use pace_common::consts::{CORRECTION_MAX_POINTS, LINE_SENSOR_NUM, MAPPING_MAX_POINTS, MARKER_SENSOR_NUM};
use pace_common::types::CurveSample;
use tracing::debug;

use crate::layout::{
    CALIB_LINE_MIN, COURSE_BASE, LOG_BASE, LOG_BYTES, LOG_CAPACITY,
};
use crate::{Store, StoreError, StoreResult};

// ─── Fixed point ────────────────────────────────────────────────────

/// Encode meters→millimeters (or radians→milliradians) into `u16`.
///
/// The representable range is `[0, 65.535]`; anything outside fails the
/// write rather than wrapping.
fn to_milli(value: f32, what: &'static str) -> StoreResult<u16> {
    if !value.is_finite() || !(0.0..=65.535).contains(&value) {
        return Err(StoreError::OutOfRange { what });
    }
    Ok((value * 1000.0).round() as u16)
}

/// Decode the fixed-point wire value back to a float.
#[inline]
fn from_milli(value: u16) -> f32 {
    value as f32 / 1000.0
}

// ─── Little-endian cursor helpers ───────────────────────────────────

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u16(&mut self, what: &'static str) -> StoreResult<u16> {
        let end = self.pos + 2;
        let bytes = self.data.get(self.pos..end).ok_or(StoreError::Corrupt { what })?;
        self.pos = end;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn f32(&mut self, what: &'static str) -> StoreResult<f32> {
        let end = self.pos + 4;
        let bytes = self.data.get(self.pos..end).ok_or(StoreError::Corrupt { what })?;
        self.pos = end;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

// ─── Calibration record ─────────────────────────────────────────────

/// Line and marker sensor calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    /// Per-channel dark level.
    pub line_min: [u16; LINE_SENSOR_NUM],
    /// Per-channel bright level.
    pub line_max: [u16; LINE_SENSOR_NUM],
    /// Per-channel normalization `1/(max−min)`.
    pub line_coeff: [f32; LINE_SENSOR_NUM],
    /// Marker-channel bright level `[right, left]`.
    pub marker_max: [u16; MARKER_SENSOR_NUM],
}

impl CalibrationRecord {
    /// A record is usable when every channel saw real contrast.
    pub fn is_valid(&self) -> bool {
        for i in 0..LINE_SENSOR_NUM {
            if self.line_max[i] <= self.line_min[i] || !self.line_coeff[i].is_finite() {
                return false;
            }
        }
        self.marker_max.iter().all(|&m| m > 0)
    }
}

/// Persist the calibration record.
pub fn write_calibration(store: &mut dyn Store, record: &CalibrationRecord) -> StoreResult<()> {
    let mut buf = Vec::with_capacity(132);
    for v in record.line_min {
        push_u16(&mut buf, v);
    }
    for v in record.line_max {
        push_u16(&mut buf, v);
    }
    for v in record.line_coeff {
        push_f32(&mut buf, v);
    }
    for v in record.marker_max {
        push_u16(&mut buf, v);
    }
    store.write(CALIB_LINE_MIN, &buf)?;
    debug!("calibration record written");
    Ok(())
}

/// Load and validate the calibration record.
pub fn read_calibration(store: &dyn Store) -> StoreResult<CalibrationRecord> {
    let mut buf = [0u8; 132];
    store.read(CALIB_LINE_MIN, &mut buf)?;
    let mut cursor = Cursor::new(&buf);

    let mut record = CalibrationRecord {
        line_min: [0; LINE_SENSOR_NUM],
        line_max: [0; LINE_SENSOR_NUM],
        line_coeff: [0.0; LINE_SENSOR_NUM],
        marker_max: [0; MARKER_SENSOR_NUM],
    };
    for v in record.line_min.iter_mut() {
        *v = cursor.u16("calibration")?;
    }
    for v in record.line_max.iter_mut() {
        *v = cursor.u16("calibration")?;
    }
    for v in record.line_coeff.iter_mut() {
        *v = cursor.f32("calibration")?;
    }
    for v in record.marker_max.iter_mut() {
        *v = cursor.u16("calibration")?;
    }

    if !record.is_valid() {
        return Err(StoreError::Corrupt { what: "calibration" });
    }
    Ok(record)
}

// ─── Course record ──────────────────────────────────────────────────

/// Everything recorded during an exploration lap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseRecord {
    /// Curvature samples in travel order.
    pub samples: Vec<CurveSample>,
    /// Crossing-line positions [m], non-decreasing.
    pub cross_lines: Vec<f32>,
    /// Curve-marker positions [m], non-decreasing.
    pub curve_markers: Vec<f32>,
}

/// Persist the recorded course as one atomic image.
pub fn write_course(store: &mut dyn Store, record: &CourseRecord) -> StoreResult<()> {
    if record.samples.len() > MAPPING_MAX_POINTS {
        return Err(StoreError::OutOfRange { what: "sample count" });
    }
    if record.cross_lines.len() > CORRECTION_MAX_POINTS
        || record.curve_markers.len() > CORRECTION_MAX_POINTS
    {
        return Err(StoreError::OutOfRange { what: "landmark count" });
    }

    let n = record.samples.len();
    let mut buf = Vec::with_capacity(2 + 4 * n + 4 + 2 * (record.cross_lines.len() + record.curve_markers.len()));
    push_u16(&mut buf, n as u16);
    for s in &record.samples {
        push_u16(&mut buf, to_milli(s.delta_distance, "sample delta_distance")?);
    }
    for s in &record.samples {
        push_u16(&mut buf, to_milli(s.delta_yaw, "sample delta_yaw")?);
    }
    push_u16(&mut buf, record.cross_lines.len() as u16);
    for &d in &record.cross_lines {
        push_u16(&mut buf, to_milli(d, "cross-line position")?);
    }
    push_u16(&mut buf, record.curve_markers.len() as u16);
    for &d in &record.curve_markers {
        push_u16(&mut buf, to_milli(d, "curve-marker position")?);
    }

    store.write(COURSE_BASE, &buf)?;
    debug!(
        samples = n,
        cross_lines = record.cross_lines.len(),
        curve_markers = record.curve_markers.len(),
        "course record written"
    );
    Ok(())
}

/// Load and validate the recorded course.
pub fn read_course(store: &dyn Store) -> StoreResult<CourseRecord> {
    // Worst-case image, decoded with a cursor; counts bound each section.
    let mut buf = vec![0u8; crate::layout::COURSE_REGION_SIZE as usize];
    store.read(COURSE_BASE, &mut buf)?;
    let mut cursor = Cursor::new(&buf);

    let n = cursor.u16("course samples")? as usize;
    if n > MAPPING_MAX_POINTS {
        return Err(StoreError::Corrupt { what: "course sample count" });
    }

    let mut record = CourseRecord::default();
    record.samples.reserve(n);
    let mut distances = Vec::with_capacity(n);
    for _ in 0..n {
        distances.push(from_milli(cursor.u16("course samples")?));
    }
    for distance in distances {
        record.samples.push(CurveSample {
            delta_distance: distance,
            delta_yaw: from_milli(cursor.u16("course samples")?),
        });
    }

    for (list, what) in [
        (&mut record.cross_lines, "cross-line landmarks"),
        (&mut record.curve_markers, "curve-marker landmarks"),
    ] {
        let count = cursor.u16(what)? as usize;
        if count > CORRECTION_MAX_POINTS {
            return Err(StoreError::Corrupt { what });
        }
        list.reserve(count);
        let mut prev = 0.0f32;
        for _ in 0..count {
            let d = from_milli(cursor.u16(what)?);
            if d < prev {
                return Err(StoreError::Corrupt { what });
            }
            prev = d;
            list.push(d);
        }
    }

    Ok(record)
}

// ─── Log region ─────────────────────────────────────────────────────

/// Record how many log bytes are valid (clamped to region capacity).
pub fn write_log_len(store: &mut dyn Store, bytes: u32) -> StoreResult<()> {
    let clamped = bytes.min(LOG_CAPACITY);
    store.write(LOG_BYTES, &clamped.to_le_bytes())
}

/// Read the valid log length (clamped to region capacity).
pub fn read_log_len(store: &dyn Store) -> StoreResult<u32> {
    let mut buf = [0u8; 4];
    store.read(LOG_BYTES, &mut buf)?;
    Ok(u32::from_le_bytes(buf).min(LOG_CAPACITY))
}

/// Append-style write into the log region at `offset`.
pub fn write_log_chunk(store: &mut dyn Store, offset: u32, data: &[u8]) -> StoreResult<()> {
    let len = data.len() as u32;
    if offset.checked_add(len).is_none_or(|end| end > LOG_CAPACITY) {
        return Err(StoreError::OutOfBounds { addr: LOG_BASE + offset, len });
    }
    store.write(LOG_BASE + offset, data)
}

/// Read back part of the log region.
pub fn read_log_chunk(store: &dyn Store, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
    let len = buf.len() as u32;
    if offset.checked_add(len).is_none_or(|end| end > LOG_CAPACITY) {
        return Err(StoreError::OutOfBounds { addr: LOG_BASE + offset, len });
    }
    store.read(LOG_BASE + offset, buf)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemStore;

    fn sample(d: f32, y: f32) -> CurveSample {
        CurveSample { delta_distance: d, delta_yaw: y }
    }

    fn valid_calibration() -> CalibrationRecord {
        let mut record = CalibrationRecord {
            line_min: [100; LINE_SENSOR_NUM],
            line_max: [3000; LINE_SENSOR_NUM],
            line_coeff: [0.0; LINE_SENSOR_NUM],
            marker_max: [2800, 2900],
        };
        for i in 0..LINE_SENSOR_NUM {
            record.line_coeff[i] = 1.0 / (record.line_max[i] - record.line_min[i]) as f32;
        }
        record
    }

    #[test]
    fn calibration_round_trips() {
        let mut store = MemStore::new();
        let record = valid_calibration();
        write_calibration(&mut store, &record).unwrap();
        let back = read_calibration(&store).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn fresh_store_has_no_calibration() {
        let store = MemStore::new();
        assert!(matches!(
            read_calibration(&store),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn course_round_trips_to_quantization() {
        let mut store = MemStore::new();
        let record = CourseRecord {
            samples: vec![sample(0.010, 0.050), sample(0.012, 0.020)],
            cross_lines: vec![0.500],
            curve_markers: vec![2.500, 7.777],
        };
        write_course(&mut store, &record).unwrap();
        let back = read_course(&store).unwrap();
        // These inputs sit exactly on the 1 mm / 1 mrad grid.
        assert_eq!(back, record);
    }

    #[test]
    fn course_quantizes_to_half_milli() {
        let mut store = MemStore::new();
        let record = CourseRecord {
            samples: vec![sample(0.0104, 0.0506)],
            cross_lines: vec![],
            curve_markers: vec![],
        };
        write_course(&mut store, &record).unwrap();
        let back = read_course(&store).unwrap();
        assert!((back.samples[0].delta_distance - 0.0104).abs() <= 0.0005);
        assert!((back.samples[0].delta_yaw - 0.0506).abs() <= 0.0005);
    }

    #[test]
    fn negative_yaw_fails_write() {
        let mut store = MemStore::new();
        let record = CourseRecord {
            samples: vec![sample(0.010, -0.050)],
            ..Default::default()
        };
        assert!(matches!(
            write_course(&mut store, &record),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn oversize_position_fails_write() {
        let mut store = MemStore::new();
        let record = CourseRecord {
            cross_lines: vec![70.0],
            ..Default::default()
        };
        assert!(matches!(
            write_course(&mut store, &record),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn too_many_samples_fail_write() {
        let mut store = MemStore::new();
        let record = CourseRecord {
            samples: vec![sample(0.01, 0.0); MAPPING_MAX_POINTS + 1],
            ..Default::default()
        };
        assert!(matches!(
            write_course(&mut store, &record),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn corrupt_sample_count_detected() {
        let mut store = MemStore::new();
        // Count claims more samples than the region can hold.
        store.write(COURSE_BASE, &u16::MAX.to_le_bytes()).unwrap();
        assert!(matches!(
            read_course(&store),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn decreasing_landmarks_detected() {
        let mut store = MemStore::new();
        let mut record = CourseRecord {
            samples: vec![sample(0.01, 0.0)],
            cross_lines: vec![2.0, 1.0],
            ..Default::default()
        };
        // The writer itself doesn't sort; corrupt data is caught on read.
        write_course(&mut store, &record).unwrap();
        assert!(matches!(
            read_course(&store),
            Err(StoreError::Corrupt { .. })
        ));
        record.cross_lines = vec![1.0, 2.0];
        write_course(&mut store, &record).unwrap();
        assert!(read_course(&store).is_ok());
    }

    #[test]
    fn log_len_clamps_to_capacity() {
        let mut store = MemStore::new();
        write_log_len(&mut store, u32::MAX).unwrap();
        assert_eq!(read_log_len(&store).unwrap(), LOG_CAPACITY);
    }

    #[test]
    fn log_chunks_round_trip() {
        let mut store = MemStore::new();
        write_log_chunk(&mut store, 96, &[7u8; 96]).unwrap();
        let mut buf = [0u8; 96];
        read_log_chunk(&store, 96, &mut buf).unwrap();
        assert_eq!(buf, [7u8; 96]);
    }

    #[test]
    fn log_chunk_past_region_rejected() {
        let mut store = MemStore::new();
        assert!(matches!(
            write_log_chunk(&mut store, LOG_CAPACITY - 10, &[0u8; 96]),
            Err(StoreError::OutOfBounds { .. })
        ));
    }
}
