//! Velocity-table generation cost over a worst-case 60 m recording.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pace_common::config::RadiusSpeedLimit;
use pace_common::consts::{MAPPING_DISTANCE, MAPPING_MAX_POINTS};
use pace_common::types::CurveSample;
use pace_control::mapping::{CurveRecorder, VelocityMapper};
use pace_store::CourseRecord;

fn full_length_recording() -> CurveRecorder {
    let samples = (0..MAPPING_MAX_POINTS)
        .map(|i| CurveSample {
            delta_distance: MAPPING_DISTANCE,
            // Alternating straights and curves of varying tightness.
            delta_yaw: if i % 40 < 20 { 0.0 } else { 0.05 + (i % 7) as f32 * 0.02 },
        })
        .collect();
    let mut recorder = CurveRecorder::new();
    recorder.load_record(&CourseRecord {
        samples,
        cross_lines: vec![],
        curve_markers: vec![],
    });
    recorder
}

fn bench_generate(c: &mut Criterion) {
    let recorder = full_length_recording();
    let limits = [
        RadiusSpeedLimit { min_radius: 0.2, max_velocity: 1.0 },
        RadiusSpeedLimit { min_radius: 0.5, max_velocity: 1.5 },
        RadiusSpeedLimit { min_radius: 1.0, max_velocity: 2.0 },
        RadiusSpeedLimit { min_radius: 5.0, max_velocity: 3.0 },
    ];

    c.bench_function("velocity_table_60m", |b| {
        let mut mapper = VelocityMapper::new();
        b.iter(|| {
            mapper.generate(
                black_box(&recorder),
                black_box(&limits),
                1.0,
                8.0,
                10.0,
                0,
            );
            black_box(mapper.table().len())
        });
    });
}

criterion_group!(benches, bench_generate);
criterion_main!(benches);
