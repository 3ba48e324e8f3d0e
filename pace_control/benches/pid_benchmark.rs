//! PID step cost — the servo runs two of these every millisecond.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pace_common::types::PidGain;
use pace_control::pid::Pid;

fn bench_pid_step(c: &mut Criterion) {
    c.bench_function("pid_step", |b| {
        let mut pid = Pid::new(PidGain::new(5.0, 0.01, 0.02));
        let mut measure = 0.0f32;
        b.iter(|| {
            let out = pid.update(black_box(1.0), black_box(measure), 1.0);
            measure = 0.9 * measure + 0.1 * out.clamp(-2.0, 2.0);
            black_box(out)
        });
    });
}

fn bench_pid_thousand_ticks(c: &mut Criterion) {
    c.bench_function("pid_1000_ticks", |b| {
        b.iter(|| {
            let mut pid = Pid::new(PidGain::new(26.0, 0.0, 0.02));
            let mut acc = 0.0f32;
            for i in 0..1000 {
                acc += pid.update(0.0, black_box((i % 7) as f32 * 0.01), 1.0e-3);
            }
            black_box(acc)
        });
    });
}

criterion_group!(benches, bench_pid_step, bench_pid_thousand_ticks);
criterion_main!(benches);
