//! # pace firmware (hosted target)
//!
//! Operator-facing binary wiring the 1 kHz pipeline onto the simulation
//! backend: calibration sweeps, exploration and fast laps, and log dumps.
//! On the bench the simulated board provides the devices; a hardware
//! backend implements the same `pace_hal` traits on the real board crate.
//!
//! Task layout mirrors the board firmware: the ticker fans the periodic
//! notification out to the power, sensing and motion tasks plus the
//! control loop on the main thread; each task runs its stage to
//! completion and blocks for the next tick.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pace_common::config::FirmwareConfig;
use pace_common::consts::{
    BATTERY_VOLTAGE_LIMIT_MAX, BATTERY_VOLTAGE_LIMIT_MIN, BUTTON_LONG_PRESS_MS,
    BUZZER_CANCEL_MS, BUZZER_ENTER_MS, BUZZER_FREQUENCY_HZ, LINE_CALIBRATION_TIME_MS,
    POWER_ADC_ERROR_TIME_MS,
};
use pace_common::notify::NotifyBits;
use pace_common::state::RunMode;
use pace_control::context::Context;
use pace_control::line::Calibrator;
use pace_control::log::{LogRecord, LOG_RECORD_SIZE};
use pace_control::odometry::Encoder;
use pace_control::tasks::{
    calibrate_imu, line_sensing_tick, motion_output_tick, motion_sensing_tick, power_tick,
    reset_sensors,
};
use pace_control::tick::{rt_setup, wait_periodic, TickHub, Ticker};
use pace_control::trace::{TraceController, TraceIo};
use pace_hal::sim::SimBoard;
use pace_hal::{MotorDriver, Operator};
use pace_store::records::{
    read_calibration, read_course, read_log_chunk, read_log_len, write_calibration,
};
use pace_store::{FileStore, Store};

/// RT priorities, high to low (applied with the `rt` feature).
const PRIORITY_TICKER: i32 = 90;
const PRIORITY_POWER: i32 = 85;
const PRIORITY_SENSING: i32 = 80;
const PRIORITY_MOTION: i32 = 80;

// ─── CLI ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pace", about = "Line-tracer firmware core (hosted target)")]
struct Cli {
    /// Configuration file (TOML); built-in defaults when absent.
    #[arg(long, default_value = "pace.toml")]
    config: PathBuf,

    /// Persistent store backing file.
    #[arg(long, default_value = "pace.fram")]
    store: PathBuf,

    /// Abort a run after this many seconds (0 = never).
    #[arg(long, default_value_t = 0)]
    timeout_s: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep-calibrate the line and marker sensors.
    Calibrate,
    /// Exploration lap: record course geometry and landmarks.
    Explore,
    /// Fast lap against the recorded course.
    Fast,
    /// Dump the stored run log as CSV.
    Dump,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    let mut store = match FileStore::open(&cli.store) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, path = %cli.store.display(), "store unavailable");
            std::process::exit(1);
        }
    };

    let ok = match cli.command {
        Command::Calibrate => calibrate(&mut store),
        Command::Explore => run_lap(&config, &mut store, RunMode::Explore, cli.timeout_s),
        Command::Fast => run_lap(&config, &mut store, RunMode::Fast, cli.timeout_s),
        Command::Dump => dump_log(&store),
    };
    if !ok {
        std::process::exit(1);
    }
}

fn load_config(path: &Path) -> FirmwareConfig {
    if path.exists() {
        match FirmwareConfig::load(path) {
            Ok(c) => {
                info!(path = %path.display(), "configuration loaded");
                c
            }
            Err(e) => {
                error!(error = %e, "configuration rejected");
                std::process::exit(1);
            }
        }
    } else {
        info!("no configuration file, using built-in defaults");
        FirmwareConfig::default()
    }
}

// ─── Calibration ────────────────────────────────────────────────────

/// Sweep calibration: sample while the operator drags the bar across the
/// line, then persist the derived record.
fn calibrate(store: &mut dyn Store) -> bool {
    let (mut board, handle) = SimBoard::new();
    handle.set_battery_voltage(11.8);

    let hub = Arc::new(TickHub::new());
    let rx = match hub.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            error!(error = %e, "tick hub");
            return false;
        }
    };
    let ticker = Ticker::start(hub.clone(), 0, PRIORITY_TICKER);

    board.operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_ENTER_MS);
    let mut calibrator = Calibrator::new();
    for _ in 0..LINE_CALIBRATION_TIME_MS {
        if !wait_periodic(&rx) {
            break;
        }
        calibrator.update(&mut board.line_adc, &mut board.marker_adc);
    }
    ticker.stop();

    match calibrator.finish() {
        Some(record) => match write_calibration(store, &record) {
            Ok(()) => {
                board.operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_ENTER_MS);
                info!(samples = calibrator.samples(), "calibration stored");
                true
            }
            Err(e) => {
                error!(error = %e, "calibration persist failed");
                false
            }
        },
        None => {
            warn!("calibration sweep saw no contrast, nothing stored");
            false
        }
    }
}

// ─── Runs ───────────────────────────────────────────────────────────

fn run_lap(config: &FirmwareConfig, store: &mut dyn Store, mode: RunMode, timeout_s: u64) -> bool {
    // Calibration is the precondition for any motorized mode.
    let calibration = match read_calibration(store) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "calibration missing or corrupt, refusing to run");
            return false;
        }
    };

    let param = match mode {
        RunMode::Explore => config.explore,
        RunMode::Fast => config.fast,
    };

    let (mut board, handle) = SimBoard::new();
    // Bench stimulus: the hosted target owns the simulated world.
    handle.set_battery_voltage(11.8);

    let ctx = Context::new();
    ctx.line.lock().set_calibration(
        calibration.line_min,
        calibration.line_max,
        calibration.line_coeff,
    );
    ctx.marker.lock().set_calibration(calibration.marker_max);
    ctx.servo.lock().set_gain(param.linear_pid, param.angular_pid);

    let mut controller = TraceController::new(param);

    match mode {
        RunMode::Explore => {
            // Overwriting a stored course needs operator confirmation.
            if read_course(store).map(|c| !c.samples.is_empty()).unwrap_or(false) {
                warn!("a recorded course exists and will be overwritten");
                if !confirmed(&board.operator) {
                    return false;
                }
            }
        }
        RunMode::Fast => {
            // A failed load refuses the mode before motors spin.
            let course = match read_course(store) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "no usable course recording, refusing fast run");
                    return false;
                }
            };
            controller.load_course(&course);
            if let Err(e) = controller.generate_profile(
                &config.limits,
                param.limit_velocity,
                param.acceleration,
                param.deceleration,
                config.look_ahead as usize,
            ) {
                warn!(error = %e, "velocity table generation failed");
                return false;
            }
        }
    }

    if let Err(e) = controller.begin(param) {
        warn!(error = %e, "run rejected");
        return false;
    }

    let hub = Arc::new(TickHub::new());
    let rx_control = match hub.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            error!(error = %e, "tick hub");
            return false;
        }
    };
    let (rx_power, rx_sensing, rx_motion) =
        match (hub.subscribe(), hub.subscribe(), hub.subscribe()) {
            (Ok(a), Ok(b), Ok(c)) => (a, b, c),
            _ => {
                error!("tick hub slots exhausted");
                return false;
            }
        };

    let ticker = Ticker::start(hub.clone(), 0, PRIORITY_TICKER);

    // Settle the board, then zero the gyro/accel offsets while stationary.
    let mut encoder = Encoder::new();
    if !reset_sensors(&ctx, &mut encoder, &mut board.encoders, &mut board.imu) {
        error!("sensor reset failed");
        ticker.stop();
        return false;
    }
    if !calibrate_imu(&mut board.imu, 1000, || wait_periodic(&rx_control)) {
        warn!("IMU calibration failed, run aborted");
        board.operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_CANCEL_MS);
        ticker.stop();
        return false;
    }

    show_battery(&ctx, &board.operator, &rx_control, &mut board.power_adc);

    let running = Arc::new(AtomicBool::new(true));
    let deadline_ticks = timeout_s.saturating_mul(1000);

    let SimBoard {
        mut encoders,
        mut imu,
        mut line_adc,
        mut marker_adc,
        mut power_adc,
        mut motor,
        mut fan,
        operator,
    } = board;

    let emergency = std::thread::scope(|s| {
        // Power monitoring (realtime tier).
        {
            let ctx = ctx.clone();
            let running = running.clone();
            s.spawn(move || {
                let _ = rt_setup(0, PRIORITY_POWER);
                task_loop(&rx_power, &running, move || {
                    power_tick(&ctx, &mut power_adc);
                });
            });
        }
        // Sensing: odometry, then line and markers.
        {
            let ctx = ctx.clone();
            let running = running.clone();
            s.spawn(move || {
                let _ = rt_setup(0, PRIORITY_SENSING);
                task_loop(&rx_sensing, &running, move || {
                    motion_sensing_tick(&ctx, &mut encoder, &mut encoders, &mut imu);
                    line_sensing_tick(&ctx, &mut line_adc, &mut marker_adc);
                });
            });
        }
        // Motion output: servo → motor duty, brake on emergency.
        {
            let ctx = ctx.clone();
            let running = running.clone();
            s.spawn(move || {
                let _ = rt_setup(0, PRIORITY_MOTION);
                motor.enable();
                task_loop(&rx_motion, &running, || motion_output_tick(&ctx, &mut motor));
                motor.brake();
                motor.disable();
            });
        }

        // Control loop on this thread.
        let mut ticks: u64 = 0;
        while wait_periodic(&rx_control) {
            ticks += 1;
            if deadline_ticks > 0 && ticks > deadline_ticks {
                warn!("run timeout, braking");
                ctx.servo.lock().emergency_stop();
            }
            // Sustained ADC silence means the board is gone: the hardware
            // target resets here, the hosted target halts.
            if ctx.power.lock().adc_error_time() > POWER_ADC_ERROR_TIME_MS {
                error!("power ADC unresponsive");
                operator.fatal();
            }
            let keep_going = {
                let mut odometry = ctx.odometry.lock();
                let line = ctx.line.lock();
                let mut marker = ctx.marker.lock();
                let power = ctx.power.lock();
                let mut servo = ctx.servo.lock();
                let mut io = TraceIo {
                    odometry: &mut odometry,
                    line: &line,
                    marker: &mut marker,
                    power: &power,
                    servo: &mut servo,
                    fan: &mut fan,
                    operator: &operator,
                    store: &mut *store,
                };
                controller.step(&mut io)
            };
            if !keep_going {
                break;
            }
        }

        // Let the motors settle at zero command before tearing down.
        std::thread::sleep(std::time::Duration::from_millis(500));
        running.store(false, Ordering::Relaxed);
        controller.is_emergency()
    });

    ticker.stop();

    if emergency {
        operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_CANCEL_MS);
        warn!("run ended in emergency");
    } else {
        operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_ENTER_MS);
    }
    !emergency
}

/// One periodic task loop: run `body` per tick until shutdown.
fn task_loop(rx: &Receiver<NotifyBits>, running: &AtomicBool, mut body: impl FnMut()) {
    loop {
        match rx.recv() {
            Ok(bits) if bits.contains(NotifyBits::STOP) => break,
            Ok(bits) if bits.contains(NotifyBits::PERIODIC) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                body();
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

/// Long press cancels, anything shorter confirms.
fn confirmed(operator: &dyn Operator) -> bool {
    let press_ms = operator.wait_press(60_000);
    if press_ms >= BUTTON_LONG_PRESS_MS {
        operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_CANCEL_MS);
        return false;
    }
    operator.set_buzzer(BUZZER_FREQUENCY_HZ, BUZZER_ENTER_MS);
    true
}

/// Boot battery check: refuse below the floor, show a 5-step level.
fn show_battery(
    ctx: &Context,
    operator: &dyn Operator,
    rx: &Receiver<NotifyBits>,
    adc: &mut dyn pace_hal::PowerSenseAdc,
) {
    // Give the average a full window of samples.
    for _ in 0..32 {
        if !wait_periodic(rx) {
            break;
        }
        power_tick(ctx, adc);
    }
    let volts = ctx.power.lock().battery_voltage_average();
    if volts < BATTERY_VOLTAGE_LIMIT_MIN {
        error!(volts, "battery below minimum");
        operator.fatal();
    }
    let span = (BATTERY_VOLTAGE_LIMIT_MAX - BATTERY_VOLTAGE_LIMIT_MIN) / 5.0;
    let level = volts - BATTERY_VOLTAGE_LIMIT_MIN;
    let mut bits = 0u8;
    for i in 0..5 {
        if level > (i + 1) as f32 * span {
            bits |= 1 << i;
        }
    }
    operator.set_indicator(bits, 0x1f);
    info!(volts, "battery check passed");
}

// ─── Log dump ───────────────────────────────────────────────────────

fn dump_log(store: &dyn Store) -> bool {
    let bytes = match read_log_len(store) {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "log header unreadable");
            return false;
        }
    };
    if bytes == 0 {
        warn!("log region is empty");
        return false;
    }

    println!("{}", LogRecord::csv_header());
    let mut offset = 0u32;
    let mut buf = [0u8; LOG_RECORD_SIZE];
    while offset + LOG_RECORD_SIZE as u32 <= bytes {
        if read_log_chunk(store, offset, &mut buf).is_err() {
            error!(offset, "log read failed");
            return false;
        }
        println!("{}", LogRecord::decode(&buf).csv_row());
        offset += LOG_RECORD_SIZE as u32;
    }
    info!(records = bytes as usize / LOG_RECORD_SIZE, "log dumped");
    true
}
