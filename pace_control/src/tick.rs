//! Periodic tick dispatcher.
//!
//! A fixed slot list of subscribers, each behind a depth-one channel: the
//! ticker posts the `PERIODIC` bit to every slot and a task that is still
//! busy simply loses that cycle — notifications never accumulate. The
//! ticker thread paces itself on absolute time so drift does not build up.
//!
//! ## RT setup
//!
//! With the `rt` cargo feature the dispatcher locks memory, prefaults its
//! stack, pins to a CPU and switches to `SCHED_FIFO` before entering the
//! loop, and paces with `clock_nanosleep(TIMER_ABSTIME)`. Without the
//! feature every RT call is a no-op and pacing falls back to
//! `std::thread::sleep`, which is plenty for the simulation backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{info, warn};

use pace_common::consts::TICK_INTERVAL_NS;
use pace_common::notify::NotifyBits;

/// Subscriber slot capacity.
pub const MAX_TASKS: usize = 10;

// ─── Errors ─────────────────────────────────────────────────────────

/// Dispatcher bring-up error.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
    /// All subscriber slots taken.
    #[error("subscriber slots exhausted")]
    SlotsFull,
}

// ─── Statistics ─────────────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone)]
pub struct TickStats {
    /// Ticks delivered.
    pub tick_count: u64,
    /// Last inter-tick interval [ns].
    pub last_interval_ns: i64,
    /// Minimum interval [ns].
    pub min_interval_ns: i64,
    /// Maximum interval [ns].
    pub max_interval_ns: i64,
    /// Running sum for the average.
    pub sum_interval_ns: i64,
    /// Cycles lost to overrun.
    pub overruns: u64,
}

impl TickStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_interval_ns: 0,
            min_interval_ns: i64::MAX,
            max_interval_ns: 0,
            sum_interval_ns: 0,
            overruns: 0,
        }
    }

    /// Record one delivered tick. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, interval_ns: i64) {
        self.tick_count += 1;
        self.last_interval_ns = interval_ns;
        if interval_ns < self.min_interval_ns {
            self.min_interval_ns = interval_ns;
        }
        if interval_ns > self.max_interval_ns {
            self.max_interval_ns = interval_ns;
        }
        self.sum_interval_ns += interval_ns;
    }

    /// Average interval [ns] (0 before the first tick).
    #[inline]
    pub fn avg_interval_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_interval_ns / self.tick_count as i64
        }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Hub ────────────────────────────────────────────────────────────

/// Fan-out hub: fixed subscriber slots, one depth-one channel each.
pub struct TickHub {
    slots: Mutex<heapless::Vec<SyncSender<NotifyBits>, MAX_TASKS>>,
}

impl TickHub {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(heapless::Vec::new()),
        }
    }

    /// Claim a subscriber slot.
    pub fn subscribe(&self) -> Result<Receiver<NotifyBits>, TickError> {
        let (tx, rx) = sync_channel(1);
        self.slots
            .lock()
            .push(tx)
            .map(|_| rx)
            .map_err(|_| TickError::SlotsFull)
    }

    /// Post `bits` to every slot. A full slot loses this notification.
    pub fn broadcast(&self, bits: NotifyBits) {
        for tx in self.slots.lock().iter() {
            let _ = tx.try_send(bits);
        }
    }
}

impl Default for TickHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Block for the next notification carrying the periodic bit.
///
/// Returns `false` when the hub is gone (controlled shutdown).
pub fn wait_periodic(rx: &Receiver<NotifyBits>) -> bool {
    loop {
        match rx.recv() {
            Ok(bits) if bits.contains(NotifyBits::PERIODIC) => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
}

// ─── RT setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), TickError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| TickError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), TickError> {
    Ok(())
}

/// Prefault stack pages so the loop never page-faults.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to one CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), TickError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| TickError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| TickError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), TickError> {
    Ok(())
}

/// Switch to SCHED_FIFO at the given priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), TickError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(TickError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), TickError> {
    Ok(())
}

/// Full RT bring-up for the calling thread.
///
/// All calls are no-ops without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), TickError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Ticker thread ──────────────────────────────────────────────────

/// Handle onto the running ticker thread.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<TickStats>>,
}

impl Ticker {
    /// Spawn the 1 kHz ticker onto `hub`.
    ///
    /// `cpu_core` and `rt_priority` apply with the `rt` feature.
    pub fn start(hub: Arc<TickHub>, cpu_core: usize, rt_priority: i32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("ticker".into())
            .spawn(move || {
                if let Err(e) = rt_setup(cpu_core, rt_priority) {
                    warn!(error = %e, "RT setup failed, running best-effort");
                }
                ticker_loop(&hub, &stop_flag)
            })
            .ok();
        Self { stop, handle }
    }

    /// Stop the ticker and collect its statistics.
    pub fn stop(mut self) -> TickStats {
        self.stop.store(true, Ordering::Relaxed);
        let stats = self
            .handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        info!(
            ticks = stats.tick_count,
            overruns = stats.overruns,
            avg_ns = stats.avg_interval_ns(),
            "ticker stopped"
        );
        stats
    }
}

/// Absolute-time paced broadcast loop (`clock_nanosleep(TIMER_ABSTIME)`).
#[cfg(feature = "rt")]
fn ticker_loop(hub: &TickHub, stop: &AtomicBool) -> TickStats {
    use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

    let clock = ClockId::CLOCK_MONOTONIC;
    let mut stats = TickStats::new();
    let Ok(mut now) = clock_gettime(clock) else {
        return stats;
    };
    let mut next = timespec_add_ns(now, TICK_INTERVAL_NS);
    let mut last = now;

    while !stop.load(Ordering::Relaxed) {
        let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next);
        now = match clock_gettime(clock) {
            Ok(t) => t,
            Err(_) => break,
        };
        if timespec_diff_ns(&now, &next) > TICK_INTERVAL_NS {
            // Lost cycles do not accumulate; realign to the present.
            stats.overruns += 1;
            next = now;
        }

        hub.broadcast(NotifyBits::PERIODIC);

        stats.record(timespec_diff_ns(&now, &last));
        last = now;
        next = timespec_add_ns(next, TICK_INTERVAL_NS);
    }
    hub.broadcast(NotifyBits::STOP);
    stats
}

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a − b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

/// Absolute-time paced broadcast loop (`std::thread::sleep` pacing).
#[cfg(not(feature = "rt"))]
fn ticker_loop(hub: &TickHub, stop: &AtomicBool) -> TickStats {
    use std::time::{Duration, Instant};

    let period = Duration::from_nanos(TICK_INTERVAL_NS as u64);
    let mut stats = TickStats::new();
    let start = Instant::now();
    let mut next = start + period;
    let mut last = start;

    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            std::thread::sleep(next - now);
        } else if now > next + period {
            // Lost cycles do not accumulate; realign to the present.
            stats.overruns += 1;
            next = now;
        }

        hub.broadcast(NotifyBits::PERIODIC);

        let fired = Instant::now();
        stats.record((fired - last).as_nanos() as i64);
        last = fired;
        next += period;
    }
    hub.broadcast(NotifyBits::STOP);
    stats
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let hub = TickHub::new();
        let rx1 = hub.subscribe().unwrap();
        let rx2 = hub.subscribe().unwrap();
        hub.broadcast(NotifyBits::PERIODIC);
        assert!(wait_periodic(&rx1));
        assert!(wait_periodic(&rx2));
    }

    #[test]
    fn slow_subscriber_loses_cycles_without_accumulation() {
        let hub = TickHub::new();
        let rx = hub.subscribe().unwrap();
        for _ in 0..5 {
            hub.broadcast(NotifyBits::PERIODIC);
        }
        // Depth-one slot: exactly one notification queued.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn slots_are_bounded() {
        let hub = TickHub::new();
        let mut receivers = Vec::new();
        for _ in 0..MAX_TASKS {
            receivers.push(hub.subscribe().unwrap());
        }
        assert!(matches!(hub.subscribe(), Err(TickError::SlotsFull)));
    }

    #[test]
    fn wait_periodic_skips_other_bits() {
        let hub = Arc::new(TickHub::new());
        let rx = hub.subscribe().unwrap();
        hub.broadcast(NotifyBits::START);
        let waiter = std::thread::spawn(move || wait_periodic(&rx));
        // The waiter drains the START notification, then blocks until a
        // periodic bit arrives.
        std::thread::sleep(std::time::Duration::from_millis(20));
        hub.broadcast(NotifyBits::PERIODIC);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn ticker_delivers_and_stops() {
        let hub = Arc::new(TickHub::new());
        let rx = hub.subscribe().unwrap();
        let ticker = Ticker::start(hub, 0, 0);
        for _ in 0..5 {
            assert!(wait_periodic(&rx));
        }
        let stats = ticker.stop();
        assert!(stats.tick_count >= 5);
    }

    #[test]
    fn stats_track_min_max_avg() {
        let mut stats = TickStats::new();
        stats.record(900_000);
        stats.record(1_100_000);
        assert_eq!(stats.tick_count, 2);
        assert_eq!(stats.min_interval_ns, 900_000);
        assert_eq!(stats.max_interval_ns, 1_100_000);
        assert_eq!(stats.avg_interval_ns(), 1_000_000);
    }
}
