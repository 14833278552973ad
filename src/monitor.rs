//! Monitoring task — CPU load, liveness and relay health
//!
//! Each task bumps its liveness counter once per completed job. A task that
//! fails internally stops bumping it; the monitor reports every periodic
//! task whose counter did not move during the last window. The window must
//! be longer than the longest period or healthy tasks show up as stalled.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::accounting::{Accounting, LoadMeter, LoadSample};
use crate::relay::MessageRelay;
use crate::task::{TaskId, NUM_TASKS};
use crate::timer::Tick;

/// Per-task completed-job counters
pub struct Liveness {
    beats: [AtomicU32; NUM_TASKS],
}

impl Liveness {
    /// All counters at zero
    pub const fn new() -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            beats: [ZERO; NUM_TASKS],
        }
    }

    /// One job of `task` completed
    pub fn beat(&self, task: TaskId) {
        self.beats[task.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs of `task` completed so far
    pub fn count(&self, task: TaskId) -> u32 {
        self.beats[task.index()].load(Ordering::Relaxed)
    }

    /// All counters
    pub fn snapshot(&self) -> [u32; NUM_TASKS] {
        let mut out = [0; NUM_TASKS];
        for (slot, beat) in out.iter_mut().zip(self.beats.iter()) {
            *slot = beat.load(Ordering::Relaxed);
        }
        out
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one monitoring pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorReport {
    /// Load over the window
    pub load: LoadSample,
    /// Bit `i` set: task in slot `i` completed no job during the window
    pub stalled: u8,
    /// Relay drops during the window
    pub dropped: u32,
    /// Release overruns during the window
    pub overruns: u32,
}

impl MonitorReport {
    /// Did `task` stall?
    pub fn is_stalled(&self, task: TaskId) -> bool {
        self.stalled & (1 << task.index()) != 0
    }

    /// Every periodic task made progress?
    pub fn all_alive(&self) -> bool {
        self.stalled == 0
    }
}

/// Monitor state carried from one window to the next
pub struct Monitor {
    meter: LoadMeter,
    last_beats: [u32; NUM_TASKS],
    last_dropped: u32,
    last_overruns: u32,
    warn_percent: u8,
}

impl Monitor {
    /// Monitor whose first window starts at `now`
    pub const fn new(now: Tick, warn_percent: u8) -> Self {
        Self {
            meter: LoadMeter::new(now),
            last_beats: [0; NUM_TASKS],
            last_dropped: 0,
            last_overruns: 0,
            warn_percent,
        }
    }

    /// Close the current window at `now` and report on it
    ///
    /// `overruns` is the running overrun total of the release controller.
    pub fn collect<const C: usize>(
        &mut self,
        now: Tick,
        accounting: &Accounting,
        liveness: &Liveness,
        relay: &MessageRelay<C>,
        overruns: u32,
    ) -> MonitorReport {
        let load = self.meter.sample(accounting, now);

        let beats = liveness.snapshot();
        let mut stalled = 0u8;
        for id in TaskId::ALL {
            if id.is_idle() {
                continue;
            }
            if beats[id.index()] == self.last_beats[id.index()] {
                stalled |= 1 << id.index();
            }
        }
        self.last_beats = beats;

        let dropped_total = relay.dropped();
        let dropped = dropped_total.wrapping_sub(self.last_dropped);
        self.last_dropped = dropped_total;

        let overrun_delta = overruns.wrapping_sub(self.last_overruns);
        self.last_overruns = overruns;

        let report = MonitorReport {
            load,
            stalled,
            dropped,
            overruns: overrun_delta,
        };
        self.log(&report);
        report
    }

    fn log(&self, report: &MonitorReport) {
        let percent = report.load.cpu_load_percent();
        crate::log_info!(
            "monitor: window={} busy={} cpu={}% dropped={} overruns={}",
            report.load.window_ticks,
            report.load.busy_ticks,
            percent,
            report.dropped,
            report.overruns
        );
        if percent >= self.warn_percent {
            crate::log_warn!("high CPU load: {}%", percent);
        }
        for id in TaskId::ALL {
            if report.is_stalled(id) {
                crate::log_warn!("task '{}' made no progress", id.name());
            }
        }
    }
}
