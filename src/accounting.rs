//! Execution-time accounting and CPU load
//!
//! One `TaskRecord` per task holds the entry/exit ticks of its latest
//! dispatch and the busy time accumulated over all dispatches. The
//! dispatcher writes it on every task switch; the monitor reads it at
//! any time. Both sides go through a critical section, so a reader never
//! sees a half-written 64-bit total on a 32-bit core.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::task::{TaskId, NUM_TASKS};
use crate::timer::{elapsed_ticks, Tick};

/// Accounting entry of one task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskRecord {
    /// Tick of the latest dispatch-in
    pub time_in: Tick,
    /// Tick of the latest dispatch-out
    pub time_out: Tick,
    /// Busy ticks summed over all completed dispatches
    pub total_busy: u64,
}

impl TaskRecord {
    /// Zeroed record
    pub const ZERO: TaskRecord = TaskRecord {
        time_in: 0,
        time_out: 0,
        total_busy: 0,
    };
}

/// Per-task accounting table
///
/// Size: NUM_TASKS × 16 bytes. Zeroed at construction, never resized.
pub struct Accounting {
    table: Mutex<RefCell<[TaskRecord; NUM_TASKS]>>,
}

impl Accounting {
    /// Zeroed table
    pub const fn new() -> Self {
        Self {
            table: Mutex::new(RefCell::new([TaskRecord::ZERO; NUM_TASKS])),
        }
    }

    /// Store the dispatch-in tick of `task`
    pub fn record_dispatch_in(&self, task: TaskId, tick: Tick) {
        critical_section::with(|cs| {
            self.table.borrow_ref_mut(cs)[task.index()].time_in = tick;
        });
    }

    /// Store the dispatch-out tick of `task` and fold the slice into its total
    ///
    /// Returns the length of the slice that just ended.
    pub fn record_dispatch_out(&self, task: TaskId, tick: Tick) -> Tick {
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let record = &mut table[task.index()];
            record.time_out = tick;
            let slice = elapsed_ticks(record.time_in, record.time_out);
            record.total_busy = record.total_busy.wrapping_add(u64::from(slice));
            slice
        })
    }

    /// Busy ticks summed over every record, idle slot included
    pub fn total_busy_ticks(&self) -> u64 {
        critical_section::with(|cs| {
            self.table
                .borrow_ref(cs)
                .iter()
                .fold(0u64, |acc, record| acc.wrapping_add(record.total_busy))
        })
    }

    /// Busy ticks of the periodic tasks only; this is what counts as load
    pub fn workload_busy_ticks(&self) -> u64 {
        critical_section::with(|cs| {
            self.table
                .borrow_ref(cs)
                .iter()
                .zip(TaskId::ALL.iter())
                .filter(|(_, id)| !id.is_idle())
                .fold(0u64, |acc, (record, _)| acc.wrapping_add(record.total_busy))
        })
    }

    /// Busy ticks of one task
    pub fn busy_ticks(&self, task: TaskId) -> u64 {
        self.record(task).total_busy
    }

    /// Ticks spent in the idle task
    pub fn idle_ticks(&self) -> u64 {
        self.busy_ticks(TaskId::Idle)
    }

    /// Copy of one record
    pub fn record(&self, task: TaskId) -> TaskRecord {
        critical_section::with(|cs| self.table.borrow_ref(cs)[task.index()])
    }

    /// Consistent copy of the whole table
    pub fn snapshot(&self) -> [TaskRecord; NUM_TASKS] {
        critical_section::with(|cs| *self.table.borrow_ref(cs))
    }

    /// Zero every record
    pub fn reset(&self) {
        critical_section::with(|cs| {
            *self.table.borrow_ref_mut(cs) = [TaskRecord::ZERO; NUM_TASKS];
        });
    }
}

impl Default for Accounting {
    fn default() -> Self {
        Self::new()
    }
}

/// One utilization sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// Busy ticks accumulated during the window
    pub busy_ticks: u64,
    /// Window length in ticks
    pub window_ticks: Tick,
    /// busy / window, clamped to [0, 1]
    pub utilization: f32,
}

impl LoadSample {
    /// Utilization as a whole percentage (0-100)
    pub fn cpu_load_percent(&self) -> u8 {
        (self.utilization * 100.0 + 0.5) as u8
    }
}

/// Load accumulator: busy-time delta between two samples
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadMeter {
    last_total: u64,
    last_tick: Tick,
}

impl LoadMeter {
    /// Meter whose first window starts at `now`
    pub const fn new(now: Tick) -> Self {
        Self {
            last_total: 0,
            last_tick: now,
        }
    }

    /// Busy fraction since the previous sample, over a caller-tracked window
    ///
    /// The window is taken to start where the previous one ended, so a
    /// later `sample` measures from `window_ticks` past it. Returns 0.0 for
    /// an empty window.
    pub fn utilization(&mut self, accounting: &Accounting, window_ticks: Tick) -> f32 {
        let total = accounting.workload_busy_ticks();
        let busy = total.wrapping_sub(self.last_total);
        self.last_total = total;
        self.last_tick = self.last_tick.wrapping_add(window_ticks);
        ratio(busy, window_ticks)
    }

    /// Take a sample whose window runs from the previous sample to `now`
    pub fn sample(&mut self, accounting: &Accounting, now: Tick) -> LoadSample {
        let window_ticks = elapsed_ticks(self.last_tick, now);
        self.last_tick = now;
        let total = accounting.workload_busy_ticks();
        let busy_ticks = total.wrapping_sub(self.last_total);
        self.last_total = total;
        LoadSample {
            busy_ticks,
            window_ticks,
            utilization: ratio(busy_ticks, window_ticks),
        }
    }
}

fn ratio(busy: u64, window: Tick) -> f32 {
    if window == 0 {
        return 0.0;
    }
    let u = busy as f32 / window as f32;
    if u > 1.0 {
        1.0
    } else {
        u
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_initialised() {
        let acct = Accounting::new();
        assert_eq!(acct.total_busy_ticks(), 0);
        for id in TaskId::ALL {
            assert_eq!(acct.record(id), TaskRecord::ZERO);
        }
    }

    #[test]
    fn test_single_dispatch() {
        let acct = Accounting::new();
        acct.record_dispatch_in(TaskId::Transmitter, 100);
        assert_eq!(acct.record_dispatch_out(TaskId::Transmitter, 140), 40);

        let rec = acct.record(TaskId::Transmitter);
        assert_eq!(rec.time_in, 100);
        assert_eq!(rec.time_out, 140);
        assert_eq!(rec.total_busy, 40);
        assert_eq!(acct.total_busy_ticks(), 40);
    }

    #[test]
    fn test_total_is_sum_of_slices() {
        let acct = Accounting::new();
        let slices = [(0u16, 5u16), (10, 15), (20, 21), (30, 30), (40, 47)];
        let mut prev = 0;
        for (t_in, t_out) in slices {
            acct.record_dispatch_in(TaskId::LoadOne, t_in);
            acct.record_dispatch_out(TaskId::LoadOne, t_out);
            let now = acct.busy_ticks(TaskId::LoadOne);
            assert!(now >= prev);
            prev = now;
        }
        assert_eq!(acct.busy_ticks(TaskId::LoadOne), 5 + 5 + 1 + 0 + 7);
    }

    #[test]
    fn test_slice_across_counter_wrap() {
        let acct = Accounting::new();
        acct.record_dispatch_in(TaskId::LoadTwo, 65_530);
        assert_eq!(acct.record_dispatch_out(TaskId::LoadTwo, 6), 12);
        assert_eq!(acct.busy_ticks(TaskId::LoadTwo), 12);
    }

    #[test]
    fn test_total_includes_idle_workload_does_not() {
        let acct = Accounting::new();
        acct.record_dispatch_in(TaskId::Idle, 0);
        acct.record_dispatch_out(TaskId::Idle, 90);
        acct.record_dispatch_in(TaskId::ButtonOne, 90);
        acct.record_dispatch_out(TaskId::ButtonOne, 100);

        let summed: u64 = acct.snapshot().iter().map(|r| r.total_busy).sum();
        assert_eq!(acct.total_busy_ticks(), summed);
        assert_eq!(acct.total_busy_ticks(), 100);
        assert_eq!(acct.idle_ticks(), 90);
        assert_eq!(acct.workload_busy_ticks(), 10);
    }

    #[test]
    fn test_meter_ignores_idle() {
        let acct = Accounting::new();
        let mut meter = LoadMeter::new(0);
        acct.record_dispatch_in(TaskId::LoadOne, 0);
        acct.record_dispatch_out(TaskId::LoadOne, 30);
        acct.record_dispatch_in(TaskId::Idle, 30);
        acct.record_dispatch_out(TaskId::Idle, 100);

        let s = meter.sample(&acct, 100);
        assert_eq!(s.busy_ticks, 30);
        assert_eq!(s.cpu_load_percent(), 30);
    }

    #[test]
    fn test_utilization_then_sample_share_the_window() {
        let acct = Accounting::new();
        let mut meter = LoadMeter::new(0);

        acct.record_dispatch_in(TaskId::LoadOne, 0);
        acct.record_dispatch_out(TaskId::LoadOne, 50);
        assert!((meter.utilization(&acct, 100) - 0.5).abs() < 1e-6);

        acct.record_dispatch_in(TaskId::LoadOne, 100);
        acct.record_dispatch_out(TaskId::LoadOne, 120);
        let s = meter.sample(&acct, 200);
        assert_eq!(s.window_ticks, 100);
        assert_eq!(s.busy_ticks, 20);
    }

    #[test]
    fn test_concurrent_reader_sees_whole_slices() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::thread;

        const PAIRS: u64 = 5_000;
        const SLICE: u16 = 7;

        let acct = Arc::new(Accounting::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let acct = Arc::clone(&acct);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut tick: Tick = 0;
                for _ in 0..PAIRS {
                    acct.record_dispatch_in(TaskId::LoadTwo, tick);
                    tick = tick.wrapping_add(SLICE);
                    acct.record_dispatch_out(TaskId::LoadTwo, tick);
                }
                done.store(true, Ordering::Release);
            })
        };

        let reader = {
            let acct = Arc::clone(&acct);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut prev = 0;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let total = acct.total_busy_ticks();
                    assert_eq!(total % u64::from(SLICE), 0, "partial slice in {total}");
                    assert!(total >= prev, "total went back from {prev} to {total}");
                    prev = total;
                    if finished {
                        break;
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(acct.total_busy_ticks(), PAIRS * u64::from(SLICE));
    }

    #[test]
    fn test_repeated_reads_agree() {
        let acct = Accounting::new();
        acct.record_dispatch_in(TaskId::ButtonTwo, 3);
        acct.record_dispatch_out(TaskId::ButtonTwo, 9);
        assert_eq!(acct.total_busy_ticks(), acct.total_busy_ticks());
        assert_eq!(acct.snapshot(), acct.snapshot());
    }

    #[test]
    fn test_reset() {
        let acct = Accounting::new();
        acct.record_dispatch_in(TaskId::ButtonTwo, 3);
        acct.record_dispatch_out(TaskId::ButtonTwo, 9);
        acct.reset();
        assert_eq!(acct.total_busy_ticks(), 0);
    }

    #[test]
    fn test_utilization_over_window() {
        let acct = Accounting::new();
        let mut meter = LoadMeter::new(0);
        assert_eq!(meter.utilization(&acct, 100), 0.0);

        acct.record_dispatch_in(TaskId::LoadOne, 0);
        acct.record_dispatch_out(TaskId::LoadOne, 25);
        let u = meter.utilization(&acct, 100);
        assert!((u - 0.25).abs() < 1e-6);

        // nothing new since the last sample
        assert_eq!(meter.utilization(&acct, 100), 0.0);
        assert_eq!(meter.utilization(&acct, 0), 0.0);
    }

    #[test]
    fn test_sample_tracks_window() {
        let acct = Accounting::new();
        let mut meter = LoadMeter::new(1_000);

        acct.record_dispatch_in(TaskId::LoadTwo, 1_010);
        acct.record_dispatch_out(TaskId::LoadTwo, 1_022);
        let s = meter.sample(&acct, 1_100);
        assert_eq!(s.window_ticks, 100);
        assert_eq!(s.busy_ticks, 12);
        assert_eq!(s.cpu_load_percent(), 12);
    }

    #[test]
    fn test_utilization_clamped() {
        let acct = Accounting::new();
        let mut meter = LoadMeter::new(0);
        // slice started before the window
        acct.record_dispatch_in(TaskId::LoadTwo, 0);
        acct.record_dispatch_out(TaskId::LoadTwo, 30);
        assert_eq!(meter.utilization(&acct, 10), 1.0);
    }
}
