//! Release controller — drift-free periodic release
//!
//! Each task keeps the absolute tick of its last release. Every call moves
//! that deadline forward by exactly one period and blocks until it is
//! reached. The deadline is never re-based on "now", so a late release does
//! not shift the ones after it.
//!
//! A task that overran gets an immediate return: the deadline still moves
//! by one period only, and the task runs back-to-back until it catches up.

use crate::task::{TaskId, NUM_TASKS};
use crate::timer::{elapsed_ticks, tick_reached, Tick, TickSource};

/// Deadline blocking primitive of the underlying scheduler
pub trait DeadlineWait {
    /// Suspend the calling task until the tick count reaches `deadline`
    fn block_until(&self, deadline: Tick);
}

/// Outcome of one release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Release {
    /// Deadline ahead; the caller blocks until it
    Wait {
        /// New absolute deadline
        deadline: Tick,
    },
    /// Deadline already reached; the caller continues without blocking
    Immediate {
        /// New absolute deadline
        deadline: Tick,
        /// Ticks past the deadline at the time of the call
        late_by: Tick,
    },
}

impl Release {
    /// New absolute deadline
    pub fn deadline(&self) -> Tick {
        match *self {
            Release::Wait { deadline } | Release::Immediate { deadline, .. } => deadline,
        }
    }

    /// Was the deadline already behind us?
    pub fn is_overrun(&self) -> bool {
        matches!(*self, Release::Immediate { late_by, .. } if late_by > 0)
    }
}

/// Per-task last-deadline cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseClock {
    last_deadline: Tick,
    releases: u32,
    overruns: u32,
}

impl ReleaseClock {
    /// Clock whose first deadline is `now`
    pub const fn new(now: Tick) -> Self {
        Self {
            last_deadline: now,
            releases: 0,
            overruns: 0,
        }
    }

    /// Deadline of the most recent release
    pub fn last_deadline(&self) -> Tick {
        self.last_deadline
    }

    /// Releases so far
    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// Releases whose deadline had already passed
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Move the deadline forward by `period` and report whether to block
    pub fn advance(&mut self, period: Tick, now: Tick) -> Release {
        let deadline = self.last_deadline.wrapping_add(period);
        self.last_deadline = deadline;
        self.releases = self.releases.wrapping_add(1);

        if tick_reached(now, deadline) {
            let late_by = elapsed_ticks(deadline, now);
            if late_by > 0 {
                self.overruns = self.overruns.wrapping_add(1);
            }
            Release::Immediate { deadline, late_by }
        } else {
            Release::Wait { deadline }
        }
    }

    /// Block until `last_deadline + period`, then make that the last deadline
    pub fn wait_for_next_period<T, W>(&mut self, period: Tick, ticks: &T, waiter: &W) -> Release
    where
        T: TickSource,
        W: DeadlineWait,
    {
        let release = self.advance(period, ticks.now());
        if let Release::Wait { deadline } = release {
            waiter.block_until(deadline);
        }
        release
    }
}

/// Release clocks of the whole task set
pub struct ReleaseController {
    clocks: [ReleaseClock; NUM_TASKS],
}

impl ReleaseController {
    /// Every deadline initialised to `now`
    pub const fn new(now: Tick) -> Self {
        Self {
            clocks: [ReleaseClock::new(now); NUM_TASKS],
        }
    }

    /// Release step without blocking; the caller parks the task on `Wait`
    pub fn release(&mut self, task: TaskId, period: Tick, now: Tick) -> Release {
        let release = self.clocks[task.index()].advance(period, now);
        if let Release::Immediate { deadline, late_by } = release {
            if late_by > 0 {
                crate::log_warn!(
                    "{} overran: deadline {} passed {} ticks ago",
                    task.name(),
                    deadline,
                    late_by
                );
            }
        }
        release
    }

    /// Block `task` until its next period starts
    pub fn wait_for_next_period<T, W>(
        &mut self,
        task: TaskId,
        period: Tick,
        ticks: &T,
        waiter: &W,
    ) -> Release
    where
        T: TickSource,
        W: DeadlineWait,
    {
        let release = self.release(task, period, ticks.now());
        if let Release::Wait { deadline } = release {
            waiter.block_until(deadline);
        }
        release
    }

    /// Clock of one task
    pub fn clock(&self, task: TaskId) -> &ReleaseClock {
        &self.clocks[task.index()]
    }

    /// Overruns summed over all tasks
    pub fn total_overruns(&self) -> u32 {
        self.clocks.iter().map(ReleaseClock::overruns).sum()
    }
}
