//! Tick source — the scheduler's monotonically increasing tick counter
//!
//! The counter is 16 bits wide and wraps. Every comparison and difference
//! between ticks goes through the wrap-aware helpers below.
//!
//! On hardware the counter is advanced from the timer interrupt; on the
//! host the harness advances it explicitly.

use core::sync::atomic::{AtomicU16, Ordering};

/// Scheduler tick value
pub type Tick = u16;

/// Read access to the current tick count
pub trait TickSource {
    /// Current tick count
    fn now(&self) -> Tick;
}

/// Ticks elapsed from `earlier` to `later`, modulo the counter width
#[inline]
pub const fn elapsed_ticks(earlier: Tick, later: Tick) -> Tick {
    later.wrapping_sub(earlier)
}

/// Has `now` reached (or passed) `deadline`?
///
/// Valid while the two values are less than half the counter range apart.
/// A deadline that falls more than `i16::MAX` ticks behind `now` reads as
/// one still ahead; the caller has to keep lag inside that horizon.
#[inline]
pub const fn tick_reached(now: Tick, deadline: Tick) -> bool {
    (now.wrapping_sub(deadline) as i16) >= 0
}

/// System tick counter
///
/// Size: 2 bytes. Safe to read from any task while the tick interrupt writes.
pub struct SysTimer {
    ticks: AtomicU16,
}

impl SysTimer {
    /// Counter starting at zero
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Counter starting at an arbitrary value (wraparound testing)
    pub const fn starting_at(tick: Tick) -> Self {
        Self {
            ticks: AtomicU16::new(tick),
        }
    }

    /// Advance by one tick, returns the new count
    ///
    /// Called from the tick interrupt only.
    pub fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Ticks elapsed since a reference point
    pub fn elapsed_since(&self, reference: Tick) -> Tick {
        elapsed_ticks(reference, self.now())
    }
}

impl Default for SysTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SysTimer {
    fn now(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }
}
