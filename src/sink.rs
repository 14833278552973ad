//! Trace sink — observable output lines for a logic analyzer
//!
//! One line pulses on every tick, one line per task pulses on every
//! dispatch-in. The harness never reads these lines back.

use crate::task::TaskId;

/// Output line driven by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceLine {
    /// Tick heartbeat
    Tick,
    /// Dispatch marker of one task
    Task(TaskId),
}

/// Logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

/// GPIO-like output collaborator
pub trait TraceSink {
    /// Drive `line` to `level`
    fn set(&self, line: TraceLine, level: Level);

    /// High then low
    fn pulse(&self, line: TraceLine) {
        self.set(line, Level::High);
        self.set(line, Level::Low);
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &S {
    fn set(&self, line: TraceLine, level: Level) {
        (**self).set(line, level)
    }
}

/// Sink for boards without spare pins
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn set(&self, _line: TraceLine, _level: Level) {}
}

/// Tick interrupt hook: heartbeat pulse
#[inline]
pub fn tick_hook<S: TraceSink + ?Sized>(sink: &S) {
    sink.pulse(TraceLine::Tick);
}
