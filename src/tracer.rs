//! Execution tracer — dispatch hooks feeding the accounting table
//!
//! The scheduler calls `on_dispatch_out` for the task losing the processor
//! and `on_dispatch_in` for the task gaining it, both from inside its own
//! switch critical section. Any scheduler that can make those two calls
//! can drive the accounting layer.

use crate::accounting::Accounting;
use crate::sink::{TraceLine, TraceSink};
use crate::task::{TagMap, TaskTag};
use crate::timer::TickSource;

/// Hooks the dispatcher invokes on every task switch
pub trait DispatchHook {
    /// `tag` is about to run
    fn on_dispatch_in(&self, tag: TaskTag);

    /// `tag` has just been switched out
    fn on_dispatch_out(&self, tag: TaskTag);
}

/// Timestamps dispatches into an `Accounting` table
pub struct ExecutionTracer<'a, T, S> {
    accounting: &'a Accounting,
    ticks: &'a T,
    sink: &'a S,
    tags: TagMap,
}

impl<'a, T, S> ExecutionTracer<'a, T, S>
where
    T: TickSource,
    S: TraceSink,
{
    /// Tracer over a validated tag map
    pub fn new(accounting: &'a Accounting, ticks: &'a T, sink: &'a S, tags: TagMap) -> Self {
        Self {
            accounting,
            ticks,
            sink,
            tags,
        }
    }

    /// Tag map in use
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }
}

impl<T, S> DispatchHook for ExecutionTracer<'_, T, S>
where
    T: TickSource,
    S: TraceSink,
{
    fn on_dispatch_in(&self, tag: TaskTag) {
        let task = self.tags.resolve(tag);
        self.accounting.record_dispatch_in(task, self.ticks.now());
        self.sink.pulse(TraceLine::Task(task));
    }

    fn on_dispatch_out(&self, tag: TaskTag) {
        let task = self.tags.resolve(tag);
        self.accounting.record_dispatch_out(task, self.ticks.now());
    }
}
