//! Cadence — periodic release and CPU-load accounting harness
//!
//! Answers two questions about a fixed set of periodic tasks on a single
//! core: did every task run at its cadence, and how much processor time
//! does each one take.
//!
//! - Drift-free release against absolute deadlines
//! - Per-task busy-time table written from the dispatch hooks
//! - CPU load sampled over caller-chosen windows
//! - Bounded, non-blocking status relay from producers to one consumer
//! - No heap, no allocation; every table is sized at build time

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod logging;

pub mod timer;
pub mod task;
pub mod error;
pub mod config;
pub mod release;
pub mod accounting;
pub mod sink;
pub mod tracer;
pub mod relay;
pub mod tasks;
pub mod monitor;
pub mod kernel;

pub use accounting::{Accounting, LoadMeter, LoadSample, TaskRecord};
pub use config::HarnessConfig;
pub use error::{ConfigError, TagMapError};
pub use kernel::{Harness, HarnessStats};
pub use monitor::{Liveness, Monitor, MonitorReport};
pub use relay::{MessageRelay, StatusMessage};
pub use release::{DeadlineWait, Release, ReleaseClock, ReleaseController};
pub use sink::{TraceLine, TraceSink};
pub use task::{TagMap, TaskId, TaskSpec, TaskTag, NUM_TASKS};
pub use timer::{SysTimer, Tick, TickSource};
pub use tracer::{DispatchHook, ExecutionTracer};
