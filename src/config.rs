//! Build-time configuration
//!
//! Everything the harness needs to know about its task set is fixed here.
//! `HarnessConfig::validate` runs once at startup, before the first
//! dispatch, and refuses a table the accounting layer could not index.

use crate::error::ConfigError;
use crate::task::{TagMap, TaskId, TaskSpec, TaskTag, NUM_TASKS};
use crate::timer::Tick;

/// Relay slots
pub const RELAY_CAPACITY: usize = 3;

/// First dispatcher tag; tags run contiguously from here in slot order
pub const TAG_BASE: TaskTag = TaskTag(16);

/// Button 1 sampler period (ticks)
pub const BUTTON_ONE_PERIOD: Tick = 50;
/// Button 2 sampler period (ticks)
pub const BUTTON_TWO_PERIOD: Tick = 50;
/// Periodic transmitter period (ticks)
pub const TRANSMITTER_PERIOD: Tick = 100;
/// Relay consumer period (ticks)
pub const UART_RECEIVER_PERIOD: Tick = 20;
/// Load generator 1 period (ticks)
pub const LOAD_ONE_PERIOD: Tick = 10;
/// Load generator 2 period (ticks)
pub const LOAD_TWO_PERIOD: Tick = 100;

/// Busy-loop length of load generator 1 on hardware
pub const LOAD_ONE_ITERATIONS: u32 = 37_500;
/// Busy-loop length of load generator 2 on hardware
pub const LOAD_TWO_ITERATIONS: u32 = 89_500;

/// Ticks between two load samples taken by the monitor
pub const MONITOR_WINDOW: Tick = 1_000;

/// Longest period the wrap-aware deadline comparison supports
///
/// The same horizon bounds how far a job may fall behind its deadline.
/// A task set that stays overloaded long enough to lag more than this
/// many ticks has its overrun jobs read as early ones.
pub const MAX_PERIOD: Tick = i16::MAX as Tick;

/// Complete harness configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarnessConfig {
    /// First dispatcher tag
    pub tag_base: TaskTag,
    /// Task table, slot order
    pub tasks: [TaskSpec; NUM_TASKS],
    /// Monitor sampling window (ticks)
    pub monitor_window: Tick,
    /// Load generator 1 busy-loop length
    pub load_one_iterations: u32,
    /// Load generator 2 busy-loop length
    pub load_two_iterations: u32,
    /// Utilization percentage above which the monitor warns
    pub load_warning_percent: u8,
}

impl HarnessConfig {
    /// Stock task set
    ///
    /// Simulated costs: 5 ticks for load 1, 12 ticks for load 2, one tick
    /// for everything else. Nominal utilization 0.72.
    pub const DEFAULT: HarnessConfig = HarnessConfig {
        tag_base: TAG_BASE,
        tasks: [
            TaskSpec::periodic(TaskId::ButtonOne, BUTTON_ONE_PERIOD, 1),
            TaskSpec::periodic(TaskId::ButtonTwo, BUTTON_TWO_PERIOD, 1),
            TaskSpec::periodic(TaskId::Transmitter, TRANSMITTER_PERIOD, 1),
            TaskSpec::periodic(TaskId::UartReceiver, UART_RECEIVER_PERIOD, 1),
            TaskSpec::periodic(TaskId::LoadOne, LOAD_ONE_PERIOD, 5),
            TaskSpec::periodic(TaskId::LoadTwo, LOAD_TWO_PERIOD, 12),
            TaskSpec::idle(),
        ],
        monitor_window: MONITOR_WINDOW,
        load_one_iterations: LOAD_ONE_ITERATIONS,
        load_two_iterations: LOAD_TWO_ITERATIONS,
        load_warning_percent: 75,
    };

    /// Descriptor of one task
    pub fn task(&self, id: TaskId) -> &TaskSpec {
        &self.tasks[id.index()]
    }

    /// Release period of one task
    pub fn period(&self, id: TaskId) -> Tick {
        self.task(id).period
    }

    /// Sum of cost / period over periodic tasks
    pub fn nominal_utilization(&self) -> f32 {
        self.tasks.iter().map(TaskSpec::utilization).sum()
    }

    /// Tag map for this configuration
    pub fn tag_map(&self) -> Result<TagMap, ConfigError> {
        Ok(TagMap::contiguous(self.tag_base)?)
    }

    /// Startup check; returns the validated tag map
    pub fn validate(&self) -> Result<TagMap, ConfigError> {
        for (slot, spec) in self.tasks.iter().enumerate() {
            if spec.id.index() != slot {
                return Err(ConfigError::Misplaced {
                    task: spec.id.name(),
                    slot,
                });
            }
            if !spec.is_periodic() {
                continue;
            }
            if spec.period == 0 {
                return Err(ConfigError::ZeroPeriod { task: spec.id.name() });
            }
            if spec.period > MAX_PERIOD {
                return Err(ConfigError::PeriodTooLong {
                    task: spec.id.name(),
                    period: spec.period,
                });
            }
        }
        if self.monitor_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        self.tag_map()
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
