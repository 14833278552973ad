//! Startup validation errors
//!
//! Only configuration and tag-map checks return errors. They run once
//! before the scheduler starts; nothing on the dispatch path fails
//! recoverably.

use core::fmt;

use crate::task::TaskTag;

/// Task tag table could not be mapped onto the accounting table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TagMapError {
    /// Tag lies outside `base..base + NUM_TASKS`
    OutOfRange {
        /// Offending tag
        tag: TaskTag,
        /// First valid tag
        base: TaskTag,
    },
    /// Two tasks carry the same tag
    Duplicate {
        /// Tag assigned twice
        tag: TaskTag,
    },
    /// `base + NUM_TASKS` does not fit the tag type
    BaseOverflow {
        /// Requested base
        base: TaskTag,
    },
}

impl fmt::Display for TagMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMapError::OutOfRange { tag, base } => {
                write!(f, "tag {} outside contiguous range starting at {}", tag.0, base.0)
            }
            TagMapError::Duplicate { tag } => write!(f, "tag {} assigned to more than one task", tag.0),
            TagMapError::BaseOverflow { base } => {
                write!(f, "tag base {} leaves no room for every task", base.0)
            }
        }
    }
}

/// Build-time configuration rejected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A periodic task has a zero period
    ZeroPeriod {
        /// Task name
        task: &'static str,
    },
    /// Period too long for wrap-aware deadline comparison
    PeriodTooLong {
        /// Task name
        task: &'static str,
        /// Configured period
        period: u16,
    },
    /// Task table entry not in its accounting slot
    Misplaced {
        /// Task name
        task: &'static str,
        /// Slot it was found in
        slot: usize,
    },
    /// Monitor sampling window of zero ticks
    ZeroWindow,
    /// Tag table invalid
    Tags(TagMapError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroPeriod { task } => write!(f, "task '{}' has a zero period", task),
            ConfigError::PeriodTooLong { task, period } => {
                write!(f, "task '{}' period {} exceeds half the tick range", task, period)
            }
            ConfigError::Misplaced { task, slot } => {
                write!(f, "task '{}' listed in slot {}", task, slot)
            }
            ConfigError::ZeroWindow => write!(f, "monitor window must be at least one tick"),
            ConfigError::Tags(e) => write!(f, "tag map: {}", e),
        }
    }
}

impl From<TagMapError> for ConfigError {
    fn from(e: TagMapError) -> Self {
        ConfigError::Tags(e)
    }
}
