//! Task identity — static task set, dispatcher tags, tag → slot mapping
//!
//! The dispatcher identifies the running task by a small integer tag. Tags
//! must cover `base..base + NUM_TASKS` exactly once so that every tag lands
//! on one accounting slot. The mapping is checked once at startup.

use crate::error::TagMapError;
use crate::timer::Tick;

/// Number of tasks, idle included
pub const NUM_TASKS: usize = 7;

/// Every task in the harness, in accounting-slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    /// Samples button 1, reports `B1_HIGH` / `B1_LOW`
    ButtonOne = 0,
    /// Samples button 2, reports `B2_HIGH` / `B2_LOW`
    ButtonTwo = 1,
    /// Sends a fixed heartbeat record
    Transmitter = 2,
    /// Drains the relay onto the serial line
    UartReceiver = 3,
    /// Synthetic load, short period
    LoadOne = 4,
    /// Synthetic load, long period
    LoadTwo = 5,
    /// Runs when nothing else is ready
    Idle = 6,
}

impl TaskId {
    /// All ids, slot order
    pub const ALL: [TaskId; NUM_TASKS] = [
        TaskId::ButtonOne,
        TaskId::ButtonTwo,
        TaskId::Transmitter,
        TaskId::UartReceiver,
        TaskId::LoadOne,
        TaskId::LoadTwo,
        TaskId::Idle,
    ];

    /// Accounting slot of this task
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Id stored in a slot
    pub const fn from_index(index: usize) -> Option<TaskId> {
        if index < NUM_TASKS {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            TaskId::ButtonOne => "button_1",
            TaskId::ButtonTwo => "button_2",
            TaskId::Transmitter => "transmitter",
            TaskId::UartReceiver => "uart_rx",
            TaskId::LoadOne => "load_1",
            TaskId::LoadTwo => "load_2",
            TaskId::Idle => "idle",
        }
    }

    /// Is this the idle task?
    pub const fn is_idle(self) -> bool {
        matches!(self, TaskId::Idle)
    }
}

/// Dispatcher-side task tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskTag(pub u8);

/// Static description of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Which task
    pub id: TaskId,
    /// Release period in ticks (0 for idle)
    pub period: Tick,
    /// Ticks of processor time one job consumes in the simulated dispatcher
    pub cost: Tick,
}

impl TaskSpec {
    /// Periodic task
    pub const fn periodic(id: TaskId, period: Tick, cost: Tick) -> Self {
        Self { id, period, cost }
    }

    /// Idle task descriptor
    pub const fn idle() -> Self {
        Self {
            id: TaskId::Idle,
            period: 0,
            cost: 0,
        }
    }

    /// Released by the release controller?
    pub const fn is_periodic(&self) -> bool {
        !self.id.is_idle()
    }

    /// Nominal utilization of this task (cost / period)
    pub fn utilization(&self) -> f32 {
        if self.period == 0 {
            0.0
        } else {
            self.cost as f32 / self.period as f32
        }
    }
}

/// Validated bijection between dispatcher tags and accounting slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMap {
    base: TaskTag,
    /// Tag of each task, slot order
    tags: [TaskTag; NUM_TASKS],
    /// Task owning each `tag - base` offset
    owners: [TaskId; NUM_TASKS],
}

impl TagMap {
    /// Contiguous tags `base, base + 1, ...` in slot order
    pub fn contiguous(base: TaskTag) -> Result<Self, TagMapError> {
        if base.0 as usize + NUM_TASKS > u8::MAX as usize + 1 {
            return Err(TagMapError::BaseOverflow { base });
        }
        let mut tags = [base; NUM_TASKS];
        for (i, tag) in tags.iter_mut().enumerate() {
            *tag = TaskTag(base.0 + i as u8);
        }
        Self::new(base, tags)
    }

    /// Check an explicit tag assignment (`tags[i]` belongs to `TaskId::ALL[i]`)
    ///
    /// Fails unless the tags cover `base..base + NUM_TASKS` exactly once.
    pub fn new(base: TaskTag, tags: [TaskTag; NUM_TASKS]) -> Result<Self, TagMapError> {
        if base.0 as usize + NUM_TASKS > u8::MAX as usize + 1 {
            return Err(TagMapError::BaseOverflow { base });
        }

        let mut owners: [Option<TaskId>; NUM_TASKS] = [None; NUM_TASKS];
        for (id, &tag) in TaskId::ALL.iter().zip(tags.iter()) {
            let offset = match tag.0.checked_sub(base.0) {
                Some(o) if (o as usize) < NUM_TASKS => o as usize,
                _ => {
                    crate::log_error!("tag {} of {} out of range", tag.0, id.name());
                    return Err(TagMapError::OutOfRange { tag, base });
                }
            };
            if owners[offset].is_some() {
                crate::log_error!("tag {} assigned twice", tag.0);
                return Err(TagMapError::Duplicate { tag });
            }
            owners[offset] = Some(*id);
        }

        // N distinct in-range tags fill all N offsets
        let mut resolved = [TaskId::Idle; NUM_TASKS];
        for (slot, owner) in resolved.iter_mut().zip(owners.iter()) {
            if let Some(id) = owner {
                *slot = *id;
            }
        }

        Ok(Self {
            base,
            tags,
            owners: resolved,
        })
    }

    /// First tag of the range
    pub fn base(&self) -> TaskTag {
        self.base
    }

    /// Tag carried by a task
    pub fn tag_of(&self, id: TaskId) -> TaskTag {
        self.tags[id.index()]
    }

    /// Task carrying a tag, `None` outside the validated range
    pub fn task_of(&self, tag: TaskTag) -> Option<TaskId> {
        let offset = tag.0.checked_sub(self.base.0)? as usize;
        self.owners.get(offset).copied()
    }

    /// Task carrying a tag that the dispatcher reported
    ///
    /// # Panics
    ///
    /// Panics on a tag outside the validated range. Tags are fixed before the
    /// scheduler starts, so this is a build defect, not a runtime condition.
    #[track_caller]
    pub fn resolve(&self, tag: TaskTag) -> TaskId {
        match self.task_of(tag) {
            Some(id) => id,
            None => panic!(
                "dispatch tag {} outside {}..{}",
                tag.0,
                self.base.0,
                self.base.0 as usize + NUM_TASKS
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_slot_order() {
        for (i, id) in TaskId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(TaskId::from_index(i), Some(*id));
        }
        assert_eq!(TaskId::from_index(NUM_TASKS), None);
    }

    #[test]
    fn test_contiguous_map() {
        let map = TagMap::contiguous(TaskTag(16)).unwrap();
        assert_eq!(map.tag_of(TaskId::ButtonOne), TaskTag(16));
        assert_eq!(map.tag_of(TaskId::Idle), TaskTag(22));
        assert_eq!(map.task_of(TaskTag(18)), Some(TaskId::Transmitter));
        assert_eq!(map.task_of(TaskTag(15)), None);
        assert_eq!(map.task_of(TaskTag(23)), None);
    }

    #[test]
    fn test_permuted_tags_accepted() {
        let tags = [4, 3, 2, 1, 0, 6, 5].map(TaskTag);
        let map = TagMap::new(TaskTag(0), tags).unwrap();
        assert_eq!(map.resolve(TaskTag(0)), TaskId::LoadOne);
        assert_eq!(map.resolve(TaskTag(5)), TaskId::Idle);
        assert_eq!(map.resolve(TaskTag(6)), TaskId::LoadTwo);
    }

    #[test]
    fn test_gap_in_tags_rejected() {
        // idle on its own pin, leaving a hole in the range
        let tags = [16, 17, 18, 19, 20, 21, 25].map(TaskTag);
        assert_eq!(
            TagMap::new(TaskTag(16), tags),
            Err(TagMapError::OutOfRange { tag: TaskTag(25), base: TaskTag(16) })
        );
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let tags = [0, 1, 2, 3, 4, 4, 6].map(TaskTag);
        assert_eq!(
            TagMap::new(TaskTag(0), tags),
            Err(TagMapError::Duplicate { tag: TaskTag(4) })
        );
    }

    #[test]
    fn test_tag_below_base_rejected() {
        let tags = [9, 10, 11, 12, 13, 14, 15].map(TaskTag);
        assert!(matches!(
            TagMap::new(TaskTag(10), tags),
            Err(TagMapError::OutOfRange { tag: TaskTag(9), .. })
        ));
    }

    #[test]
    fn test_base_overflow_rejected() {
        assert_eq!(
            TagMap::contiguous(TaskTag(250)),
            Err(TagMapError::BaseOverflow { base: TaskTag(250) })
        );
        assert!(TagMap::contiguous(TaskTag(249)).is_ok());
    }

    #[test]
    #[should_panic(expected = "dispatch tag 40")]
    fn test_resolve_unknown_tag_panics() {
        let map = TagMap::contiguous(TaskTag(16)).unwrap();
        map.resolve(TaskTag(40));
    }

    #[test]
    fn test_spec_utilization() {
        let spec = TaskSpec::periodic(TaskId::LoadOne, 10, 3);
        assert!((spec.utilization() - 0.3).abs() < 1e-6);
        assert_eq!(TaskSpec::idle().utilization(), 0.0);
        assert!(!TaskSpec::idle().is_periodic());
    }
}
