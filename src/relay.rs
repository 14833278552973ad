//! Message relay — bounded status queue from many producers to one consumer
//!
//! Fixed capacity, value semantics: records are copied in and copied out.
//! Neither side ever waits. A send into a full relay fails immediately and
//! the record is dropped; the drop is counted, never retried.
//!
//! Enqueue/dequeue run inside a short critical section, so concurrent
//! producers are serialized in whatever order they enter it.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;

/// Longest status text
pub const STATUS_TEXT_LEN: usize = 11;

/// Record size: text plus NUL terminator
pub const STATUS_RECORD_LEN: usize = STATUS_TEXT_LEN + 1;

/// Fixed-size, NUL-terminated status record
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusMessage {
    bytes: [u8; STATUS_RECORD_LEN],
}

impl StatusMessage {
    /// Record holding `text`, truncated to `STATUS_TEXT_LEN` bytes
    pub const fn new(text: &str) -> Self {
        let src = text.as_bytes();
        let mut bytes = [0u8; STATUS_RECORD_LEN];
        let mut i = 0;
        while i < src.len() && i < STATUS_TEXT_LEN {
            bytes[i] = src[i];
            i += 1;
        }
        Self { bytes }
    }

    /// Text bytes, up to the terminator
    pub fn as_bytes(&self) -> &[u8] {
        let len = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(STATUS_TEXT_LEN);
        &self.bytes[..len]
    }

    /// Text as `&str`; a multi-byte character cut by truncation is dropped
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Full fixed-width record, terminator included
    pub fn as_record(&self) -> &[u8; STATUS_RECORD_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusMessage({:?})", self.as_str())
    }
}

struct RelayState<const C: usize> {
    queue: Deque<StatusMessage, C>,
    sent: u32,
    dropped: u32,
}

/// Bounded MPSC relay of `StatusMessage`s
pub struct MessageRelay<const C: usize> {
    state: Mutex<RefCell<RelayState<C>>>,
}

impl<const C: usize> MessageRelay<C> {
    /// Empty relay
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(RelayState {
                queue: Deque::new(),
                sent: 0,
                dropped: 0,
            })),
        }
    }

    /// Enqueue a copy of `msg`
    ///
    /// Returns false, and drops the record, if the relay is full.
    #[must_use]
    pub fn try_send(&self, msg: StatusMessage) -> bool {
        let accepted = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            match state.queue.push_back(msg) {
                Ok(()) => {
                    state.sent = state.sent.wrapping_add(1);
                    true
                }
                Err(_) => {
                    state.dropped = state.dropped.wrapping_add(1);
                    false
                }
            }
        });
        if !accepted {
            crate::log_debug!("relay full, dropped {}", msg.as_str());
        }
        accepted
    }

    /// Dequeue the oldest record, `None` if empty
    pub fn try_receive(&self) -> Option<StatusMessage> {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).queue.pop_front())
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).queue.len())
    }

    /// Nothing queued?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every slot occupied?
    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).queue.is_full())
    }

    /// Slot count
    pub const fn capacity(&self) -> usize {
        C
    }

    /// Records accepted so far
    pub fn sent(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).sent)
    }

    /// Records dropped on a full relay so far
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).dropped)
    }
}

impl<const C: usize> Default for MessageRelay<C> {
    fn default() -> Self {
        Self::new()
    }
}
