//! Periodic task bodies
//!
//! Each body is one job's worth of work. `run_periodic` wraps a body in the
//! release loop a real task runs forever; the simulated dispatcher calls
//! the bodies directly through `Workload`.

use crate::config::HarnessConfig;
use crate::monitor::Liveness;
use crate::relay::{MessageRelay, StatusMessage};
use crate::release::{DeadlineWait, ReleaseClock};
use crate::task::TaskId;
use crate::timer::{Tick, TickSource};

/// Button 1 pressed
pub const BUTTON_ONE_HIGH: StatusMessage = StatusMessage::new("B1_HIGH");
/// Button 1 released
pub const BUTTON_ONE_LOW: StatusMessage = StatusMessage::new("B1_LOW");
/// Button 2 pressed
pub const BUTTON_TWO_HIGH: StatusMessage = StatusMessage::new("B2_HIGH");
/// Button 2 released
pub const BUTTON_TWO_LOW: StatusMessage = StatusMessage::new("B2_LOW");
/// Periodic transmitter record
pub const TRANSMITTER: StatusMessage = StatusMessage::new("TRANSMITTER");

/// Digital input sampled by a button monitor
pub trait ButtonInput {
    /// Current level, `true` = high
    fn is_high(&self) -> bool;
}

/// Input held at a fixed level
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLevel(pub bool);

impl ButtonInput for FixedLevel {
    fn is_high(&self) -> bool {
        self.0
    }
}

/// Byte-oriented output the relay consumer forwards records to
pub trait SerialOut {
    /// Write one byte
    fn put_char(&self, byte: u8);

    /// Write a run of bytes
    fn put_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.put_char(b);
        }
    }
}

/// Output that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSerial;

impl SerialOut for NullSerial {
    fn put_char(&self, _byte: u8) {}
}

/// Sample a button and report its level; returns whether the relay took it
pub fn button_monitor<B, const C: usize>(
    button: &B,
    high: StatusMessage,
    low: StatusMessage,
    relay: &MessageRelay<C>,
) -> bool
where
    B: ButtonInput + ?Sized,
{
    let msg = if button.is_high() { high } else { low };
    relay.try_send(msg)
}

/// Send the fixed transmitter record
pub fn periodic_transmitter<const C: usize>(relay: &MessageRelay<C>) -> bool {
    relay.try_send(TRANSMITTER)
}

/// Forward at most one record from the relay to `out`
///
/// Writes `\n`, the record text, `\n`. Writes nothing when the relay is empty.
pub fn uart_receiver<O, const C: usize>(relay: &MessageRelay<C>, out: &O) -> Option<StatusMessage>
where
    O: SerialOut + ?Sized,
{
    let msg = relay.try_receive()?;
    out.put_char(b'\n');
    out.put_bytes(msg.as_bytes());
    out.put_char(b'\n');
    Some(msg)
}

/// Burn a fixed number of loop iterations
pub fn load_generator(iterations: u32) -> u32 {
    let mut i = 0u32;
    while core::hint::black_box(i) < iterations {
        i += 1;
    }
    i
}

/// Release loop of one periodic task
///
/// Runs `body`, bumps the task's liveness counter, waits for the next
/// period. Never returns.
pub fn run_periodic<T, W, F>(
    task: TaskId,
    period: Tick,
    ticks: &T,
    waiter: &W,
    liveness: &Liveness,
    mut body: F,
) -> !
where
    T: TickSource,
    W: DeadlineWait,
    F: FnMut(),
{
    let mut clock = ReleaseClock::new(ticks.now());
    loop {
        body();
        liveness.beat(task);
        let release = clock.wait_for_next_period(period, ticks, waiter);
        if release.is_overrun() {
            crate::log_warn!("{} overran, released at {}", task.name(), release.deadline());
        }
    }
}

/// Collaborators of the task bodies, bundled for the dispatcher
pub struct Workload<B1, B2, O> {
    /// Button 1 input
    pub button_one: B1,
    /// Button 2 input
    pub button_two: B2,
    /// Relay consumer output
    pub serial: O,
    /// Load generator 1 iterations per job
    pub load_one_iterations: u32,
    /// Load generator 2 iterations per job
    pub load_two_iterations: u32,
}

impl<B1, B2, O> Workload<B1, B2, O>
where
    B1: ButtonInput,
    B2: ButtonInput,
    O: SerialOut,
{
    /// Collaborators with the busy-loop lengths of `config`
    pub fn new(config: &HarnessConfig, button_one: B1, button_two: B2, serial: O) -> Self {
        Self {
            button_one,
            button_two,
            serial,
            load_one_iterations: config.load_one_iterations,
            load_two_iterations: config.load_two_iterations,
        }
    }

    /// Run the body of `task` once
    pub fn run<const C: usize>(&self, task: TaskId, relay: &MessageRelay<C>) {
        match task {
            TaskId::ButtonOne => {
                button_monitor(&self.button_one, BUTTON_ONE_HIGH, BUTTON_ONE_LOW, relay);
            }
            TaskId::ButtonTwo => {
                button_monitor(&self.button_two, BUTTON_TWO_HIGH, BUTTON_TWO_LOW, relay);
            }
            TaskId::Transmitter => {
                periodic_transmitter(relay);
            }
            TaskId::UartReceiver => {
                uart_receiver(relay, &self.serial);
            }
            TaskId::LoadOne => {
                load_generator(self.load_one_iterations);
            }
            TaskId::LoadTwo => {
                load_generator(self.load_two_iterations);
            }
            TaskId::Idle => {}
        }
    }
}
