//! Recording mock collaborators for host tests
//!
//! Every mock appends to a shared [`HwLog`] so a test can assert the exact
//! interleaving of rail switches, line writes, delays and command sets across
//! collaborators. Mocks are `Clone`; clones share state, so a test keeps one
//! handle while the panel owns the other.

#![cfg(any(test, feature = "std"))]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::vec::Vec;

use crate::backlight::{BacklightDevice, BacklightError};
use crate::channel::{CommandChannel, CommandSet, CommandSetKind, LinkMode, ReadBuf, TransportError};
use crate::gpio::{GpioBank, GpioError, GpioLine, PinctrlState};
use crate::power::{PowerError, PowerRails, RailId};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Event log ───────────────────────────────────────────────────────────────

/// One observable hardware interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwEvent {
    /// Command set sent.
    Send(CommandSetKind),
    /// Command set sent with a read-back.
    Read(CommandSetKind),
    /// Bus-turn-around issued.
    BusTurnaround,
    /// Tearing-effect wait issued.
    WaitTe,
    /// Link selected.
    Link(LinkMode),
    /// Rail enabled.
    RailOn(RailId),
    /// Rail disabled.
    RailOff(RailId),
    /// Control line driven.
    Gpio(GpioLine, bool),
    /// Pin-control state selected.
    Pinctrl(PinctrlState),
    /// Backlight device level.
    Backlight(u32),
    /// Delay, in milliseconds.
    Delay(u32),
}

/// Shared, ordered log of [`HwEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct HwLog(Arc<Mutex<Vec<HwEvent>>>);

impl HwLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&self, event: HwEvent) {
        lock(&self.0).push(event);
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<HwEvent> {
        lock(&self.0).clone()
    }

    /// Events other than delays.
    pub fn without_delays(&self) -> Vec<HwEvent> {
        lock(&self.0)
            .iter()
            .copied()
            .filter(|e| !matches!(e, HwEvent::Delay(_)))
            .collect()
    }

    /// Command sets sent, in order (reads included).
    pub fn sent_sets(&self) -> Vec<CommandSetKind> {
        lock(&self.0)
            .iter()
            .filter_map(|e| match e {
                HwEvent::Send(k) | HwEvent::Read(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    /// Number of times `event` was logged.
    pub fn count(&self, event: HwEvent) -> usize {
        lock(&self.0).iter().filter(|e| **e == event).count()
    }

    /// Forget everything logged so far.
    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

// ── Command channel ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChannelState {
    fail_sets: Vec<CommandSetKind>,
    reads: VecDeque<Result<ReadBuf, TransportError>>,
    default_read: Option<ReadBuf>,
    bta: Option<Result<(), TransportError>>,
    te: Option<Result<(), TransportError>>,
    link: LinkMode,
    payloads: Vec<(CommandSetKind, Vec<u8>)>,
}

/// Mock [`CommandChannel`].
#[derive(Debug, Clone)]
pub struct MockChannel {
    log: HwLog,
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    /// Create a channel that accepts every set and answers reads with zeros.
    pub fn new(log: HwLog) -> Self {
        Self {
            log,
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    /// Fail every send of `kind` from now on.
    pub fn fail_on(&self, kind: CommandSetKind) {
        lock(&self.state).fail_sets.push(kind);
    }

    /// Stop failing sends.
    pub fn clear_failures(&self) {
        lock(&self.state).fail_sets.clear();
    }

    /// Queue one read response.
    pub fn push_read(&self, response: Result<&[u8], TransportError>) {
        let entry = response.map(|bytes| ReadBuf::from_slice(bytes).unwrap_or_default());
        lock(&self.state).reads.push_back(entry);
    }

    /// Response returned once the queue is empty.
    pub fn set_default_read(&self, bytes: &[u8]) {
        lock(&self.state).default_read = ReadBuf::from_slice(bytes).ok();
    }

    /// Outcome of every bus-turn-around.
    pub fn set_bta(&self, result: Result<(), TransportError>) {
        lock(&self.state).bta = Some(result);
    }

    /// Outcome of every tearing-effect wait.
    pub fn set_te(&self, result: Result<(), TransportError>) {
        lock(&self.state).te = Some(result);
    }

    /// Currently selected link.
    pub fn link(&self) -> LinkMode {
        lock(&self.state).link
    }

    /// Payload bytes of every command sent, tagged with its set.
    pub fn payloads(&self) -> Vec<(CommandSetKind, Vec<u8>)> {
        lock(&self.state).payloads.clone()
    }

    fn transmit(&self, set: &CommandSet) -> Result<(), TransportError> {
        let mut st = lock(&self.state);
        if st.fail_sets.contains(&set.kind) {
            return Err(TransportError::Communication);
        }
        for cmd in &set.commands {
            st.payloads.push((set.kind, cmd.payload.to_vec()));
        }
        Ok(())
    }
}

impl CommandChannel for MockChannel {
    async fn send(&mut self, set: &CommandSet) -> Result<(), TransportError> {
        self.log.push(HwEvent::Send(set.kind));
        self.transmit(set)
    }

    async fn send_and_read(
        &mut self,
        set: &CommandSet,
        len: usize,
    ) -> Result<ReadBuf, TransportError> {
        self.log.push(HwEvent::Read(set.kind));
        self.transmit(set)?;
        let mut st = lock(&self.state);
        let response = match st.reads.pop_front() {
            Some(r) => r?,
            None => st.default_read.clone().unwrap_or_default(),
        };
        if response.len() < len {
            let mut padded = response;
            while padded.len() < len {
                padded.push(0).map_err(|_| TransportError::ShortRead)?;
            }
            return Ok(padded);
        }
        Ok(response)
    }

    async fn bus_turnaround(&mut self) -> Result<(), TransportError> {
        self.log.push(HwEvent::BusTurnaround);
        lock(&self.state).bta.unwrap_or(Ok(()))
    }

    async fn wait_te(&mut self, _timeout_ms: u32) -> Result<(), TransportError> {
        self.log.push(HwEvent::WaitTe);
        lock(&self.state).te.unwrap_or(Ok(()))
    }

    async fn select_link(&mut self, link: LinkMode) -> Result<LinkMode, TransportError> {
        self.log.push(HwEvent::Link(link));
        let mut st = lock(&self.state);
        let previous = st.link;
        st.link = link;
        Ok(previous)
    }
}

// ── Power rails ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PowerState {
    fail_enable: Vec<RailId>,
    fail_disable: Vec<RailId>,
    on: Vec<RailId>,
}

/// Mock [`PowerRails`].
#[derive(Debug, Clone)]
pub struct MockPower {
    log: HwLog,
    state: Arc<Mutex<PowerState>>,
}

impl MockPower {
    /// Create rails that switch successfully.
    pub fn new(log: HwLog) -> Self {
        Self {
            log,
            state: Arc::new(Mutex::new(PowerState::default())),
        }
    }

    /// Make enabling `rail` fail.
    pub fn fail_enable(&self, rail: RailId) {
        lock(&self.state).fail_enable.push(rail);
    }

    /// Make disabling `rail` fail.
    pub fn fail_disable(&self, rail: RailId) {
        lock(&self.state).fail_disable.push(rail);
    }

    /// Rails currently on.
    pub fn enabled(&self) -> Vec<RailId> {
        lock(&self.state).on.clone()
    }
}

impl PowerRails for MockPower {
    async fn enable(&mut self, rail: RailId) -> Result<(), PowerError> {
        let mut st = lock(&self.state);
        if st.fail_enable.contains(&rail) {
            return Err(PowerError::Regulator(rail));
        }
        self.log.push(HwEvent::RailOn(rail));
        if !st.on.contains(&rail) {
            st.on.push(rail);
        }
        Ok(())
    }

    async fn disable(&mut self, rail: RailId) -> Result<(), PowerError> {
        let mut st = lock(&self.state);
        if st.fail_disable.contains(&rail) {
            return Err(PowerError::Regulator(rail));
        }
        self.log.push(HwEvent::RailOff(rail));
        st.on.retain(|r| *r != rail);
        Ok(())
    }
}

// ── GPIO ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct GpioState {
    writes: usize,
    fail_at: Option<usize>,
    levels: Vec<(GpioLine, bool)>,
}

/// Mock [`GpioBank`].
#[derive(Debug, Clone)]
pub struct MockGpio {
    log: HwLog,
    state: Arc<Mutex<GpioState>>,
}

impl MockGpio {
    /// Create a bank where every line can be driven.
    pub fn new(log: HwLog) -> Self {
        Self {
            log,
            state: Arc::new(Mutex::new(GpioState::default())),
        }
    }

    /// Fail the `n`th line write from now (zero-based).
    pub fn fail_write(&self, n: usize) {
        let mut st = lock(&self.state);
        st.fail_at = Some(st.writes.saturating_add(n));
    }

    /// Last level driven on `line`.
    pub fn level(&self, line: GpioLine) -> Option<bool> {
        lock(&self.state)
            .levels
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, v)| *v)
    }
}

impl GpioBank for MockGpio {
    fn set_level(&mut self, line: GpioLine, high: bool) -> Result<(), GpioError> {
        let mut st = lock(&self.state);
        let index = st.writes;
        st.writes = st.writes.saturating_add(1);
        if st.fail_at == Some(index) {
            return Err(GpioError::Write(line));
        }
        self.log.push(HwEvent::Gpio(line, high));
        match st.levels.iter_mut().find(|(l, _)| *l == line) {
            Some(entry) => entry.1 = high,
            None => st.levels.push((line, high)),
        }
        Ok(())
    }

    fn select_pinctrl(&mut self, state: PinctrlState) -> Result<(), GpioError> {
        self.log.push(HwEvent::Pinctrl(state));
        Ok(())
    }
}

// ── Backlight ───────────────────────────────────────────────────────────────

/// Mock [`BacklightDevice`].
#[derive(Debug, Clone)]
pub struct MockBacklight {
    log: HwLog,
    level: Arc<Mutex<Option<u32>>>,
}

impl MockBacklight {
    /// Create a device with no level written.
    pub fn new(log: HwLog) -> Self {
        Self {
            log,
            level: Arc::new(Mutex::new(None)),
        }
    }

    /// Last level written.
    pub fn level(&self) -> Option<u32> {
        *lock(&self.level)
    }
}

impl BacklightDevice for MockBacklight {
    async fn set_level(&mut self, level: u32, _max: u32) -> Result<(), BacklightError> {
        self.log.push(HwEvent::Backlight(level));
        *lock(&self.level) = Some(level);
        Ok(())
    }
}

// ── Delay ───────────────────────────────────────────────────────────────────

/// Mock `DelayNs` that logs the requested duration and yields once.
#[derive(Debug, Clone)]
pub struct MockDelay {
    log: HwLog,
}

impl MockDelay {
    /// Create a delay that logs to `log`.
    pub fn new(log: HwLog) -> Self {
        Self { log }
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.log.push(HwEvent::Delay(ns / 1_000_000));
        embassy_futures::yield_now().await;
    }

    async fn delay_us(&mut self, us: u32) {
        self.log.push(HwEvent::Delay(us / 1_000));
        embassy_futures::yield_now().await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.log.push(HwEvent::Delay(ms));
        embassy_futures::yield_now().await;
    }
}

/// One log plus every mock wired to it.
#[derive(Debug, Clone)]
pub struct MockHardware {
    /// Shared event log.
    pub log: HwLog,
    /// Command channel.
    pub channel: MockChannel,
    /// Power rails.
    pub power: MockPower,
    /// Control lines.
    pub gpio: MockGpio,
    /// Backlight device.
    pub backlight: MockBacklight,
    /// Delay provider.
    pub delay: MockDelay,
}

impl MockHardware {
    /// Create a full set of mocks sharing one log.
    pub fn new() -> Self {
        let log = HwLog::new();
        Self {
            channel: MockChannel::new(log.clone()),
            power: MockPower::new(log.clone()),
            gpio: MockGpio::new(log.clone()),
            backlight: MockBacklight::new(log.clone()),
            delay: MockDelay::new(log.clone()),
            log,
        }
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}
