//! Mock implementations for testing without hardware.
//!
//! Every mock is a cheap handle over shared state: clone it, give one
//! clone to the component under test, and inspect or script the other.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockClock`] | [`Clock`] | Manually advanced time |
//! | [`MockTransport`] | [`Transport`] | Scripted reads, captured writes |
//! | [`MockInputBus`] | [`InputBus`] | Settable port values |
//! | [`MockOutput`] | [`OutputDriver`] | Records output levels |
//! | [`MockRelayPort`] | [`RelayPort`] | Records relay masks |
//! | [`MockTelemetry`] | [`Telemetry`] | Captures gauges and counters |
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::hal::{MockClock, MockOutput};
//! use rs_hydronic::traits::{Clock, OutputDriver};
//!
//! let clock = MockClock::new();
//! let handle = clock.clone();
//! handle.advance(500);
//! assert_eq!(clock.now_ms(), 500);
//!
//! let output = MockOutput::new();
//! let mut driver = output.clone();
//! driver.set_output(true).unwrap();
//! assert_eq!(output.current(), Some(true));
//! ```
//!
//! [`Clock`]: crate::traits::Clock
//! [`Transport`]: crate::traits::Transport
//! [`InputBus`]: crate::traits::InputBus
//! [`OutputDriver`]: crate::traits::OutputDriver
//! [`RelayPort`]: crate::relay::RelayPort
//! [`Telemetry`]: crate::traits::Telemetry

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::relay::RelayPort;
use crate::sync::lock;
use crate::traits::{Clock, InputBus, OutputDriver, Telemetry, Transport};

fn injected_failure(what: &str) -> io::Error {
    io::Error::other(format!("mock {what} failure"))
}

/// Decrement a failure budget, returning whether this call should fail.
fn take_failure(budget: &mut usize) -> bool {
    if *budget > 0 {
        *budget -= 1;
        true
    } else {
        false
    }
}

// ============================================================================
// Time
// ============================================================================

/// Mock clock for deterministic time in tests.
///
/// Clones share the same time.
///
/// # Example
///
/// ```rust
/// use rs_hydronic::hal::MockClock;
/// use rs_hydronic::traits::Clock;
///
/// let clock = MockClock::new();
/// clock.set(1000);
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Clock at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute time.
    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Default)]
struct TransportState {
    incoming: VecDeque<io::Result<Vec<u8>>>,
    written: Vec<u8>,
    max_write: Option<usize>,
    fail_writes: usize,
    blocking: bool,
    reads_waiting: usize,
    closed: bool,
}

#[derive(Debug, Default)]
struct TransportShared {
    state: Mutex<TransportState>,
    ready: Condvar,
}

/// Mock byte transport.
///
/// Reads return queued chunks in order, then `Ok(0)` when the queue is
/// empty. A [`blocking`](MockTransport::blocking) transport instead waits
/// in `read` until bytes are queued or the transport is closed, like a
/// serial port without a read timeout. Writes are appended to a capture
/// buffer.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    shared: Arc<TransportShared>,
}

impl MockTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty transport whose reads block until data arrives or `close`.
    pub fn blocking() -> Self {
        let t = Self::default();
        t.state().blocking = true;
        t
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        lock(&self.shared.state)
    }

    /// Queue bytes for a future read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state().incoming.push_back(Ok(bytes.to_vec()));
        self.shared.ready.notify_all();
    }

    /// Queue a read error.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state()
            .incoming
            .push_back(Err(io::Error::new(kind, "mock read failure")));
        self.shared.ready.notify_all();
    }

    /// Whether every queued chunk has been read.
    pub fn drained(&self) -> bool {
        self.state().incoming.is_empty()
    }

    /// Number of reads currently blocked waiting for data.
    pub fn reads_waiting(&self) -> usize {
        self.state().reads_waiting
    }

    /// Accept at most `n` bytes per write.
    pub fn set_max_write(&self, n: usize) {
        self.state().max_write = Some(n);
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().fail_writes = n;
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Everything written so far, as text.
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.state().written).into_owned()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Transport for MockTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        while state.blocking && state.incoming.is_empty() && !state.closed {
            state.reads_waiting += 1;
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.reads_waiting -= 1;
        }
        if state.closed {
            return Ok(0);
        }
        match state.incoming.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.incoming.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if take_failure(&mut state.fail_writes) {
            return Err(injected_failure("write"));
        }
        let n = state.max_write.map_or(buf.len(), |max| max.min(buf.len()));
        state.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        self.state().closed = true;
        self.shared.ready.notify_all();
        Ok(())
    }
}

// ============================================================================
// Input Bus
// ============================================================================

#[derive(Debug, Default)]
struct BusState {
    ports: BTreeMap<u8, u8>,
    reads: usize,
    fail_reads: usize,
}

/// Mock GPIO expander with settable port values.
///
/// Ports that were never set read as 0.
#[derive(Clone, Debug, Default)]
pub struct MockInputBus {
    state: Arc<Mutex<BusState>>,
}

impl MockInputBus {
    /// All ports low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a whole port.
    pub fn set_port(&self, port: u8, value: u8) {
        lock(&self.state).ports.insert(port, value);
    }

    /// Set a single bit.
    pub fn set_bit(&self, port: u8, bit: u8, high: bool) {
        let mut state = lock(&self.state);
        let value = state.ports.entry(port).or_insert(0);
        if high {
            *value |= 1 << bit;
        } else {
            *value &= !(1 << bit);
        }
    }

    /// Fail the next `n` port reads.
    pub fn fail_next_reads(&self, n: usize) {
        lock(&self.state).fail_reads = n;
    }

    /// Successful port reads so far.
    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }
}

impl InputBus for MockInputBus {
    fn read_port(&mut self, port: u8) -> io::Result<u8> {
        let mut state = lock(&self.state);
        if take_failure(&mut state.fail_reads) {
            return Err(injected_failure("bus read"));
        }
        state.reads += 1;
        Ok(state.ports.get(&port).copied().unwrap_or(0))
    }
}

// ============================================================================
// Outputs
// ============================================================================

#[derive(Debug, Default)]
struct OutputState {
    levels: Vec<bool>,
    attempts: usize,
    fail_writes: usize,
}

/// Mock on/off output.
///
/// Records every level that was written successfully.
#[derive(Clone, Debug, Default)]
pub struct MockOutput {
    state: Arc<Mutex<OutputState>>,
}

impl MockOutput {
    /// Output with no writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels written successfully, oldest first.
    pub fn levels(&self) -> Vec<bool> {
        lock(&self.state).levels.clone()
    }

    /// Last level written successfully.
    pub fn current(&self) -> Option<bool> {
        lock(&self.state).levels.last().copied()
    }

    /// Write attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: usize) {
        lock(&self.state).fail_writes = n;
    }
}

impl OutputDriver for MockOutput {
    fn set_output(&mut self, on: bool) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.attempts += 1;
        if take_failure(&mut state.fail_writes) {
            return Err(injected_failure("output"));
        }
        state.levels.push(on);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RelayState {
    writes: Vec<u32>,
    fail_writes: usize,
}

/// Mock relay port recording each mask written successfully.
#[derive(Clone, Debug, Default)]
pub struct MockRelayPort {
    state: Arc<Mutex<RelayState>>,
}

impl MockRelayPort {
    /// Port with no writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Masks written successfully, oldest first.
    pub fn writes(&self) -> Vec<u32> {
        lock(&self.state).writes.clone()
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: usize) {
        lock(&self.state).fail_writes = n;
    }
}

impl RelayPort for MockRelayPort {
    fn write_relays(&self, mask: u32) -> io::Result<()> {
        let mut state = lock(&self.state);
        if take_failure(&mut state.fail_writes) {
            return Err(injected_failure("relay"));
        }
        state.writes.push(mask);
        Ok(())
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Default)]
struct Metrics {
    gauges: BTreeMap<String, f64>,
    counters: BTreeMap<String, f64>,
}

/// Mock telemetry sink.
#[derive(Debug, Default)]
pub struct MockTelemetry {
    metrics: Mutex<Metrics>,
}

impl MockTelemetry {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value of gauge `name`.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        lock(&self.metrics).gauges.get(name).copied()
    }

    /// Accumulated value of counter `name` (0 if never incremented).
    pub fn counter(&self, name: &str) -> f64 {
        lock(&self.metrics).counters.get(name).copied().unwrap_or(0.0)
    }
}

impl Telemetry for MockTelemetry {
    fn set_gauge(&self, name: &str, value: f64) {
        lock(&self.metrics).gauges.insert(name.to_owned(), value);
    }

    fn add_counter(&self, name: &str, delta: f64) {
        *lock(&self.metrics)
            .counters
            .entry(name.to_owned())
            .or_insert(0.0) += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_splits_chunks_across_reads() {
        let t = MockTransport::new();
        t.push_bytes(b"abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn transport_returns_queued_errors() {
        let t = MockTransport::new();
        t.push_error(io::ErrorKind::BrokenPipe);
        let mut buf = [0u8; 4];
        assert_eq!(
            t.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert!(t.drained());
    }

    #[test]
    fn blocking_read_wakes_on_data_and_close() {
        let t = MockTransport::blocking();
        let reader = t.clone();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            let first = reader.read(&mut buf).unwrap();
            let second = reader.read(&mut buf).unwrap();
            (first, second)
        });

        while t.reads_waiting() == 0 {
            std::thread::yield_now();
        }
        t.push_bytes(b"ab");
        while !(t.drained() && t.reads_waiting() > 0) {
            std::thread::yield_now();
        }
        t.close().unwrap();

        assert_eq!(handle.join().unwrap(), (2, 0));
    }

    #[test]
    fn input_bus_bits_and_failures() {
        let mut bus = MockInputBus::new();
        bus.set_bit(1, 3, true);
        assert_eq!(bus.read_port(1).unwrap(), 0b1000);
        bus.fail_next_reads(1);
        assert!(bus.read_port(1).is_err());
        assert_eq!(bus.read_port(0).unwrap(), 0);
        assert_eq!(bus.reads(), 2);
    }

    #[test]
    fn output_counts_failed_attempts() {
        let mut out = MockOutput::new();
        out.fail_next_writes(1);
        assert!(out.set_output(true).is_err());
        out.set_output(true).unwrap();
        assert_eq!(out.levels(), vec![true]);
        assert_eq!(out.attempts(), 2);
    }

    #[test]
    fn telemetry_accumulates_counters() {
        let t = MockTelemetry::new();
        t.add_counter("c", 1.5);
        t.add_counter("c", 0.5);
        t.set_gauge("g", 1.0);
        assert_eq!(t.counter("c"), 2.0);
        assert_eq!(t.gauge("g"), Some(1.0));
        assert_eq!(t.counter("missing"), 0.0);
    }
}
