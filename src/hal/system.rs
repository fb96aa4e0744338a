//! Desktop and Linux implementations of the hardware traits.

use std::io::{self, Read, Write};
use std::sync::{Mutex, PoisonError};

use crate::sync::lock;
use crate::traits::{Clock, Telemetry, Transport};

/// Monotonic clock based on tokio's `Instant`.
///
/// Follows tokio's paused test clock, so `tokio::time::advance` moves it.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: tokio::time::Instant,
}

impl MonotonicClock {
    /// Clock reading zero now.
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// [`Transport`] over blocking std I/O halves (serial port, TCP stream,
/// pty).
///
/// Reads and writes lock separate halves, so a command never waits for a
/// pending read. Pass two handles to the same device, e.g. a stream and
/// its `try_clone`. Give the read half a timeout: `close` flushes the
/// write half but cannot interrupt a read already in progress.
#[derive(Debug)]
pub struct IoTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> IoTransport<R, W> {
    /// Wrap the opened halves.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the halves.
    pub fn into_inner(self) -> (R, W) {
        (
            self.reader.into_inner().unwrap_or_else(PoisonError::into_inner),
            self.writer.into_inner().unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl<R, W> Transport for IoTransport<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        lock(&self.reader).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.writer).write(buf)
    }

    fn close(&self) -> io::Result<()> {
        lock(&self.writer).flush()
    }
}

/// Telemetry sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn set_gauge(&self, _name: &str, _value: f64) {}

    fn add_counter(&self, _name: &str, _delta: f64) {}
}

/// Telemetry sink that writes to the `log` facade at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn set_gauge(&self, name: &str, value: f64) {
        log::trace!("gauge {name} = {value}");
    }

    fn add_counter(&self, name: &str, delta: f64) {
        log::trace!("counter {name} += {delta}");
    }
}

/// Output driver over an `embedded-hal` output pin.
#[cfg(feature = "embedded-hal")]
#[derive(Debug)]
pub struct PinOutput<P> {
    pin: P,
    active_low: bool,
}

#[cfg(feature = "embedded-hal")]
impl<P> PinOutput<P> {
    /// Pin driven high for on.
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    /// Pin driven low for on (common for relay boards).
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }
}

#[cfg(feature = "embedded-hal")]
impl<P> crate::traits::OutputDriver for PinOutput<P>
where
    P: embedded_hal::digital::OutputPin + Send,
{
    fn set_output(&mut self, on: bool) -> io::Result<()> {
        use embedded_hal::digital::Error as _;

        let result = if on != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|e| io::Error::other(format!("pin error: {:?}", e.kind())))
    }
}
