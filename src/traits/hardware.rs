//! Hardware abstraction traits for time, transports, input buses, and outputs.
//!
//! These are the seams between the controller core and the physical board.
//! The core never opens devices itself: a collaborator hands it an
//! already-configured handle (baud rate, parity, and bus address are set).
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Clock`] | Monotonic millisecond time source |
//! | [`Transport`] | Byte-oriented duplex channel (UART, 1-Wire adapter) |
//! | [`InputBus`] | Port-at-a-time reads from a GPIO expander |
//! | [`OutputDriver`] | Drives one physical on/off output (relay, pin) |
//!
//! # Implementation
//!
//! Desktop and test implementations live in [`crate::hal`]. For tests, use
//! the mocks from [`crate::hal::mock`].
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::traits::{Clock, OutputDriver};
//! use rs_hydronic::hal::MockClock;
//!
//! let clock = MockClock::new();
//! clock.advance(250);
//! assert_eq!(clock.now_ms(), 250);
//!
//! // Any `FnMut(bool) -> io::Result<()>` closure is an output driver.
//! let mut last = None;
//! let mut relay = |on: bool| -> std::io::Result<()> {
//!     last = Some(on);
//!     Ok(())
//! };
//! relay.set_output(true).unwrap();
//! assert_eq!(last, Some(true));
//! ```

use std::io;
use std::sync::Arc;

/// Time source trait.
///
/// Provides monotonic time in milliseconds since an arbitrary epoch. All
/// deadlines inside a component are expressed against the component's clock.
///
/// # Example
///
/// ```rust
/// use rs_hydronic::traits::Clock;
/// use rs_hydronic::hal::MockClock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Byte-oriented duplex channel to a controller board.
///
/// The board reader calls `read` on its own thread while commands are
/// written from others, so implementations keep independent read and
/// write halves. `close` must make a pending `read` return.
///
/// A `read` should also return `Ok(0)` (or a `TimedOut`/`WouldBlock`
/// error) when no data arrives for a while.
pub trait Transport: Send + Sync {
    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing was available.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `buf`, returning how many bytes were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Release the underlying device.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// GPIO expander input bus.
///
/// An expander exposes its inputs as 8-bit ports; one call is one bus
/// transaction. The input sampler calls it from its poll task, inside
/// `block_in_place` on a multi-thread runtime. On a current-thread runtime
/// a read blocks every other task, so keep it to one short transaction.
pub trait InputBus: Send {
    /// Read the current level of all 8 lines on `port`.
    fn read_port(&mut self, port: u8) -> io::Result<u8>;
}

/// A single physical on/off output.
///
/// This is the only coupling between an actuator and its hardware.
/// Implemented for plain closures so a collaborator can wire any pin
/// driver without a wrapper type.
pub trait OutputDriver: Send {
    /// Drive the output on (`true`) or off (`false`).
    fn set_output(&mut self, on: bool) -> io::Result<()>;
}

impl<F> OutputDriver for F
where
    F: FnMut(bool) -> io::Result<()> + Send,
{
    #[inline]
    fn set_output(&mut self, on: bool) -> io::Result<()> {
        self(on)
    }
}
