//! Crate-wide error type.
//!
//! Every fallible operation returns [`Error`]. Variants fall in three groups:
//!
//! | Group | Variants | Caller reaction |
//! |-------|----------|-----------------|
//! | Decoding | [`MalformedFrame`](Error::MalformedFrame) | Drop the frame, keep reading |
//! | Construction | [`SampleRateTooFast`](Error::SampleRateTooFast), [`InvalidParameter`](Error::InvalidParameter), [`InvalidUnit`](Error::InvalidUnit) | Refuse to start |
//! | Lifecycle / I/O | [`AlreadyStarted`](Error::AlreadyStarted), [`AlreadyOpen`](Error::AlreadyOpen), [`NotOpen`](Error::NotOpen), [`Io`](Error::Io), [`Output`](Error::Output), [`Runtime`](Error::Runtime) | Fails that call only |

use core::fmt;
use std::io;

/// Errors produced by decoders, samplers, actuators, and meters.
#[derive(Debug)]
pub enum Error {
    /// A frame could not be parsed. Discard it and continue reading.
    MalformedFrame(&'static str),
    /// Requested input sampling rate exceeds what the bus can sustain.
    SampleRateTooFast {
        /// Configured rate in Hz.
        requested_hz: u32,
        /// Highest accepted rate in Hz.
        max_hz: u32,
    },
    /// `start` called on a component that is already running.
    AlreadyStarted,
    /// `open` called on a board that already owns a transport.
    AlreadyOpen,
    /// Operation needs an open board.
    NotOpen,
    /// A configuration value failed validation.
    InvalidParameter(&'static str),
    /// A quantity string had an unknown or malformed unit.
    InvalidUnit(String),
    /// Transport or bus I/O failed.
    Io(io::Error),
    /// Writing a physical output failed. Logical state was still recorded.
    Output(io::Error),
    /// No tokio runtime was available, or a background task died.
    Runtime(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFrame(why) => write!(f, "malformed frame: {why}"),
            Self::SampleRateTooFast {
                requested_hz,
                max_hz,
            } => write!(
                f,
                "sample rate too fast: {requested_hz} Hz exceeds {max_hz} Hz"
            ),
            Self::AlreadyStarted => write!(f, "already started"),
            Self::AlreadyOpen => write!(f, "already open"),
            Self::NotOpen => write!(f, "not open"),
            Self::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
            Self::InvalidUnit(msg) => write!(f, "invalid unit: {msg}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Output(e) => write!(f, "output write failed: {e}"),
            Self::Runtime(msg) => write!(f, "runtime: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_sample_rate() {
        let e = Error::SampleRateTooFast {
            requested_hz: 1_000_000,
            max_hz: 10_000,
        };
        let s = e.to_string();
        assert!(s.contains("1000000"));
        assert!(s.contains("10000"));
    }

    #[test]
    fn io_converts_and_exposes_source() {
        let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(e, Error::Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn output_error_has_source() {
        let e = Error::Output(io::Error::other("nack"));
        assert!(e.to_string().contains("nack"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn is_std_error() {
        let e = Error::AlreadyOpen;
        let _: &dyn std::error::Error = &e;
        assert_eq!(e.to_string(), "already open");
    }
}
