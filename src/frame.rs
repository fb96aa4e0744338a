//! Status frame decoding for the I/O board serial link.
//!
//! The board firmware streams one status frame per line in one of two
//! shapes, selected by [`WireFormat`]:
//!
//! - **Hex** – a fixed `HH|HH|HH\n` line: serial number byte, input
//!   bitmask, relay bitmask.
//! - **Json** – a newline-terminated status object (requires the `json`
//!   feature).
//!
//! Both readers are fed one byte at a time, so a decoder attached
//! mid-stream or after a board reset recovers on the next terminator.
//! Partial hex lines are dropped silently; a line that is complete but
//! wrong yields [`Error::MalformedFrame`] and decoding carries on.
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::frame::{FrameDecoder, WireFormat};
//!
//! // A stray terminator after a partial frame, then a complete one.
//! let bytes = b"A|0\n0A|05|03\n";
//! let frames: Vec<_> = FrameDecoder::from_bytes(&bytes[..], WireFormat::Hex)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].serial(), "0A");
//! assert_eq!(frames[0].relay_state(), 0x03);
//! assert!(frames[0].input_high(0));
//! assert!(!frames[0].input_high(1));
//! assert!(frames[0].input_high(2));
//! ```

use std::collections::BTreeMap;
use std::io;

use heapless::Vec as HVec;

use crate::error::{Error, Result};

/// Characters in a complete hex frame, excluding the terminator.
pub const HEX_FRAME_LEN: usize = 8;

/// Hex digits in each frame field.
pub const HEX_FIELD_LEN: usize = 2;

/// Input channels carried by a hex frame.
pub const HEX_CHANNELS: u8 = 8;

/// Longest JSON status line accepted.
pub const MAX_JSON_LINE: usize = 4096;

const TERMINATOR: u8 = b'\n';
const SEPARATOR: u8 = b'|';

// ============================================================================
// Frame Types
// ============================================================================

/// Status frame wire shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WireFormat {
    /// Newline-terminated JSON status objects
    #[cfg(feature = "json")]
    Json,
    /// Fixed `HH|HH|HH` lines
    #[default]
    Hex,
}

/// Level of one board input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLevel {
    /// Digital input
    Bool(bool),
    /// Firmware-reported numeric state
    Int(i64),
}

impl InputLevel {
    /// Whether the input reads as active. Non-zero integers are active.
    pub fn is_high(self) -> bool {
        match self {
            InputLevel::Bool(b) => b,
            InputLevel::Int(n) => n != 0,
        }
    }
}

/// One input channel in a status frame.
#[derive(Clone, Debug, PartialEq)]
pub struct InputStatus {
    /// Current level
    pub level: InputLevel,
    /// Pulses counted by the firmware since boot
    pub pulse_count: Option<u64>,
    /// Firmware timestamp of the last pulse
    pub last_pulse_time: Option<f64>,
}

impl InputStatus {
    /// Status with only a level and no counters.
    pub fn from_level(level: InputLevel) -> Self {
        Self {
            level,
            pulse_count: None,
            last_pulse_time: None,
        }
    }
}

/// A decoded board status snapshot.
///
/// Frames are immutable; rule logic keeps the previous one and calls
/// [`StatusFrame::changed_inputs`] to find edges.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusFrame {
    serial: String,
    relay_state: u32,
    inputs: BTreeMap<u8, InputStatus>,
    firmware_version: Option<String>,
    up_time: Option<u64>,
}

impl StatusFrame {
    /// Build a frame from bitmasks, one boolean channel per input bit.
    pub fn from_bitmasks(serial: impl Into<String>, inputs: u8, relay_state: u32) -> Self {
        let inputs = (0..HEX_CHANNELS)
            .map(|bit| {
                let level = InputLevel::Bool(inputs & (1 << bit) != 0);
                (bit, InputStatus::from_level(level))
            })
            .collect();

        Self {
            serial: serial.into(),
            relay_state,
            inputs,
            firmware_version: None,
            up_time: None,
        }
    }

    /// Board serial number or identifier.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Relay bitmask as reported by the board.
    pub fn relay_state(&self) -> u32 {
        self.relay_state
    }

    /// All reported inputs keyed by channel.
    pub fn inputs(&self) -> &BTreeMap<u8, InputStatus> {
        &self.inputs
    }

    /// Status of one input channel.
    pub fn input(&self, channel: u8) -> Option<&InputStatus> {
        self.inputs.get(&channel)
    }

    /// Whether `channel` is present and active.
    pub fn input_high(&self, channel: u8) -> bool {
        self.input(channel).is_some_and(|s| s.level.is_high())
    }

    /// Firmware version, if the wire format carries one.
    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    /// Board uptime, if the wire format carries one.
    pub fn up_time(&self) -> Option<u64> {
        self.up_time
    }

    /// Channels whose active state differs from `previous`.
    ///
    /// A channel present in only one of the frames counts as changed when
    /// it is active.
    pub fn changed_inputs(&self, previous: &StatusFrame) -> Vec<u8> {
        let mut channels: Vec<u8> = self
            .inputs
            .keys()
            .chain(previous.inputs.keys())
            .copied()
            .collect();
        channels.sort_unstable();
        channels.dedup();
        channels.retain(|c| self.input_high(*c) != previous.input_high(*c));
        channels
    }
}

/// Encode the command that sets the board's relays to `mask`.
pub fn encode_relay_command(mask: u32) -> String {
    format!("s {mask}\n")
}

// ============================================================================
// Hex Reader
// ============================================================================

/// Where the hex reader is within the current line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Collecting field `n` (0, 1, or 2)
    AwaitingField(u8),
    /// More than a frame's worth of characters before a terminator
    Overflowed,
}

/// Byte-at-a-time reader for `HH|HH|HH` frames.
#[derive(Debug)]
pub struct HexFrameReader {
    buf: HVec<u8, HEX_FRAME_LEN>,
    state: ScanState,
}

impl Default for HexFrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl HexFrameReader {
    /// Reader waiting for the first field.
    pub fn new() -> Self {
        Self {
            buf: HVec::new(),
            state: ScanState::AwaitingField(0),
        }
    }

    /// Current scan state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed one byte.
    ///
    /// Returns `None` while a line is in progress or after a partial line
    /// was discarded, `Some(Ok(frame))` for a good line, and
    /// `Some(Err(MalformedFrame))` for a complete line that is wrong.
    pub fn push(&mut self, byte: u8) -> Option<Result<StatusFrame>> {
        if byte == TERMINATOR {
            return self.finish_line();
        }

        match self.state {
            ScanState::Overflowed => None,
            ScanState::AwaitingField(n) => {
                if self.buf.push(byte).is_err() {
                    self.state = ScanState::Overflowed;
                } else if byte == SEPARATOR {
                    self.state = ScanState::AwaitingField(n.saturating_add(1));
                }
                None
            }
        }
    }

    fn finish_line(&mut self) -> Option<Result<StatusFrame>> {
        let state = core::mem::replace(&mut self.state, ScanState::AwaitingField(0));
        let result = match state {
            ScanState::Overflowed => Some(Err(Error::MalformedFrame("hex frame too long"))),
            ScanState::AwaitingField(n) if n < 2 || !last_field_complete(&self.buf) => {
                log::debug!("discarding partial frame ({} bytes)", self.buf.len());
                None
            }
            ScanState::AwaitingField(_) => Some(parse_hex_line(&self.buf)),
        };
        self.buf.clear();
        result
    }
}

/// Whether the field after the last separator holds its full digits.
/// Until it does, a terminator only means the frame was cut short.
fn last_field_complete(line: &[u8]) -> bool {
    line.iter()
        .rposition(|b| *b == SEPARATOR)
        .is_some_and(|i| line.len() - i - 1 >= HEX_FIELD_LEN)
}

fn parse_hex_line(line: &[u8]) -> Result<StatusFrame> {
    if line.len() != HEX_FRAME_LEN || line[2] != SEPARATOR || line[5] != SEPARATOR {
        return Err(Error::MalformedFrame("expected HH|HH|HH"));
    }
    let serial = hex_byte(&line[0..2])?;
    let inputs = hex_byte(&line[3..5])?;
    let relays = hex_byte(&line[6..8])?;
    Ok(StatusFrame::from_bitmasks(
        format!("{serial:02X}"),
        inputs,
        u32::from(relays),
    ))
}

fn hex_byte(pair: &[u8]) -> Result<u8> {
    let digit = |b: u8| -> Result<u8> {
        (b as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or(Error::MalformedFrame("invalid hex digit"))
    };
    Ok(digit(pair[0])? << 4 | digit(pair[1])?)
}

// ============================================================================
// JSON Reader
// ============================================================================

#[cfg(feature = "json")]
mod wire {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum WireLevel {
        Bool(bool),
        Int(i64),
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct WireInput {
        #[serde(alias = "State")]
        pub state: WireLevel,
        #[serde(default, alias = "PulseCount")]
        pub pulse_count: Option<u64>,
        #[serde(default, alias = "LastPulseTime")]
        pub last_pulse_time: Option<f64>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct WireStatus {
        #[serde(alias = "SerialNumber")]
        pub serial_number: String,
        #[serde(default, alias = "FirmwareVersion")]
        pub firmware_version: Option<String>,
        #[serde(default, alias = "UpTime")]
        pub up_time: Option<u64>,
        #[serde(alias = "RelayState")]
        pub relay_state: u32,
        #[serde(default, alias = "Inputs")]
        pub inputs: BTreeMap<String, WireInput>,
    }
}

/// Line reader for JSON status objects.
#[cfg(feature = "json")]
#[derive(Debug, Default)]
pub struct JsonLineReader {
    line: Vec<u8>,
    overflowed: bool,
}

#[cfg(feature = "json")]
impl JsonLineReader {
    /// Empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Empty lines are skipped.
    pub fn push(&mut self, byte: u8) -> Option<Result<StatusFrame>> {
        if byte != TERMINATOR {
            if self.line.len() >= MAX_JSON_LINE {
                self.overflowed = true;
            } else {
                self.line.push(byte);
            }
            return None;
        }

        let overflowed = core::mem::take(&mut self.overflowed);
        let line = core::mem::take(&mut self.line);
        if overflowed {
            return Some(Err(Error::MalformedFrame("status line too long")));
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(parse_json_line(&line))
    }
}

#[cfg(feature = "json")]
fn parse_json_line(line: &[u8]) -> Result<StatusFrame> {
    let status: wire::WireStatus = serde_json::from_slice(line).map_err(|e| {
        log::debug!("bad status object: {e}");
        Error::MalformedFrame("invalid status object")
    })?;

    let mut inputs = BTreeMap::new();
    for (key, input) in status.inputs {
        let channel: u8 = key
            .trim()
            .parse()
            .map_err(|_| Error::MalformedFrame("input id is not a channel number"))?;
        let level = match input.state {
            wire::WireLevel::Bool(b) => InputLevel::Bool(b),
            wire::WireLevel::Int(n) => InputLevel::Int(n),
        };
        inputs.insert(
            channel,
            InputStatus {
                level,
                pulse_count: input.pulse_count,
                last_pulse_time: input.last_pulse_time,
            },
        );
    }

    Ok(StatusFrame {
        serial: status.serial_number,
        relay_state: status.relay_state,
        inputs,
        firmware_version: status.firmware_version,
        up_time: status.up_time,
    })
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Debug)]
enum LineReader {
    Hex(HexFrameReader),
    #[cfg(feature = "json")]
    Json(JsonLineReader),
}

/// Format-agnostic, push-style frame decoder.
///
/// Used directly by callers that receive bytes in chunks (the board
/// reader); [`FrameDecoder`] wraps it for pull-style iteration.
#[derive(Debug)]
pub struct FrameParser {
    reader: LineReader,
}

impl FrameParser {
    /// Parser for `format`.
    pub fn new(format: WireFormat) -> Self {
        let reader = match format {
            WireFormat::Hex => LineReader::Hex(HexFrameReader::new()),
            #[cfg(feature = "json")]
            WireFormat::Json => LineReader::Json(JsonLineReader::new()),
        };
        Self { reader }
    }

    /// Feed one byte; see [`HexFrameReader::push`].
    pub fn push(&mut self, byte: u8) -> Option<Result<StatusFrame>> {
        match &mut self.reader {
            LineReader::Hex(r) => r.push(byte),
            #[cfg(feature = "json")]
            LineReader::Json(r) => r.push(byte),
        }
    }
}

/// Lazy frame iterator over a byte source.
///
/// Yields `Err` for malformed lines and transport errors, then keeps going
/// with the following bytes. Ends when the byte source ends.
pub struct FrameDecoder<I> {
    bytes: I,
    parser: FrameParser,
}

impl<I> FrameDecoder<I>
where
    I: Iterator<Item = io::Result<u8>>,
{
    /// Decoder over a fallible byte iterator, e.g. `reader.bytes()`.
    pub fn new(bytes: I, format: WireFormat) -> Self {
        Self {
            bytes,
            parser: FrameParser::new(format),
        }
    }
}

impl<'a> FrameDecoder<core::iter::Map<core::slice::Iter<'a, u8>, fn(&u8) -> io::Result<u8>>> {
    /// Decoder over an in-memory buffer.
    pub fn from_bytes(bytes: &'a [u8], format: WireFormat) -> Self {
        let ok: fn(&u8) -> io::Result<u8> = |b| Ok(*b);
        FrameDecoder::new(bytes.iter().map(ok), format)
    }
}

impl<I> Iterator for FrameDecoder<I>
where
    I: Iterator<Item = io::Result<u8>>,
{
    type Item = Result<StatusFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.bytes.next()? {
                Ok(byte) => {
                    if let Some(item) = self.parser.push(byte) {
                        return Some(item);
                    }
                }
                Err(e) => return Some(Err(Error::Io(e))),
            }
        }
    }
}
