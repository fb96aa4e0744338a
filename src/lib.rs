//! # rs-hydronic
//!
//! The timing and I/O core of a residential heating and hot-water
//! controller: timed pump/fan outputs, debounced expander inputs, board
//! status decoding, and pulse flow metering.
//!
//! ## Features
//!
//! - **Timed actuators**: on-until deadlines, merged demand claims, and an
//!   enforced minimum off time (blackout) after every turn-off
//! - **Debounced inputs**: fixed-rate sampling of GPIO expander lines with a
//!   per-input ignore window
//! - **Frame decoding**: resynchronizing readers for the board's hex and
//!   JSON status lines
//! - **Flow metering**: running totals and trailing-window flow rates from
//!   meter pulses
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Clock, transport, input bus, output, and telemetry seams
//! - `onoff` / `actuator` - Pure on/off state machine and its tokio task wrapper
//! - `debounce` - Debounce filter and the input sampler
//! - `frame` / `board` - Status frame decoding and the serial board
//! - `flow` - Pulse flow meter
//! - `relay` - Relay wiring and per-relay output drivers
//! - `hal` - Concrete implementations (system and mock)
//!
//! The four core components do not depend on each other; application logic
//! wires them together.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use rs_hydronic::{
//!     ActuatorConfig, FrameDecoder, TimedActuator, WireFormat,
//!     hal::{MockOutput, MonotonicClock},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rs_hydronic::Result<()> {
//! let output = MockOutput::new();
//! let pump = TimedActuator::spawn(
//!     ActuatorConfig::new("recirc_pump", Duration::from_secs(120)),
//!     output.clone(),
//!     MonotonicClock::new(),
//! )?;
//!
//! // Run the pump while the hot tap input (channel 2) is active.
//! for frame in FrameDecoder::from_bytes(b"01|04|00\n", WireFormat::Hex) {
//!     if frame?.input_high(2) {
//!         pump.needed_for("hot_tap", Duration::from_secs(30))?;
//!     }
//! }
//!
//! assert_eq!(output.current(), Some(true));
//! pump.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Timed actuator with a background expiry task.
pub mod actuator;
/// Serial I/O board: frame reader and relay commands.
pub mod board;
/// Configuration structs with builder methods and validation.
pub mod config;
/// Input debouncing and the expander sampler.
pub mod debounce;
/// Crate-wide error type.
pub mod error;
/// Pulse flow meter.
pub mod flow;
/// Status frame decoding.
pub mod frame;
/// Hardware abstraction layer with system and mock implementations.
pub mod hal;
/// Pure on/off state machine.
pub mod onoff;
/// Relay wiring and outputs.
pub mod relay;
/// Core traits for hardware abstraction and telemetry.
pub mod traits;
/// Volume and flow-rate units.
pub mod units;

mod sync;

// Re-exports for convenience
pub use actuator::TimedActuator;
pub use board::IoBoard;
pub use config::{
    ActuatorConfig, BoardConfig, Config, FlowMeterConfig, SamplerConfig, MAX_SAMPLING_RATE_HZ,
};
pub use debounce::{DebounceSampler, DebouncedEvent, Debouncer, InputMap, PinLocation};
pub use error::{Error, Result};
pub use flow::FlowMeter;
pub use frame::{
    encode_relay_command, FrameDecoder, FrameParser, InputLevel, InputStatus, StatusFrame,
    WireFormat,
};
pub use onoff::{OnOffOutcome, OnOffState, OnOffStatus, RejectReason};
pub use relay::{RelayBank, RelayMap, RelayOutput, RelayPort};
pub use traits::{Clock, InputBus, OutputDriver, Telemetry, Transport};
pub use units::{Volume, VolumeFlowRate};
