//! Configuration for boards, samplers, actuators, and flow meters.
//!
//! Every struct is plain data with `with_*` builder methods. Component
//! constructors call `validate()` and refuse to build on error, so a
//! value that made it into a running component is known-good.
//!
//! Names use `heapless::String` so configs stay cheap to clone and copy
//! into metric names.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rs_hydronic::config::{ActuatorConfig, Config, FlowMeterConfig, SamplerConfig};
//! use rs_hydronic::units::Volume;
//!
//! let config = Config::default()
//!     .with_sampler(SamplerConfig::default().with_inputs(&[5, 6, 7]))
//!     .with_actuator(ActuatorConfig::new("recirc_pump", Duration::from_secs(300)))
//!     .with_meter(FlowMeterConfig::new("hot", Volume::from_litres(0.1)));
//!
//! assert!(config.validate().is_ok());
//! ```

use core::time::Duration;

use heapless::String as HString;

use crate::debounce::InputMap;
use crate::error::{Error, Result};
use crate::frame::WireFormat;
use crate::units::Volume;

/// Maximum length for component names and metric namespaces.
pub const MAX_SHORT_STRING: usize = 32;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Highest input sampling rate the expander bus can sustain.
pub const MAX_SAMPLING_RATE_HZ: u32 = 10_000;

/// Ring capacity used when a flow meter is configured with fewer than one event.
pub const DEFAULT_MAX_EVENT_COUNT: usize = 100;

/// Create a ShortString from a &str, truncating at a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete controller configuration.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Serial I/O board
    pub board: BoardConfig,
    /// Expander input sampler
    pub sampler: SamplerConfig,
    /// Pulse flow meters
    pub meters: Vec<FlowMeterConfig>,
    /// Timed pump/fan outputs
    pub actuators: Vec<ActuatorConfig>,
}

impl Config {
    /// Set board configuration
    pub fn with_board(mut self, board: BoardConfig) -> Self {
        self.board = board;
        self
    }

    /// Set sampler configuration
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Add a flow meter
    pub fn with_meter(mut self, meter: FlowMeterConfig) -> Self {
        self.meters.push(meter);
        self
    }

    /// Add an actuator
    pub fn with_actuator(mut self, actuator: ActuatorConfig) -> Self {
        self.actuators.push(actuator);
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.board.validate()?;
        self.sampler.validate()?;
        for meter in &self.meters {
            meter.validate()?;
        }
        for actuator in &self.actuators {
            actuator.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Board Config
// ============================================================================

/// Serial I/O board configuration
///
/// The default format is [`WireFormat::Hex`], the compact `HH|HH|HH`
/// firmware output. It is the default whether or not the `json` feature
/// is enabled; select `WireFormat::Json` explicitly for boards that
/// stream JSON status lines.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardConfig {
    /// Board name used in log lines
    pub name: ShortString,
    /// Status frame format the firmware emits
    pub format: WireFormat,
    /// Back-off after a read that returned no bytes
    pub idle_backoff_ms: u64,
    /// Back-off after a transport read error
    pub retry_backoff_ms: u64,
    /// Decoded frames buffered before the reader waits on the consumer
    pub channel_capacity: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: short_string("arduino"),
            format: WireFormat::default(),
            idle_backoff_ms: 10,
            retry_backoff_ms: 1000,
            channel_capacity: 16,
        }
    }
}

impl BoardConfig {
    /// Set the board name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }

    /// Set the wire format
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the idle back-off
    pub fn with_idle_backoff_ms(mut self, ms: u64) -> Self {
        self.idle_backoff_ms = ms;
        self
    }

    /// Set the error retry back-off
    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Set the frame channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::InvalidParameter("board channel capacity must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Sampler Config
// ============================================================================

/// Debounced input sampler configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerConfig {
    /// Samples per second
    pub sampling_rate_hz: u32,
    /// Ignore window after an emitted change
    pub debounce_ms: u64,
    /// Board input numbers to watch
    pub inputs: Vec<u8>,
    /// Where each board input lives on the expander
    pub input_map: InputMap,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 100,
            debounce_ms: 20,
            inputs: Vec::new(),
            input_map: InputMap::sequent_16_input(),
        }
    }
}

impl SamplerConfig {
    /// Set the sampling rate
    pub fn with_sampling_rate_hz(mut self, hz: u32) -> Self {
        self.sampling_rate_hz = hz;
        self
    }

    /// Set the debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Set the watched inputs
    pub fn with_inputs(mut self, inputs: &[u8]) -> Self {
        self.inputs = inputs.to_vec();
        self
    }

    /// Set the input wiring table
    pub fn with_input_map(mut self, map: InputMap) -> Self {
        self.input_map = map;
        self
    }

    /// Time between samples.
    pub fn sampling_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.sampling_rate_hz.max(1)))
    }

    /// Ignore window after an emitted change.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sampling_rate_hz > MAX_SAMPLING_RATE_HZ {
            return Err(Error::SampleRateTooFast {
                requested_hz: self.sampling_rate_hz,
                max_hz: MAX_SAMPLING_RATE_HZ,
            });
        }
        if self.sampling_rate_hz == 0 {
            return Err(Error::InvalidParameter("sampling rate must be non-zero"));
        }
        if self.inputs.iter().any(|i| self.input_map.location(*i).is_none()) {
            return Err(Error::InvalidParameter("input is not in the input map"));
        }
        Ok(())
    }
}

// ============================================================================
// Actuator Config
// ============================================================================

/// Timed on/off output configuration.
///
/// No `Default`: every output states its own blackout period.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorConfig {
    /// Output name, used in metric names and logs
    pub name: ShortString,
    /// Metric namespace
    pub namespace: ShortString,
    /// Minimum off time after a turn-off before the output may turn on again
    pub blackout_ms: u64,
    /// Telemetry tick (and failed-write retry) interval while on
    pub refresh_ms: u64,
}

impl ActuatorConfig {
    /// Create an actuator config with the required blackout period.
    pub fn new(name: &str, blackout: Duration) -> Self {
        Self {
            name: short_string(name),
            namespace: ShortString::new(),
            blackout_ms: blackout.as_millis() as u64,
            refresh_ms: 1000,
        }
    }

    /// Set the metric namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = short_string(namespace);
        self
    }

    /// Set the telemetry tick interval
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh_ms = refresh.as_millis() as u64;
        self
    }

    /// Blackout period as a `Duration`.
    pub fn blackout(&self) -> Duration {
        Duration::from_millis(self.blackout_ms)
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidParameter("actuator name must not be empty"));
        }
        if self.refresh_ms == 0 {
            return Err(Error::InvalidParameter("actuator refresh period must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Flow Meter Config
// ============================================================================

/// Pulse flow meter configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowMeterConfig {
    /// Meter name
    pub name: ShortString,
    /// Volume represented by one pulse (must be positive)
    pub volume_per_pulse: Volume,
    /// Total reported before the first pulse
    pub starting_volume: Volume,
    /// Pulses retained for rate calculation (< 1 means the default of 100)
    pub max_event_count: usize,
}

impl FlowMeterConfig {
    /// Create a meter config with the given pulse volume.
    pub fn new(name: &str, volume_per_pulse: Volume) -> Self {
        Self {
            name: short_string(name),
            volume_per_pulse,
            starting_volume: Volume::ZERO,
            max_event_count: DEFAULT_MAX_EVENT_COUNT,
        }
    }

    /// Set the starting total
    pub fn with_starting_volume(mut self, volume: Volume) -> Self {
        self.starting_volume = volume;
        self
    }

    /// Set the ring capacity
    pub fn with_max_event_count(mut self, count: usize) -> Self {
        self.max_event_count = count;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        let pulse = self.volume_per_pulse.litres();
        if !pulse.is_finite() || pulse <= 0.0 {
            return Err(Error::InvalidParameter("volume per pulse must be positive"));
        }
        Ok(())
    }

    /// Ring capacity after applying the default.
    pub fn effective_max_event_count(&self) -> usize {
        if self.max_event_count < 1 {
            DEFAULT_MAX_EVENT_COUNT
        } else {
            self.max_event_count
        }
    }

    /// Starting total, with negative or NaN values clamped to zero.
    pub fn effective_starting_volume(&self) -> Volume {
        if self.starting_volume.litres() > 0.0 {
            self.starting_volume
        } else {
            Volume::ZERO
        }
    }
}
