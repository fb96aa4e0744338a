//! Pulse flow meter with a bounded sliding window.
//!
//! Each pulse adds a fixed volume to a running total and records its time
//! in a ring of at most `max_event_count` entries, newest first. The flow
//! rate over a trailing window is the volume of the pulses inside it
//! divided by the window length.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rs_hydronic::config::FlowMeterConfig;
//! use rs_hydronic::flow::FlowMeter;
//! use rs_hydronic::hal::MockClock;
//! use rs_hydronic::units::Volume;
//!
//! let clock = MockClock::new();
//! let meter = FlowMeter::new(
//!     FlowMeterConfig::new("hot", Volume::from_litres(0.5)),
//!     clock.clone(),
//! ).unwrap();
//!
//! for _ in 0..4 {
//!     clock.advance(15_000);
//!     meter.pulse();
//! }
//!
//! assert_eq!(meter.total().to_string(), "2.000L");
//! assert_eq!(meter.flow(Duration::from_secs(60)).to_string(), "2.000Lpm");
//! ```

use core::fmt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{FlowMeterConfig, ShortString};
use crate::error::Result;
use crate::hal::MonotonicClock;
use crate::sync::lock;
use crate::traits::{Clock, Telemetry};
use crate::units::{Volume, VolumeFlowRate};

struct MeterState {
    total: Volume,
    events: VecDeque<u64>,
}

/// Pulse-counting flow meter.
///
/// All operations serialize on one internal lock, so a meter can be shared
/// between the pulse producer and rate readers behind an `Arc`.
pub struct FlowMeter<C = MonotonicClock> {
    name: ShortString,
    pulse: Volume,
    max_event_count: usize,
    clock: C,
    state: Mutex<MeterState>,
    telemetry: Option<(Arc<dyn Telemetry>, String)>,
}

impl<C: Clock> FlowMeter<C> {
    /// Build a meter. Fails if the pulse volume is not positive.
    pub fn new(config: FlowMeterConfig, clock: C) -> Result<Self> {
        config.validate()?;
        let max_event_count = config.effective_max_event_count();
        Ok(Self {
            name: config.name.clone(),
            pulse: config.volume_per_pulse,
            max_event_count,
            clock,
            state: Mutex::new(MeterState {
                total: config.effective_starting_volume(),
                events: VecDeque::with_capacity(max_event_count + 1),
            }),
            telemetry: None,
        })
    }

    /// Report pulse volume to `telemetry` as counter `<name>_volume_litres`.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        let metric = format!("{}_volume_litres", self.name);
        self.telemetry = Some((telemetry, metric));
        self
    }

    /// Meter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one pulse at the current time.
    pub fn pulse(&self) {
        let now_ms = self.clock.now_ms();
        {
            let mut state = lock(&self.state);
            state.total += self.pulse;
            state.events.push_front(now_ms);
            state.events.truncate(self.max_event_count);
        }
        if let Some((telemetry, metric)) = &self.telemetry {
            telemetry.add_counter(metric, self.pulse.litres());
        }
    }

    /// Flow rate over the trailing `window`. A zero window reads as no flow.
    pub fn flow(&self, window: Duration) -> VolumeFlowRate {
        let window_ms = window.as_millis() as u64;
        if window_ms == 0 {
            return VolumeFlowRate::ZERO;
        }

        let now_ms = self.clock.now_ms();
        let pulses = {
            let state = lock(&self.state);
            match now_ms.checked_sub(window_ms) {
                // Newest first, so stop at the first entry outside the window.
                Some(since_ms) => state.events.iter().take_while(|t| **t > since_ms).count(),
                // Window reaches back past the clock's epoch.
                None => state.events.len(),
            }
        };

        let minutes = window.as_secs_f64() / 60.0;
        VolumeFlowRate::from_lpm(pulses as f64 * self.pulse.litres() / minutes)
    }

    /// Total volume, including the starting volume.
    pub fn total(&self) -> Volume {
        lock(&self.state).total
    }

    /// Pulses currently retained for rate calculation.
    pub fn event_count(&self) -> usize {
        lock(&self.state).events.len()
    }
}

impl<C: Clock> fmt::Display for FlowMeter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.total())
    }
}
