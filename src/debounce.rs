//! Debounced digital inputs on a GPIO expander.
//!
//! [`Debouncer`] is the per-input filter: it emits a [`DebouncedEvent`]
//! when a freshly sampled level differs from the last emitted one and the
//! input is outside its ignore window. [`DebounceSampler`] runs it on a
//! fixed-period tokio task over an [`InputBus`], reading only the
//! expander ports that carry a configured input.
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::debounce::Debouncer;
//!
//! let mut debouncer = Debouncer::new([5], 20);
//!
//! let events = debouncer.update([(5, true)], 0);
//! assert_eq!(events.len(), 1);
//!
//! // Chatter inside the 20ms window is ignored.
//! assert!(debouncer.update([(5, false)], 5).is_empty());
//! assert!(debouncer.update([(5, true)], 10).is_empty());
//!
//! let events = debouncer.update([(5, false)], 25);
//! assert!(!events[0].level);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::{Arc, Mutex};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SamplerConfig;
use crate::error::{Error, Result};
use crate::hal::MonotonicClock;
use crate::sync::lock;
use crate::traits::{Clock, InputBus};

// ============================================================================
// Input Wiring
// ============================================================================

/// Location of one input line on the expander.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PinLocation {
    /// Expander port (one bus read per port)
    pub port: u8,
    /// Bit within the port, 0..=7
    pub bit: u8,
}

/// Board input number to expander pin wiring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InputMap {
    pins: BTreeMap<u8, PinLocation>,
}

impl InputMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire `input` to `port`/`bit`.
    pub fn with_input(mut self, input: u8, port: u8, bit: u8) -> Self {
        self.pins.insert(input, PinLocation { port, bit });
        self
    }

    /// Sequent Microsystems 16-input opto hat.
    ///
    /// Inputs 16..=9 sit on port 0 bits 0..=7, inputs 8..=1 on port 1.
    pub fn sequent_16_input() -> Self {
        (0..8u8).fold(Self::new(), |map, bit| {
            map.with_input(16 - bit, 0, bit).with_input(8 - bit, 1, bit)
        })
    }

    /// Where `input` is wired.
    pub fn location(&self, input: u8) -> Option<PinLocation> {
        self.pins.get(&input).copied()
    }

    /// Number of wired inputs.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Whether no inputs are wired.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

// ============================================================================
// Debouncer
// ============================================================================

/// A validated input level change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebouncedEvent {
    /// Board input number
    pub input: u8,
    /// New level
    pub level: bool,
    /// Sample time
    pub at_ms: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct InputState {
    stable: bool,
    ignore_until_ms: u64,
}

/// Pure per-input debounce filter.
///
/// Every input starts with a stable level of `false`, so an input that is
/// already high produces an event on the first sample.
#[derive(Clone, Debug)]
pub struct Debouncer {
    debounce_ms: u64,
    inputs: BTreeMap<u8, InputState>,
}

impl Debouncer {
    /// Filter for `inputs` with the given ignore window.
    pub fn new(inputs: impl IntoIterator<Item = u8>, debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            inputs: inputs
                .into_iter()
                .map(|i| (i, InputState::default()))
                .collect(),
        }
    }

    /// Last emitted level of `input`.
    pub fn stable(&self, input: u8) -> Option<bool> {
        self.inputs.get(&input).map(|s| s.stable)
    }

    /// Apply one sample and return the events it produces.
    ///
    /// Levels for inputs the filter was not built with are ignored.
    pub fn update(
        &mut self,
        levels: impl IntoIterator<Item = (u8, bool)>,
        now_ms: u64,
    ) -> Vec<DebouncedEvent> {
        let mut events = Vec::new();
        for (input, raw) in levels {
            let Some(state) = self.inputs.get_mut(&input) else {
                continue;
            };
            if raw != state.stable && now_ms >= state.ignore_until_ms {
                state.stable = raw;
                state.ignore_until_ms = now_ms.saturating_add(self.debounce_ms);
                events.push(DebouncedEvent {
                    input,
                    level: raw,
                    at_ms: now_ms,
                });
            }
        }
        events
    }
}

// ============================================================================
// Sampler
// ============================================================================

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Wired inputs and the distinct ports they need.
#[derive(Clone, Debug)]
struct ReadPlan {
    inputs: Vec<(u8, PinLocation)>,
    ports: Vec<u8>,
}

impl ReadPlan {
    fn new(config: &SamplerConfig) -> Result<Self> {
        let mut inputs = Vec::with_capacity(config.inputs.len());
        for input in &config.inputs {
            let location = config
                .input_map
                .location(*input)
                .ok_or(Error::InvalidParameter("input is not in the input map"))?;
            inputs.push((*input, location));
        }
        let ports: BTreeSet<u8> = inputs.iter().map(|(_, loc)| loc.port).collect();
        Ok(Self {
            inputs,
            ports: ports.into_iter().collect(),
        })
    }

    fn read<B: InputBus + ?Sized>(&self, bus: &mut B) -> io::Result<BTreeMap<u8, bool>> {
        let mut values = BTreeMap::new();
        for port in &self.ports {
            values.insert(*port, bus.read_port(*port)?);
        }
        Ok(self
            .inputs
            .iter()
            .map(|(input, loc)| {
                let byte = values.get(&loc.port).copied().unwrap_or(0);
                (*input, byte & (1 << loc.bit) != 0)
            })
            .collect())
    }
}

/// Polls expander inputs and emits debounced level changes.
///
/// The bus is owned by the sampler; the poll loop and [`read_inputs`]
/// serialize on the same mutex.
///
/// [`read_inputs`]: DebounceSampler::read_inputs
pub struct DebounceSampler<B, C = MonotonicClock> {
    config: SamplerConfig,
    plan: ReadPlan,
    bus: Arc<Mutex<B>>,
    clock: Arc<C>,
    running: Mutex<Option<Running>>,
}

impl<B, C> DebounceSampler<B, C>
where
    B: InputBus + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Validate `config` and take ownership of the bus.
    pub fn new(config: SamplerConfig, bus: B, clock: C) -> Result<Self> {
        config.validate()?;
        if config.inputs.is_empty() {
            return Err(Error::InvalidParameter("no inputs configured"));
        }
        if config.debounce() <= config.sampling_period() {
            log::warn!(
                "debounce window {:?} does not exceed sampling period {:?}; every change passes",
                config.debounce(),
                config.sampling_period()
            );
        }
        let plan = ReadPlan::new(&config)?;

        Ok(Self {
            config,
            plan,
            bus: Arc::new(Mutex::new(bus)),
            clock: Arc::new(clock),
            running: Mutex::new(None),
        })
    }

    /// Sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Expander ports read on each sample.
    pub fn ports(&self) -> &[u8] {
        &self.plan.ports
    }

    /// Whether the poll task is running.
    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Read the raw level of every configured input once, without debounce.
    pub fn read_inputs(&self) -> Result<BTreeMap<u8, bool>> {
        let mut bus = lock(&self.bus);
        Ok(self.plan.read(&mut *bus)?)
    }

    /// Start the poll task, sending events to `listener`.
    pub fn start(&self, listener: mpsc::Sender<DebouncedEvent>) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| Error::Runtime("sampler must be started inside a tokio runtime"))?;

        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Err(Error::AlreadyStarted);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let poll = PollLoop {
            plan: self.plan.clone(),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            debouncer: Debouncer::new(self.config.inputs.iter().copied(), self.config.debounce_ms),
            listener,
            multi_thread: handle.runtime_flavor() == RuntimeFlavor::MultiThread,
        };
        let period = self.config.sampling_period();
        let task = handle.spawn(poll.run(period, stop_rx));

        log::info!(
            "input sampler started: {} inputs on ports {:?} at {} Hz",
            self.plan.inputs.len(),
            self.plan.ports,
            self.config.sampling_rate_hz
        );
        *running = Some(Running {
            stop: stop_tx,
            task,
        });
        Ok(())
    }

    /// Stop the poll task and wait for it to exit. Safe to call when stopped.
    pub async fn stop(&self) {
        let Some(running) = lock(&self.running).take() else {
            return;
        };
        let _ = running.stop.send(true);
        if let Err(e) = running.task.await {
            log::warn!("input sampler task ended abnormally: {e}");
        }
        log::info!("input sampler stopped");
    }
}

impl<B, C> Drop for DebounceSampler<B, C> {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            let _ = running.stop.send(true);
        }
    }
}

struct PollLoop<B, C> {
    plan: ReadPlan,
    bus: Arc<Mutex<B>>,
    clock: Arc<C>,
    debouncer: Debouncer,
    listener: mpsc::Sender<DebouncedEvent>,
    multi_thread: bool,
}

impl<B, C> PollLoop<B, C>
where
    B: InputBus,
    C: Clock,
{
    /// One sample. On a multi-thread runtime the bus transaction runs in
    /// `block_in_place` so a slow bus does not stall other tasks.
    fn read(&self) -> io::Result<BTreeMap<u8, bool>> {
        let read = || self.plan.read(&mut *lock(&self.bus));
        if self.multi_thread {
            tokio::task::block_in_place(read)
        } else {
            read()
        }
    }

    async fn run(mut self, period: std::time::Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }

            let levels = match self.read() {
                Ok(levels) => levels,
                Err(e) => {
                    log::warn!("input read failed, skipping sample: {e}");
                    continue;
                }
            };

            let now_ms = self.clock.now_ms();
            for event in self.debouncer.update(levels, now_ms) {
                log::debug!("input {} -> {}", event.input, event.level);
                // A full listener must not hold off stop.
                tokio::select! {
                    sent = self.listener.send(event) => {
                        if sent.is_err() {
                            log::info!("input listener closed, sampler exiting");
                            return;
                        }
                    }
                    _ = stop.changed() => return,
                }
            }
        }
    }
}
