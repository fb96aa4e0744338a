//! Timed on/off actuator backed by a tokio expiry task.
//!
//! [`TimedActuator`] wraps an [`OnOffState`] with a lock, an output
//! driver, and a background task that turns the output off when its
//! deadline passes. Public operations are synchronous and may be called
//! from any thread; each one nudges the task so it re-reads the deadline.
//!
//! # Output writes
//!
//! Edges are written through the [`OutputDriver`] after the state lock is
//! released but while the output lock is held, so edges reach the hardware
//! in the order they were decided. A failed write is returned to the caller
//! as [`Error::Output`], the logical state stands, and the task retries the
//! write on its next tick.
//!
//! # Telemetry
//!
//! - `<ns>_physical_<name>_state` gauge: 1 while on, 0 while off
//! - `<ns>_physical_<name>_on_time` counter: seconds spent on
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rs_hydronic::actuator::TimedActuator;
//! use rs_hydronic::config::ActuatorConfig;
//! use rs_hydronic::hal::{MockOutput, MonotonicClock};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rs_hydronic::Result<()> {
//! let output = MockOutput::new();
//! let pump = TimedActuator::spawn(
//!     ActuatorConfig::new("recirc", Duration::from_secs(60)),
//!     output.clone(),
//!     MonotonicClock::new(),
//! )?;
//!
//! pump.needed_for("hot_tap", Duration::from_secs(30))?;
//! pump.needed_for("schedule", Duration::from_secs(90))?;
//! assert!(pump.status().is_on);
//! assert_eq!(output.levels(), vec![true]);
//!
//! pump.shutdown().await?;
//! assert!(!pump.status().is_on);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::ActuatorConfig;
use crate::error::{Error, Result};
use crate::hal::{MonotonicClock, NoopTelemetry};
use crate::onoff::{OnOffOutcome, OnOffState, OnOffStatus};
use crate::sync::lock;
use crate::traits::{physical_metric, Clock, OutputDriver, Telemetry};

struct OutputSlot<O> {
    driver: O,
    desired: bool,
    dirty: bool,
}

impl<O: OutputDriver> OutputSlot<O> {
    fn drive(&mut self, level: bool, name: &str) -> Result<()> {
        self.desired = level;
        match self.driver.set_output(level) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                log::warn!("{name}: output write ({level}) failed, will retry: {e}");
                self.dirty = true;
                Err(Error::Output(e))
            }
        }
    }
}

struct Shared<O, C> {
    config: ActuatorConfig,
    clock: C,
    state: Mutex<OnOffState>,
    output: Mutex<OutputSlot<O>>,
    wake: Notify,
    telemetry: Arc<dyn Telemetry>,
    state_metric: String,
    on_time_metric: String,
}

impl<O, C> Shared<O, C>
where
    O: OutputDriver,
    C: Clock,
{
    /// Run `op` under the state lock and drive any edge it produces.
    fn apply<F>(&self, op: F) -> Result<OnOffOutcome>
    where
        F: FnOnce(&mut OnOffState, u64) -> OnOffOutcome,
    {
        let now_ms = self.clock.now_ms();
        let mut state = lock(&self.state);
        let outcome = op(&mut state, now_ms);

        let result = match outcome.edge() {
            Some(level) => {
                let on_ms = state.take_on_time_ms(now_ms);
                let mut output = lock(&self.output);
                drop(state);
                self.record_edge(level, on_ms);
                output.drive(level, &self.config.name)
            }
            None => Ok(()),
        };

        self.wake.notify_one();
        result.map(|()| outcome)
    }

    fn record_edge(&self, level: bool, on_ms: u64) {
        log::debug!(
            "{}: turned {}",
            self.config.name,
            if level { "on" } else { "off" }
        );
        self.telemetry
            .set_gauge(&self.state_metric, if level { 1.0 } else { 0.0 });
        self.record_on_time(on_ms);
    }

    fn record_on_time(&self, on_ms: u64) {
        if on_ms > 0 {
            self.telemetry
                .add_counter(&self.on_time_metric, on_ms as f64 / 1000.0);
        }
    }

    /// Deadline and whether periodic ticks are needed.
    fn schedule(&self) -> (Option<u64>, bool) {
        let (deadline, is_on) = {
            let state = lock(&self.state);
            (state.until_ms(), state.is_on())
        };
        let dirty = lock(&self.output).dirty;
        (deadline, is_on || dirty)
    }

    fn tick(&self, now_ms: u64) {
        let (on_ms, is_on) = {
            let mut state = lock(&self.state);
            (state.take_on_time_ms(now_ms), state.is_on())
        };
        self.record_on_time(on_ms);
        self.telemetry
            .set_gauge(&self.state_metric, if is_on { 1.0 } else { 0.0 });

        let mut output = lock(&self.output);
        if output.dirty {
            let level = output.desired;
            let _ = output.drive(level, &self.config.name);
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let refresh_ms = self.config.refresh_ms.max(1);
        let mut next_tick_ms: Option<u64> = None;

        loop {
            let now_ms = self.clock.now_ms();
            let (deadline, active) = self.schedule();
            if !active {
                next_tick_ms = None;
            } else if next_tick_ms.is_none() {
                next_tick_ms = Some(now_ms + refresh_ms);
            }

            let wake_at = deadline.into_iter().chain(next_tick_ms).min();
            let sleep = async move {
                match wake_at {
                    Some(t) => tokio::time::sleep(Duration::from_millis(t.saturating_sub(now_ms))).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wake.notified() => continue,
                _ = sleep => {}
            }

            let now_ms = self.clock.now_ms();
            // Re-checked under the lock: a request that moved the deadline wins.
            let _ = self.apply(|state, now| state.expire(now));

            if next_tick_ms.is_some_and(|t| now_ms >= t) {
                self.tick(now_ms);
                next_tick_ms = Some(now_ms + refresh_ms);
            }
        }
        log::debug!("{}: expiry task exiting", self.config.name);
    }
}

/// One controllable output with timed on requests, merged claims, and a
/// blackout period after every turn-off.
///
/// Dropping the actuator stops its task without writing the output; call
/// [`shutdown`](Self::shutdown) to force the output off first.
pub struct TimedActuator<O, C = MonotonicClock> {
    shared: Arc<Shared<O, C>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<O, C> TimedActuator<O, C>
where
    O: OutputDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Start an actuator with no telemetry.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: ActuatorConfig, output: O, clock: C) -> Result<Self> {
        Self::spawn_with_telemetry(config, output, clock, Arc::new(NoopTelemetry))
    }

    /// Start an actuator that reports to `telemetry`.
    pub fn spawn_with_telemetry(
        config: ActuatorConfig,
        output: O,
        clock: C,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self> {
        config.validate()?;
        let handle = Handle::try_current()
            .map_err(|_| Error::Runtime("actuator must be spawned inside a tokio runtime"))?;

        let state_metric = physical_metric(&config.namespace, &config.name, "state");
        let on_time_metric = physical_metric(&config.namespace, &config.name, "on_time");
        telemetry.set_gauge(&state_metric, 0.0);

        let shared = Arc::new(Shared {
            state: Mutex::new(OnOffState::new(config.blackout_ms)),
            output: Mutex::new(OutputSlot {
                driver: output,
                desired: false,
                dirty: false,
            }),
            config,
            clock,
            wake: Notify::new(),
            telemetry,
            state_metric,
            on_time_metric,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = handle.spawn(Arc::clone(&shared).run(shutdown_rx));
        log::info!(
            "{}: actuator started (blackout {:?})",
            shared.config.name,
            shared.config.blackout()
        );

        Ok(Self {
            shared,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Actuator name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Current time on the actuator's clock.
    pub fn now_ms(&self) -> u64 {
        self.shared.clock.now_ms()
    }

    /// Turn on (or stay on) until `until_ms`.
    ///
    /// Ignored during the blackout window; the returned outcome says why.
    pub fn on_until(&self, until_ms: u64) -> Result<OnOffOutcome> {
        self.shared.apply(|state, now| state.on_until(until_ms, now))
    }

    /// Turn on (or stay on) for `duration` from now.
    pub fn on_for(&self, duration: Duration) -> Result<OnOffOutcome> {
        let until_ms = self.now_ms().saturating_add(duration.as_millis() as u64);
        self.on_until(until_ms)
    }

    /// Record that `claimant` needs the output on until `until_ms`.
    ///
    /// The output stays on until the last live claim expires.
    pub fn needed_until(&self, claimant: &str, until_ms: u64) -> Result<OnOffOutcome> {
        self.shared
            .apply(|state, now| state.needed_until(claimant, until_ms, now))
    }

    /// Record that `claimant` needs the output on for `duration` from now.
    pub fn needed_for(&self, claimant: &str, duration: Duration) -> Result<OnOffOutcome> {
        let until_ms = self.now_ms().saturating_add(duration.as_millis() as u64);
        self.needed_until(claimant, until_ms)
    }

    /// Turn off now and drop all claims.
    pub fn off(&self) -> Result<OnOffOutcome> {
        self.shared.apply(|state, now| state.off(now))
    }

    /// Current status.
    pub fn status(&self) -> OnOffStatus {
        let now_ms = self.now_ms();
        lock(&self.shared.state).status(now_ms)
    }

    /// Force the output off, stop the task, and wait for it to exit.
    ///
    /// Later on requests are rejected. Safe to call more than once; every
    /// call writes the output off.
    pub async fn shutdown(&self) -> Result<()> {
        let now_ms = self.now_ms();
        let result = {
            let mut state = lock(&self.shared.state);
            let outcome = state.shutdown(now_ms);
            let on_ms = state.take_on_time_ms(now_ms);
            let mut output = lock(&self.shared.output);
            drop(state);
            if outcome.edge().is_some() {
                self.shared.record_edge(false, on_ms);
            }
            output.drive(false, &self.shared.config.name)
        };

        let _ = self.shutdown_tx.send(true);
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("{}: expiry task ended abnormally: {e}", self.name());
            }
            log::info!("{}: actuator shut down", self.name());
        }
        result
    }
}
