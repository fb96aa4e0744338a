//! Timed actuator behaviour against tokio's paused clock

use std::sync::Arc;
use std::time::Duration;

use rs_hydronic::{
    hal::{MockClock, MockOutput, MockTelemetry, MonotonicClock},
    ActuatorConfig, Error, OnOffOutcome, RejectReason, TimedActuator,
};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn fan(blackout: Duration, output: &MockOutput) -> TimedActuator<MockOutput> {
    TimedActuator::spawn(
        ActuatorConfig::new("fan", blackout),
        output.clone(),
        MonotonicClock::new(),
    )
    .unwrap()
}

// ============================================================================
// Expiry and Blackout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn blackout_scenario_three_seconds() {
    let output = MockOutput::new();
    let fan = fan(secs(3), &output);

    assert_eq!(fan.on_for(secs(2)).unwrap(), OnOffOutcome::TurnedOn);
    assert!(fan.status().is_on);

    tokio::time::sleep(secs(3)).await;
    assert!(!fan.status().is_on);
    assert_eq!(output.levels(), vec![true, false]);

    // Off at 2s, so blackout lasts until 5s.
    assert_eq!(
        fan.on_for(secs(2)).unwrap(),
        OnOffOutcome::Rejected(RejectReason::Blackout { not_before_ms: 5_000 })
    );
    assert!(!fan.status().is_on);
    assert_eq!(output.levels(), vec![true, false]);

    tokio::time::sleep(secs(2)).await;
    assert_eq!(fan.on_for(secs(2)).unwrap(), OnOffOutcome::TurnedOn);
    assert!(fan.status().is_on);
    assert_eq!(output.levels(), vec![true, false, true]);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn extending_deadline_before_expiry_wins() {
    let output = MockOutput::new();
    let fan = fan(secs(0), &output);

    fan.on_for(secs(2)).unwrap();
    tokio::time::sleep(ms(1_500)).await;
    assert_eq!(fan.on_for(secs(5)).unwrap(), OnOffOutcome::Rescheduled);

    tokio::time::sleep(secs(3)).await;
    assert!(fan.status().is_on);
    assert_eq!(output.levels(), vec![true]);

    tokio::time::sleep(secs(3)).await;
    assert!(!fan.status().is_on);
    assert_eq!(output.levels(), vec![true, false]);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shortening_deadline_applies() {
    let output = MockOutput::new();
    let fan = fan(secs(0), &output);

    fan.on_for(secs(60)).unwrap();
    fan.on_for(secs(1)).unwrap();
    tokio::time::sleep(ms(1_100)).await;

    assert_eq!(output.levels(), vec![true, false]);
    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn status_reports_off_at_deadline_before_task_runs() {
    let clock = MockClock::new();
    let output = MockOutput::new();
    let fan = TimedActuator::spawn(
        ActuatorConfig::new("fan", secs(0)),
        output.clone(),
        clock.clone(),
    )
    .unwrap();

    fan.on_until(1_000).unwrap();
    clock.set(1_000);
    let status = fan.status();
    assert!(!status.is_on);
    assert_eq!(status.until_ms, None);

    fan.shutdown().await.unwrap();
}

// ============================================================================
// Claims
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stays_on_until_last_claim_expires() {
    let output = MockOutput::new();
    let pump = fan(secs(0), &output);

    pump.needed_for("hot_tap", secs(5)).unwrap();
    pump.needed_for("schedule", secs(10)).unwrap();
    pump.needed_for("hot_tap", secs(2)).unwrap();
    assert_eq!(pump.status().until_ms, Some(10_000));

    tokio::time::sleep(secs(6)).await;
    assert!(pump.status().is_on);

    tokio::time::sleep(ms(4_010)).await;
    assert!(!pump.status().is_on);
    assert_eq!(output.levels(), vec![true, false]);

    pump.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn off_keeps_live_claims_and_starts_blackout() {
    let output = MockOutput::new();
    let pump = fan(secs(10), &output);

    pump.needed_for("schedule", secs(60)).unwrap();
    tokio::time::sleep(secs(1)).await;
    assert_eq!(pump.off().unwrap(), OnOffOutcome::TurnedOff);

    let status = pump.status();
    assert!(!status.is_on);
    assert_eq!(status.not_before_ms, 11_000);

    tokio::time::sleep(secs(10)).await;
    // The schedule claim is still live and stretches the short new one.
    assert_eq!(
        pump.needed_for("hot_tap", secs(1)).unwrap(),
        OnOffOutcome::TurnedOn
    );
    assert_eq!(pump.status().until_ms, Some(60_000));

    pump.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_claims_merge() {
    let clock = MockClock::new();
    let output = MockOutput::new();
    let pump = Arc::new(
        TimedActuator::spawn(
            ActuatorConfig::new("pump", secs(0)),
            output.clone(),
            clock.clone(),
        )
        .unwrap(),
    );

    let threads: Vec<_> = (1..=8u64)
        .map(|i| {
            let pump = Arc::clone(&pump);
            std::thread::spawn(move || {
                pump.needed_until(&format!("claim-{i}"), i * 1_000).unwrap();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(pump.status().until_ms, Some(8_000));
    assert_eq!(output.levels(), vec![true]);

    pump.shutdown().await.unwrap();
}

// ============================================================================
// Output Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn failed_write_is_retried_on_tick() {
    let output = MockOutput::new();
    output.fail_next_writes(1);
    let fan = fan(secs(0), &output);

    assert!(matches!(fan.on_for(secs(10)), Err(Error::Output(_))));
    assert!(fan.status().is_on);
    assert!(output.levels().is_empty());

    tokio::time::sleep(ms(1_500)).await;
    assert_eq!(output.levels(), vec![true]);
    assert_eq!(output.attempts(), 2);

    fan.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_off_write_is_retried_on_tick() {
    let output = MockOutput::new();
    let fan = fan(secs(0), &output);

    fan.on_for(secs(10)).unwrap();
    output.fail_next_writes(1);
    assert!(matches!(fan.off(), Err(Error::Output(_))));
    assert!(!fan.status().is_on);

    tokio::time::sleep(ms(1_500)).await;
    assert_eq!(output.levels(), vec![true, false]);

    fan.shutdown().await.unwrap();
}

// ============================================================================
// Telemetry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn telemetry_tracks_state_and_on_time() {
    let output = MockOutput::new();
    let telemetry = Arc::new(MockTelemetry::new());
    let fan = TimedActuator::spawn_with_telemetry(
        ActuatorConfig::new("fan", secs(0)).with_namespace("heaticus"),
        output.clone(),
        MonotonicClock::new(),
        telemetry.clone(),
    )
    .unwrap();

    assert_eq!(telemetry.gauge("heaticus_physical_fan_state"), Some(0.0));

    fan.on_for(secs(5)).unwrap();
    assert_eq!(telemetry.gauge("heaticus_physical_fan_state"), Some(1.0));

    tokio::time::sleep(ms(3_500)).await;
    assert_eq!(telemetry.counter("heaticus_physical_fan_on_time"), 3.0);

    tokio::time::sleep(secs(2)).await;
    assert_eq!(telemetry.gauge("heaticus_physical_fan_state"), Some(0.0));
    assert_eq!(telemetry.counter("heaticus_physical_fan_on_time"), 5.0);

    fan.shutdown().await.unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn shutdown_forces_off_and_is_idempotent() {
    let output = MockOutput::new();
    let fan = fan(secs(0), &output);

    fan.on_for(secs(30)).unwrap();
    fan.shutdown().await.unwrap();
    assert_eq!(output.current(), Some(false));
    assert!(!fan.status().is_on);

    fan.shutdown().await.unwrap();
    assert_eq!(
        fan.on_for(secs(1)).unwrap(),
        OnOffOutcome::Rejected(RejectReason::ShutDown)
    );
    assert_eq!(output.current(), Some(false));
}

#[tokio::test(start_paused = true)]
async fn shutdown_on_idle_actuator_writes_off() {
    let output = MockOutput::new();
    let fan = fan(secs(0), &output);

    fan.shutdown().await.unwrap();
    assert_eq!(output.levels(), vec![false]);
}
