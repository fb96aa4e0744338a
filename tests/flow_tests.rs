//! Flow meter totals, ring bounds, and windowed rates

use std::sync::Arc;
use std::time::Duration;

use rs_hydronic::{hal::MockClock, Error, FlowMeter, FlowMeterConfig, Volume};

const MINUTE_MS: u64 = 60_000;

fn litres(s: &str) -> Volume {
    Volume::parse(s).unwrap()
}

// ============================================================================
// Totals and Rates
// ============================================================================

#[test]
fn steady_pulses_one_per_minute() {
    let clock = MockClock::new();
    let meter = FlowMeter::new(FlowMeterConfig::new("name", litres("1L")), clock.clone()).unwrap();

    for _ in 0..105 {
        clock.advance(MINUTE_MS);
        meter.pulse();
    }

    assert_eq!(meter.event_count(), 100);
    assert_eq!(meter.total().to_string(), "105.000L");
    assert_eq!(meter.to_string(), "name:105.000L");
    assert_eq!(meter.flow(Duration::from_secs(5 * 60)).to_string(), "1.000Lpm");
}

#[test]
fn starting_volume_and_idle_window() {
    let clock = MockClock::new();
    let config = FlowMeterConfig::new("name", litres("1L"))
        .with_starting_volume(litres("1L"))
        .with_max_event_count(10);
    let meter = FlowMeter::new(config, clock.clone()).unwrap();

    for _ in 0..15 {
        clock.advance(MINUTE_MS);
        meter.pulse();
    }
    clock.advance(5 * MINUTE_MS);

    assert_eq!(meter.event_count(), 10);
    assert_eq!(meter.total().to_string(), "16.000L");
    assert_eq!(meter.to_string(), "name:16.000L");
    assert_eq!(meter.flow(Duration::from_secs(5)).to_string(), "0.000Lpm");
}

#[test]
fn pulse_at_clock_epoch_counts_in_longer_window() {
    let clock = MockClock::new();
    let meter = FlowMeter::new(FlowMeterConfig::new("hot", litres("1L")), clock.clone()).unwrap();

    meter.pulse();
    clock.advance(30_000);

    assert_eq!(meter.flow(Duration::from_secs(60)).to_string(), "1.000Lpm");
    assert_eq!(meter.flow(Duration::from_secs(10)).to_string(), "0.000Lpm");
}

#[test]
fn five_pulses_over_five_minutes() {
    let clock = MockClock::new();
    clock.set(10 * MINUTE_MS);
    let meter = FlowMeter::new(FlowMeterConfig::new("cold", litres("1L")), clock.clone()).unwrap();

    for _ in 0..5 {
        clock.advance(MINUTE_MS);
        meter.pulse();
    }

    let rate = meter.flow(Duration::from_secs(5 * 60));
    assert!((rate.lpm() - 1.0).abs() < 1e-9);
}

#[test]
fn gallon_pulses_report_in_litres() {
    let clock = MockClock::new();
    let meter =
        FlowMeter::new(FlowMeterConfig::new("hot", litres("0.1gal")), clock.clone()).unwrap();

    for _ in 0..10 {
        meter.pulse();
    }
    assert!((meter.total().gallons() - 1.0).abs() < 1e-9);
    assert_eq!(meter.total().to_string(), "4.546L");
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn invalid_pulse_volume_is_refused() {
    let result = FlowMeter::new(FlowMeterConfig::new("name", Volume::ZERO), MockClock::new());
    assert!(matches!(result, Err(Error::InvalidParameter(_))));
}

#[test]
fn negative_starting_volume_is_clamped() {
    let config = FlowMeterConfig::new("name", litres("1L")).with_starting_volume(Volume::from_litres(-3.0));
    let meter = FlowMeter::new(config, MockClock::new()).unwrap();
    assert_eq!(meter.total(), Volume::ZERO);
}

#[test]
fn zero_capacity_uses_default() {
    let clock = MockClock::new();
    let config = FlowMeterConfig::new("name", litres("1L")).with_max_event_count(0);
    let meter = FlowMeter::new(config, clock.clone()).unwrap();
    for _ in 0..150 {
        meter.pulse();
    }
    assert_eq!(meter.event_count(), 100);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_pulses_and_reads() {
    let clock = MockClock::new();
    let meter = Arc::new(
        FlowMeter::new(FlowMeterConfig::new("main", litres("1L")), clock.clone()).unwrap(),
    );

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let meter = Arc::clone(&meter);
            std::thread::spawn(move || {
                for _ in 0..250 {
                    meter.pulse();
                }
            })
        })
        .collect();

    let reader = {
        let meter = Arc::clone(&meter);
        std::thread::spawn(move || {
            for _ in 0..100 {
                assert!(meter.event_count() <= 100);
                let _ = meter.flow(Duration::from_secs(60));
            }
        })
    };

    for p in producers {
        p.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(meter.total().litres(), 1000.0);
    assert_eq!(meter.event_count(), 100);
}
