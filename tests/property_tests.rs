//! Property tests for decoder resync, claim merging, debounce, and the flow ring

use proptest::prelude::*;

use rs_hydronic::{
    hal::MockClock, Debouncer, FlowMeter, FlowMeterConfig, FrameDecoder, OnOffState, Volume,
    WireFormat,
};

fn hex_line(serial: u8, inputs: u8, relays: u8) -> String {
    format!("{serial:02X}|{inputs:02X}|{relays:02X}")
}

proptest! {
    // ========================================================================
    // Frame Decoder
    // ========================================================================

    #[test]
    fn stray_terminator_then_complete_frame(
        partial in (any::<u8>(), any::<u8>(), any::<u8>(), 0usize..8),
        frame in (any::<u8>(), any::<u8>(), any::<u8>()),
    ) {
        let (ps, pi, pr, cut) = partial;
        let prefix = &hex_line(ps, pi, pr)[..cut];
        let stream = format!("{prefix}\n{}\n", hex_line(frame.0, frame.1, frame.2));

        let frames: Vec<_> = FrameDecoder::from_bytes(stream.as_bytes(), WireFormat::Hex).collect();
        prop_assert_eq!(frames.len(), 1);
        let decoded = frames[0].as_ref().unwrap();
        prop_assert_eq!(decoded.serial(), format!("{:02X}", frame.0));
        prop_assert_eq!(decoded.relay_state(), u32::from(frame.2));
        for bit in 0..8u8 {
            prop_assert_eq!(decoded.input_high(bit), frame.1 & (1 << bit) != 0);
        }
    }

    #[test]
    fn garbage_never_hides_the_next_frame(
        garbage in proptest::collection::vec(any::<u8>(), 0..64),
        frame in (any::<u8>(), any::<u8>(), any::<u8>()),
    ) {
        let mut stream = garbage;
        stream.push(b'\n');
        stream.extend_from_slice(hex_line(frame.0, frame.1, frame.2).as_bytes());
        stream.push(b'\n');

        let frames: Vec<_> = FrameDecoder::from_bytes(&stream, WireFormat::Hex).collect();
        let last = frames.last().unwrap().as_ref().unwrap();
        prop_assert_eq!(last.relay_state(), u32::from(frame.2));
    }

    // ========================================================================
    // Claims
    // ========================================================================

    #[test]
    fn on_until_latest_claim(
        claims in proptest::collection::vec((0u8..4, 1u64..10_000), 1..16),
        at in 0u64..12_000,
    ) {
        let mut state = OnOffState::new(0);
        for (claimant, until) in &claims {
            let outcome = state.needed_until(&format!("c{claimant}"), *until, 0);
            prop_assert!(outcome.is_accepted());
        }

        // Later claims from the same claimant replace earlier ones.
        let mut latest = std::collections::BTreeMap::new();
        for (claimant, until) in &claims {
            latest.insert(*claimant, *until);
        }
        let max = latest.values().copied().max().unwrap();

        // Until covers every live claim.
        prop_assert!(state.until_ms().unwrap() >= max);
        prop_assert_eq!(state.status(at).is_on, at < state.until_ms().unwrap());
    }

    #[test]
    fn blackout_never_shrinks(
        ops in proptest::collection::vec((0u8..4, 0u64..500), 1..64),
    ) {
        let mut state = OnOffState::new(1_000);
        let mut now = 0u64;
        let mut not_before = state.not_before_ms();
        for (op, step) in ops {
            now += step;
            match op {
                0 => { state.on_until(now + 300, now); }
                1 => { state.needed_until("a", now + 700, now); }
                2 => { state.off(now); }
                _ => { state.expire(now); }
            }
            prop_assert!(state.not_before_ms() >= not_before);
            if state.is_on() {
                prop_assert!(now >= not_before);
            }
            not_before = state.not_before_ms();
        }
    }

    // ========================================================================
    // Debounce
    // ========================================================================

    #[test]
    fn debouncer_respects_ignore_window(
        samples in proptest::collection::vec((any::<bool>(), 1u64..30), 1..200),
        debounce in 1u64..50,
    ) {
        let mut debouncer = Debouncer::new([1], debounce);
        let mut now = 0u64;
        let mut last: Option<(bool, u64)> = None;

        for (level, step) in samples {
            now += step;
            for event in debouncer.update([(1, level)], now) {
                if let Some((prev_level, prev_at)) = last {
                    prop_assert_ne!(event.level, prev_level);
                    prop_assert!(event.at_ms >= prev_at + debounce);
                } else {
                    prop_assert!(event.level);
                }
                last = Some((event.level, event.at_ms));
            }
        }
    }

    // ========================================================================
    // Flow Meter
    // ========================================================================

    #[test]
    fn ring_bounded_and_total_exact(
        pulses in 0usize..400,
        capacity in 1usize..150,
        start in 0u32..100,
    ) {
        let clock = MockClock::new();
        let config = FlowMeterConfig::new("m", Volume::from_litres(1.0))
            .with_max_event_count(capacity)
            .with_starting_volume(Volume::from_litres(f64::from(start)));
        let meter = FlowMeter::new(config, clock.clone()).unwrap();

        for _ in 0..pulses {
            clock.advance(7);
            meter.pulse();
            prop_assert!(meter.event_count() <= capacity);
        }
        prop_assert_eq!(meter.event_count(), pulses.min(capacity));
        prop_assert_eq!(meter.total().litres(), f64::from(start) + pulses as f64);
    }
}
