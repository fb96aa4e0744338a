//! On/off state machine with blackout periods and merged demand claims.
//!
//! [`OnOffState`] is the pure core of a timed actuator. It owns no clock
//! and no output: every operation takes `now_ms` and returns an
//! [`OnOffOutcome`] describing the edge, if any, the caller must drive.
//! [`TimedActuator`](crate::actuator::TimedActuator) wraps it with a lock,
//! a background expiry task, and an output driver.
//!
//! # Rules
//!
//! - An on request during the blackout window is rejected with no effect.
//! - While on, the deadline is the latest of the most recent request and
//!   all live claims.
//! - Turning off (by request or expiry) starts a new blackout window.
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::onoff::{OnOffOutcome, OnOffState, RejectReason};
//!
//! let mut state = OnOffState::new(3_000);
//!
//! assert_eq!(state.on_until(2_000, 0), OnOffOutcome::TurnedOn);
//! assert_eq!(state.expire(2_000), OnOffOutcome::TurnedOff);
//!
//! // Blackout runs until 5_000.
//! assert_eq!(
//!     state.on_until(4_000, 2_000),
//!     OnOffOutcome::Rejected(RejectReason::Blackout { not_before_ms: 5_000 })
//! );
//! assert_eq!(state.on_until(7_000, 5_000), OnOffOutcome::TurnedOn);
//! ```

use std::collections::BTreeMap;

/// Why an on request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Still inside the minimum off period
    Blackout {
        /// Earliest time the output may turn on again
        not_before_ms: u64,
    },
    /// The requested deadline is not in the future
    AlreadyExpired,
    /// The actuator has been shut down
    ShutDown,
}

/// Result of a state machine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnOffOutcome {
    /// Off to on edge; drive the output on
    TurnedOn,
    /// Already on; only the deadline moved
    Rescheduled,
    /// On to off edge; drive the output off
    TurnedOff,
    /// Nothing changed
    Unchanged,
    /// On request refused; nothing changed
    Rejected(RejectReason),
}

impl OnOffOutcome {
    /// Output level this outcome requires, if it is an edge.
    pub fn edge(self) -> Option<bool> {
        match self {
            OnOffOutcome::TurnedOn => Some(true),
            OnOffOutcome::TurnedOff => Some(false),
            _ => None,
        }
    }

    /// Whether the request was accepted.
    pub fn is_accepted(self) -> bool {
        !matches!(self, OnOffOutcome::Rejected(_))
    }
}

/// Point-in-time view of an actuator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnOffStatus {
    /// Whether the output is logically on at the queried time
    pub is_on: bool,
    /// Deadline, when on
    pub until_ms: Option<u64>,
    /// End of the current blackout window
    pub not_before_ms: u64,
}

/// Timed on/off state.
#[derive(Clone, Debug)]
pub struct OnOffState {
    blackout_ms: u64,
    is_on: bool,
    until_ms: u64,
    not_before_ms: u64,
    claims: BTreeMap<String, u64>,
    shut_down: bool,
    accounted_ms: u64,
    unreported_on_ms: u64,
}

impl OnOffState {
    /// Off state with the given blackout period.
    pub fn new(blackout_ms: u64) -> Self {
        Self {
            blackout_ms,
            is_on: false,
            until_ms: 0,
            not_before_ms: 0,
            claims: BTreeMap::new(),
            shut_down: false,
            accounted_ms: 0,
            unreported_on_ms: 0,
        }
    }

    /// Whether the output is currently driven on.
    ///
    /// Unlike [`status`](Self::status) this does not look at the clock: it
    /// stays `true` past the deadline until [`expire`](Self::expire) runs.
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Current deadline, when on.
    pub fn until_ms(&self) -> Option<u64> {
        self.is_on.then_some(self.until_ms)
    }

    /// End of the blackout window.
    pub fn not_before_ms(&self) -> u64 {
        self.not_before_ms
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Latest live claim expiry (strictly after `now_ms`).
    pub fn max_claim(&self, now_ms: u64) -> Option<u64> {
        self.claims.values().copied().filter(|t| *t > now_ms).max()
    }

    /// Number of recorded claims, live or expired.
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Request on until `until_ms`.
    pub fn on_until(&mut self, until_ms: u64, now_ms: u64) -> OnOffOutcome {
        if self.shut_down {
            return OnOffOutcome::Rejected(RejectReason::ShutDown);
        }
        if now_ms < self.not_before_ms {
            return OnOffOutcome::Rejected(RejectReason::Blackout {
                not_before_ms: self.not_before_ms,
            });
        }
        if !self.is_on && until_ms <= now_ms {
            return OnOffOutcome::Rejected(RejectReason::AlreadyExpired);
        }

        self.until_ms = self.max_claim(now_ms).map_or(until_ms, |c| c.max(until_ms));
        if self.is_on {
            OnOffOutcome::Rescheduled
        } else {
            self.is_on = true;
            self.accounted_ms = now_ms;
            OnOffOutcome::TurnedOn
        }
    }

    /// Record `claimant`'s demand to stay on until `until_ms`, then request
    /// on until the latest live claim.
    ///
    /// The claim is kept even when the request is rejected, so a later
    /// claim from anyone merges with it once the blackout ends.
    pub fn needed_until(&mut self, claimant: &str, until_ms: u64, now_ms: u64) -> OnOffOutcome {
        if self.shut_down {
            return OnOffOutcome::Rejected(RejectReason::ShutDown);
        }
        match self.claims.get_mut(claimant) {
            Some(t) => *t = until_ms,
            None => {
                self.claims.insert(claimant.to_owned(), until_ms);
            }
        }
        let target = self.max_claim(now_ms).unwrap_or(now_ms);
        self.on_until(target, now_ms)
    }

    /// Turn off now. Always allowed; starts a blackout only if it was on.
    ///
    /// Claims are kept: one still live when the blackout ends merges into
    /// the next on request.
    pub fn off(&mut self, now_ms: u64) -> OnOffOutcome {
        if self.is_on {
            self.turn_off(now_ms, now_ms);
            OnOffOutcome::TurnedOff
        } else {
            OnOffOutcome::Unchanged
        }
    }

    /// Turn off if the deadline has passed.
    pub fn expire(&mut self, now_ms: u64) -> OnOffOutcome {
        if self.is_on && now_ms >= self.until_ms {
            self.turn_off(now_ms, self.until_ms.min(now_ms));
            OnOffOutcome::TurnedOff
        } else {
            OnOffOutcome::Unchanged
        }
    }

    /// Turn off, drop every claim, and refuse further on requests.
    pub fn shutdown(&mut self, now_ms: u64) -> OnOffOutcome {
        let outcome = self.off(now_ms);
        self.claims.clear();
        self.shut_down = true;
        outcome
    }

    /// Snapshot at `now_ms`, reporting off once the deadline has passed.
    pub fn status(&self, now_ms: u64) -> OnOffStatus {
        let is_on = self.is_on && now_ms < self.until_ms;
        OnOffStatus {
            is_on,
            until_ms: is_on.then_some(self.until_ms),
            not_before_ms: self.not_before_ms,
        }
    }

    /// On-time accumulated since the last call, in milliseconds.
    pub fn take_on_time_ms(&mut self, now_ms: u64) -> u64 {
        if self.is_on {
            let end = now_ms.min(self.until_ms).max(self.accounted_ms);
            self.unreported_on_ms += end - self.accounted_ms;
            self.accounted_ms = end;
        }
        core::mem::take(&mut self.unreported_on_ms)
    }

    fn turn_off(&mut self, now_ms: u64, ended_ms: u64) {
        self.unreported_on_ms += ended_ms.saturating_sub(self.accounted_ms);
        self.accounted_ms = ended_ms;
        self.is_on = false;
        self.not_before_ms = self.not_before_ms.max(now_ms.saturating_add(self.blackout_ms));
    }
}
