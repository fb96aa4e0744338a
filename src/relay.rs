//! Relay wiring and per-relay output drivers.
//!
//! Relay boards take the whole relay bitmask in one command, while
//! actuators drive a single output each. [`RelayBank`] holds the shared
//! mask and hands out one [`RelayOutput`] per relay; every edge updates
//! its bit and writes the full mask through a [`RelayPort`].
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::relay::{RelayBank, RelayMap};
//! use rs_hydronic::hal::MockRelayPort;
//! use rs_hydronic::traits::OutputDriver;
//!
//! let port = MockRelayPort::new();
//! let bank = RelayBank::new(port.clone(), RelayMap::sequent_8_relay());
//!
//! let mut pump = bank.output(2).unwrap();
//! let mut fan = bank.output(8).unwrap();
//! pump.set_output(true).unwrap();
//! fan.set_output(true).unwrap();
//!
//! assert_eq!(port.writes(), vec![0b0000_0100, 0b0000_0110]);
//! ```

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::sync::lock;
use crate::traits::OutputDriver;

/// Something that accepts a complete relay bitmask.
pub trait RelayPort: Send + Sync {
    /// Set every relay at once.
    fn write_relays(&self, mask: u32) -> io::Result<()>;
}

impl<P: RelayPort + ?Sized> RelayPort for Arc<P> {
    fn write_relays(&self, mask: u32) -> io::Result<()> {
        (**self).write_relays(mask)
    }
}

/// Relay number to mask bit wiring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RelayMap {
    bits: BTreeMap<u8, u8>,
}

impl RelayMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire `relay` to mask bit `bit`.
    pub fn with_relay(mut self, relay: u8, bit: u8) -> Self {
        self.bits.insert(relay, bit);
        self
    }

    /// Relays `1..=count` on bits `0..count`.
    pub fn identity(count: u8) -> Self {
        (0..count.min(32)).fold(Self::new(), |map, bit| map.with_relay(bit + 1, bit))
    }

    /// Sequent Microsystems 8-relay hat.
    pub fn sequent_8_relay() -> Self {
        [(1, 0), (8, 1), (2, 2), (7, 3), (4, 4), (5, 5), (3, 6), (6, 7)]
            .into_iter()
            .fold(Self::new(), |map, (relay, bit)| map.with_relay(relay, bit))
    }

    /// Mask bit for `relay`.
    pub fn bit(&self, relay: u8) -> Option<u8> {
        self.bits.get(&relay).copied()
    }
}

struct BankInner<P> {
    port: P,
    mask: Mutex<u32>,
}

/// Shared relay mask over one port.
pub struct RelayBank<P> {
    inner: Arc<BankInner<P>>,
    map: RelayMap,
}

impl<P> Clone for RelayBank<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            map: self.map.clone(),
        }
    }
}

impl<P: RelayPort> RelayBank<P> {
    /// Bank with every relay assumed off.
    pub fn new(port: P, map: RelayMap) -> Self {
        Self {
            inner: Arc::new(BankInner {
                port,
                mask: Mutex::new(0),
            }),
            map,
        }
    }

    /// Output driver for `relay`.
    pub fn output(&self, relay: u8) -> Result<RelayOutput<P>> {
        let bit = self
            .map
            .bit(relay)
            .filter(|b| *b < 32)
            .ok_or(Error::InvalidParameter("relay is not in the relay map"))?;
        Ok(RelayOutput {
            inner: Arc::clone(&self.inner),
            relay,
            bit,
        })
    }

    /// Last requested mask.
    pub fn mask(&self) -> u32 {
        *lock(&self.inner.mask)
    }

    /// Turn every relay off.
    pub fn all_off(&self) -> io::Result<()> {
        let mut mask = lock(&self.inner.mask);
        *mask = 0;
        self.inner.port.write_relays(0)
    }
}

/// One relay of a [`RelayBank`].
pub struct RelayOutput<P> {
    inner: Arc<BankInner<P>>,
    relay: u8,
    bit: u8,
}

impl<P> RelayOutput<P> {
    /// Relay number.
    pub fn relay(&self) -> u8 {
        self.relay
    }
}

impl<P: RelayPort> OutputDriver for RelayOutput<P> {
    fn set_output(&mut self, on: bool) -> io::Result<()> {
        // The mask lock is held across the write so commands leave in order.
        let mut mask = lock(&self.inner.mask);
        if on {
            *mask |= 1 << self.bit;
        } else {
            *mask &= !(1 << self.bit);
        }
        self.inner.port.write_relays(*mask).inspect_err(|e| {
            log::warn!("relay {} write failed: {e}", self.relay);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockRelayPort;

    #[test]
    fn identity_map_is_one_based() {
        let map = RelayMap::identity(4);
        assert_eq!(map.bit(1), Some(0));
        assert_eq!(map.bit(4), Some(3));
        assert_eq!(map.bit(5), None);
        assert_eq!(map.bit(0), None);
    }

    #[test]
    fn sequent_map_matches_hat_wiring() {
        let map = RelayMap::sequent_8_relay();
        assert_eq!(map.bit(1), Some(0));
        assert_eq!(map.bit(8), Some(1));
        assert_eq!(map.bit(3), Some(6));
        assert_eq!(map.bit(6), Some(7));
    }

    #[test]
    fn unmapped_relay_is_rejected() {
        let bank = RelayBank::new(MockRelayPort::new(), RelayMap::identity(2));
        assert!(matches!(bank.output(3), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn outputs_share_one_mask() {
        let port = MockRelayPort::new();
        let bank = RelayBank::new(port.clone(), RelayMap::identity(8));
        let mut a = bank.output(1).unwrap();
        let mut b = bank.output(3).unwrap();

        a.set_output(true).unwrap();
        b.set_output(true).unwrap();
        a.set_output(false).unwrap();

        assert_eq!(port.writes(), vec![0b001, 0b101, 0b100]);
        assert_eq!(bank.mask(), 0b100);
    }

    #[test]
    fn failed_write_keeps_requested_mask() {
        let port = MockRelayPort::new();
        let bank = RelayBank::new(port.clone(), RelayMap::identity(8));
        let mut a = bank.output(2).unwrap();

        port.fail_next_writes(1);
        assert!(a.set_output(true).is_err());
        assert_eq!(bank.mask(), 0b10);

        a.set_output(true).unwrap();
        assert_eq!(port.writes(), vec![0b10]);
    }

    #[test]
    fn all_off_clears_mask() {
        let port = MockRelayPort::new();
        let bank = RelayBank::new(port.clone(), RelayMap::identity(8));
        bank.output(1).unwrap().set_output(true).unwrap();
        bank.all_off().unwrap();
        assert_eq!(bank.mask(), 0);
        assert_eq!(port.writes().last(), Some(&0));
    }
}
