//! Volume and volume-flow-rate quantities.
//!
//! Volumes are stored in litres, flow rates in litres per minute. Both parse
//! from human strings with a unit suffix so configuration can say `"0.1gal"`
//! or `"100 ml"` instead of a bare number.
//!
//! ```rust
//! use rs_hydronic::units::{Volume, VolumeFlowRate};
//!
//! let pulse = Volume::parse("100ml").unwrap();
//! assert_eq!(pulse.to_string(), "0.100L");
//!
//! let rate = VolumeFlowRate::parse("2 lpm").unwrap();
//! assert_eq!(rate.to_string(), "2.000Lpm");
//! ```

use core::fmt;
use core::ops::{Add, AddAssign, Mul};

use crate::error::{Error, Result};

/// Litres in one (imperial) gallon.
pub const LITRES_PER_GALLON: f64 = 4.54609;

/// A volume in litres.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Volume(f64);

struct Suffix {
    text: &'static str,
    plural: bool,
    scale: f64,
}

// Order matters: longer suffixes must be tried before their tails.
const VOLUME_SUFFIXES: &[Suffix] = &[
    Suffix { text: "milliliter", plural: true, scale: 0.001 },
    Suffix { text: "millilitre", plural: true, scale: 0.001 },
    Suffix { text: "liter", plural: true, scale: 1.0 },
    Suffix { text: "litre", plural: true, scale: 1.0 },
    Suffix { text: "gallon", plural: true, scale: LITRES_PER_GALLON },
    Suffix { text: "gal", plural: false, scale: LITRES_PER_GALLON },
    Suffix { text: "ml", plural: false, scale: 0.001 },
    Suffix { text: "g", plural: false, scale: LITRES_PER_GALLON },
    Suffix { text: "l", plural: false, scale: 1.0 },
];

const RATE_SUFFIXES: &[Suffix] = &[
    Suffix { text: "gpm", plural: false, scale: LITRES_PER_GALLON },
    Suffix { text: "lpm", plural: false, scale: 1.0 },
];

fn parse_with(s: &str, table: &[Suffix]) -> Result<f64> {
    let lower = s.trim().to_ascii_lowercase();

    for unit in table {
        let number = if let Some(n) = lower.strip_suffix(unit.text) {
            Some(n)
        } else if unit.plural {
            lower
                .strip_suffix('s')
                .and_then(|n| n.strip_suffix(unit.text))
        } else {
            None
        };

        if let Some(number) = number {
            let number = number.trim();
            return number
                .parse::<f64>()
                .map(|n| n * unit.scale)
                .map_err(|e| Error::InvalidUnit(format!("'{number}' {e}")));
        }
    }

    let known: Vec<&str> = table.iter().map(|u| u.text).collect();
    Err(Error::InvalidUnit(format!(
        "unknown unit for '{}' valid: {}",
        s,
        known.join(", ")
    )))
}

impl Volume {
    /// Zero litres.
    pub const ZERO: Volume = Volume(0.0);

    /// Volume from litres.
    #[inline]
    pub const fn from_litres(litres: f64) -> Self {
        Self(litres)
    }

    /// Parse a volume with a required unit suffix.
    ///
    /// Accepts `ml`, `l`, `g`/`gal`, and the spelled-out singular or plural
    /// forms of millilitre, litre, and gallon in either spelling.
    pub fn parse(s: &str) -> Result<Self> {
        parse_with(s, VOLUME_SUFFIXES).map(Self)
    }

    /// The volume in litres.
    #[inline]
    pub const fn litres(self) -> f64 {
        self.0
    }

    /// The volume in gallons.
    #[inline]
    pub fn gallons(self) -> f64 {
        self.0 / LITRES_PER_GALLON
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}L", self.0)
    }
}

impl core::str::FromStr for Volume {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Add for Volume {
    type Output = Volume;

    fn add(self, rhs: Volume) -> Volume {
        Volume(self.0 + rhs.0)
    }
}

impl AddAssign for Volume {
    fn add_assign(&mut self, rhs: Volume) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for Volume {
    type Output = Volume;

    fn mul(self, rhs: f64) -> Volume {
        Volume(self.0 * rhs)
    }
}

/// A flow rate in litres per minute.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct VolumeFlowRate(f64);

impl VolumeFlowRate {
    /// No flow.
    pub const ZERO: VolumeFlowRate = VolumeFlowRate(0.0);

    /// Rate from litres per minute.
    #[inline]
    pub const fn from_lpm(lpm: f64) -> Self {
        Self(lpm)
    }

    /// Parse a rate with a required `lpm` or `gpm` suffix.
    pub fn parse(s: &str) -> Result<Self> {
        parse_with(s, RATE_SUFFIXES).map(Self)
    }

    /// The rate in litres per minute.
    #[inline]
    pub const fn lpm(self) -> f64 {
        self.0
    }

    /// The rate in gallons per minute.
    #[inline]
    pub fn gpm(self) -> f64 {
        self.0 / LITRES_PER_GALLON
    }
}

impl fmt::Display for VolumeFlowRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}Lpm", self.0)
    }
}

impl core::str::FromStr for VolumeFlowRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
