//! Translation of raw power-sensor values.
//!
//! The monitors only ever see usable wattage. Everything else a sensor can
//! report is turned into a sentinel that is published in place of the
//! appliance state until the sensor recovers.

use laundry_core::ApplianceState;
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// Raw state string a host uses for a sensor it cannot reach.
pub const STATE_UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Watts(f64),
    Unavailable,
    /// Anything that is not a finite, non-negative number.
    Problem(String),
}

impl SensorReading {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == STATE_UNAVAILABLE {
            return SensorReading::Unavailable;
        }
        match raw.parse::<f64>() {
            Ok(watts) if watts.is_finite() && watts >= 0.0 => SensorReading::Watts(watts),
            _ => {
                warn!(value = %raw, "Unusable power reading");
                SensorReading::Problem(raw.to_string())
            }
        }
    }
}

/// Sentinel published while the sensor has no usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorFault {
    Unavailable,
    Problem,
}

/// Value published for an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Published {
    Appliance(ApplianceState),
    Fault(SensorFault),
}

impl Published {
    pub fn as_str(&self) -> &'static str {
        match self {
            Published::Appliance(state) => state.as_str(),
            Published::Fault(SensorFault::Unavailable) => STATE_UNAVAILABLE,
            Published::Fault(SensorFault::Problem) => "problem",
        }
    }

    /// Numeric encoding for the state gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            Published::Appliance(ApplianceState::Off) => 0.0,
            Published::Appliance(ApplianceState::On) => 1.0,
            Published::Appliance(ApplianceState::Done) => 2.0,
            Published::Fault(SensorFault::Unavailable) => -1.0,
            Published::Fault(SensorFault::Problem) => -2.0,
        }
    }
}

impl fmt::Display for Published {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Published {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
