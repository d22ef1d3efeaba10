use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Dryer thresholds, tuned on a dryer that idles at ~1.5W, draws ~5W with the
/// control panel on, ~11.7W with the door open and ~200-250W while running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DryerConfig {
    /// Instantaneous ceiling for "off".
    pub off_max_watts: f64,
    /// Windowed floor for "on".
    pub on_min_watts: f64,
    /// Windowed ceiling for "door open".
    pub door_max_watts: f64,
    pub window_secs: u32,
}

impl Default for DryerConfig {
    fn default() -> Self {
        Self {
            off_max_watts: 8.0,
            on_min_watts: 150.0,
            door_max_watts: 15.0,
            window_secs: 15,
        }
    }
}

impl DryerConfig {
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.window_secs))
    }
}

/// Washer thresholds. The control panel alone draws ~2.8W; a running washer
/// often dips to ~7.5W but never for long, so "on" uses the windowed maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasherConfig {
    /// Windowed maximum that marks the washer running.
    pub on_min_watts: f64,
    /// Instantaneous ceiling for "off".
    pub off_max_watts: f64,
    pub window_secs: u32,
    /// Minimum dwell after a power-state transition before the next one.
    pub lockout_secs: u32,
}

impl Default for WasherConfig {
    fn default() -> Self {
        Self {
            on_min_watts: 20.0,
            off_max_watts: 5.0,
            window_secs: 60,
            lockout_secs: 60,
        }
    }
}

impl WasherConfig {
    pub fn window(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.window_secs))
    }

    pub fn lockout(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.lockout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub washer: WasherConfig,
    pub dryer: DryerConfig,
}
