//! Dryer monitoring.
//!
//! While running the dryer draws ~200-250W with a spike to ~700W every few
//! minutes. A start draws 1200-1700W for about a second. In wrinkle protect it
//! mostly idles at ~1.5W, except that every 5 minutes it spikes to
//! ~1500-2000W for a second and holds ~200W for 10 seconds. Requiring the
//! whole window above the "on" floor filters those cycles out.
//!
//! Going between off and a high-power state can pass through the door-open
//! band, so "door" also needs the whole window inside that band.

use crate::config::DryerConfig;
use crate::error::MonitorError;
use crate::monitor::{ApplianceState, Monitor};
use crate::window::{Classifier, WindowView, WindowedStep};
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DryerPowerState {
    #[default]
    Off,
    On,
    /// Door open: lamp on, drum idle.
    Door,
}

/// Dryer power-state classification over a power window.
///
/// `previous` is the power-state kept when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DryerClassifier {
    config: DryerConfig,
    previous: DryerPowerState,
}

impl DryerClassifier {
    pub fn new(config: DryerConfig, previous: DryerPowerState) -> Self {
        Self { config, previous }
    }
}

impl Classifier for DryerClassifier {
    type Output = DryerPowerState;

    fn classify(&self, power: &WindowView<'_>) -> DryerPowerState {
        let cfg = &self.config;
        // It never has a transient drop this low.
        if power.current() < cfg.off_max_watts {
            return DryerPowerState::Off;
        }
        if power.min() >= cfg.on_min_watts {
            return DryerPowerState::On;
        }
        if power.min() > cfg.off_max_watts && power.max() < cfg.door_max_watts {
            return DryerPowerState::Door;
        }
        self.previous
    }
}

#[derive(Debug, Clone)]
pub struct DryerMonitor {
    config: DryerConfig,
    state: ApplianceState,
    power_state: DryerPowerState,
    power: WindowedStep,
}

impl DryerMonitor {
    pub fn new(config: DryerConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            config,
            state: ApplianceState::Off,
            power_state: DryerPowerState::Off,
            power: WindowedStep::new(config.window())?,
        })
    }

    pub fn power_state(&self) -> DryerPowerState {
        self.power_state
    }

    pub fn power(&self) -> &WindowedStep {
        &self.power
    }
}

fn next_state(state: ApplianceState, power_state: DryerPowerState) -> ApplianceState {
    match (state, power_state) {
        // Finished; clothes are ready until someone opens the door.
        (ApplianceState::On | ApplianceState::Done, DryerPowerState::Off) => ApplianceState::Done,
        // Being loaded or unloaded.
        (_, DryerPowerState::Off | DryerPowerState::Door) => ApplianceState::Off,
        (_, DryerPowerState::On) => ApplianceState::On,
    }
}

impl Monitor for DryerMonitor {
    fn update(
        &mut self,
        time: NaiveDateTime,
        watts: Option<f64>,
    ) -> Result<Option<NaiveDateTime>, MonitorError> {
        self.power.update(time, watts)?;
        if self.power.is_empty() {
            return Ok(None);
        }

        let power_state =
            DryerClassifier::new(self.config, self.power_state).classify(&self.power.view()?);
        // Forecast against the power-state just settled: it is the one in
        // force until the first change.
        let forecast = self
            .power
            .process(&DryerClassifier::new(self.config, power_state))?;

        if power_state != self.power_state {
            debug!("dryer power state {:?} -> {:?} at {time}", self.power_state, power_state);
            self.power_state = power_state;
        }
        let state = next_state(self.state, power_state);
        if state != self.state {
            debug!("dryer state {} -> {} at {time}", self.state, state);
            self.state = state;
        }

        Ok(forecast.next_change)
    }

    fn state(&self) -> ApplianceState {
        self.state
    }
}
