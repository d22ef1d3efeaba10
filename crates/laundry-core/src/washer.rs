//! Washer monitoring.
//!
//! A running washer frequently drops to ~7.5W but never for more than about
//! 10 seconds, and the 60-second maximum stays above 50W except while it
//! ramps up from 10-20W during the first ~20 seconds. That ramp can briefly
//! dip below the "off" ceiling, which the post-transition lockout absorbs.
//! When a load finishes the washer drops below 1W, then to 0W.

use crate::config::WasherConfig;
use crate::error::MonitorError;
use crate::monitor::{ApplianceState, Monitor};
use crate::window::{Classifier, WindowView, WindowedStep};
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasherPowerState {
    #[default]
    Off,
    On,
}

impl From<WasherPowerState> for ApplianceState {
    fn from(power_state: WasherPowerState) -> Self {
        match power_state {
            WasherPowerState::Off => ApplianceState::Off,
            WasherPowerState::On => ApplianceState::On,
        }
    }
}

/// Washer power-state classification with a post-transition lockout.
///
/// Holds an immutable snapshot of the power-state in force and the time it
/// was entered, so classifying a hypothetical later view never depends on
/// the monitor's live state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WasherClassifier {
    config: WasherConfig,
    previous: WasherPowerState,
    last_transition: Option<NaiveDateTime>,
}

impl WasherClassifier {
    pub fn new(
        config: WasherConfig,
        previous: WasherPowerState,
        last_transition: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            config,
            previous,
            last_transition,
        }
    }

    /// Instant from which a new transition is accepted again.
    pub fn lockout_expiry(&self) -> Option<NaiveDateTime> {
        self.last_transition
            .and_then(|t| t.checked_add_signed(self.config.lockout()))
    }

    fn locked_at(&self, time: NaiveDateTime) -> bool {
        matches!(self.lockout_expiry(), Some(expiry) if time < expiry)
    }

    /// Classification of `power` as if no lockout applied.
    pub fn candidate(&self, power: &WindowView<'_>) -> WasherPowerState {
        match self.previous {
            WasherPowerState::Off if power.max() >= self.config.on_min_watts => WasherPowerState::On,
            WasherPowerState::On if power.current() < self.config.off_max_watts => {
                WasherPowerState::Off
            }
            previous => previous,
        }
    }
}

impl Classifier for WasherClassifier {
    type Output = WasherPowerState;

    fn classify(&self, power: &WindowView<'_>) -> WasherPowerState {
        if self.locked_at(power.time()) {
            return self.previous;
        }
        self.candidate(power)
    }
}

#[derive(Debug, Clone)]
pub struct WasherMonitor {
    config: WasherConfig,
    state: ApplianceState,
    power_state: WasherPowerState,
    last_transition: Option<NaiveDateTime>,
    power: WindowedStep,
}

impl WasherMonitor {
    pub fn new(config: WasherConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            config,
            state: ApplianceState::Off,
            power_state: WasherPowerState::Off,
            last_transition: None,
            power: WindowedStep::new(config.window())?,
        })
    }

    pub fn power_state(&self) -> WasherPowerState {
        self.power_state
    }

    /// Time of the last power-state transition.
    pub fn last_transition(&self) -> Option<NaiveDateTime> {
        self.last_transition
    }

    pub fn power(&self) -> &WindowedStep {
        &self.power
    }

    /// Lockout expiry, if the window as aged to that instant calls for a
    /// transition the lockout is holding back.
    ///
    /// Before the expiry every transition is held; after it, changes only
    /// happen at eviction instants, which `process` already covers.
    fn held_transition(
        &self,
        classifier: &WasherClassifier,
        now: NaiveDateTime,
    ) -> Result<Option<NaiveDateTime>, MonitorError> {
        let Some(expiry) = classifier.lockout_expiry().filter(|e| *e > now) else {
            return Ok(None);
        };
        let aged = self.power.view_at(expiry)?;
        Ok((classifier.candidate(&aged) != self.power_state).then_some(expiry))
    }
}

fn next_state(
    state: ApplianceState,
    previous: WasherPowerState,
    power_state: WasherPowerState,
) -> ApplianceState {
    match (previous, power_state) {
        (WasherPowerState::On, WasherPowerState::Off) => ApplianceState::Done,
        (_, WasherPowerState::Off) if state == ApplianceState::Done => ApplianceState::Done,
        (_, power_state) => power_state.into(),
    }
}

fn earliest(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl Monitor for WasherMonitor {
    fn update(
        &mut self,
        time: NaiveDateTime,
        watts: Option<f64>,
    ) -> Result<Option<NaiveDateTime>, MonitorError> {
        self.power.update(time, watts)?;
        if self.power.is_empty() {
            return Ok(None);
        }

        let previous = self.power_state;
        let power_state = WasherClassifier::new(self.config, previous, self.last_transition)
            .classify(&self.power.view()?);
        if power_state != previous {
            debug!("washer power state {previous:?} -> {power_state:?} at {time}");
            self.power_state = power_state;
            self.last_transition = Some(time);
        }

        let state = next_state(self.state, previous, power_state);
        if state != self.state {
            debug!("washer state {} -> {} at {time}", self.state, state);
            self.state = state;
        }

        let classifier = WasherClassifier::new(self.config, power_state, self.last_transition);
        let forecast = self.power.process(&classifier)?;
        let held = self.held_transition(&classifier, time)?;
        Ok(earliest(forecast.next_change, held))
    }

    fn state(&self) -> ApplianceState {
        self.state
    }

    fn door_opened(&mut self) {
        if self.state == ApplianceState::Done {
            debug!("washer door opened; unloaded");
            self.state = ApplianceState::Off;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 3, 28)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn monitor() -> WasherMonitor {
        WasherMonitor::new(WasherConfig::default()).unwrap()
    }

    #[test]
    fn transitions_follow_power_state() {
        use ApplianceState::*;
        use WasherPowerState as P;
        assert_eq!(next_state(On, P::On, P::Off), Done);
        assert_eq!(next_state(Done, P::Off, P::Off), Done);
        assert_eq!(next_state(Off, P::Off, P::Off), Off);
        assert_eq!(next_state(Done, P::Off, P::On), On);
        assert_eq!(next_state(Off, P::Off, P::On), On);
    }

    #[test]
    fn washer_cycle() {
        let mut m = monitor();
        let mut t = 0;
        while t < 600 {
            m.update(at(t), Some(2.8)).unwrap();
            t += 10;
        }
        assert_eq!(m.state(), ApplianceState::Off);

        let t0 = t;
        while t < t0 + 20 * 60 {
            m.update(at(t), Some(520.0)).unwrap();
            assert_eq!(m.state(), ApplianceState::On);
            t += 10;
        }

        m.update(at(t), Some(0.3)).unwrap();
        assert_eq!(m.state(), ApplianceState::Done);
        m.update(at(t + 600), Some(0.3)).unwrap();
        assert_eq!(m.state(), ApplianceState::Done);

        m.door_opened();
        assert_eq!(m.state(), ApplianceState::Off);
        m.update(at(t + 700), Some(0.0)).unwrap();
        assert_eq!(m.state(), ApplianceState::Off);
    }

    #[test]
    fn door_ignored_while_running() {
        let mut m = monitor();
        m.update(at(0), Some(520.0)).unwrap();
        m.door_opened();
        assert_eq!(m.state(), ApplianceState::On);
    }

    #[test]
    fn lockout_defers_stop_and_schedules_its_expiry() {
        let mut m = monitor();
        m.update(at(0), Some(2.8)).unwrap();
        assert_eq!(m.update(at(30), Some(15.0)).unwrap(), None);
        m.update(at(40), Some(450.0)).unwrap();
        assert_eq!(m.power_state(), WasherPowerState::On);
        assert_eq!(m.last_transition(), Some(at(40)));

        // Ramp-up dip below the "off" ceiling: held by the lockout.
        let next = m.update(at(55), Some(3.0)).unwrap();
        assert_eq!(m.state(), ApplianceState::On);
        assert_eq!(next, Some(at(100)));

        // Power recovers before the lockout ends; nothing is pending.
        assert_eq!(m.update(at(62), Some(300.0)).unwrap(), None);
        assert_eq!(m.update(at(100), None).unwrap(), None);
        assert_eq!(m.state(), ApplianceState::On);
    }

    #[test]
    fn held_stop_applies_at_lockout_expiry() {
        let mut m = monitor();
        m.update(at(0), Some(600.0)).unwrap();
        let next = m.update(at(30), Some(0.4)).unwrap();
        assert_eq!(m.state(), ApplianceState::On);
        assert_eq!(next, Some(at(60)));

        assert_eq!(m.update(at(60), None).unwrap(), None);
        assert_eq!(m.state(), ApplianceState::Done);
        assert_eq!(m.last_transition(), Some(at(60)));
    }

    #[test]
    fn held_start_applies_at_lockout_expiry() {
        let mut m = monitor();
        m.update(at(0), Some(600.0)).unwrap();
        m.update(at(70), Some(0.2)).unwrap();
        assert_eq!(m.state(), ApplianceState::Done);

        // A short burst inside the lockout is remembered by the window max.
        m.update(at(80), Some(40.0)).unwrap();
        let next = m.update(at(85), Some(0.5)).unwrap();
        assert_eq!(m.state(), ApplianceState::Done);
        assert_eq!(next, Some(at(130)));

        m.update(at(130), None).unwrap();
        assert_eq!(m.state(), ApplianceState::On);
    }

    #[test]
    fn lockout_forecast_uses_snapshot() {
        let mut m = monitor();
        m.update(at(0), Some(600.0)).unwrap();
        let before = (m.power_state(), m.last_transition(), m.state());
        let view = m.power().view().unwrap();
        let classifier = WasherClassifier::new(WasherConfig::default(), before.0, before.1);
        assert_eq!(classifier.classify(&view), WasherPowerState::On);
        assert_eq!(classifier.lockout_expiry(), Some(at(60)));
        assert_eq!(m.power().process(&classifier).unwrap().next_change, None);
        assert_eq!((m.power_state(), m.last_transition(), m.state()), before);
    }
}
