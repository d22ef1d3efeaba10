use crate::config::ThresholdsConfig;
use crate::dryer::DryerMonitor;
use crate::error::{MonitorError, ParseApplianceError};
use crate::tags::ENTITY_DOMAIN;
use crate::washer::WasherMonitor;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Published lifecycle state of an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceState {
    #[default]
    Off,
    On,
    /// A load finished and has not been taken out yet.
    Done,
}

impl ApplianceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceState::Off => "off",
            ApplianceState::On => "on",
            ApplianceState::Done => "done",
        }
    }
}

impl fmt::Display for ApplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input to a monitor. Inputs must be fed in chronological order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// A new power reading in watts.
    Reading { time: NaiveDateTime, watts: f64 },
    /// Re-evaluation without a new reading, usually a scheduled wake-up.
    Tick { time: NaiveDateTime },
    DoorOpened { time: NaiveDateTime },
}

impl Input {
    pub fn time(&self) -> NaiveDateTime {
        match *self {
            Input::Reading { time, .. } | Input::Tick { time } | Input::DoorOpened { time } => time,
        }
    }
}

/// Outcome of one handled input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub state: ApplianceState,
    /// When to tick the monitor again if nothing else arrives first.
    pub next_check: Option<NaiveDateTime>,
}

pub trait Monitor {
    /// Advance to `time`, optionally with a new reading, and return the next
    /// time a tick is required even without new readings.
    fn update(
        &mut self,
        time: NaiveDateTime,
        watts: Option<f64>,
    ) -> Result<Option<NaiveDateTime>, MonitorError>;

    fn state(&self) -> ApplianceState;

    /// Appliances without a door sensor ignore this.
    fn door_opened(&mut self) {}

    fn handle(&mut self, input: Input) -> Result<Step, MonitorError> {
        let next_check = match input {
            Input::Reading { time, watts } => self.update(time, Some(watts))?,
            Input::Tick { time } => self.update(time, None)?,
            Input::DoorOpened { time } => {
                // Bring the monitor up to the event first so the door applies
                // to the state as of `time`.
                let next_check = self.update(time, None)?;
                self.door_opened();
                next_check
            }
        };
        Ok(Step {
            state: self.state(),
            next_check,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceKind {
    Washer,
    Dryer,
}

impl ApplianceKind {
    pub const ALL: [ApplianceKind; 2] = [ApplianceKind::Washer, ApplianceKind::Dryer];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceKind::Washer => "washer",
            ApplianceKind::Dryer => "dryer",
        }
    }

    /// Host entity the appliance state is published under.
    pub fn entity_id(&self) -> String {
        format!("{ENTITY_DOMAIN}.{}", self.as_str())
    }
}

impl fmt::Display for ApplianceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplianceKind {
    type Err = ParseApplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "washer" => Ok(ApplianceKind::Washer),
            "dryer" => Ok(ApplianceKind::Dryer),
            _ => Err(ParseApplianceError(s.to_string())),
        }
    }
}

/// Any supported appliance monitor.
#[derive(Debug, Clone)]
pub enum Appliance {
    Washer(WasherMonitor),
    Dryer(DryerMonitor),
}

impl Appliance {
    pub fn new(kind: ApplianceKind, thresholds: &ThresholdsConfig) -> Result<Self, MonitorError> {
        Ok(match kind {
            ApplianceKind::Washer => Appliance::Washer(WasherMonitor::new(thresholds.washer)?),
            ApplianceKind::Dryer => Appliance::Dryer(DryerMonitor::new(thresholds.dryer)?),
        })
    }

    pub fn kind(&self) -> ApplianceKind {
        match self {
            Appliance::Washer(_) => ApplianceKind::Washer,
            Appliance::Dryer(_) => ApplianceKind::Dryer,
        }
    }
}

impl Monitor for Appliance {
    fn update(
        &mut self,
        time: NaiveDateTime,
        watts: Option<f64>,
    ) -> Result<Option<NaiveDateTime>, MonitorError> {
        match self {
            Appliance::Washer(m) => m.update(time, watts),
            Appliance::Dryer(m) => m.update(time, watts),
        }
    }

    fn state(&self) -> ApplianceState {
        match self {
            Appliance::Washer(m) => m.state(),
            Appliance::Dryer(m) => m.state(),
        }
    }

    fn door_opened(&mut self) {
        match self {
            Appliance::Washer(m) => m.door_opened(),
            Appliance::Dryer(m) => m.door_opened(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 3, 29)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("washer".parse::<ApplianceKind>().unwrap(), ApplianceKind::Washer);
        assert_eq!(" Dryer ".parse::<ApplianceKind>().unwrap(), ApplianceKind::Dryer);
        assert!("oven".parse::<ApplianceKind>().is_err());
        assert_eq!(ApplianceKind::Dryer.entity_id(), "laundry.dryer");
    }

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&ApplianceState::Done).unwrap(), "\"done\"");
        assert_eq!(ApplianceState::On.to_string(), "on");
    }

    #[test]
    fn tick_before_any_reading_is_harmless() {
        let mut m = Appliance::new(ApplianceKind::Dryer, &ThresholdsConfig::default()).unwrap();
        let step = m.handle(Input::Tick { time: at(0) }).unwrap();
        assert_eq!(
            step,
            Step {
                state: ApplianceState::Off,
                next_check: None
            }
        );
    }

    #[test]
    fn handle_rejects_out_of_order_inputs() {
        let mut m = Appliance::new(ApplianceKind::Washer, &ThresholdsConfig::default()).unwrap();
        m.handle(Input::Reading {
            time: at(10),
            watts: 2.8,
        })
        .unwrap();
        let err = m.handle(Input::DoorOpened { time: at(5) }).unwrap_err();
        assert!(matches!(err, MonitorError::OutOfOrder { .. }));
    }

    #[test]
    fn door_event_reaches_washer_through_handle() {
        let mut m = Appliance::new(ApplianceKind::Washer, &ThresholdsConfig::default()).unwrap();
        m.handle(Input::Reading {
            time: at(0),
            watts: 520.0,
        })
        .unwrap();
        let step = m
            .handle(Input::Reading {
                time: at(600),
                watts: 0.3,
            })
            .unwrap();
        assert_eq!(step.state, ApplianceState::Done);

        let step = m.handle(Input::DoorOpened { time: at(700) }).unwrap();
        assert_eq!(step.state, ApplianceState::Off);
    }
}
