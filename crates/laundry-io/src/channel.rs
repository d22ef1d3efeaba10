//! Host-side plumbing for one monitored appliance.
//!
//! A channel feeds sensor updates, door events and its own scheduled
//! wake-ups into a monitor in time order, keeps the single pending wake-up,
//! and reports the published value whenever it changes.

use crate::metrics;
use crate::sensor::{Published, SensorFault, SensorReading};
use chrono::NaiveDateTime;
use laundry_core::{
    Appliance, ApplianceKind, Input, Monitor, MonitorError, ThresholdsConfig,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{kind} monitor rejected input: {source}")]
    Monitor {
        kind: ApplianceKind,
        #[source]
        source: MonitorError,
    },
}

#[derive(Debug)]
pub struct ApplianceChannel {
    monitor: Appliance,
    fault: Option<SensorFault>,
    published: Option<Published>,
    wake_at: Option<NaiveDateTime>,
}

impl ApplianceChannel {
    pub fn new(monitor: Appliance) -> Self {
        Self {
            monitor,
            fault: None,
            published: None,
            wake_at: None,
        }
    }

    pub fn kind(&self) -> ApplianceKind {
        self.monitor.kind()
    }

    pub fn monitor(&self) -> &Appliance {
        &self.monitor
    }

    /// Pending wake-up, if aging alone will change the monitor's answer.
    pub fn next_wake(&self) -> Option<NaiveDateTime> {
        self.wake_at
    }

    /// Value that should be published right now.
    pub fn current(&self) -> Published {
        match self.fault {
            Some(fault) => Published::Fault(fault),
            None => Published::Appliance(self.monitor.state()),
        }
    }

    /// Apply a raw sensor value received at `time`, returning the published
    /// changes in order.
    pub fn on_power(
        &mut self,
        time: NaiveDateTime,
        raw: &str,
    ) -> Result<Vec<Published>, ChannelError> {
        let kind = self.kind();
        let mut changes = self.catch_up(time)?;
        match SensorReading::parse(raw) {
            SensorReading::Watts(watts) => {
                metrics::record_reading(kind, watts);
                self.fault = None;
                self.feed(Input::Reading { time, watts })?;
            }
            SensorReading::Unavailable => {
                metrics::record_bad_reading(kind);
                self.fault = Some(SensorFault::Unavailable);
            }
            SensorReading::Problem(_) => {
                metrics::record_bad_reading(kind);
                self.fault = Some(SensorFault::Problem);
            }
        }
        changes.extend(self.publish_if_changed());
        Ok(changes)
    }

    pub fn on_door_opened(&mut self, time: NaiveDateTime) -> Result<Vec<Published>, ChannelError> {
        debug!(appliance = %self.kind(), "Door opened");
        let mut changes = self.catch_up(time)?;
        self.feed(Input::DoorOpened { time })?;
        changes.extend(self.publish_if_changed());
        Ok(changes)
    }

    /// Fire the pending wake-up if it is due at `time`.
    pub fn on_wake(&mut self, time: NaiveDateTime) -> Result<Option<Published>, ChannelError> {
        match self.wake_at {
            Some(deadline) if time >= deadline => {
                metrics::record_wakeup(self.kind());
                self.feed(Input::Tick { time })?;
                Ok(self.publish_if_changed())
            }
            _ => Ok(None),
        }
    }

    /// Fire every wake-up due at or before an event at `time`, each at its
    /// own deadline.
    fn catch_up(&mut self, time: NaiveDateTime) -> Result<Vec<Published>, ChannelError> {
        let mut changes = Vec::new();
        while let Some(deadline) = self.wake_at.filter(|deadline| *deadline <= time) {
            metrics::record_wakeup(self.kind());
            self.feed(Input::Tick { time: deadline })?;
            changes.extend(self.publish_if_changed());
        }
        Ok(changes)
    }

    fn feed(&mut self, input: Input) -> Result<(), ChannelError> {
        let kind = self.kind();
        let step = self
            .monitor
            .handle(input)
            .map_err(|source| ChannelError::Monitor { kind, source })?;
        // The newest forecast supersedes any wake-up armed earlier.
        self.wake_at = step.next_check;
        if let Some(next) = step.next_check {
            debug!(appliance = %kind, next_check = %next, "Wake-up armed");
        }
        Ok(())
    }

    fn publish_if_changed(&mut self) -> Option<Published> {
        let current = self.current();
        if self.published == Some(current) {
            return None;
        }
        self.published = Some(current);
        metrics::record_published(self.kind(), current);
        info!(appliance = %self.kind(), state = %current, "Appliance state changed");
        Some(current)
    }
}

/// Every monitored appliance, one channel each.
#[derive(Debug)]
pub struct ChannelSet {
    channels: Vec<ApplianceChannel>,
}

impl ChannelSet {
    pub fn new(thresholds: &ThresholdsConfig) -> Result<Self, MonitorError> {
        let channels = ApplianceKind::ALL
            .iter()
            .map(|kind| Appliance::new(*kind, thresholds).map(ApplianceChannel::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { channels })
    }

    pub fn get_mut(&mut self, kind: ApplianceKind) -> Option<&mut ApplianceChannel> {
        self.channels.iter_mut().find(|c| c.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplianceChannel> {
        self.channels.iter()
    }

    /// Fire every wake-up due at `time`, returning the changes it caused.
    pub fn fire_due(&mut self, time: NaiveDateTime) -> Vec<(ApplianceKind, Published)> {
        let mut changes = Vec::new();
        for channel in &mut self.channels {
            match channel.on_wake(time) {
                Ok(Some(published)) => changes.push((channel.kind(), published)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Wake-up failed"),
            }
        }
        changes
    }

    /// Earliest pending wake-up over all channels.
    pub fn next_wake(&self) -> Option<NaiveDateTime> {
        self.channels.iter().filter_map(|c| c.next_wake()).min()
    }
}
