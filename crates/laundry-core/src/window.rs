//! Time-windowed view of a step-wise continuous signal.
//!
//! A [`WindowedStep`] keeps the samples of a piecewise-constant signal that
//! still cover the trailing `duration` of time. Besides the usual aggregate
//! queries it can forecast when a pure [`Classifier`] over the window would
//! change its answer if no further input ever arrived, so callers can arm a
//! single wake-up instead of polling.

use crate::error::MonitorError;
use chrono::{NaiveDateTime, TimeDelta};
use log::warn;
use std::collections::VecDeque;

/// One step of the signal. `value` holds from `time` until the next sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: NaiveDateTime,
    pub value: f64,
}

/// Read-only view of a window as it is, or as it would be at a later time.
///
/// A view always holds at least one sample.
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    samples: &'a VecDeque<Sample>,
    first: usize,
    now: NaiveDateTime,
}

impl<'a> WindowView<'a> {
    /// The instant this view describes.
    pub fn time(&self) -> NaiveDateTime {
        self.now
    }

    /// Value of the most recent sample.
    pub fn current(&self) -> f64 {
        self.samples[self.samples.len() - 1].value
    }

    pub fn min(&self) -> f64 {
        self.values().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values().fold(f64::NEG_INFINITY, f64::max)
    }

    fn values(&self) -> impl Iterator<Item = f64> + 'a {
        let samples = self.samples;
        samples.range(self.first..).map(|s| s.value)
    }
}

/// A pure classification of a window.
///
/// Implementations must be side-effect free and return the same output for
/// views with the same contents and time: [`WindowedStep::process`] calls
/// them repeatedly on hypothetical views.
pub trait Classifier {
    type Output: PartialEq;

    fn classify(&self, view: &WindowView<'_>) -> Self::Output;
}

impl<F, T> Classifier for F
where
    F: Fn(&WindowView<'_>) -> T,
    T: PartialEq,
{
    type Output = T;

    fn classify(&self, view: &WindowView<'_>) -> T {
        self(view)
    }
}

/// Result of [`WindowedStep::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forecast<T> {
    /// Classification of the window as it is now.
    pub value: T,
    /// Earliest instant at which aging alone changes the classification.
    pub next_change: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct WindowedStep {
    duration: TimeDelta,
    samples: VecDeque<Sample>,
    latest: Option<NaiveDateTime>,
}

impl WindowedStep {
    pub fn new(duration: TimeDelta) -> Result<Self, MonitorError> {
        if duration <= TimeDelta::zero() {
            return Err(MonitorError::InvalidWindow(duration));
        }
        Ok(Self {
            duration,
            samples: VecDeque::new(),
            latest: None,
        })
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    /// Time of the most recent update, reading or tick.
    pub fn latest(&self) -> Option<NaiveDateTime> {
        self.latest
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Move the window forward to end at `time`, optionally recording a step
    /// of the signal to `value` at `time`.
    ///
    /// Times must never go backwards; an older `time` is rejected and the
    /// window is left as it was.
    pub fn update(&mut self, time: NaiveDateTime, value: Option<f64>) -> Result<(), MonitorError> {
        if let Some(latest) = self.latest {
            if time < latest {
                warn!("rejecting window update at {time}: latest update was at {latest}");
                return Err(MonitorError::OutOfOrder { time, latest });
            }
        }
        self.latest = Some(time);

        let start = time
            .checked_sub_signed(self.duration)
            .unwrap_or(NaiveDateTime::MIN);
        let mut evicted = None;
        while let Some(front) = self.samples.front() {
            if front.time > start {
                break;
            }
            evicted = self.samples.pop_front();
        }
        // The last evicted step still covers the trailing edge up to the
        // next sample. Put it back, starting at the edge.
        if let Some(last) = evicted {
            self.samples.push_front(Sample {
                time: start,
                value: last.value,
            });
        }

        if let Some(value) = value {
            match self.samples.back_mut() {
                // A zero-length step covers nothing.
                Some(back) if back.time == time => back.value = value,
                _ => self.samples.push_back(Sample { time, value }),
            }
        }
        Ok(())
    }

    /// Value of the most recent sample, regardless of the window size.
    pub fn current(&self) -> Option<f64> {
        self.samples.back().map(|s| s.value)
    }

    pub fn min(&self) -> Option<f64> {
        self.view().ok().map(|view| view.min())
    }

    pub fn max(&self) -> Option<f64> {
        self.view().ok().map(|view| view.max())
    }

    /// View of the window as of the latest update.
    pub fn view(&self) -> Result<WindowView<'_>, MonitorError> {
        match self.latest {
            Some(now) if !self.samples.is_empty() => Ok(WindowView {
                samples: &self.samples,
                first: 0,
                now,
            }),
            _ => Err(MonitorError::EmptyWindow),
        }
    }

    /// View of the window as it would be at `time` if no input arrived in
    /// between.
    pub fn view_at(&self, time: NaiveDateTime) -> Result<WindowView<'_>, MonitorError> {
        let view = self.view()?;
        if time < view.now {
            return Err(MonitorError::OutOfOrder {
                time,
                latest: view.now,
            });
        }
        let start = time
            .checked_sub_signed(self.duration)
            .unwrap_or(NaiveDateTime::MIN);
        // A step has left the window once its successor starts at or before
        // the trailing edge.
        let mut first = 0;
        while first + 1 < self.samples.len() && self.samples[first + 1].time <= start {
            first += 1;
        }
        Ok(WindowView { first, now: time, ..view })
    }

    /// Classify the window and forecast when aging alone would change the
    /// result.
    ///
    /// The forecast walks the instants at which each remaining sample's
    /// predecessor leaves the window and re-classifies the truncated window
    /// there. The first instant whose result differs is returned; `None`
    /// means the classification is stable until new input arrives.
    pub fn process<C: Classifier>(&self, classifier: &C) -> Result<Forecast<C::Output>, MonitorError> {
        let view = self.view()?;
        let value = classifier.classify(&view);

        for (first, sample) in self.samples.iter().enumerate().skip(1) {
            let Some(now) = sample.time.checked_add_signed(self.duration) else {
                break;
            };
            let aged = WindowView { first, now, ..view };
            if classifier.classify(&aged) != value {
                return Ok(Forecast {
                    value,
                    next_change: Some(now),
                });
            }
        }

        Ok(Forecast {
            value,
            next_change: None,
        })
    }
}
