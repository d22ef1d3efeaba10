#[cfg(test)]
mod proptest_monitor {
    use crate::config::{DryerConfig, WasherConfig};
    use crate::dryer::{DryerClassifier, DryerMonitor, DryerPowerState};
    use crate::monitor::{ApplianceState, Monitor};
    use crate::washer::{WasherMonitor, WasherPowerState};
    use crate::window::{Classifier, WindowedStep};
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use proptest::prelude::*;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 3, 29)
            .unwrap()
            .and_hms_opt(20, 30, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn washer_watts() -> impl Strategy<Value = f64> {
        prop::sample::select(vec![0.0, 0.3, 2.8, 4.0, 7.5, 15.0, 25.0, 520.0])
    }

    fn dryer_watts() -> impl Strategy<Value = f64> {
        prop::sample::select(vec![0.0, 1.5, 5.0, 9.0, 11.7, 14.0, 40.0, 160.0, 220.0, 700.0, 1800.0])
    }

    /// Readings as (seconds since previous reading, watts).
    fn readings(watts: impl Strategy<Value = f64>) -> impl Strategy<Value = Vec<(i64, f64)>> {
        prop::collection::vec((1i64..40, watts), 1..80)
    }

    /// Feed readings and fire every returned deadline that falls strictly
    /// before the next reading. Returns the state right after each reading.
    fn event_driven<M: Monitor>(
        monitor: &mut M,
        readings: &[(i64, f64)],
        mut observe: impl FnMut(&M, NaiveDateTime),
    ) -> Vec<ApplianceState> {
        let mut states = Vec::new();
        let mut wake: Option<NaiveDateTime> = None;
        let mut now = 0;
        for &(gap, watts) in readings {
            now += gap;
            while let Some(deadline) = wake.filter(|d| *d < at(now)) {
                wake = monitor.update(deadline, None).unwrap();
                observe(monitor, deadline);
            }
            wake = monitor.update(at(now), Some(watts)).unwrap();
            observe(monitor, at(now));
            states.push(monitor.state());
        }
        states
    }

    /// Re-evaluate every second, whether or not anything was scheduled.
    fn polled<M: Monitor>(monitor: &mut M, readings: &[(i64, f64)]) -> Vec<ApplianceState> {
        let mut states = Vec::new();
        let mut now = 0;
        for &(gap, watts) in readings {
            for tick in 1..gap {
                monitor.update(at(now + tick), None).unwrap();
            }
            now += gap;
            monitor.update(at(now), Some(watts)).unwrap();
            states.push(monitor.state());
        }
        states
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        // Property: wake-ups reproduce what per-second polling would see
        #[test]
        fn dryer_wakeups_match_polling(readings in readings(dryer_watts())) {
            let config = DryerConfig::default();
            let mut woken = DryerMonitor::new(config).unwrap();
            let mut polling = DryerMonitor::new(config).unwrap();
            let expected = polled(&mut polling, &readings);
            prop_assert_eq!(event_driven(&mut woken, &readings, |_, _| {}), expected);
        }

        #[test]
        fn washer_wakeups_match_polling(readings in readings(washer_watts())) {
            let config = WasherConfig::default();
            let mut woken = WasherMonitor::new(config).unwrap();
            let mut polling = WasherMonitor::new(config).unwrap();
            let expected = polled(&mut polling, &readings);
            prop_assert_eq!(event_driven(&mut woken, &readings, |_, _| {}), expected);
        }

        // Property: washer power-state transitions are at least a lockout apart
        #[test]
        fn washer_transitions_respect_lockout(readings in readings(washer_watts())) {
            let config = WasherConfig::default();
            let mut monitor = WasherMonitor::new(config).unwrap();
            let mut transitions: Vec<NaiveDateTime> = Vec::new();
            let mut last = WasherPowerState::Off;
            event_driven(&mut monitor, &readings, |m, time| {
                if m.power_state() != last {
                    transitions.push(time);
                    last = m.power_state();
                }
            });
            for pair in transitions.windows(2) {
                prop_assert!(pair[1] - pair[0] >= config.lockout());
            }
        }

        // Property: "door" needs every retained sample inside the door band
        #[test]
        fn dryer_door_needs_whole_window_in_band(
            readings in readings(dryer_watts()),
            previous in prop::sample::select(vec![DryerPowerState::Off, DryerPowerState::On]),
        ) {
            let config = DryerConfig::default();
            let mut window = WindowedStep::new(config.window()).unwrap();
            let classifier = DryerClassifier::new(config, previous);
            let mut now = 0;
            for &(gap, watts) in &readings {
                now += gap;
                window.update(at(now), Some(watts)).unwrap();
                if classifier.classify(&window.view().unwrap()) == DryerPowerState::Door {
                    prop_assert!(window
                        .samples()
                        .all(|s| s.value > config.off_max_watts && s.value < config.door_max_watts));
                }
            }
        }
    }
}
