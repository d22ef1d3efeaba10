//! Replay of recorded power traces.
//!
//! A trace is CSV, one `timestamp,value` row per sensor update. The driver
//! feeds it to a monitor the way a host with one-shot timers would, so the
//! transitions it reports are the ones a live deployment would publish.

use chrono::NaiveDateTime;
use laundry_core::{ApplianceState, Monitor, MonitorError};
use laundry_io::SensorReading;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read trace: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("monitor rejected trace: {0}")]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// 1-based line of the row in the trace.
    pub line: usize,
    pub time: NaiveDateTime,
    pub watts: f64,
}

/// One update fed to the monitor: a record, or a wake-up when `watts` is
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStep {
    pub time: NaiveDateTime,
    pub watts: Option<f64>,
    pub state: ApplianceState,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let watts = self.watts.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string());
        write!(f, "{} {:>10} {}", self.time.format(TIMESTAMP_FORMAT), watts, self.state)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    /// Published state changes, starting with the state at the first record.
    pub transitions: Vec<(NaiveDateTime, ApplianceState)>,
    pub trace: Vec<TraceStep>,
}

/// Open `path`, or stdin for `-`.
pub fn read_trace_file(path: &Path) -> Result<Vec<Record>, ReplayError> {
    if path == Path::new("-") {
        return parse_trace(io::stdin().lock());
    }
    parse_trace(BufReader::new(File::open(path)?))
}

/// Parse trace rows. Rows whose value is `unavailable` are skipped.
pub fn parse_trace(reader: impl BufRead) -> Result<Vec<Record>, ReplayError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        let parse_error = |reason: String| ReplayError::Parse { line: number, reason };

        let row = line.trim();
        if row.is_empty() {
            continue;
        }
        let mut fields = row.split(',');
        let (Some(stamp), Some(value)) = (fields.next(), fields.next()) else {
            return Err(parse_error("expected `timestamp,value`".to_string()));
        };
        let time = NaiveDateTime::parse_from_str(stamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| parse_error(format!("bad timestamp {stamp:?}: {e}")))?;
        match SensorReading::parse(value) {
            SensorReading::Watts(watts) => records.push(Record {
                line: number,
                time,
                watts,
            }),
            SensorReading::Unavailable => {}
            SensorReading::Problem(raw) => {
                return Err(parse_error(format!("bad power value {raw:?}")));
            }
        }
    }
    Ok(records)
}

/// Feed `records` to `monitor`, firing each returned deadline when it comes
/// due. A wake-up due at the same instant as a record fires first, so the
/// aged classification at that instant is never skipped.
pub fn replay<M: Monitor>(monitor: &mut M, records: &[Record]) -> Result<Replay, ReplayError> {
    let mut result = Replay::default();
    let mut pending = records.iter().peekable();
    let mut wake: Option<NaiveDateTime> = None;
    let mut previous: Option<ApplianceState> = None;

    loop {
        let next = pending.peek().map(|record| **record);
        let (time, watts, line) = match (next, wake) {
            (Some(record), Some(deadline)) if deadline <= record.time => (deadline, None, None),
            (Some(record), _) => {
                pending.next();
                (record.time, Some(record.watts), Some(record.line))
            }
            (None, Some(deadline)) => (deadline, None, None),
            (None, None) => break,
        };

        wake = match (monitor.update(time, watts), line) {
            (Ok(wake), _) => wake,
            (Err(e), Some(line)) => {
                return Err(ReplayError::Parse {
                    line,
                    reason: e.to_string(),
                })
            }
            (Err(e), None) => return Err(e.into()),
        };
        let state = monitor.state();
        if previous != Some(state) {
            result.transitions.push((time, state));
            previous = Some(state);
        }
        result.trace.push(TraceStep { time, watts, state });
    }
    Ok(result)
}
