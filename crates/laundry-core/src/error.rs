use chrono::{NaiveDateTime, TimeDelta};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// An input arrived with a timestamp earlier than one already applied.
    #[error("input at {time} is older than the latest applied input at {latest}")]
    OutOfOrder {
        time: NaiveDateTime,
        latest: NaiveDateTime,
    },
    #[error("window holds no samples; no reading has been recorded yet")]
    EmptyWindow,
    #[error("window duration must be positive, got {0}")]
    InvalidWindow(TimeDelta),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown appliance {0:?}; expected \"washer\" or \"dryer\"")]
pub struct ParseApplianceError(pub String);
