//! Audit trail of published appliance states.
//!
//! Every state the monitor publishes is appended to a JSONL file together
//! with process start and shutdown markers.

use chrono::NaiveDateTime;
use laundry_core::ApplianceKind;
use laundry_io::Published;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A new appliance state was published
    StateChanged,
    /// System startup
    SystemStart,
    /// System shutdown
    SystemShutdown,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Local time on the monitors' timeline
    pub timestamp: NaiveDateTime,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Details for a state change event
#[derive(Debug, Clone, Serialize)]
pub struct StateChangedDetails {
    pub appliance: ApplianceKind,
    pub entity: String,
    pub state: Published,
}

impl StateChangedDetails {
    pub fn new(appliance: ApplianceKind, state: Published) -> Self {
        Self {
            appliance,
            entity: appliance.entity_id(),
            state,
        }
    }
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified path.
    /// The file is opened in append mode to preserve existing logs.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp: NaiveDateTime,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> io::Result<()> {
        self.log(&AuditEntry {
            timestamp,
            unix_us,
            event_type,
            details,
        })
    }

    pub fn log_state_change(
        &self,
        timestamp: NaiveDateTime,
        unix_us: u64,
        appliance: ApplianceKind,
        state: Published,
    ) -> io::Result<()> {
        let details = serde_json::to_value(StateChangedDetails::new(appliance, state))?;
        self.log_event(timestamp, unix_us, AuditEventType::StateChanged, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use laundry_core::ApplianceState;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_audit_logger_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let t0 = NaiveDate::from_ymd_opt(2020, 3, 29)
            .unwrap()
            .and_hms_opt(19, 30, 25)
            .unwrap();

        let logger = AuditLogger::new(&path).unwrap();

        logger
            .log_event(
                t0,
                1585510225000000,
                AuditEventType::SystemStart,
                serde_json::json!({"version": "0.1.0"}),
            )
            .unwrap();

        logger
            .log_state_change(
                t0 + chrono::TimeDelta::seconds(5),
                1585510230000000,
                ApplianceKind::Washer,
                Published::Appliance(ApplianceState::On),
            )
            .unwrap();

        // Read back and verify
        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let entry1: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry1.timestamp, t0);
        assert_eq!(entry1.event_type, AuditEventType::SystemStart);

        let entry2: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(entry2.event_type, AuditEventType::StateChanged);
        assert_eq!(entry2.details["entity"], "laundry.washer");
        assert_eq!(entry2.details["state"], "on");
    }
}
