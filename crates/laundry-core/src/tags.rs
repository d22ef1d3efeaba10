/// Naming of one exported quantity.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub metric: &'static str,
    pub help: &'static str,
}

/// Host domain appliance states are published under, e.g. `laundry.washer`.
pub const ENTITY_DOMAIN: &str = "laundry";

pub const APPLIANCE_STATE: Tag = Tag {
    metric: "laundry_appliance_state",
    help: "Published appliance state (0=off, 1=on, 2=done, -1=unavailable, -2=problem)",
};

pub const POWER_WATTS: Tag = Tag {
    metric: "laundry_power_watts",
    help: "Latest valid power reading in watts",
};

pub const READINGS: Tag = Tag {
    metric: "laundry_readings_total",
    help: "Valid power readings fed to the monitor",
};

pub const BAD_READINGS: Tag = Tag {
    metric: "laundry_bad_readings_total",
    help: "Power sensor updates that were unavailable or not a usable number",
};

pub const WAKEUPS: Tag = Tag {
    metric: "laundry_wakeups_total",
    help: "Scheduled re-evaluations fired without a new reading",
};

pub const STATE_CHANGES: Tag = Tag {
    metric: "laundry_state_changes_total",
    help: "Published state changes",
};
