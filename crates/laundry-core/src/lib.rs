pub mod config;
pub mod dryer;
pub mod error;
pub mod monitor;
mod monitor_proptest;
pub mod tags;
pub mod timebase;
pub mod washer;
pub mod window;

pub use config::{DryerConfig, ThresholdsConfig, WasherConfig};
pub use dryer::{DryerClassifier, DryerMonitor, DryerPowerState};
pub use error::{MonitorError, ParseApplianceError};
pub use monitor::{Appliance, ApplianceKind, ApplianceState, Input, Monitor, Step};
pub use timebase::TimeBase;
pub use washer::{WasherClassifier, WasherMonitor, WasherPowerState};
pub use window::{Classifier, Forecast, Sample, WindowView, WindowedStep};
