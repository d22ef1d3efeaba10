pub mod bridge;
pub mod channel;
pub mod metrics;
pub mod protocol;
pub mod sensor;

pub use bridge::{run_bridge, BridgeConfig};
pub use channel::{ApplianceChannel, ChannelError, ChannelSet};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{IncomingMessage, ProtocolError, ProtocolVersion, StateMsg};
pub use sensor::{Published, SensorFault, SensorReading};
