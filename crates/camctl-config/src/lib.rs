pub mod global;
pub mod keepalive;
pub mod loader;
pub mod media_server;
pub mod paths;
pub mod snapshot;

pub use global::CamctlConfig;
pub use keepalive::{KeepaliveConfig, StreamReadinessConfig};
pub use loader::ConfigLoader;
pub use media_server::{CodecConfig, MediaServerConfig};
pub use paths::PathsConfig;
pub use snapshot::{CaptureExperience, SnapshotTierConfig};
