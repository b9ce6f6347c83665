pub mod camera_monitor;
pub mod ffprobe_activator;
pub mod keepalive_reader;
pub mod process_group;
pub mod snapshot_manager;

pub use camera_monitor::{CameraMonitor, DeviceInfo, UnavailableCameraMonitor};
pub use ffprobe_activator::FfprobeActivator;
pub use keepalive_reader::RTSPKeepaliveReader;
pub use process_group::ProcessGroup;
pub use snapshot_manager::{Snapshot, SnapshotManager, SnapshotMetadata, SnapshotOptions};
