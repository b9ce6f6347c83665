pub mod name_lock;
pub mod path_manager;
pub mod single_flight;
pub mod stream_manager;

pub use name_lock::NameLockTable;
pub use path_manager::{ApplyOutcome, PathManager, PathManagerConfig};
pub use single_flight::SingleFlight;
pub use stream_manager::{StreamHandle, StreamManager};
