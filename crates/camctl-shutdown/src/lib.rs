pub mod resource;
pub mod signal;

pub use resource::{Resource, ResourceError, ResourceManager};
pub use signal::{ShutdownSignal, SignalHandler};
