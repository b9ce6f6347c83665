pub mod activation;
pub mod client;
pub mod error;
pub mod path_utils;
pub mod types;

pub use activation::PublisherActivator;
#[cfg(any(test, feature = "testing"))]
pub use activation::MockPublisherActivator;
pub use client::{MediaServerClient, MediaServerTransport, API_VERSION};
#[cfg(any(test, feature = "testing"))]
pub use client::MockMediaServerTransport;
pub use error::{MediaServerError, Result};
pub use types::{
    CameraIdentifier, DevicePath, PathConfiguration, PathName, RecordFormat, RuntimePath,
    RuntimePathReader, RuntimePathSource,
};
