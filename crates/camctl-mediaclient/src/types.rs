use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable external label for a capture endpoint, e.g. `camera0`.
///
/// The only identifier that crosses the external API boundary; the
/// mapping to a [`DevicePath`] is total and bidirectional for V4L2
/// devices (see [`crate::path_utils`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraIdentifier(String);

impl CameraIdentifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric suffix of a `camera<N>` identifier, if it parses as one.
    pub fn device_index(&self) -> Option<u64> {
        self.0.strip_prefix("camera")?.parse().ok()
    }
}

impl fmt::Display for CameraIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CameraIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CameraIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Filesystem path to a local capture device (`/dev/videoN`), or a
/// source URL (`rtsp://…`, `rtmp://…`). Internal to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePath {
    V4l2(String),
    Url(String),
}

impl DevicePath {
    pub fn as_str(&self) -> &str {
        match self {
            DevicePath::V4l2(p) => p,
            DevicePath::Url(u) => u,
        }
    }

    pub fn is_v4l2(&self) -> bool {
        matches!(self, DevicePath::V4l2(_))
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The label under which a stream is registered with the media server.
/// Construct via [`crate::path_utils::validate_path_name`] — this type
/// does not validate on its own so that it can carry names that failed
/// validation through error paths for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathName(String);

impl PathName {
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recording container format accepted by the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Fmp4,
    Mpegts,
}

/// The configuration record sent to the media server for one path.
///
/// Invariant: either `source` is non-empty, or `run_on_demand` is
/// non-empty (never both empty, never both set in a way that leaves
/// the server unable to determine where media comes from).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "sourceOnDemand", skip_serializing_if = "Option::is_none")]
    pub source_on_demand: Option<bool>,
    #[serde(
        rename = "sourceOnDemandStartTimeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_on_demand_start_timeout: Option<String>,
    #[serde(
        rename = "sourceOnDemandCloseAfter",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_on_demand_close_after: Option<String>,

    #[serde(rename = "runOnDemand", skip_serializing_if = "Option::is_none")]
    pub run_on_demand: Option<String>,
    #[serde(
        rename = "runOnDemandRestart",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_on_demand_restart: Option<bool>,
    #[serde(
        rename = "runOnDemandStartTimeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_on_demand_start_timeout: Option<String>,
    #[serde(
        rename = "runOnDemandCloseAfter",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_on_demand_close_after: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<bool>,
    #[serde(rename = "recordFormat", skip_serializing_if = "Option::is_none")]
    pub record_format: Option<RecordFormat>,
    #[serde(rename = "recordPath", skip_serializing_if = "Option::is_none")]
    pub record_path: Option<String>,
}

impl PathConfiguration {
    /// True once either `source` or `run_on_demand` carries a non-empty value.
    pub fn is_well_formed(&self) -> bool {
        let has_source = self.source.as_deref().is_some_and(|s| !s.is_empty());
        let has_on_demand = self.run_on_demand.as_deref().is_some_and(|s| !s.is_empty());
        has_source || has_on_demand
    }
}

/// Server-reported source of a [`RuntimePath`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimePathSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub id: Option<String>,
}

/// One connected reader of a runtime path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimePathReader {
    #[serde(rename = "type")]
    pub reader_type: String,
    pub id: String,
}

/// Server-reported live state of a path. Cannot be mutated through the
/// config API; it vanishes when unused.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimePath {
    pub name: String,
    pub source: Option<RuntimePathSource>,
    pub ready: bool,
    #[serde(default)]
    pub readers: Vec<RuntimePathReader>,
}
