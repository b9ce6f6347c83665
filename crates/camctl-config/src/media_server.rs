use serde::{Deserialize, Serialize};

/// Connection details for the media server's HTTP control plane and
/// RTSP ingest, and the codec parameters used to build publisher
/// commands (spec §6.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaServerConfig {
    pub api_host: String,
    pub api_port: u16,
    pub rtsp_host: String,
    pub rtsp_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
    /// `sourceOnDemandStartTimeout`/`runOnDemandStartTimeout` sent with
    /// every on-demand path (spec §4.3.1/§4.3.3).
    #[serde(default = "default_on_demand_start_timeout_secs")]
    pub on_demand_start_timeout_secs: u64,
    /// `sourceOnDemandCloseAfter`/`runOnDemandCloseAfter`: how long the
    /// media server keeps an on-demand source/publisher alive once its
    /// last reader disconnects.
    #[serde(default = "default_on_demand_close_after_secs")]
    pub on_demand_close_after_secs: u64,
    pub codec: CodecConfig,
}

impl MediaServerConfig {
    pub fn api_base_url(&self) -> String {
        format!("http://{}:{}", self.api_host, self.api_port)
    }

    pub fn rtsp_host_port(&self) -> String {
        format!("{}:{}", self.rtsp_host, self.rtsp_port)
    }
}

/// FFmpeg publisher parameters (spec §4.3.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    #[serde(default = "default_video_profile")]
    pub video_profile: String,
    #[serde(default = "default_video_level")]
    pub video_level: String,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

fn default_request_timeout_secs() -> f64 {
    5.0
}

fn default_on_demand_start_timeout_secs() -> u64 {
    10
}

fn default_on_demand_close_after_secs() -> u64 {
    10
}

fn default_video_profile() -> String {
    "main".to_string()
}

fn default_video_level() -> String {
    "4.0".to_string()
}

fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_bitrate() -> String {
    "2M".to_string()
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 9997,
            rtsp_host: "127.0.0.1".to_string(),
            rtsp_port: 8554,
            request_timeout_secs: default_request_timeout_secs(),
            on_demand_start_timeout_secs: default_on_demand_start_timeout_secs(),
            on_demand_close_after_secs: default_on_demand_close_after_secs(),
            codec: CodecConfig::default(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            video_profile: default_video_profile(),
            video_level: default_video_level(),
            pixel_format: default_pixel_format(),
            preset: default_preset(),
            bitrate: default_bitrate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_url_format() {
        let cfg = MediaServerConfig::default();
        assert_eq!(cfg.api_base_url(), "http://127.0.0.1:9997");
    }
}
