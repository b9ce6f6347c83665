use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::CamctlConfig;

/// Loads and validates [`CamctlConfig`] from a `camctl.toml` file
/// overlaid with `CAMCTL_`-prefixed environment variables.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// Loads `camctl.toml` from the configured directory, falling back
    /// to `CamctlConfig::default()` when the file does not exist.
    /// Environment variables always apply on top, file or no file.
    pub fn load(&self) -> Result<CamctlConfig> {
        let config_path = self.config_dir.join("camctl.toml");

        // Start from the documented defaults so a missing file, or a
        // file that only overrides a handful of fields, still produces
        // a fully populated config.
        let mut builder = Config::builder().add_source(Config::try_from(&CamctlConfig::default())?);
        if config_path.exists() {
            builder = builder.add_source(File::new(
                config_path
                    .to_str()
                    .ok_or_else(|| anyhow!("invalid config path"))?,
                FileFormat::Toml,
            ));
        }
        builder = builder.add_source(
            Environment::with_prefix("CAMCTL")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }

    /// Cross-field validation beyond what serde's type system enforces
    /// (spec §3/§9).
    pub fn validate(&self) -> Result<()> {
        let config = self.load()?;

        if config.snapshot.tier0_v4l2_direct_timeout_secs <= 0.0
            || config.snapshot.tier1_usb_direct_timeout_secs <= 0.0
            || config.snapshot.tier2_rtsp_ready_check_timeout_secs <= 0.0
            || config.snapshot.tier3_activation_timeout_secs <= 0.0
        {
            return Err(anyhow!("all snapshot tier timeouts must be positive"));
        }
        if config.snapshot.immediate_response_threshold_secs <= 0.0
            || config.snapshot.acceptable_response_threshold_secs
                < config.snapshot.immediate_response_threshold_secs
            || config.snapshot.slow_response_threshold_secs
                < config.snapshot.acceptable_response_threshold_secs
        {
            return Err(anyhow!(
                "snapshot response thresholds must be positive and non-decreasing"
            ));
        }

        if config.keepalive.max_restart_count == 0 {
            return Err(anyhow!("keepalive.max_restart_count must be greater than 0"));
        }
        if config.keepalive.max_backoff_delay_secs <= 0.0 {
            return Err(anyhow!("keepalive.max_backoff_delay_secs must be positive"));
        }

        if config.media_server.api_port == 0 || config.media_server.rtsp_port == 0 {
            return Err(anyhow!("media_server ports must be non-zero"));
        }

        Ok(())
    }
}
