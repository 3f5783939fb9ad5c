//! Configuration loader
//!
//! Loads configuration from YAML files and applies environment variable overrides.
//! Priority: environment variables > file contents > defaults

use std::env;

use crate::config::types::Config;
use crate::error::ExporterConfigError;
use tracing::{debug, info, warn};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Config, ExporterConfigError> {
        let path = path.as_ref();
        info!(
            config_path = %path.display(),
            "Loading configuration from YAML file"
        );

        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to read configuration file"
            );
            ExporterConfigError::InvalidFile(format!("{}: {}", path.display(), e))
        })?;

        debug!(
            config_path = %path.display(),
            file_size_bytes = content.len(),
            "Read configuration file"
        );

        let config = Self::from_yaml_str(&content).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Configuration rejected"
            );
            e
        })?;

        info!(
            config_path = %path.display(),
            targets = config.targets.len(),
            collectors = config.collectors.len(),
            scrape_timeout_secs = config.global.scrape_timeout_secs,
            listen_address = %config.global.listen_address,
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Parse, override and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Config, ExporterConfigError> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| ExporterConfigError::ParseFailed(format!("Failed to parse YAML: {}", e)))?;

        debug!("Parsed YAML configuration successfully");

        Self::apply_env_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) {
        // ELASTIC_EXPORTER_LISTEN_ADDRESS
        if let Ok(address) = env::var("ELASTIC_EXPORTER_LISTEN_ADDRESS") {
            debug!(
                env_var = "ELASTIC_EXPORTER_LISTEN_ADDRESS",
                value = %address,
                "Applying environment variable override"
            );
            config.global.listen_address = address;
        }

        // ELASTIC_EXPORTER_SCRAPE_TIMEOUT_SECS
        if let Some(secs) = parse_u64_var("ELASTIC_EXPORTER_SCRAPE_TIMEOUT_SECS") {
            config.global.scrape_timeout_secs = secs;
        }

        // ELASTIC_EXPORTER_MIN_INTERVAL_SECS
        if let Some(secs) = parse_u64_var("ELASTIC_EXPORTER_MIN_INTERVAL_SECS") {
            config.global.min_interval_secs = secs;
        }
    }
}

fn parse_u64_var(name: &'static str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(value) => {
            debug!(
                env_var = name,
                value = value,
                "Applying environment variable override"
            );
            Some(value)
        }
        Err(e) => {
            warn!(
                env_var = name,
                value = %raw,
                error = %e,
                "Failed to parse environment variable, using configured value"
            );
            None
        }
    }
}
