use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ScopeError;
use crate::session::CaptureSettings;
use crate::types::{ChannelIndex, SampleCount, SampleRate, TriggerConfig, TriggerSlope, VoltageRange};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub acquisition: AcquisitionConfig,
    pub trigger: TriggerSettings,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    pub plot: PlotConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub device_index: i32,
    /// Overrides the platform's default WaveForms runtime location
    pub library_path: Option<String>,
    /// Run against the built-in simulator instead of hardware
    pub simulate: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    pub channel: i32,
    pub voltage_range: f64,
    pub voltage_offset: f64,
    pub sample_count: usize,
    pub sample_rate: f64,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TriggerSettings {
    pub enabled: bool,
    pub channel: i32,
    pub level: f64,
    pub slope: TriggerSlope,
    pub auto_timeout_s: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationConfig {
    pub frequency_hz: f64,
    pub amplitude_v: f64,
    pub noise_v: f64,
    pub polls_until_done: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlotConfig {
    pub width: usize,
    pub height: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            library_path: None,
            simulate: false,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            voltage_range: 5.0,
            voltage_offset: 0.0,
            sample_count: 8192,
            sample_rate: 100_000.0,
            poll_interval_ms: 1,
            timeout_ms: 5000,
        }
    }
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: 0,
            level: 0.0,
            slope: TriggerSlope::Rising,
            auto_timeout_s: 1.0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            amplitude_v: 1.0,
            noise_v: 0.1,
            polls_until_done: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 140,
            height: 60,
        }
    }
}

impl AcquisitionConfig {
    /// Default capture size as validated types
    pub fn capture_size(&self) -> Result<(SampleCount, SampleRate), ScopeError> {
        Ok((
            SampleCount::new(self.sample_count)?,
            SampleRate::hz(self.sample_rate)?,
        ))
    }
}

impl AppConfig {
    /// Per-capture settings for the acquisition session
    pub fn capture_settings(&self) -> Result<CaptureSettings, ScopeError> {
        let acquisition = &self.acquisition;
        if !acquisition.voltage_offset.is_finite() {
            return Err(ScopeError::InvalidParameters(format!(
                "voltage_offset must be finite, got {}",
                acquisition.voltage_offset
            )));
        }
        if acquisition.poll_interval_ms > acquisition.timeout_ms {
            return Err(ScopeError::InvalidParameters(format!(
                "poll_interval_ms ({}) exceeds timeout_ms ({})",
                acquisition.poll_interval_ms, acquisition.timeout_ms
            )));
        }

        let trigger = if self.trigger.enabled {
            // Rejects negative, NaN and values too large for a Duration
            let auto_timeout = Duration::try_from_secs_f64(self.trigger.auto_timeout_s)
                .map_err(|_| {
                    ScopeError::InvalidParameters(format!(
                        "trigger auto_timeout_s must be a non-negative number of seconds, got {}",
                        self.trigger.auto_timeout_s
                    ))
                })?;
            Some(TriggerConfig {
                channel: ChannelIndex::new(self.trigger.channel)?,
                level: self.trigger.level,
                slope: self.trigger.slope,
                auto_timeout,
            })
        } else {
            None
        };

        Ok(CaptureSettings {
            device_index: self.device.device_index,
            channel: ChannelIndex::new(acquisition.channel)?,
            voltage_range: VoltageRange::volts(acquisition.voltage_range)?,
            voltage_offset: acquisition.voltage_offset,
            trigger,
            poll_interval: Duration::from_millis(acquisition.poll_interval_ms),
            timeout: Duration::from_millis(acquisition.timeout_ms),
        })
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        // Try common config file locations
        let possible_paths = ["ad2-scope.toml", "config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // Add environment variable overrides with prefix "AD2_SCOPE_"
    builder = builder.add_source(
        Environment::with_prefix("AD2_SCOPE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_produce_valid_settings() {
        let config = AppConfig::default();
        let settings = config.capture_settings().unwrap();
        assert_eq!(settings.channel, ChannelIndex(0));
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert!(settings.trigger.is_none());

        let (count, rate) = config.acquisition.capture_size().unwrap();
        assert_eq!(count.get(), 8192);
        assert_eq!(rate.get(), 100_000.0);
    }

    #[test]
    fn test_bad_channel_rejected() {
        let mut config = AppConfig::default();
        config.acquisition.channel = 5;
        assert!(matches!(
            config.capture_settings(),
            Err(ScopeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_trigger_settings_mapped() {
        let mut config = AppConfig::default();
        config.trigger = TriggerSettings {
            enabled: true,
            channel: 1,
            level: 0.5,
            slope: TriggerSlope::Falling,
            auto_timeout_s: 0.25,
        };
        let trigger = config.capture_settings().unwrap().trigger.unwrap();
        assert_eq!(trigger.channel, ChannelIndex(1));
        assert_eq!(trigger.slope, TriggerSlope::Falling);
        assert_eq!(trigger.auto_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_trigger_auto_timeout_rejected() {
        for auto_timeout_s in [1e30, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = AppConfig::default();
            config.trigger.enabled = true;
            config.trigger.auto_timeout_s = auto_timeout_s;
            assert!(matches!(
                config.capture_settings(),
                Err(ScopeError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/ad2-scope.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config_or_default(Some(Path::new("/nonexistent/ad2-scope.toml")));
        assert_eq!(config.acquisition.sample_count, 8192);
        assert!(!config.device.simulate);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!(
            "ad2-scope-config-test-{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[acquisition]\nsample_count = 1000\nsample_rate = 10000.0\n\n[trigger]\nslope = \"falling\"\n\n[device]\nsimulate = true"
        )
        .unwrap();
        drop(file);

        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.acquisition.sample_count, 1000);
        assert_eq!(config.acquisition.sample_rate, 10_000.0);
        assert_eq!(config.acquisition.voltage_range, 5.0);
        assert_eq!(config.trigger.slope, TriggerSlope::Falling);
        assert!(config.device.simulate);
    }
}
