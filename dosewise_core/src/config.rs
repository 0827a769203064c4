//! Configuration file support for Dosewise.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/dosewise/config.toml`.

use crate::localtime::parse_timezone;
use crate::{Error, ReminderPolicy, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    /// Default reminder policy for new profiles
    #[serde(default)]
    pub policy: ReminderPolicy,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    /// Path of the profile store inside the data directory
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }
}

/// Profile created by `dosewise init`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_name")]
    pub name: String,

    /// IANA timezone name
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            timezone: default_timezone(),
        }
    }
}

// Default value functions
fn home_dir_or_cwd() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base =
        dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("dosewise")
}

fn default_profile_name() -> String {
    "default".into()
}

fn default_timezone() -> String {
    "UTC".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        parse_timezone(&self.profile.timezone)
            .map_err(|e| Error::Config(format!("profile.timezone: {}", e)))?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("dosewise").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.profile.timezone, "UTC");
        assert_eq!(config.policy.grace_minutes, 30);
        assert_eq!(config.policy.snooze_minutes, 10);
        assert!(config.data.data_dir.ends_with("dosewise"));
        assert!(config.data.store_path().ends_with("profiles.json"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.policy.quiet_hours_start = Some("22:00".parse().unwrap());
        config.policy.quiet_hours_end = Some("07:00".parse().unwrap());
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.policy, parsed.policy);
        assert_eq!(config.profile.name, parsed.profile.name);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[profile]
timezone = "Europe/Berlin"

[policy]
grace_minutes = 45
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.profile.timezone, "Europe/Berlin");
        assert_eq!(config.profile.name, "default");
        assert_eq!(config.policy.grace_minutes, 45);
        assert_eq!(config.policy.snooze_minutes, 10); // default
    }

    #[test]
    fn test_load_rejects_unknown_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[profile]\ntimezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profile.timezone = "America/New_York".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.profile.timezone, "America/New_York");
    }
}
