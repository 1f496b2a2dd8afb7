use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use snow_owl_defender::DefenderConfig;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Operator configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Seconds between periodic defender cleanups, 0 disables the task
    pub cleanup_interval_secs: u64,
    pub logging: LoggingConfig,
    pub defender: DefenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60,
            logging: LoggingConfig::default(),
            defender: DefenderConfig {
                enabled: true,
                safelist_file: Some(PathBuf::from("/etc/snow-owl/safelist.json")),
                blocklist_file: Some(PathBuf::from("/etc/snow-owl/blocklist.json")),
                ..DefenderConfig::default()
            },
        }
    }
}

/// Logging configuration
///
/// NIST 800-53: AU-2 (Audit Events), AU-9 (Protection of Audit Information)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// Optional log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text logging for human readability
    Text,
    /// JSON structured logging for SIEM integration
    Json,
}

pub async fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    let config: AppConfig =
        toml::from_str(&contents).context("Failed to parse configuration file")?;

    Ok(config)
}

pub async fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let contents = toml::to_string_pretty(config).context("Failed to serialize configuration")?;

    fs::write(path, contents)
        .await
        .context("Failed to write configuration file")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("config.toml");

        save_config(&path, &AppConfig::default())
            .await
            .expect("Failed to save config");
        let loaded = load_config(&path).await.expect("Failed to load config");

        assert_eq!(loaded.cleanup_interval_secs, 60);
        assert_eq!(loaded.logging.format, LogFormat::Text);
        assert_eq!(loaded.defender, AppConfig::default().defender);
    }

    #[tokio::test]
    async fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            "[defender]\nenabled = true\nthreshold = 8\n\n[logging]\nformat = \"json\"\n",
        )
        .await
        .expect("Failed to write config");

        let loaded = load_config(&path).await.expect("Failed to load config");
        assert!(loaded.defender.enabled);
        assert_eq!(loaded.defender.threshold, 8);
        assert!(loaded.defender.safelist_file.is_none());
        assert_eq!(loaded.logging.format, LogFormat::Json);
        assert_eq!(loaded.logging.level, "info");
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let err = load_config(Path::new("/nonexistent/snow-owl/config.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read configuration file"));
    }
}
