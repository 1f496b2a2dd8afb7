use anyhow::{Result, bail};
use std::path::Path;

use crate::config::{self, AppConfig};

/// Write the default configuration
///
/// NIST 800-53: CM-6 (Configuration Settings)
pub async fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        bail!(
            "Configuration file {} already exists, use --force to overwrite",
            config_path.display()
        );
    }

    config::save_config(config_path, &AppConfig::default()).await?;
    println!("Configuration file created at: {}", config_path.display());
    println!("\nReview the safe and block list paths before enabling the defender.");
    Ok(())
}
