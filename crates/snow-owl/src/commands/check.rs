use anyhow::{Context, Result};
use snow_owl_defender::{Defender, load_host_list, parse_address};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::config::AppConfig;

/// Admission status of a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStatus {
    Invalid,
    Banned,
    Safe,
    Allowed,
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressStatus::Invalid => "invalid",
            AddressStatus::Banned => "banned",
            AddressStatus::Safe => "safe",
            AddressStatus::Allowed => "allowed",
        };
        f.write_str(s)
    }
}

pub fn address_status(defender: &Defender, address: &str) -> AddressStatus {
    if parse_address(address).is_none() {
        AddressStatus::Invalid
    } else if defender.is_banned(address) {
        AddressStatus::Banned
    } else if defender.is_safe(address) {
        AddressStatus::Safe
    } else {
        AddressStatus::Allowed
    }
}

/// Validate the defender configuration and both list files
///
/// NIST 800-53: CM-6 (Configuration Settings)
pub fn validate(config: &AppConfig) -> Result<()> {
    let defender_config = &config.defender;
    if !defender_config.enabled {
        println!("Defender is disabled, nothing to validate");
        return Ok(());
    }

    defender_config
        .validate()
        .context("Invalid defender configuration")?;

    for (kind, path) in [
        ("safe list", defender_config.safelist_file.as_deref()),
        ("block list", defender_config.blocklist_file.as_deref()),
    ] {
        println!("{:<12} {}", kind, describe_list(path)?);
    }

    info!(
        event = "config_validated",
        threshold = defender_config.threshold,
        ban_time = defender_config.ban_time,
        observation_time = defender_config.observation_time,
        entries_soft_limit = defender_config.entries_soft_limit,
        entries_hard_limit = defender_config.entries_hard_limit,
        "Defender configuration is valid"
    );
    println!("Configuration is valid");
    Ok(())
}

fn describe_list(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok("not configured".to_string());
    };

    let list = load_host_list(path)
        .with_context(|| format!("Failed to load host list {}", path.display()))?;
    Ok(match list {
        Some(list) => format!(
            "{} ({} addresses, {} networks)",
            path.display(),
            list.address_count(),
            list.network_count()
        ),
        None => format!("{} (empty)", path.display()),
    })
}

/// Print the status of each address against the configured lists
pub fn check(config: &AppConfig, addresses: &[String]) -> Result<()> {
    let Some(defender) =
        Defender::from_config(config.defender.clone()).context("Failed to create defender")?
    else {
        println!("Defender is disabled, all addresses are allowed");
        return Ok(());
    };

    println!("{:<40} STATUS", "ADDRESS");
    for address in addresses {
        println!("{:<40} {}", address, address_status(&defender, address));
    }
    Ok(())
}
