//! Defender facade
//!
//! NIST 800-53: AC-7 (Unsuccessful Logon Attempts), SC-5 (Denial of Service Protection)
//! STIG: V-222578 - Protect against brute force authentication
//! Implementation: One shared, concurrency safe handle consulted by every
//! protocol handler before admitting a connection and fed with every
//! authentication outcome

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audit::AuditLogger;
use crate::config::DefenderConfig;
use crate::error::{DefenderError, Result};
use crate::event::{DefenderEntry, HostEvent};
use crate::host_list::{HostList, load_host_list, parse_address};
use crate::store::{EventOutcome, ReputationStore};

/// Source of the current time
///
/// Injected so ban expiry and score decay can be driven by tests.
pub trait TimeSource: Send + Sync {
    /// Current wall clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock time source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
struct HostLists {
    safe: Option<HostList>,
    block: Option<HostList>,
}

impl HostLists {
    fn load(config: &DefenderConfig) -> Result<Self> {
        Ok(Self {
            safe: load_optional(config.safelist_file.as_deref())?,
            block: load_optional(config.blocklist_file.as_deref())?,
        })
    }

    fn is_safe(&self, ip: IpAddr) -> bool {
        self.safe.as_ref().is_some_and(|list| list.contains(ip))
    }

    fn is_blocked(&self, ip: IpAddr) -> bool {
        self.block.as_ref().is_some_and(|list| list.contains(ip))
    }
}

fn load_optional(path: Option<&Path>) -> Result<Option<HostList>> {
    match path {
        Some(path) if !path.as_os_str().is_empty() => load_host_list(path),
        _ => Ok(None),
    }
}

/// In-memory host reputation engine
///
/// Construct once at startup and share as `Arc<Defender>` with every
/// connection handler. Reads take a shared lock; recording events, eviction
/// and removal take the exclusive lock.
pub struct Defender {
    config: DefenderConfig,
    lists: RwLock<Arc<HostLists>>,
    store: RwLock<ReputationStore>,
    time: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for Defender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Defender")
            .field("config", &self.config)
            .field("hosts", &self.count_hosts())
            .field("banned", &self.count_banned())
            .finish()
    }
}

impl Defender {
    /// Build a defender when the configuration enables one
    ///
    /// # Returns
    ///
    /// `Ok(None)` when `enabled` is false, so callers skip every check
    ///
    /// # Errors
    ///
    /// Invalid configuration or unreadable safe/block lists
    pub fn from_config(config: DefenderConfig) -> Result<Option<Self>> {
        if !config.enabled {
            info!(event = "defender_disabled", "Defender is disabled");
            return Ok(None);
        }
        Self::new(config).map(Some)
    }

    /// Create a defender using the wall clock
    ///
    /// # Errors
    ///
    /// Invalid configuration or unreadable safe/block lists
    pub fn new(config: DefenderConfig) -> Result<Self> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a defender with an explicit time source
    ///
    /// # NIST 800-53: CM-6 (Configuration Settings)
    /// # Implementation: Validates configuration and loads both lists before
    /// # accepting any traffic
    ///
    /// # Errors
    ///
    /// Invalid configuration or unreadable safe/block lists
    pub fn with_time_source(config: DefenderConfig, time: Arc<dyn TimeSource>) -> Result<Self> {
        config.validate()?;
        let lists = HostLists::load(&config)?;

        AuditLogger::host_lists_loaded(
            display_path(config.safelist_file.as_deref()),
            display_path(config.blocklist_file.as_deref()),
            lists.safe.is_some(),
            lists.block.is_some(),
        );

        info!(
            event = "defender_initialized",
            threshold = config.threshold,
            ban_time = config.ban_time,
            ban_time_increment = config.ban_time_increment,
            observation_time = config.observation_time,
            entries_soft_limit = config.entries_soft_limit,
            entries_hard_limit = config.entries_hard_limit,
            "Defender initialized"
        );

        Ok(Self {
            store: RwLock::new(ReputationStore::new(config.clone())?),
            config,
            lists: RwLock::new(Arc::new(lists)),
            time,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &DefenderConfig {
        &self.config
    }

    fn lists(&self) -> Arc<HostLists> {
        Arc::clone(&self.lists.read())
    }

    /// Record an authentication relevant event for an address
    ///
    /// Safe listed and block listed addresses are ignored, as is anything
    /// that does not parse as an IP address.
    ///
    /// # NIST 800-53: AC-7 (Unsuccessful Logon Attempts)
    /// # STIG: V-222578
    /// # Implementation: Accumulates score, bans at the threshold and
    /// # lengthens active bans on repeat offenses
    pub fn add_event(&self, address: &str, event: HostEvent) {
        let Some(ip) = parse_address(address) else {
            debug!(
                event = "defender_invalid_address",
                address = %address,
                "Ignoring event for unparseable address"
            );
            return;
        };

        let lists = self.lists();
        if lists.is_safe(ip) || lists.is_blocked(ip) {
            return;
        }

        let (outcome, remaining_hosts, remaining_banned) = {
            let mut store = self.store.write();
            // read under the lock so events land in timestamp order
            let now = self.time.now();
            let outcome = store.add_event(ip, event, now);
            (outcome, store.count_hosts(), store.count_banned())
        };

        let client_addr = ip.to_string();
        let trigger = event.to_string();
        match outcome {
            EventOutcome::Tracked {
                score,
                evicted_hosts,
            } => {
                debug!(
                    event = "host_event",
                    client_addr = %client_addr,
                    trigger = %trigger,
                    score = score,
                    "Host event recorded"
                );
                if evicted_hosts > 0 {
                    AuditLogger::entries_evicted("hosts", evicted_hosts, remaining_hosts);
                }
            }
            EventOutcome::Banned {
                expires_at,
                evicted_bans,
            } => {
                AuditLogger::host_banned(&client_addr, &trigger, &format_time(expires_at));
                if evicted_bans > 0 {
                    AuditLogger::entries_evicted("banned", evicted_bans, remaining_banned);
                }
            }
            EventOutcome::BanExtended { expires_at } => {
                AuditLogger::ban_extended(&client_addr, &trigger, &format_time(expires_at));
            }
        }
    }

    /// Check if an address must be refused
    ///
    /// True for block listed addresses and for active bans. Never changes
    /// any state.
    ///
    /// # NIST 800-53: AC-7, SC-7 (Boundary Protection)
    /// # Implementation: Admission check run on every new connection
    pub fn is_banned(&self, address: &str) -> bool {
        let Some(ip) = parse_address(address) else {
            return false;
        };

        if self.lists().is_blocked(ip) {
            return true;
        }

        self.store.read().is_banned(&ip, self.time.now())
    }

    /// Check if an address is safe listed
    pub fn is_safe(&self, address: &str) -> bool {
        parse_address(address).is_some_and(|ip| self.lists().is_safe(ip))
    }

    /// Expiry of an active ban, `None` when not dynamically banned
    pub fn get_ban_time(&self, address: &str) -> Option<DateTime<Utc>> {
        let ip = parse_address(address)?;
        self.store.read().ban_time(&ip, self.time.now())
    }

    /// Effective score, zero for banned or unknown addresses
    pub fn get_score(&self, address: &str) -> i32 {
        parse_address(address)
            .map(|ip| self.store.read().score(&ip, self.time.now()))
            .unwrap_or(0)
    }

    /// Snapshot of a banned or tracked host
    ///
    /// # Errors
    ///
    /// `DefenderError::NotFound` if the address is in neither table
    pub fn get_host(&self, address: &str) -> Result<DefenderEntry> {
        parse_address(address)
            .and_then(|ip| self.store.read().host(&ip, self.time.now()))
            .ok_or_else(|| DefenderError::NotFound(address.to_string()))
    }

    /// All banned hosts followed by all tracked hosts
    pub fn get_hosts(&self) -> Vec<DefenderEntry> {
        self.store.read().hosts(self.time.now())
    }

    /// Remove an address from the tracked or banned table
    ///
    /// # Returns
    ///
    /// `true` if something was removed
    pub fn delete_host(&self, address: &str) -> bool {
        let Some(ip) = parse_address(address) else {
            return false;
        };

        let removed = self.store.write().remove(&ip);
        if removed {
            AuditLogger::host_removed(&ip.to_string());
        }
        removed
    }

    /// Number of tracked hosts
    pub fn count_hosts(&self) -> usize {
        self.store.read().count_hosts()
    }

    /// Number of ban entries
    pub fn count_banned(&self) -> usize {
        self.store.read().count_banned()
    }

    /// Drop expired events, hosts and bans, then enforce capacity limits
    ///
    /// # Returns
    ///
    /// Number of table entries removed
    pub fn cleanup(&self) -> usize {
        let mut store = self.store.write();
        let now = self.time.now();
        let hosts = store.cleanup_hosts(now);
        let banned = store.cleanup_banned(now);
        if hosts + banned > 0 {
            debug!(
                event = "defender_cleanup",
                hosts_removed = hosts,
                banned_removed = banned,
                hosts = store.count_hosts(),
                banned = store.count_banned(),
                "Defender cleanup completed"
            );
        }
        hosts + banned
    }

    /// Re-read the safe and block list files
    ///
    /// The new lists replace the old ones only if both load successfully.
    ///
    /// # Errors
    ///
    /// List I/O or parse errors; the previous lists stay active
    pub fn reload(&self) -> Result<()> {
        let lists = match HostLists::load(&self.config) {
            Ok(lists) => lists,
            Err(e) => {
                AuditLogger::host_lists_reload_failed(&e.to_string());
                return Err(e);
            }
        };

        AuditLogger::host_lists_loaded(
            display_path(self.config.safelist_file.as_deref()),
            display_path(self.config.blocklist_file.as_deref()),
            lists.safe.is_some(),
            lists.block.is_some(),
        );
        *self.lists.write() = Arc::new(lists);
        Ok(())
    }

    /// Run [`Defender::cleanup`] every `interval` on the Tokio runtime
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_cleanup_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.cleanup();
            }
        })
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn display_path(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.display().to_string())
}
