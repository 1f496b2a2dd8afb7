//! Host reputation tables
//!
//! NIST 800-53: AC-7 (Unsuccessful Logon Attempts), SC-5 (Denial of Service Protection)
//! Implementation: Per-address sliding-window scores, time bounded bans with
//! escalation, and capacity bounded eviction for both tables
//!
//! The store is not synchronized and never reads the clock: every operation
//! takes `now` from the caller. [`crate::Defender`] owns the lock and the
//! time source.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

use crate::config::DefenderConfig;
use crate::error::Result;
use crate::event::{DefenderEntry, HostEvent};

#[derive(Debug, Clone, Copy)]
struct ScoredEvent {
    at: DateTime<Utc>,
    score: i32,
}

/// Event history of a tracked, not banned, host
#[derive(Debug, Default)]
struct HostScore {
    events: Vec<ScoredEvent>,
}

impl HostScore {
    /// Sum of weights of events still inside the window
    fn score(&self, now: DateTime<Utc>, window: Duration) -> i32 {
        self.events
            .iter()
            .filter(|e| is_live(e.at, now, window))
            .map(|e| e.score)
            .sum()
    }

    /// Physically drop expired events, returning the remaining score
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> i32 {
        self.events.retain(|e| is_live(e.at, now, window));
        self.events.iter().map(|e| e.score).sum()
    }

    fn last_event(&self) -> Option<DateTime<Utc>> {
        self.events.iter().map(|e| e.at).max()
    }
}

/// An event counts while `at + window > now`; at exactly `window` old it has expired
fn is_live(at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    saturating_add(at, window) > now
}

/// Expiries past the representable range stay at `DateTime::<Utc>::MAX_UTC`
fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Result of recording an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Host is tracked with the given effective score
    Tracked {
        /// Effective score after this event
        score: i32,
        /// Records dropped by the capacity check this insert triggered
        evicted_hosts: usize,
    },
    /// Score crossed the threshold and a new ban was created
    Banned {
        /// Ban expiry
        expires_at: DateTime<Utc>,
        /// Ban entries dropped by the capacity check this ban triggered
        evicted_bans: usize,
    },
    /// Host was already banned and its ban was extended
    BanExtended {
        /// New ban expiry
        expires_at: DateTime<Utc>,
    },
}

/// Tracked hosts and active bans
#[derive(Debug)]
pub struct ReputationStore {
    config: DefenderConfig,
    hosts: HashMap<IpAddr, HostScore>,
    banned: HashMap<IpAddr, DateTime<Utc>>,
}

impl ReputationStore {
    /// Create an empty store
    ///
    /// # Errors
    ///
    /// `DefenderError::Config` if `config` fails validation
    pub fn new(config: DefenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hosts: HashMap::new(),
            banned: HashMap::new(),
        })
    }

    /// Configuration the store was built with
    pub fn config(&self) -> &DefenderConfig {
        &self.config
    }

    /// Record an event for a host that is not safe or block listed
    ///
    /// # NIST 800-53: AC-7 (Unsuccessful Logon Attempts)
    /// # Implementation: Bans the host once its windowed score reaches the
    /// # threshold; further offenses while banned lengthen the ban
    pub fn add_event(&mut self, ip: IpAddr, event: HostEvent, now: DateTime<Utc>) -> EventOutcome {
        if let Some(expires_at) = self.banned.get_mut(&ip) {
            if *expires_at > now {
                *expires_at = saturating_add(*expires_at, self.config.ban_increment());
                return EventOutcome::BanExtended {
                    expires_at: *expires_at,
                };
            }
            // expired ban, the host starts over with a clean history
            self.banned.remove(&ip);
        }

        let window = self.config.observation_window();
        let is_new = !self.hosts.contains_key(&ip);
        let host = self.hosts.entry(ip).or_default();
        host.events.push(ScoredEvent {
            at: now,
            score: event.score(&self.config),
        });
        let score = host.prune(now, window);

        if score >= self.config.threshold {
            self.hosts.remove(&ip);
            let expires_at = saturating_add(now, self.config.ban_duration());
            self.banned.insert(ip, expires_at);

            let evicted_bans = if self.banned.len() > self.config.entries_hard_limit {
                self.cleanup_banned(now)
            } else {
                0
            };
            return EventOutcome::Banned {
                expires_at,
                evicted_bans,
            };
        }

        let evicted_hosts = if is_new && self.hosts.len() > self.config.entries_hard_limit {
            self.cleanup_hosts(now)
        } else {
            0
        };

        EventOutcome::Tracked {
            score,
            evicted_hosts,
        }
    }

    /// Drop hosts without live events, then trim to the soft limit if the
    /// table is still above the hard limit
    ///
    /// Hosts with the stalest last event go first. Returns how many records
    /// were removed.
    pub fn cleanup_hosts(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.config.observation_window();
        let before = self.hosts.len();

        self.hosts.retain(|_, host| {
            host.prune(now, window);
            !host.events.is_empty()
        });
        let expired = before - self.hosts.len();

        let mut trimmed = 0;
        if self.hosts.len() > self.config.entries_hard_limit {
            let mut by_activity: Vec<(Option<DateTime<Utc>>, IpAddr)> = self
                .hosts
                .iter()
                .map(|(ip, host)| (host.last_event(), *ip))
                .collect();
            by_activity.sort_unstable();

            let excess = by_activity.len().saturating_sub(self.config.entries_soft_limit);
            for (_, ip) in by_activity.into_iter().take(excess) {
                self.hosts.remove(&ip);
                trimmed += 1;
            }
        }

        if expired + trimmed > 0 {
            debug!(
                event = "hosts_cleanup",
                expired = expired,
                evicted = trimmed,
                remaining = self.hosts.len(),
                "Cleaned up tracked hosts"
            );
        }

        expired + trimmed
    }

    /// Drop expired bans, then trim to the soft limit if the table is still
    /// above the hard limit
    ///
    /// Bans expiring soonest go first. Returns how many entries were removed.
    pub fn cleanup_banned(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.banned.len();

        self.banned.retain(|_, expires_at| *expires_at > now);
        let expired = before - self.banned.len();

        let mut trimmed = 0;
        if self.banned.len() > self.config.entries_hard_limit {
            let mut by_expiry: Vec<(DateTime<Utc>, IpAddr)> = self
                .banned
                .iter()
                .map(|(ip, expires_at)| (*expires_at, *ip))
                .collect();
            by_expiry.sort_unstable();

            let excess = by_expiry.len().saturating_sub(self.config.entries_soft_limit);
            for (_, ip) in by_expiry.into_iter().take(excess) {
                self.banned.remove(&ip);
                trimmed += 1;
            }
        }

        if expired + trimmed > 0 {
            debug!(
                event = "banned_cleanup",
                expired = expired,
                evicted = trimmed,
                remaining = self.banned.len(),
                "Cleaned up banned hosts"
            );
        }

        expired + trimmed
    }

    /// Check if a host has an active ban
    pub fn is_banned(&self, ip: &IpAddr, now: DateTime<Utc>) -> bool {
        self.ban_time(ip, now).is_some()
    }

    /// Expiry of an active ban
    pub fn ban_time(&self, ip: &IpAddr, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.banned.get(ip).copied().filter(|t| *t > now)
    }

    /// Effective score, zero for banned or unknown hosts
    pub fn score(&self, ip: &IpAddr, now: DateTime<Utc>) -> i32 {
        self.hosts
            .get(ip)
            .map(|host| host.score(now, self.config.observation_window()))
            .unwrap_or(0)
    }

    /// Snapshot of a banned host or of a tracked host with a live score
    pub fn host(&self, ip: &IpAddr, now: DateTime<Utc>) -> Option<DefenderEntry> {
        if let Some(expires_at) = self.ban_time(ip, now) {
            return Some(DefenderEntry {
                ip: ip.to_string(),
                score: 0,
                ban_time: Some(expires_at),
            });
        }

        let score = self.score(ip, now);
        (score > 0).then(|| DefenderEntry {
            ip: ip.to_string(),
            score,
            ban_time: None,
        })
    }

    /// All banned hosts followed by all tracked hosts with a live score
    pub fn hosts(&self, now: DateTime<Utc>) -> Vec<DefenderEntry> {
        let window = self.config.observation_window();

        let mut banned: Vec<(&IpAddr, DateTime<Utc>)> = self
            .banned
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(ip, expires_at)| (ip, *expires_at))
            .collect();
        banned.sort_unstable_by_key(|(ip, _)| **ip);

        let mut tracked: Vec<(&IpAddr, i32)> = self
            .hosts
            .iter()
            .map(|(ip, host)| (ip, host.score(now, window)))
            .filter(|(_, score)| *score > 0)
            .collect();
        tracked.sort_unstable_by_key(|(ip, _)| **ip);

        banned
            .into_iter()
            .map(|(ip, expires_at)| DefenderEntry {
                ip: ip.to_string(),
                score: 0,
                ban_time: Some(expires_at),
            })
            .chain(tracked.into_iter().map(|(ip, score)| DefenderEntry {
                ip: ip.to_string(),
                score,
                ban_time: None,
            }))
            .collect()
    }

    /// Remove a host from whichever table holds it
    pub fn remove(&mut self, ip: &IpAddr) -> bool {
        let banned = self.banned.remove(ip).is_some();
        let tracked = self.hosts.remove(ip).is_some();
        banned || tracked
    }

    /// Number of tracked hosts, including those whose events all expired
    pub fn count_hosts(&self) -> usize {
        self.hosts.len()
    }

    /// Number of ban entries, including expired ones not yet cleaned up
    pub fn count_banned(&self) -> usize {
        self.banned.len()
    }

    #[cfg(test)]
    fn insert_ban(&mut self, ip: IpAddr, expires_at: DateTime<Utc>) {
        self.banned.insert(ip, expires_at);
    }

    #[cfg(test)]
    fn insert_host_events(&mut self, ip: IpAddr, events: &[(DateTime<Utc>, i32)]) {
        let host = self.hosts.entry(ip).or_default();
        host.events
            .extend(events.iter().map(|&(at, score)| ScoredEvent { at, score }));
    }
}
