//! Host events and host table entries

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::config::DefenderConfig;

/// Authentication-relevant event reported by a protocol handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    /// Wrong credentials for an existing account
    LoginFailed,
    /// Login attempt for an account that does not exist
    UserNotFound,
    /// Rate or connection count limit violated
    LimitExceeded,
    /// Connection closed without any authentication attempt
    NoLoginTried,
}

impl HostEvent {
    /// Score weight configured for this event kind
    pub fn score(self, config: &DefenderConfig) -> i32 {
        match self {
            HostEvent::LoginFailed => config.score_valid,
            HostEvent::UserNotFound | HostEvent::NoLoginTried => config.score_invalid,
            HostEvent::LimitExceeded => config.score_limit_exceeded,
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostEvent::LoginFailed => "login_failed",
            HostEvent::UserNotFound => "user_not_found",
            HostEvent::LimitExceeded => "limit_exceeded",
            HostEvent::NoLoginTried => "no_login_tried",
        };
        f.write_str(name)
    }
}

/// Snapshot of a tracked or banned host
///
/// A banned host carries a zero score; a tracked host has no ban time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefenderEntry {
    /// Address as reported by the protocol layer, normalized
    pub ip: String,
    /// Effective score inside the observation window
    pub score: i32,
    /// Ban expiry
    pub ban_time: Option<DateTime<Utc>>,
}

impl DefenderEntry {
    /// Stable identifier for API listings: hex encoding of the address text
    pub fn id(&self) -> String {
        hex::encode(self.ip.as_bytes())
    }

    /// Ban expiry as RFC 3339, empty when the host is not banned
    pub fn ban_time_rfc3339(&self) -> String {
        self.ban_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    }

    /// Decode an identifier produced by [`DefenderEntry::id`]
    pub fn ip_from_id(id: &str) -> Option<String> {
        let bytes = hex::decode(id).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl Serialize for DefenderEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("DefenderEntry", 4)?;
        s.serialize_field("id", &self.id())?;
        s.serialize_field("ip", &self.ip)?;
        s.serialize_field("score", &self.score)?;
        s.serialize_field("ban_time", &self.ban_time_rfc3339())?;
        s.end()
    }
}
