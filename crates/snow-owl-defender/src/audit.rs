use serde::{Deserialize, Serialize};
use tracing::{Level, event};

/// Security audit events emitted by the defender
///
/// NIST 800-53 Controls:
/// - AU-2: Audit Events (ban lifecycle and list changes)
/// - AU-3: Content of Audit Records (structured event data)
/// - AU-12: Audit Generation (automatic event generation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DefenderAuditEvent {
    /// Safe and block lists loaded or reloaded
    HostListsLoaded {
        #[serde(flatten)]
        common: CommonFields,
        safelist_file: Option<String>,
        blocklist_file: Option<String>,
        safelist_active: bool,
        blocklist_active: bool,
    },

    /// Reloading the host lists failed, previous lists stay active
    HostListsReloadFailed {
        #[serde(flatten)]
        common: CommonFields,
        error: String,
    },

    /// Host score reached the threshold
    HostBanned {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        trigger: String,
        ban_expires: String,
    },

    /// Banned host kept offending, ban lengthened
    BanExtended {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
        trigger: String,
        ban_expires: String,
    },

    /// Capacity limit reached, entries evicted
    EntriesEvicted {
        #[serde(flatten)]
        common: CommonFields,
        table: String,
        evicted: usize,
        remaining: usize,
    },

    /// Host removed by an operator
    HostRemoved {
        #[serde(flatten)]
        common: CommonFields,
        client_addr: String,
    },
}

/// Common fields present in all audit events
///
/// NIST 800-53 AU-3: Content of Audit Records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonFields {
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Hostname or system identifier
    pub hostname: String,
    /// Service name
    pub service: String,
    /// Severity level (info, warn, error)
    pub severity: String,
}

impl CommonFields {
    /// Create common fields with current timestamp
    pub fn new(severity: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            service: "snow-owl-defender".to_string(),
            severity: severity.to_string(),
        }
    }
}

impl DefenderAuditEvent {
    /// Log this audit event using structured tracing
    pub fn log(&self) {
        let json = serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"Failed to serialize audit event: {:?}\"}}",
                self
            )
        });

        match self.common().severity.as_str() {
            "error" => event!(Level::ERROR, audit_event = %json),
            "warn" => event!(Level::WARN, audit_event = %json),
            _ => event!(Level::INFO, audit_event = %json),
        }
    }

    fn common(&self) -> &CommonFields {
        match self {
            DefenderAuditEvent::HostListsLoaded { common, .. }
            | DefenderAuditEvent::HostListsReloadFailed { common, .. }
            | DefenderAuditEvent::HostBanned { common, .. }
            | DefenderAuditEvent::BanExtended { common, .. }
            | DefenderAuditEvent::EntriesEvicted { common, .. }
            | DefenderAuditEvent::HostRemoved { common, .. } => common,
        }
    }
}

/// Audit logger for defender decisions
pub struct AuditLogger;

impl AuditLogger {
    /// Log host lists becoming active
    pub fn host_lists_loaded(
        safelist_file: Option<String>,
        blocklist_file: Option<String>,
        safelist_active: bool,
        blocklist_active: bool,
    ) {
        DefenderAuditEvent::HostListsLoaded {
            common: CommonFields::new("info"),
            safelist_file,
            blocklist_file,
            safelist_active,
            blocklist_active,
        }
        .log();
    }

    /// Log a failed list reload
    pub fn host_lists_reload_failed(error: &str) {
        DefenderAuditEvent::HostListsReloadFailed {
            common: CommonFields::new("error"),
            error: error.to_string(),
        }
        .log();
    }

    /// Log a new ban
    pub fn host_banned(client_addr: &str, trigger: &str, ban_expires: &str) {
        DefenderAuditEvent::HostBanned {
            common: CommonFields::new("warn"),
            client_addr: client_addr.to_string(),
            trigger: trigger.to_string(),
            ban_expires: ban_expires.to_string(),
        }
        .log();
    }

    /// Log a ban extension
    pub fn ban_extended(client_addr: &str, trigger: &str, ban_expires: &str) {
        DefenderAuditEvent::BanExtended {
            common: CommonFields::new("warn"),
            client_addr: client_addr.to_string(),
            trigger: trigger.to_string(),
            ban_expires: ban_expires.to_string(),
        }
        .log();
    }

    /// Log capacity eviction
    pub fn entries_evicted(table: &str, evicted: usize, remaining: usize) {
        DefenderAuditEvent::EntriesEvicted {
            common: CommonFields::new("warn"),
            table: table.to_string(),
            evicted,
            remaining,
        }
        .log();
    }

    /// Log an operator removal
    pub fn host_removed(client_addr: &str) {
        DefenderAuditEvent::HostRemoved {
            common: CommonFields::new("info"),
            client_addr: client_addr.to_string(),
        }
        .log();
    }
}
