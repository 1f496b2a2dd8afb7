//! # Snow Owl Defender
//!
//! Host reputation engine shared by every Snow Owl protocol server.
//!
//! NIST 800-53: AC-7 (Unsuccessful Logon Attempts), SC-5 (Denial of Service Protection)
//!
//! Protocol handlers call [`Defender::is_banned`] before admitting a
//! connection and [`Defender::add_event`] for every authentication outcome.
//! Each address accumulates a score over a sliding observation window; once
//! it reaches the threshold the address is banned for a limited time, and
//! further offenses during the ban lengthen it.
//!
//! ## Features
//!
//! - Safe list and block list of addresses and CIDR networks
//! - Sliding window score decay
//! - Escalating bans for repeat offenders
//! - Bounded memory for tracked and banned hosts under sustained attack
//! - Structured audit events for SIEM integration

pub mod audit;
pub mod config;
pub mod defender;
pub mod error;
pub mod event;
pub mod host_list;
pub mod store;

pub use config::DefenderConfig;
pub use defender::{Defender, SystemTimeSource, TimeSource};
pub use error::{DefenderError, Result};
pub use event::{DefenderEntry, HostEvent};
pub use host_list::{HostList, HostListFile, load_host_list, parse_address};
pub use store::{EventOutcome, ReputationStore};
