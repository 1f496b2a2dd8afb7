//! Defender Integration Tests
//!
//! Tests for the defender as protocol handlers use it:
//! - Safe and block lists loaded from files
//! - Score accumulation, bans and escalation
//! - Capacity limits for tracked and banned hosts
//! - Concurrent access from many connection handlers

use chrono::{DateTime, TimeZone, Utc};
use snow_owl_defender::{
    Defender, DefenderConfig, DefenderError, HostEvent, HostListFile, TimeSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tempfile::TempDir;

struct ControllableTimeSource {
    millis: AtomicI64,
}

impl ControllableTimeSource {
    fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap();
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl TimeSource for ControllableTimeSource {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap()
    }
}

fn write_list(dir: &Path, name: &str, addresses: &[&str], networks: &[&str]) -> PathBuf {
    let list = HostListFile {
        addresses: addresses.iter().map(|s| s.to_string()).collect(),
        networks: networks.iter().map(|s| s.to_string()).collect(),
    };
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(&list).expect("Failed to serialize"))
        .expect("Failed to write host list");
    path
}

fn base_config() -> DefenderConfig {
    DefenderConfig {
        enabled: true,
        ban_time: 10,
        ban_time_increment: 2,
        threshold: 5,
        score_invalid: 2,
        score_valid: 1,
        score_limit_exceeded: 3,
        observation_time: 15,
        entries_soft_limit: 1,
        entries_hard_limit: 2,
        safelist_file: None,
        blocklist_file: None,
    }
}

fn listed_config(dir: &Path) -> DefenderConfig {
    DefenderConfig {
        blocklist_file: Some(write_list(
            dir,
            "bl.json",
            &["172.16.1.1", "172.16.1.2"],
            &["10.8.0.0/24"],
        )),
        safelist_file: Some(write_list(
            dir,
            "sl.json",
            &["172.16.1.3", "172.16.1.4"],
            &["192.168.8.0/24"],
        )),
        ..base_config()
    }
}

#[test]
fn test_missing_list_files_fail_construction() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = listed_config(temp_dir.path());

    config.safelist_file = Some(PathBuf::from("slFile"));
    let err = Defender::new(config.clone()).unwrap_err();
    assert!(matches!(err, DefenderError::ListLoadIo { .. }));

    config.safelist_file = Some(temp_dir.path().join("sl.json"));
    config.blocklist_file = Some(PathBuf::from("blFile"));
    assert!(Defender::new(config.clone()).is_err());

    config.blocklist_file = Some(temp_dir.path().join("bl.json"));
    assert!(Defender::new(config).is_ok());
}

#[test]
fn test_block_list_is_banned_without_events() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let defender = Defender::new(listed_config(temp_dir.path())).expect("Failed to create defender");

    assert!(defender.is_banned("172.16.1.1"));
    assert!(!defender.is_banned("172.16.1.10"));
    assert!(!defender.is_banned("10.8.2.3"));
    assert!(defender.is_banned("10.8.0.3"));
    assert!(!defender.is_banned("invalid ip"));
    assert_eq!(defender.count_banned(), 0);
    assert_eq!(defender.count_hosts(), 0);
    assert!(defender.get_hosts().is_empty());
    assert!(defender.get_host("10.8.0.4").is_err());

    // block listed hosts never take table space
    for _ in 0..10 {
        defender.add_event("10.8.0.3", HostEvent::NoLoginTried);
    }
    assert_eq!(defender.count_banned(), 0);
    assert_eq!(defender.count_hosts(), 0);
    assert!(defender.get_ban_time("10.8.0.3").is_none());
}

#[test]
fn test_safe_list_is_never_banned() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let defender = Defender::new(listed_config(temp_dir.path())).expect("Failed to create defender");

    for _ in 0..20 {
        defender.add_event("172.16.1.4", HostEvent::LoginFailed);
        defender.add_event("192.168.8.4", HostEvent::UserNotFound);
        defender.add_event("172.16.1.3", HostEvent::LimitExceeded);
    }
    assert_eq!(defender.count_hosts(), 0);
    assert!(!defender.is_banned("172.16.1.4"));
    assert!(!defender.is_banned("192.168.8.4"));
    assert!(defender.is_safe("192.168.8.200"));
    assert!(!defender.is_safe("192.168.9.1"));
}

#[test]
fn test_full_lifecycle_with_eviction() {
    let time = Arc::new(ControllableTimeSource::new());
    let defender = Defender::with_time_source(base_config(), time.clone())
        .expect("Failed to create defender");
    let second = chrono::Duration::seconds(1);

    let test_ip = "12.34.56.78";
    defender.add_event(test_ip, HostEvent::LoginFailed);
    defender.add_event(test_ip, HostEvent::LimitExceeded);
    assert_eq!(defender.get_score(test_ip), 4);
    defender.add_event(test_ip, HostEvent::NoLoginTried);
    assert!(defender.is_banned(test_ip));
    assert_eq!(defender.count_banned(), 1);

    let (ip1, ip2, ip3) = ("12.34.56.79", "12.34.56.80", "12.34.56.81");

    time.advance(second);
    defender.add_event(ip1, HostEvent::NoLoginTried);
    time.advance(second);
    defender.add_event(ip2, HostEvent::NoLoginTried);
    assert_eq!(defender.count_hosts(), 2);

    time.advance(second);
    defender.add_event(ip3, HostEvent::NoLoginTried);
    assert_eq!(defender.count_hosts(), 1);
    assert_eq!(defender.get_score(ip1), 0);
    assert_eq!(defender.get_score(ip2), 0);
    assert_eq!(defender.get_score(ip3), 2);

    defender.add_event(ip3, HostEvent::NoLoginTried);
    defender.add_event(ip3, HostEvent::NoLoginTried);
    assert!(defender.get_ban_time(ip3).is_some());
    assert_eq!(defender.count_hosts(), 0);
    assert_eq!(defender.count_banned(), 2);

    time.advance(second);
    for _ in 0..3 {
        defender.add_event(ip1, HostEvent::NoLoginTried);
    }
    // third ban exceeds the hard limit, only the latest expiry survives
    assert_eq!(defender.count_hosts(), 0);
    assert_eq!(defender.count_banned(), 1);
    assert!(defender.get_ban_time(test_ip).is_none());
    assert!(defender.get_ban_time(ip3).is_none());
    assert!(defender.get_ban_time(ip1).is_some());

    let ban_time = defender.get_ban_time(ip1).expect("ip1 should be banned");
    defender.add_event(ip1, HostEvent::LoginFailed);
    let new_ban_time = defender.get_ban_time(ip1).expect("ip1 should be banned");
    assert!(new_ban_time > ban_time);

    assert!(defender.delete_host(ip1));
    assert!(!defender.delete_host(ip1));
}

#[test]
fn test_host_table_never_exceeds_hard_limit() {
    let time = Arc::new(ControllableTimeSource::new());
    let config = DefenderConfig {
        threshold: 10,
        score_invalid: 2,
        score_valid: 2,
        ban_time: 30,
        ban_time_increment: 50,
        observation_time: 30,
        entries_soft_limit: 50,
        entries_hard_limit: 100,
        ..base_config()
    };
    let defender =
        Defender::with_time_source(config, time.clone()).expect("Failed to create defender");

    for round in 0..3 {
        for i in 0..=255u8 {
            time.advance(chrono::Duration::milliseconds(10));
            defender.add_event(&format!("192.168.4.{}", i), HostEvent::LoginFailed);
            assert!(defender.count_hosts() <= 100, "round {} host {}", round, i);
            assert!(defender.count_banned() <= 50, "round {} host {}", round, i);
        }
    }

    // the table settles between the soft and hard limits
    assert!(defender.count_hosts() >= 50);
}

#[test]
fn test_ban_table_never_exceeds_hard_limit() {
    let time = Arc::new(ControllableTimeSource::new());
    let config = DefenderConfig {
        entries_soft_limit: 5,
        entries_hard_limit: 10,
        ..base_config()
    };
    let defender =
        Defender::with_time_source(config, time.clone()).expect("Failed to create defender");

    for i in 0..40u8 {
        time.advance(chrono::Duration::seconds(1));
        let ip = format!("203.0.113.{}", i);
        for _ in 0..3 {
            defender.add_event(&ip, HostEvent::UserNotFound);
        }
        assert!(defender.count_banned() <= 10);
    }

    // every eviction keeps the latest expiries, so the newest bans survive
    let banned: Vec<String> = defender.get_hosts().into_iter().map(|e| e.ip).collect();
    assert!(banned.len() >= 5 && banned.len() <= 10);
    assert!(banned.contains(&"203.0.113.39".to_string()));
    assert!(!banned.contains(&"203.0.113.0".to_string()));
}

#[test]
fn test_oversized_durations_fail_construction() {
    for config in [
        DefenderConfig {
            observation_time: 1_000_000_000_000,
            ..base_config()
        },
        DefenderConfig {
            ban_time: 1_000_000_000_000_000,
            ..base_config()
        },
    ] {
        let err = Defender::new(config).unwrap_err();
        assert!(matches!(err, DefenderError::Config(_)));
    }
}

#[test]
fn test_longest_valid_durations_keep_accepting_events() {
    let time = Arc::new(ControllableTimeSource::new());
    let config = DefenderConfig {
        ban_time: snow_owl_defender::config::MAX_DURATION_MINUTES,
        ban_time_increment: 100,
        observation_time: snow_owl_defender::config::MAX_DURATION_MINUTES,
        ..base_config()
    };
    let defender =
        Defender::with_time_source(config, time.clone()).expect("Failed to create defender");
    let ip = "198.51.100.99";

    for _ in 0..3000 {
        defender.add_event(ip, HostEvent::LimitExceeded);
    }
    assert!(defender.is_banned(ip));
    assert_eq!(defender.get_ban_time(ip), Some(DateTime::<Utc>::MAX_UTC));

    time.advance(chrono::Duration::days(365 * 1000));
    assert!(defender.is_banned(ip));
    defender.add_event(ip, HostEvent::LoginFailed);
    assert_eq!(defender.count_banned(), 1);
}

#[test]
fn test_reload_swaps_lists() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = listed_config(temp_dir.path());
    let block_path = config.blocklist_file.clone().expect("blocklist configured");
    let defender = Defender::new(config).expect("Failed to create defender");

    assert!(defender.is_banned("172.16.1.1"));
    assert!(!defender.is_banned("198.51.100.7"));

    write_list(temp_dir.path(), "bl.json", &["198.51.100.7"], &[]);
    defender.reload().expect("Failed to reload lists");
    assert!(!defender.is_banned("172.16.1.1"));
    assert!(defender.is_banned("198.51.100.7"));

    // a broken file keeps the previous lists in effect
    std::fs::write(&block_path, b"{ broken").expect("Failed to write file");
    let err = defender.reload().unwrap_err();
    assert!(matches!(err, DefenderError::ListLoadParse { .. }));
    assert!(defender.is_banned("198.51.100.7"));

    // empty declarations remove the list entirely
    write_list(temp_dir.path(), "bl.json", &[], &[]);
    defender.reload().expect("Failed to reload lists");
    assert!(!defender.is_banned("198.51.100.7"));
}

#[test]
fn test_concurrent_handlers() {
    let config = DefenderConfig {
        threshold: 10,
        entries_soft_limit: 20,
        entries_hard_limit: 40,
        ..base_config()
    };
    let defender = Defender::new(config).expect("Failed to create defender");

    std::thread::scope(|scope| {
        for worker in 0..8u8 {
            let defender = &defender;
            scope.spawn(move || {
                for i in 0..200u16 {
                    let ip = format!("10.{}.{}.{}", worker, i / 256, i % 256);
                    defender.add_event(&ip, HostEvent::UserNotFound);
                    defender.add_event(&ip, HostEvent::LimitExceeded);
                    let _ = defender.is_banned(&ip);
                    let _ = defender.get_score(&ip);
                    assert!(defender.count_hosts() <= 40);
                    assert!(defender.count_banned() <= 40);
                }
            });
        }

        scope.spawn(|| {
            for _ in 0..200 {
                for entry in defender.get_hosts() {
                    assert!(entry.score == 0 || entry.ban_time.is_none());
                }
            }
        });
    });

    assert!(defender.count_hosts() <= 40);
}
