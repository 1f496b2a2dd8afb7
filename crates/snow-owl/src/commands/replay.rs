use anyhow::{Context, Result, bail};
use serde::Deserialize;
use snow_owl_defender::{Defender, HostEvent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::AppConfig;

/// One line of an event log
#[derive(Debug, Deserialize)]
struct EventRecord {
    ip: String,
    event: HostEvent,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Feed every record of `reader` into `defender`
///
/// Blank lines are ignored; malformed lines are logged and counted as
/// skipped.
pub async fn replay_events<R>(defender: &Defender, reader: R) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read event log")? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<EventRecord>(line) {
            Ok(record) => {
                defender.add_event(&record.ip, record.event);
                summary.applied += 1;
            }
            Err(e) => {
                warn!(
                    event = "replay_line_skipped",
                    line = line_number,
                    error = %e,
                    "Skipping malformed event record"
                );
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Replay an event log and print the resulting host table as JSON
pub async fn run(config: &AppConfig, file: &Path) -> Result<()> {
    let Some(defender) =
        Defender::from_config(config.defender.clone()).context("Failed to create defender")?
    else {
        bail!("Defender is disabled in the configuration");
    };
    let defender = Arc::new(defender);

    let cleanup_task = (config.cleanup_interval_secs > 0).then(|| {
        Arc::clone(&defender)
            .spawn_cleanup_task(Duration::from_secs(config.cleanup_interval_secs))
    });

    let summary = if file == Path::new("-") {
        replay_events(&defender, BufReader::new(tokio::io::stdin())).await
    } else {
        let log = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("Failed to open event log {}", file.display()))?;
        replay_events(&defender, BufReader::new(log)).await
    };

    if let Some(task) = cleanup_task {
        task.abort();
    }
    let summary = summary?;

    info!(
        event = "replay_completed",
        applied = summary.applied,
        skipped = summary.skipped,
        hosts = defender.count_hosts(),
        banned = defender.count_banned(),
        "Event log replayed"
    );

    let hosts = serde_json::to_string_pretty(&defender.get_hosts())
        .context("Failed to serialize host table")?;
    println!("{}", hosts);
    Ok(())
}
