//! Monitor Module
//!
//! Feeds already-parsed game events, one JSON object per line, into the
//! synchronizer.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::synchronizer::StateSynchronizer;

/// Counters for one monitor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub lines: u64,
    pub events: u64,
    pub forwarded: u64,
    pub rejected: u64,
}

/// Reads events as JSON lines and hands each to the synchronizer in order
pub struct JsonLinesMonitor {
    synchronizer: Arc<StateSynchronizer>,
}

impl JsonLinesMonitor {
    pub fn new(synchronizer: Arc<StateSynchronizer>) -> Self {
        Self { synchronizer }
    }

    /// Parse one line. Blank lines and `#` comments carry no event.
    pub fn parse_line(line: &str) -> Result<Option<Event>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    /// Consume `reader` until it ends or `shutdown` turns true
    pub async fn run<R>(
        &self,
        reader: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<MonitorStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = MonitorStats::default();
        info!("Event monitor started");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Event monitor shutdown");
                        break;
                    }
                    continue;
                }
            };
            let Some(line) = line else {
                debug!("Event source closed");
                break;
            };
            stats.lines += 1;

            match Self::parse_line(&line) {
                Ok(Some(event)) => {
                    stats.events += 1;
                    if self.synchronizer.handle_event(event).await.forward {
                        stats.forwarded += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    stats.rejected += 1;
                    warn!(line = stats.lines, "Skipping unreadable event: {}", e);
                }
            }
        }

        info!(
            events = stats.events,
            forwarded = stats.forwarded,
            rejected = stats.rejected,
            "Event monitor stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(JsonLinesMonitor::parse_line("").unwrap().is_none());
        assert!(JsonLinesMonitor::parse_line("  # comment").unwrap().is_none());
        assert!(JsonLinesMonitor::parse_line("{\"event\":\"Nope\"}").is_err());

        let event = JsonLinesMonitor::parse_line(
            r#"{"event":"Undocked","timestamp":"2016-01-01T12:00:00Z","station":"Lave Station"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.name(), "Undocked");
    }
}
