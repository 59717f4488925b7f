//! Config file poller feeding the coordinator's settings stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use routegrid_core::{publish_if_changed, RoutegridConfig, SettingsSender};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of one poll of the config file.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Published,
    /// File unreadable or invalid; the previous settings stay in force.
    Rejected,
}

/// Re-read `path` and publish coordinator settings if they changed.
///
/// Store changes are only reported: the database and document key are bound
/// at startup.
pub fn poll_config(path: &Path, tx: &SettingsSender, current: &mut RoutegridConfig) -> PollOutcome {
    let next = match RoutegridConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = ?path, error = %e, "config reload failed; keeping previous settings");
            return PollOutcome::Rejected;
        }
    };

    if next.store != current.store {
        warn!(path = ?path, "store settings changed; restart routegridd to apply them");
    }

    let published = publish_if_changed(tx, next.settings());
    *current = next;
    if published {
        info!(path = ?path, "coordinator settings reloaded");
        PollOutcome::Published
    } else {
        PollOutcome::Unchanged
    }
}

/// Poll the config file every `interval` until shutdown is signalled.
pub async fn run(
    path: PathBuf,
    interval: Duration,
    mut current: RoutegridConfig,
    tx: SettingsSender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                poll_config(&path, &tx, &mut current);
            }
            _ = shutdown.changed() => {
                debug!("config reloader shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routegrid_core::settings_channel;

    fn write_config(file: &tempfile::NamedTempFile, interval_ms: u64, timeout_ms: u64) {
        let body = format!(
            "[coordinator]\nupdate_interval_ms = {interval_ms}\ntimeout_threshold_ms = {timeout_ms}\n"
        );
        std::fs::write(file.path(), body).unwrap();
    }

    #[test]
    fn publishes_only_on_change() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, 30_000, 90_000);
        let mut current = RoutegridConfig::from_file(file.path()).unwrap();
        let (tx, mut rx) = settings_channel(current.settings());
        rx.borrow_and_update();

        assert_eq!(poll_config(file.path(), &tx, &mut current), PollOutcome::Unchanged);
        assert!(!rx.has_changed().unwrap());

        write_config(&file, 45_000, 120_000);
        assert_eq!(poll_config(file.path(), &tx, &mut current), PollOutcome::Published);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().update_interval, Duration::from_secs(45));
        assert_eq!(current.coordinator.timeout_threshold_ms, 120_000);
    }

    #[test]
    fn invalid_file_keeps_previous_settings() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, 30_000, 90_000);
        let mut current = RoutegridConfig::from_file(file.path()).unwrap();
        let (tx, rx) = settings_channel(current.settings());

        write_config(&file, 0, 90_000);
        assert_eq!(poll_config(file.path(), &tx, &mut current), PollOutcome::Rejected);
        assert_eq!(*rx.borrow(), current.settings());
        assert_eq!(current.coordinator.update_interval_ms, 30_000);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, 30_000, 90_000);
        let current = RoutegridConfig::from_file(file.path()).unwrap();
        let (tx, mut rx) = settings_channel(current.settings());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(
            file.path().to_path_buf(),
            Duration::from_millis(10),
            current,
            tx,
            shutdown_rx,
        ));

        write_config(&file, 60_000, 200_000);
        // A poll may catch the file mid-write; wait for the full value.
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let timeout = rx.borrow_and_update().timeout_threshold;
                if timeout == Duration::from_secs(200) {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(rx.borrow().update_interval, Duration::from_secs(60));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
