//! Settings stream consumed by the coordinator.
//!
//! The stream is a `tokio::sync::watch` channel: the receiver always holds the
//! latest value, which the coordinator reads once during setup and then
//! reacts to on every change.

use tokio::sync::watch;

use crate::config::CoordinatorSettings;

pub type SettingsSender = watch::Sender<CoordinatorSettings>;
pub type SettingsReceiver = watch::Receiver<CoordinatorSettings>;

/// Create a settings stream seeded with `initial`.
pub fn settings_channel(initial: CoordinatorSettings) -> (SettingsSender, SettingsReceiver) {
    watch::channel(initial)
}

/// Publish `next` only if it differs from the current value.
///
/// Returns true if receivers were notified.
pub fn publish_if_changed(tx: &SettingsSender, next: CoordinatorSettings) -> bool {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    })
}
