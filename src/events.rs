//! Lifecycle events emitted by the updater.
//!
//! Hosts receive these over the channel handed to
//! [`AutoUpdater::new`](crate::AutoUpdater::new) and drive their own UI or
//! restart flow from them. Events for a cycle always arrive in order:
//! `CheckingForUpdate`, then either `UpdateNotAvailable` or
//! `UpdateAvailable` followed by `UpdateDownloaded`, with `Error` replacing
//! whichever step failed.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Messages from an update cycle to the host application.
#[derive(Debug, Clone)]
pub enum UpdaterEvent {
    /// A check cycle has started.
    CheckingForUpdate,
    /// The feed reported a release newer than the running version; the
    /// download step starts immediately after this.
    UpdateAvailable,
    /// The feed reported nothing to apply.
    UpdateNotAvailable,
    /// The update was downloaded and is ready to apply. Call
    /// [`AutoUpdater::quit_and_install`](crate::AutoUpdater::quit_and_install)
    /// to restart into it.
    UpdateDownloaded(DownloadedUpdate),
    /// An operational failure. Carries both the wire error object and the
    /// plain message string, matching what legacy consumers received.
    Error { error: WireError, message: String },
}

/// Payload of [`UpdaterEvent::UpdateDownloaded`].
#[derive(Debug, Clone)]
pub struct DownloadedUpdate {
    pub release_notes: String,
    pub version: String,
    /// Stamped locally when the download completes. The Windows toolchain
    /// reports no publish time, so this approximates it.
    pub date: DateTime<Utc>,
    pub feed_url: String,
}

/// Error shape legacy consumers received across the process boundary:
/// exactly the fields `stack`, `message`, `name`.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub stack: String,
    pub message: String,
    pub name: String,
}

impl WireError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        WireError {
            stack: format!("Error: {}", message),
            message,
            name: "Error".to_string(),
        }
    }
}
