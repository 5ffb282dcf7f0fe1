//! Error types for the updater.
//!
//! Two conventions, matching the legacy surface: configuration errors are
//! returned synchronously from [`initialize`](crate::AutoUpdater::initialize)
//! because they represent programmer misuse, while operational failures are
//! only ever reported through [`UpdaterEvent::Error`](crate::UpdaterEvent).

use thiserror::Error;

/// Everything that can go wrong in the updater.
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// Malformed `initialize` arguments. Returned, never emitted.
    #[error("{0}")]
    Config(String),

    /// `check_for_updates` was called before a feed URL was configured.
    #[error("Update URL is not set")]
    FeedUrlNotSet,

    /// The Squirrel toolchain is missing, or this is not a Squirrel install.
    #[error("Can not find Squirrel")]
    SquirrelMissing,

    /// `quit_and_install` was called before an update was downloaded.
    #[error("No update available, can't quit and install")]
    NoUpdateAvailable,

    /// Spawning or waiting on the updater tool failed.
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The updater tool ran but failed or produced unusable output.
    #[error("{0}")]
    Tool(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UpdaterError>;
