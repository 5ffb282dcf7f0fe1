//! Squirrel-based auto-update facade for Windows desktop apps.
//!
//! Wraps the Squirrel toolchain (`Update.exe`) behind a small event-emitting
//! service: configure a feed URL, start a check, and watch lifecycle events
//! arrive on a channel. The toolchain does the heavy lifting (feed protocol,
//! differential download, signature checks, staged install); this crate
//! validates configuration, drives the tool, and keeps the event order and
//! error messages hosts already rely on.
//!
//! ```no_run
//! # fn main() -> Result<(), comet_updater::UpdaterError> {
//! use std::sync::{mpsc, Arc};
//! use comet_updater::{AutoUpdater, SquirrelBackend, UpdaterEvent};
//!
//! let (tx, rx) = mpsc::channel();
//! let mut updater = AutoUpdater::new(Arc::new(SquirrelBackend::new()), tx);
//! updater.initialize("https://updates.example.com/comet/win64")?;
//! updater.check_for_updates();
//!
//! while let Ok(event) = rx.recv() {
//!     match event {
//!         UpdaterEvent::UpdateDownloaded(update) => {
//!             println!("restarting into {}", update.version);
//!             updater.quit_and_install();
//!         }
//!         UpdaterEvent::Error { message, .. } => eprintln!("update failed: {}", message),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod squirrel;
pub mod updater;
pub mod util;

pub use config::{FeedOptions, InitOptions};
pub use error::UpdaterError;
pub use events::{DownloadedUpdate, UpdaterEvent, WireError};
pub use squirrel::{SquirrelBackend, UpdateBackend, UpdateInfo};
pub use updater::{AutoUpdater, Phase};
