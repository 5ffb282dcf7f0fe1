//! The auto-update facade.
//!
//! [`AutoUpdater`] owns a feed URL and an [`UpdateBackend`], and turns the
//! backend's results into ordered [`UpdaterEvent`]s on the channel the host
//! supplied. A check cycle runs check-then-download on one background
//! thread; configuration mistakes are returned from [`AutoUpdater::initialize`]
//! directly, every runtime failure goes out as an event.
//!
//! # Error Handling Patterns
//!
//! Event sends use `let _ =`: if the receiver is dropped the host has shut
//! down and there is no one left to tell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use tracing::debug;

use crate::config::InitOptions;
use crate::error::{Result, UpdaterError};
use crate::events::{DownloadedUpdate, UpdaterEvent, WireError};
use crate::squirrel::UpdateBackend;

/// Where in the update cycle the updater currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Checking,
    Downloading,
    Downloaded,
    Installing,
}

/// Event-emitting wrapper around the external updater toolchain.
///
/// Explicitly constructed and explicitly owned: the host builds one, keeps
/// the receiving end of the channel, and calls the lifecycle methods. There
/// is no global instance.
pub struct AutoUpdater {
    backend: Arc<dyn UpdateBackend>,
    tx: Sender<UpdaterEvent>,
    feed_url: Option<String>,
    update_available: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    phase: Arc<Mutex<Phase>>,
}

impl AutoUpdater {
    pub fn new(backend: Arc<dyn UpdateBackend>, tx: Sender<UpdaterEvent>) -> Self {
        AutoUpdater {
            backend,
            tx,
            feed_url: None,
            update_available: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    /// Store the feed URL for later checks. Idempotent, last call wins.
    ///
    /// Accepts the two legacy shapes (a bare URL string, or options with a
    /// `url` field) via [`InitOptions`]; malformed arguments are returned as
    /// [`UpdaterError::Config`], never emitted. An empty URL is stored
    /// as-is and only rejected by [`check_for_updates`](Self::check_for_updates).
    pub fn initialize(&mut self, options: impl Into<InitOptions>) -> Result<()> {
        let url = options.into().into_feed_url()?;
        debug!(feed_url = %url, "updater initialized");
        self.feed_url = Some(url);
        Ok(())
    }

    /// [`initialize`](Self::initialize) for hosts that hand configuration
    /// through as dynamic JSON, reproducing the legacy argument dispatch.
    pub fn initialize_value(&mut self, value: &serde_json::Value) -> Result<()> {
        self.initialize(InitOptions::from_value(value)?)
    }

    /// The configured feed URL, or the empty string when unset.
    pub fn feed_url(&self) -> &str {
        self.feed_url.as_deref().unwrap_or("")
    }

    #[deprecated(note = "use `initialize` instead")]
    pub fn set_feed_url(&mut self, url: impl Into<String>) {
        self.feed_url = Some(url.into());
    }

    /// Whether a check cycle has reported an update this process lifetime.
    /// Only a restart resets it.
    pub fn update_available(&self) -> bool {
        self.update_available.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a check-then-download cycle.
    ///
    /// Never fails directly; problems arrive as [`UpdaterEvent::Error`].
    /// With no feed URL configured, or without the updater toolchain, this
    /// emits exactly one error event and nothing else. A call while a cycle
    /// is already in flight is ignored.
    pub fn check_for_updates(&self) {
        let feed_url = match self.feed_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return self.emit_error(&UpdaterError::FeedUrlNotSet),
        };
        if !self.backend.is_supported() {
            return self.emit_error(&UpdaterError::SquirrelMissing);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("check_for_updates ignored, a cycle is already in flight");
            return;
        }

        set_phase(&self.phase, Phase::Checking);
        let _ = self.tx.send(UpdaterEvent::CheckingForUpdate);

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let update_available = Arc::clone(&self.update_available);
        let in_flight = Arc::clone(&self.in_flight);
        let phase = Arc::clone(&self.phase);
        thread::spawn(move || {
            run_cycle(backend.as_ref(), &tx, &feed_url, &update_available, &phase);
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Stage the downloaded update and terminate the host process.
    ///
    /// Emits an error event (and does not terminate) when no update has
    /// been reported available this process lifetime.
    pub fn quit_and_install(&self) {
        if !self.update_available.load(Ordering::SeqCst) {
            return self.emit_error(&UpdaterError::NoUpdateAvailable);
        }
        set_phase(&self.phase, Phase::Installing);
        if let Err(err) = self.backend.stage_install_on_restart() {
            return self.emit_error(&err);
        }
        self.backend.quit();
    }

    fn emit_error(&self, err: &UpdaterError) {
        emit_error(&self.tx, err);
    }
}

/// One check-then-download cycle, run off the caller's thread. Events leave
/// through a single sender, so their order is the order they happened.
fn run_cycle(
    backend: &dyn UpdateBackend,
    tx: &Sender<UpdaterEvent>,
    feed_url: &str,
    update_available: &AtomicBool,
    phase: &Mutex<Phase>,
) {
    let update = match backend.check_for_update(feed_url) {
        Ok(update) => update,
        Err(err) => {
            set_phase(phase, Phase::Idle);
            return emit_error(tx, &err);
        }
    };

    let Some(update) = update else {
        set_phase(phase, Phase::Idle);
        let _ = tx.send(UpdaterEvent::UpdateNotAvailable);
        return;
    };

    update_available.store(true, Ordering::SeqCst);
    let _ = tx.send(UpdaterEvent::UpdateAvailable);

    set_phase(phase, Phase::Downloading);
    if let Err(err) = backend.download_update(feed_url) {
        set_phase(phase, Phase::Idle);
        return emit_error(tx, &err);
    }

    set_phase(phase, Phase::Downloaded);
    let _ = tx.send(UpdaterEvent::UpdateDownloaded(DownloadedUpdate {
        release_notes: update.release_notes,
        version: update.version,
        // The Windows toolchain reports no publish time; stamp locally.
        date: Utc::now(),
        feed_url: feed_url.to_string(),
    }));
}

// Both the wire error object and the plain message string go out, to keep
// compatibility with consumers of the old two-argument error events.
fn emit_error(tx: &Sender<UpdaterEvent>, err: &UpdaterError) {
    let message = err.to_string();
    let _ = tx.send(UpdaterEvent::Error {
        error: WireError::new(message.as_str()),
        message,
    });
}

fn set_phase(phase: &Mutex<Phase>, next: Phase) {
    let mut guard = phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let from = *guard;
    debug!(?from, ?next, "phase transition");
    *guard = next;
}

#[cfg(test)]
mod tests {
    use super::{AutoUpdater, Phase};
    use crate::config::FeedOptions;
    use crate::error::{Result, UpdaterError};
    use crate::events::UpdaterEvent;
    use crate::squirrel::{UpdateBackend, UpdateInfo};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone)]
    enum CheckScript {
        Update(UpdateInfo),
        NoUpdate,
        Fail(&'static str),
    }

    struct MockBackend {
        supported: bool,
        check: CheckScript,
        download_fails: bool,
        /// When set, `check_for_update` blocks until the gate receives.
        gate: Option<Mutex<Receiver<()>>>,
        staged: AtomicBool,
        quit_called: AtomicBool,
    }

    impl MockBackend {
        fn with_check(check: CheckScript) -> Self {
            MockBackend {
                supported: true,
                check,
                download_fails: false,
                gate: None,
                staged: AtomicBool::new(false),
                quit_called: AtomicBool::new(false),
            }
        }
    }

    impl UpdateBackend for MockBackend {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn check_for_update(&self, _feed_url: &str) -> Result<Option<UpdateInfo>> {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            match &self.check {
                CheckScript::Update(info) => Ok(Some(info.clone())),
                CheckScript::NoUpdate => Ok(None),
                CheckScript::Fail(message) => Err(UpdaterError::Tool(message.to_string())),
            }
        }

        fn download_update(&self, _feed_url: &str) -> Result<()> {
            if self.download_fails {
                Err(UpdaterError::Tool("download failed".to_string()))
            } else {
                Ok(())
            }
        }

        fn stage_install_on_restart(&self) -> Result<()> {
            self.staged.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn quit(&self) {
            self.quit_called.store(true, Ordering::SeqCst);
        }
    }

    fn sample_update() -> UpdateInfo {
        UpdateInfo {
            version: "1.2.3".to_string(),
            release_notes: "bug fixes".to_string(),
        }
    }

    fn updater_with(
        backend: MockBackend,
    ) -> (AutoUpdater, Arc<MockBackend>, Receiver<UpdaterEvent>) {
        let backend = Arc::new(backend);
        let (tx, rx) = mpsc::channel();
        let updater = AutoUpdater::new(backend.clone(), tx);
        (updater, backend, rx)
    }

    fn recv(rx: &Receiver<UpdaterEvent>) -> UpdaterEvent {
        rx.recv_timeout(Duration::from_secs(5)).expect("expected an event")
    }

    fn error_message(event: UpdaterEvent) -> String {
        match event {
            UpdaterEvent::Error { message, .. } => message,
            other => panic!("expected an error event, got {:?}", other),
        }
    }

    #[test]
    fn test_feed_url_defaults_to_empty() {
        let (updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        assert_eq!(updater.feed_url(), "");
    }

    #[test]
    fn test_initialize_stores_url_and_last_call_wins() {
        let (mut updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.initialize("https://first.example.com").unwrap();
        updater.initialize("https://second.example.com").unwrap();
        assert_eq!(updater.feed_url(), "https://second.example.com");
    }

    #[test]
    fn test_initialize_options_form() {
        let (mut updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater
            .initialize(FeedOptions {
                url: Some("https://updates.example.com".to_string()),
                update_url: None,
            })
            .unwrap();
        assert_eq!(updater.feed_url(), "https://updates.example.com");
    }

    #[test]
    fn test_initialize_options_without_url_fails() {
        let (mut updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        let err = updater.initialize(FeedOptions::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("Expected options object to contain a 'url' string property"));
    }

    #[test]
    fn test_initialize_value_rejects_missing_argument() {
        let (mut updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        let err = updater.initialize_value(&serde_json::Value::Null).unwrap_err();
        assert!(err
            .to_string()
            .contains("Expected an options object with a 'url' property to be provided"));
    }

    #[test]
    fn test_deprecated_set_feed_url_alias() {
        let (mut updater, _, _rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        #[allow(deprecated)]
        updater.set_feed_url("https://updates.example.com");
        assert_eq!(updater.feed_url(), "https://updates.example.com");
    }

    #[test]
    fn test_check_without_feed_url_emits_single_error() {
        let (updater, _, rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.check_for_updates();
        assert_eq!(error_message(recv(&rx)), "Update URL is not set");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_check_with_empty_feed_url_emits_single_error() {
        let (mut updater, _, rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.initialize("").unwrap();
        updater.check_for_updates();
        assert_eq!(error_message(recv(&rx)), "Update URL is not set");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_check_without_toolchain_emits_single_error() {
        let mut backend = MockBackend::with_check(CheckScript::NoUpdate);
        backend.supported = false;
        let (mut updater, _, rx) = updater_with(backend);
        updater.initialize("https://updates.example.com").unwrap();
        updater.check_for_updates();
        assert_eq!(error_message(recv(&rx)), "Can not find Squirrel");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_cycle_event_order() {
        let (mut updater, _, rx) =
            updater_with(MockBackend::with_check(CheckScript::Update(sample_update())));
        updater.initialize("https://updates.example.com").unwrap();
        assert!(!updater.update_available());

        updater.check_for_updates();

        assert!(matches!(recv(&rx), UpdaterEvent::CheckingForUpdate));
        assert!(matches!(recv(&rx), UpdaterEvent::UpdateAvailable));
        assert!(updater.update_available());

        match recv(&rx) {
            UpdaterEvent::UpdateDownloaded(update) => {
                assert_eq!(update.version, "1.2.3");
                assert_eq!(update.release_notes, "bug fixes");
                assert_eq!(update.feed_url, "https://updates.example.com");
            }
            other => panic!("expected UpdateDownloaded, got {:?}", other),
        }
        assert_eq!(updater.phase(), Phase::Downloaded);
    }

    #[test]
    fn test_no_update_cycle() {
        let (mut updater, _, rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.initialize("https://updates.example.com").unwrap();
        updater.check_for_updates();

        assert!(matches!(recv(&rx), UpdaterEvent::CheckingForUpdate));
        assert!(matches!(recv(&rx), UpdaterEvent::UpdateNotAvailable));
        assert!(!updater.update_available());
    }

    #[test]
    fn test_check_failure_emits_error_after_checking() {
        let (mut updater, _, rx) =
            updater_with(MockBackend::with_check(CheckScript::Fail("feed unreachable")));
        updater.initialize("https://updates.example.com").unwrap();
        updater.check_for_updates();

        assert!(matches!(recv(&rx), UpdaterEvent::CheckingForUpdate));
        assert_eq!(error_message(recv(&rx)), "feed unreachable");
        assert!(!updater.update_available());
    }

    #[test]
    fn test_download_failure_keeps_availability_flag() {
        let mut backend = MockBackend::with_check(CheckScript::Update(sample_update()));
        backend.download_fails = true;
        let (mut updater, _, rx) = updater_with(backend);
        updater.initialize("https://updates.example.com").unwrap();
        updater.check_for_updates();

        assert!(matches!(recv(&rx), UpdaterEvent::CheckingForUpdate));
        assert!(matches!(recv(&rx), UpdaterEvent::UpdateAvailable));
        assert_eq!(error_message(recv(&rx)), "download failed");
        // An error ends the cycle but never clears availability.
        assert!(updater.update_available());
    }

    #[test]
    fn test_error_event_carries_wire_error() {
        let (updater, _, rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.check_for_updates();
        match recv(&rx) {
            UpdaterEvent::Error { error, message } => {
                assert_eq!(error.message, message);
                assert_eq!(error.name, "Error");
                assert_eq!(error.stack, format!("Error: {}", message));
            }
            other => panic!("expected an error event, got {:?}", other),
        }
    }

    #[test]
    fn test_quit_and_install_without_update_does_not_quit() {
        let (updater, backend, rx) = updater_with(MockBackend::with_check(CheckScript::NoUpdate));
        updater.quit_and_install();
        assert_eq!(
            error_message(recv(&rx)),
            "No update available, can't quit and install"
        );
        assert!(!backend.staged.load(Ordering::SeqCst));
        assert!(!backend.quit_called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_quit_and_install_after_download() {
        let (mut updater, backend, rx) =
            updater_with(MockBackend::with_check(CheckScript::Update(sample_update())));
        updater.initialize("https://updates.example.com").unwrap();
        updater.check_for_updates();
        loop {
            if matches!(recv(&rx), UpdaterEvent::UpdateDownloaded(_)) {
                break;
            }
        }

        updater.quit_and_install();
        assert!(backend.staged.load(Ordering::SeqCst));
        assert!(backend.quit_called.load(Ordering::SeqCst));
        assert_eq!(updater.phase(), Phase::Installing);
    }

    #[test]
    fn test_reentrant_check_is_ignored() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let mut backend = MockBackend::with_check(CheckScript::NoUpdate);
        backend.gate = Some(Mutex::new(gate_rx));
        let (mut updater, _, rx) = updater_with(backend);
        updater.initialize("https://updates.example.com").unwrap();

        updater.check_for_updates();
        // Second call lands while the first cycle is blocked in the check.
        updater.check_for_updates();
        gate_tx.send(()).unwrap();

        assert!(matches!(recv(&rx), UpdaterEvent::CheckingForUpdate));
        assert!(matches!(recv(&rx), UpdaterEvent::UpdateNotAvailable));
        assert!(rx.try_recv().is_err());
    }
}
