//! Integration with the Squirrel `Update.exe` toolchain.
//!
//! Squirrel installs applications as `...\App\app-<version>\app.exe`, with
//! `Update.exe` one level above the versioned directory. This module
//! locates that binary, drives its command-line interface, and parses the
//! release metadata it prints. Everything behind the actual check, the
//! differential download, and signature verification lives in `Update.exe`
//! itself.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, UpdaterError};
use crate::util::run_with_timeout;

/// The external updater toolchain, as the facade sees it.
///
/// The production implementation is [`SquirrelBackend`]; tests inject
/// scripted implementations to exercise the event lifecycle without
/// touching the filesystem or exiting the process.
pub trait UpdateBackend: Send + Sync {
    /// Whether the toolchain is present for this install.
    fn is_supported(&self) -> bool;

    /// Ask the feed whether there is a release to apply. `Ok(None)` means
    /// the running version is current.
    fn check_for_update(&self, feed_url: &str) -> Result<Option<UpdateInfo>>;

    /// Download (and stage) the release the last check reported.
    fn download_update(&self, feed_url: &str) -> Result<()>;

    /// Arrange for the new version to start once the current process exits.
    fn stage_install_on_restart(&self) -> Result<()>;

    /// Terminate the host process. Never returns in production.
    fn quit(&self);
}

/// Release metadata reported by a successful update check.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub version: String,
    pub release_notes: String,
}

#[derive(Debug, Deserialize)]
struct CheckOutput {
    #[serde(rename = "releasesToApply", default)]
    releases_to_apply: Vec<ReleaseEntry>,
}

#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    version: String,
    #[serde(rename = "releaseNotes", default)]
    release_notes: String,
}

/// How long a single `Update.exe` invocation may run before it is killed.
/// Downloads over slow links take a while; checks do not, but share the cap.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x8;

/// Drives the `Update.exe` that ships with a Squirrel install.
pub struct SquirrelBackend {
    update_exe: PathBuf,
    exe_name: String,
}

impl SquirrelBackend {
    /// Backend for the currently running executable.
    pub fn new() -> Self {
        let exe = std::env::current_exe().unwrap_or_default();
        Self::for_executable(&exe)
    }

    /// Backend for a specific installed executable path. `Update.exe` is
    /// expected beside the versioned app directories, one level above the
    /// executable.
    pub fn for_executable(exe: &Path) -> Self {
        let update_exe = exe
            .parent()
            .and_then(Path::parent)
            .map(|install_dir| install_dir.join("Update.exe"))
            .unwrap_or_else(|| PathBuf::from("Update.exe"));
        let exe_name = exe
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        SquirrelBackend { update_exe, exe_name }
    }

    fn run_update_tool(&self, args: &[&str]) -> Result<String> {
        debug!(update_exe = %self.update_exe.display(), ?args, "spawning update tool");
        let mut command = Command::new(&self.update_exe);
        command.args(args);
        let output = run_with_timeout(&mut command, COMMAND_TIMEOUT).map_err(|source| {
            UpdaterError::Spawn {
                command: format!("Update.exe {}", args.join(" ")),
                source,
            }
        })?;
        if output.timed_out {
            return Err(UpdaterError::Tool(format!(
                "Update.exe {} timed out",
                args.join(" ")
            )));
        }
        match output.status {
            Some(status) if status.success() => Ok(output.stdout),
            Some(status) => Err(UpdaterError::Tool(format!(
                "Update.exe {} exited with {}: {}",
                args.join(" "),
                status,
                output.stderr.trim()
            ))),
            None => Err(UpdaterError::Tool(format!(
                "Update.exe {} could not be reaped after timeout",
                args.join(" ")
            ))),
        }
    }
}

impl Default for SquirrelBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateBackend for SquirrelBackend {
    fn is_supported(&self) -> bool {
        self.update_exe.is_file()
    }

    fn check_for_update(&self, feed_url: &str) -> Result<Option<UpdateInfo>> {
        let stdout = self.run_update_tool(&["--checkForUpdate", feed_url])?;
        parse_check_output(&stdout)
    }

    fn download_update(&self, feed_url: &str) -> Result<()> {
        self.run_update_tool(&["--update", feed_url])?;
        Ok(())
    }

    fn stage_install_on_restart(&self) -> Result<()> {
        debug!(exe_name = %self.exe_name, "staging install on restart");
        let mut command = Command::new(&self.update_exe);
        command.arg("--processStartAndWait").arg(&self.exe_name);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(DETACHED_PROCESS);
        }
        // Detached fire-and-forget: the tool outlives us and relaunches the
        // app from the new versioned directory.
        command.spawn().map_err(|source| UpdaterError::Spawn {
            command: format!("Update.exe --processStartAndWait {}", self.exe_name),
            source,
        })?;
        Ok(())
    }

    fn quit(&self) {
        std::process::exit(0);
    }
}

/// The tool prints progress lines followed by a final JSON document; only
/// the last non-empty line is the answer. The final `releasesToApply` entry
/// names the release that would end up applied.
fn parse_check_output(stdout: &str) -> Result<Option<UpdateInfo>> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| UpdaterError::Tool("Update check produced no output".to_string()))?;
    let parsed: CheckOutput = serde_json::from_str(line.trim())
        .map_err(|err| UpdaterError::Tool(format!("Malformed update check output: {}", err)))?;
    Ok(parsed
        .releases_to_apply
        .into_iter()
        .next_back()
        .map(|release| UpdateInfo {
            version: release.version,
            release_notes: release.release_notes,
        }))
}
