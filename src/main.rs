use std::sync::{mpsc, Arc};

use anyhow::Result;
use clap::Parser;
use comet_updater::{AutoUpdater, SquirrelBackend, UpdaterEvent};

#[derive(Parser, Debug)]
#[command(
    name = "comet",
    about = "Check for and apply Squirrel updates for the host app",
    version
)]
struct Args {
    /// Update feed URL to check against
    #[arg(short, long)]
    feed_url: String,

    /// Restart into the new version once the download completes
    #[arg(short, long)]
    install: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let (tx, rx) = mpsc::channel();
    let mut updater = AutoUpdater::new(Arc::new(SquirrelBackend::new()), tx);
    updater.initialize(args.feed_url.as_str())?;
    updater.check_for_updates();

    while let Ok(event) = rx.recv() {
        match event {
            UpdaterEvent::CheckingForUpdate => eprintln!("Checking for update..."),
            UpdaterEvent::UpdateNotAvailable => {
                eprintln!("Already up to date.");
                break;
            }
            UpdaterEvent::UpdateAvailable => eprintln!("Update available, downloading..."),
            UpdaterEvent::UpdateDownloaded(update) => {
                eprintln!("Downloaded {} ({})", update.version, update.date);
                if !update.release_notes.is_empty() {
                    eprintln!("{}", update.release_notes);
                }
                if args.install {
                    eprintln!("Restarting to install...");
                    updater.quit_and_install();
                }
                break;
            }
            UpdaterEvent::Error { message, .. } => {
                anyhow::bail!("Update failed: {}", message);
            }
        }
    }

    Ok(())
}
