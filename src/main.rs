//! Patchsync - incremental patch client
//!
//! Connects once, authenticates, and applies every pending version for the
//! configured locale before exiting.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use patchsync::logger::{Logger, NoopLogger, TextLogger};
use patchsync::progress::TransferProgress;
use patchsync::{Args, DirectoryArchive, UpdateSession};

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // A partial download is discarded on the next run
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    let config = args.resolve_config()?;

    if !config.client_dir.is_dir() {
        anyhow::bail!(
            "Error: client directory does not exist: {}",
            config.client_dir.display()
        );
    }

    // Choose logger once; zero overhead with NoopLogger
    let logger: Arc<dyn Logger> = if let Some(ref p) = args.log_file {
        match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {e:#}", p.display());
                Arc::new(NoopLogger)
            }
        }
    } else {
        Arc::new(NoopLogger)
    };

    if args.verbose {
        println!("Patchsync {}", env!("CARGO_PKG_VERSION"));
        println!("  Server: {}", config.server);
        println!("  Locale: {}", config.locale);
        println!("  Client: {}", config.client_dir.display());
        println!(
            "  Mode:   {}",
            if config.segmented { "segmented" } else { "full" }
        );
    }

    let mut session = UpdateSession::new(config, Box::new(DirectoryArchive::new()))?
        .with_logger(logger);

    let progress = Arc::new(TransferProgress::new(args.verbose));
    {
        let p = progress.clone();
        session
            .notifier()
            .subscribe_progress(move |ev| p.on_progress(ev.file, ev.received, ev.total));
        let p = progress.clone();
        session.notifier().subscribe_status(move |s| p.on_status(s));
    }

    // Single sequential session; no worker threads needed
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match rt.block_on(session.run()) {
        Ok(outcome) => {
            progress.finish_success(&outcome);
            Ok(())
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            Err(e.into())
        }
    }
}
