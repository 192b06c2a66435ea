//! NextGCore MME (Mobility Management Entity)
//!
//! Hosts the NAS API: UE context directory, GUTI allocation and duplicate
//! eNB UE S1AP ID handling.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nextgcore_mmed::{ConfigSnapshot, MmeApi};

/// NextGCore MME - Mobility Management Entity
#[derive(Parser, Debug)]
#[command(name = "nextgcore-mmed")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EPC Mobility Management Entity")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/mme.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(long)]
    no_color: bool,
}

/// MME application state
pub struct MmeApp {
    /// Running flag
    running: Arc<AtomicBool>,
    /// NAS API
    api: Option<MmeApi>,
}

impl MmeApp {
    /// Create a new MME application
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            api: None,
        }
    }

    /// Initialize the MME application
    pub fn init(&mut self, config_path: &str) -> Result<()> {
        log::info!("Initializing MME...");

        let config = ConfigSnapshot::from_file(config_path)
            .with_context(|| format!("Failed to load configuration {}", config_path))?;
        log::debug!("EMM/ESM configuration loaded");

        self.api = Some(MmeApi::new(Arc::new(config)));
        log::debug!("UE context directory initialized");

        log::info!("MME initialized successfully");
        Ok(())
    }

    /// Run the MME main loop
    pub fn run(&self) -> Result<()> {
        log::info!("MME running...");

        // NAS, S1AP and SGs handlers drive the API; the main thread only
        // waits for shutdown.
        while self.running.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        log::info!("MME main loop exited");
        Ok(())
    }

    /// Shutdown the MME application
    pub fn shutdown(&mut self) {
        log::info!("Shutting down MME...");

        if let Some(api) = self.api.take() {
            log::info!("{} UE context(s) dropped", api.num_of_ue());
        }

        log::info!("MME shutdown complete");
    }

    /// Signal the application to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl Default for MmeApp {
    fn default() -> Self {
        Self::new()
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .write_style(if args.no_color {
            env_logger::WriteStyle::Never
        } else {
            env_logger::WriteStyle::Auto
        })
        .init();

    log::info!("NextGCore MME v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);

    // Create MME application
    let mut app = MmeApp::new();

    // Setup signal handlers
    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    // Initialize
    app.init(&args.config)?;

    // Run main loop
    app.run()?;

    // Shutdown
    app.shutdown();

    log::info!("NextGCore MME terminated");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
