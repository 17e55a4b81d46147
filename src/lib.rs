use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use clap::Parser;
use futures::channel::mpsc::unbounded;
use log::{error, info, warn, LevelFilter};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Settings;
use crate::device::connection::BtleTransport;
use crate::device::resolver::StdinSelector;
use crate::device::types::Events;
use crate::error::AppRunError;
use crate::sim::input_sim::RdevInjector;
use crate::sim::key_state::KeyStateTracker;
use crate::sim::types::KeyName;
use crate::status::print_status;
use crate::supervisor::{StopReason, Supervisor};

pub mod config;
pub mod device;
pub mod error;
pub mod os;
pub mod sim;
pub mod status;
pub mod supervisor;
#[cfg(test)]
mod testing;

/// How long a blocking stdin read may keep the runtime alive after the supervisor stopped.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// 128 + SIGINT, as shells report a process killed by Ctrl+C.
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Holds a keyboard key while the ELET-PTT bluetooth button is pressed.", long_about = None)]
pub struct Cli {
    /// Path to the config file, instead of ptt-hotkey.json next to the executable or in the user's config directory
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use the device with this address for this run, without saving it
    #[arg(long)]
    pub mac: Option<String>,

    /// Hold this key instead of the configured one
    #[arg(long)]
    pub key: Option<String>,

    /// Print the supported key names and exit
    #[arg(long)]
    pub list_keys: bool,

    /// Log debug messages
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        }
        else if self.quiet {
            LevelFilter::Warn
        }
        else {
            LevelFilter::Info
        }
    }
}

pub fn init_logging(level: LevelFilter) -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // btleplug is very chatty at debug level
        .level_for("btleplug", LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    Ok(())
}

fn settings_from(config: &config::types::Config, cli: &Cli) -> Result<Settings, AppRunError> {
    let mut settings = Settings::try_from(config)?;

    if let Some(address) = cli.mac.as_deref().map(str::trim).filter(|address| !address.is_empty()) {
        settings.mac_address = Some(address.to_string());
    }
    if let Some(key) = &cli.key {
        settings.key_to_hold = key.parse::<KeyName>()?;
    }

    Ok(settings)
}

/// The first Ctrl+C stops the supervisor, which still disconnects cleanly. A second one exits
/// right away.
async fn handle_ctrl_c(cancel: CancellationToken, tracker: Weak<KeyStateTracker>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", err);
        return;
    }
    info!("Received Ctrl+C");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Received Ctrl+C again, exiting without waiting for bluetooth");
        if let Some(tracker) = tracker.upgrade() {
            tracker.release_held();
        }
        std::process::exit(FORCED_EXIT_CODE);
    }
}

async fn run_app(cli: Cli) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(cli.config.as_deref())?;
    let mut locker = config_io.locker()?;
    let _lock = locker.lock()?;

    let config = config_io.read_or_create().await?;
    let settings = settings_from(&config, &cli)?;
    info!("Settings: {:?}", settings);

    let transport = Arc::new(BtleTransport::new().await?);

    let (status_sender, status_receiver) = unbounded();
    let events = Events::new(vec![status_sender]);
    let tracker = Arc::new(KeyStateTracker::new(settings.key_to_hold, Arc::new(RdevInjector), events.clone()));
    let status_task = tokio::spawn(print_status(status_receiver, settings.key_to_hold));

    let cancel = CancellationToken::new();
    tokio::spawn(handle_ctrl_c(cancel.clone(), Arc::downgrade(&tracker)));

    println!("[*] Press Ctrl+C to exit");
    let mut supervisor = Supervisor::new(
        transport,
        Arc::new(StdinSelector),
        Arc::new(config_io.clone()),
        tracker.clone(),
        &settings,
        events,
    );
    let reason = supervisor.run(&cancel).await;
    drop(supervisor);

    // the sessions release the key themselves, this covers anything that slipped past them
    tracker.release_held();
    drop(tracker);

    if timeout(SHUTDOWN_TIMEOUT, status_task).await.is_err() {
        info!("Status output did not finish in time");
    }

    match reason {
        StopReason::Interrupted => println!("\n[*] Stopped by user"),
        StopReason::SelectionCancelled => println!("[*] No device selected, exiting"),
    }
    Ok(())
}

pub fn run(cli: Cli) -> Result<(), AppRunError> {
    if cli.list_keys {
        for name in KeyName::supported_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run_app(cli));
    // an unanswered device prompt is still blocked reading stdin
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result
}
