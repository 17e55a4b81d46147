use std::process::ExitCode;
use clap::Parser;
use log::info;
use ptt_hotkey::{init_logging, run, Cli};
use ptt_hotkey::error::{error_chain, AppRunError, ConfigError};

// This embedded Info.plist is used for the bluetooth permission prompt when running the binary
// from a terminal.
#[cfg(target_os = "macos")]
embed_plist::embed_info_plist!(concat!(env!("OUT_DIR"), "/Info.plist"));

#[cfg(target_os = "macos")]
fn macos_init() {
    ptt_hotkey::os::macos::warn_without_accessibility_access();
}

#[cfg(not(target_os = "macos"))]
fn macos_init() {}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.log_level()) {
        eprintln!("Failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }
    info!(concat!("PTT Hotkey ", env!("CARGO_PKG_VERSION")));

    macos_init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("[!] Another instance of ptt-hotkey is already running");
            ExitCode::FAILURE
        },
        Err(err) => {
            eprintln!("[!] {}", error_chain(&err));
            ExitCode::FAILURE
        },
    }
}
