use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::io::AddressStore;
use crate::device::constants::{DISCOVERY_SCAN_DURATION, PRODUCT_NAME_TOKEN, VERIFY_SCAN_DURATION};
use crate::device::transport::BleTransport;
use crate::device::types::{DeviceCandidate, ResolveOutcome};
use crate::error::DeviceError;

/// Lets the operator pick one of several discovered devices.
#[async_trait]
pub trait DeviceSelector: Send + Sync {
    /// Returns the 1-based number entered by the operator, or `None` if the answer was not a
    /// number at all (or there was no answer).
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize>;
}

/// Prompts on stdout and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinSelector;

#[async_trait]
impl DeviceSelector for StdinSelector {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<usize> {
        println!();
        println!("[*] Multiple devices found. Please choose:");
        for (index, candidate) in candidates.iter().enumerate() {
            println!("    {}. {}", index + 1, candidate);
        }
        print!("Enter number: ");
        if let Err(err) = std::io::stdout().flush() {
            debug!("Failed to flush stdout: {:?}", err);
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => line.trim().parse::<usize>().ok(),
            Err(err) => {
                warn!("Failed to read selection: {:?}", err);
                None
            },
        }
    }
}

/// Turns the configured address, or the result of a discovery scan, into one device address.
pub struct DeviceResolver<T: BleTransport> {
    transport: Arc<T>,
    selector: Arc<dyn DeviceSelector>,
    store: Arc<dyn AddressStore>,
}

impl<T: BleTransport> DeviceResolver<T> {
    pub fn new(transport: Arc<T>, selector: Arc<dyn DeviceSelector>, store: Arc<dyn AddressStore>) -> Self {
        DeviceResolver { transport, selector, store }
    }

    pub async fn resolve(&self, configured: Option<&str>, cancel: &CancellationToken) -> Result<ResolveOutcome, DeviceError> {
        match configured {
            Some(address) => self.verify(address, cancel).await,
            None => self.discover(cancel).await,
        }
    }

    async fn scan(&self, duration: Duration, cancel: &CancellationToken) -> Result<Option<Vec<DeviceCandidate>>, DeviceError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            result = self.transport.scan(duration) => result.map(Some),
        }
    }

    // an explicitly configured device is never swapped for another one found nearby
    async fn verify(&self, address: &str, cancel: &CancellationToken) -> Result<ResolveOutcome, DeviceError> {
        let devices = match self.scan(VERIFY_SCAN_DURATION, cancel).await? {
            Some(devices) => devices,
            None => return Ok(ResolveOutcome::Cancelled),
        };

        if devices.iter().any(|device| device.matches_address(address)) {
            return Ok(ResolveOutcome::Found(address.to_string()));
        }

        println!("[!] Configured device {} not found", address);
        Ok(ResolveOutcome::NotFound)
    }

    async fn discover(&self, cancel: &CancellationToken) -> Result<ResolveOutcome, DeviceError> {
        println!("[*] Scanning for {} devices...", PRODUCT_NAME_TOKEN);

        let devices = match self.scan(DISCOVERY_SCAN_DURATION, cancel).await? {
            Some(devices) => devices,
            None => return Ok(ResolveOutcome::Cancelled),
        };
        debug!("Scan found {} device(s)", devices.len());

        let candidates: Vec<DeviceCandidate> = devices
            .into_iter()
            .filter(|device| device.name_contains(PRODUCT_NAME_TOKEN))
            .collect();

        for candidate in &candidates {
            println!("    Found: {}", candidate);
        }

        let selected = match candidates.len() {
            0 => return Ok(ResolveOutcome::NotFound),
            1 => {
                println!("[+] Auto-selected: {}", candidates[0].address);
                &candidates[0]
            },
            _ => {
                let choice = tokio::select! {
                    _ = cancel.cancelled() => None,
                    choice = self.selector.choose(&candidates) => choice,
                };

                match choice.and_then(|number| number.checked_sub(1)).and_then(|index| candidates.get(index)) {
                    Some(candidate) => candidate,
                    None => {
                        println!();
                        println!("[!] Selection cancelled");
                        return Ok(ResolveOutcome::Cancelled);
                    },
                }
            },
        };

        info!("Selected device {}", selected);
        self.persist(&selected.address).await;
        Ok(ResolveOutcome::Found(selected.address.clone()))
    }

    async fn persist(&self, address: &str) {
        if let Err(err) = self.store.store_address(address).await {
            warn!("Failed to save the selected device to the config file: {}", err);
        }
    }
}
