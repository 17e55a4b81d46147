use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use async_trait::async_trait;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

/// `<exe>.json` next to the executable, but only if that file exists. A copy of the program on
/// a usb stick then carries its own settings.
fn portable_config_path() -> Option<PathBuf> {
    let exe = current_exe()
        .map_err(|err| debug!("No path for the current executable: {:?}", err))
        .ok()?;
    let path = exe.with_extension("json");
    path.is_file().then_some(path)
}

fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("nl", "anytone", "ptt-hotkey")
        .map(|dirs| dirs.config_dir().join("ptt-hotkey.json"))
}

fn default_config_path() -> Result<PathBuf, ConfigError> {
    portable_config_path()
        .or_else(user_config_path)
        .ok_or(ConfigError::NoConfigPath)
}

/// Persists the address of a device picked during discovery.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn store_address(&self, address: &str) -> Result<(), ConfigError>;
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    /// Takes the exclusive lock, failing right away if another process holds it.
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    path: PathBuf,
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Opens the config file at `path`, or at the default location when `path` is `None`.
    pub fn new_sync(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory)?;
        }

        // kept open for the whole run, locker() locks this same file
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(ConfigIO { inner: Arc::new(Mutex::new(ConfigIOInner { path, file })) })
    }

    pub fn path(&self) -> PathBuf {
        self.lock_inner().path.clone()
    }

    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        let file = self.lock_inner().file.try_clone()?;
        Ok(ConfigIOLocker { rw_lock: RwLock::new(file) })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ConfigIOInner> {
        // the inner state is never left half-updated, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // a duplicate handle of the locked file, reopening by path would bypass the lock
    fn get_file(&self) -> Result<File, ConfigError> {
        let file = self.lock_inner().file.try_clone()?;
        Ok(File::from_std(file))
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        debug!("Reading config file");

        let mut content = Vec::new();
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_json::from_str(str::from_utf8(&content)?)?)
    }

    /// Reads the config file, writing the defaults to it first if it is still empty.
    pub async fn read_or_create(&self) -> Result<Config, ConfigError> {
        let file = self.get_file()?;
        if file.metadata().await?.len() > 0 {
            return self.read().await;
        }

        let config = Config::default();
        self.save(config.clone()).await?;
        println!("[*] Created default config file: {}", self.path().to_string_lossy());
        Ok(config)
    }

    pub async fn save(&self, config: Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        debug!("Saving config");

        let content = serde_json::to_string_pretty(&config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AddressStore for ConfigIO {
    async fn store_address(&self, address: &str) -> Result<(), ConfigError> {
        let mut config = self.read().await?;
        config.ptt.mac_address = address.to_string();
        self.save(config).await?;
        println!("[+] Saved MAC address to config: {}", address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ConfigIO) {
        let dir = tempfile::tempdir().unwrap();
        let io = ConfigIO::new_sync(Some(&dir.path().join("nested").join("ptt-hotkey.json"))).unwrap();
        (dir, io)
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let (_dir, io) = open_temp();
        assert_eq!(io.read().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn read_or_create_writes_defaults() {
        let (_dir, io) = open_temp();

        let config = io.read_or_create().await.unwrap();
        assert_eq!(config, Config::default());

        let content = std::fs::read_to_string(io.path()).unwrap();
        assert!(content.contains("\"PTT\""));
        assert!(content.contains("0000ff02-0000-1000-8000-00805f9b34fb"));
    }

    #[tokio::test]
    async fn save_then_read_returns_saved_config() {
        let (_dir, io) = open_temp();

        let mut config = Config::default();
        config.ptt.key_to_hold = String::from("f9");
        config.connection.scan_interval = 10;
        io.save(config.clone()).await.unwrap();

        assert_eq!(io.read().await.unwrap(), config);

        // a shorter document must not leave trailing bytes of the previous one behind
        io.save(Config::default()).await.unwrap();
        assert_eq!(io.read().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn store_address_keeps_other_settings() {
        let (_dir, io) = open_temp();

        let mut config = Config::default();
        config.ptt.key_to_hold = String::from("shift");
        io.save(config).await.unwrap();

        io.store_address("AA:BB:CC:DD:EE:FF").await.unwrap();
        io.store_address("AA:BB:CC:DD:EE:FF").await.unwrap();

        let config = io.read().await.unwrap();
        assert_eq!(config.ptt.mac_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(config.ptt.key_to_hold, "shift");
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let (_dir, io) = open_temp();
        std::fs::write(io.path(), "[PTT]\nmac_address =").unwrap();

        assert!(matches!(io.read().await, Err(ConfigError::JsonError { .. })));
    }

    #[test]
    fn second_locker_can_not_lock() {
        let (_dir, mut io) = open_temp();
        let mut first = io.locker().unwrap();
        let _guard = first.lock().unwrap();

        let mut second = ConfigIO::new_sync(Some(&io.path())).unwrap().locker().unwrap();
        assert!(matches!(second.lock(), Err(ConfigError::CanNotLock { .. })));
    }
}
