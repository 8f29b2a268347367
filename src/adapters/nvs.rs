//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! - **`target_os = "espidf"`**: ESP-IDF NVS, one namespace per subsystem
//!   ("storage" for the provisioned key, "restart" for the restart log,
//!   "token" for device secrets, "netkey" for the config blob).
//! - **host**: one file per `namespace/key` under a root directory, written
//!   via temp-file + rename so a killed process never leaves half a value.
//!   The directory outlives the process, which is what lets a simulated
//!   restart observe the provisioning state the previous run left behind.
//!
//! # Security
//!
//! - Config validation runs before every save.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::DeviceConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::path::{Path, PathBuf};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "netkey";
const CONFIG_KEY: &str = "devcfg";

/// Upper bound for the postcard-encoded [`DeviceConfig`].
const CONFIG_BLOB_MAX: usize = 1024;

/// Environment variable overriding the host store location.
#[cfg(not(target_os = "espidf"))]
pub const NVS_DIR_ENV: &str = "NETKEY_NVS_DIR";

#[cfg(not(target_os = "espidf"))]
const DEFAULT_NVS_DIR: &str = ".netkey/nvs";

/// Cheap to clone: every task that needs storage holds its own handle.
#[derive(Debug, Clone)]
pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    root: PathBuf,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised automatically.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Result<Self, StorageError> {
        // SAFETY: called once from main() before any task touches NVS.
        let ret = unsafe { nvs_flash_init() };
        let needs_erase = ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
            || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t;
        if needs_erase {
            warn!("NvsAdapter: partition full or from a newer IDF, erasing");
            // SAFETY: as above.
            esp_check(unsafe { nvs_flash_erase() })
                .and_then(|()| esp_check(unsafe { nvs_flash_init() }))
                .map_err(|_| StorageError::IoError)?;
        } else {
            esp_check(ret).map_err(|_| StorageError::IoError)?;
        }
        info!("NvsAdapter: flash partition ready");
        Ok(Self {})
    }

    /// Open the host store at `$NETKEY_NVS_DIR`, or `./.netkey/nvs`.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, StorageError> {
        let root = std::env::var_os(NVS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_NVS_DIR));
        Self::at(root)
    }

    /// Open (creating if needed) a host store rooted at `root`.
    #[cfg(not(target_os = "espidf"))]
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|_| StorageError::IoError)?;
        info!("NvsAdapter: file backend at {}", root.display());
        Ok(Self { root })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[cfg(not(target_os = "espidf"))]
    fn path(&self, namespace: &str, key: &str) -> PathBuf {
        self.root.join(namespace).join(key)
    }
}

// ── ESP-IDF namespace handle ──────────────────────────────────

/// An open NVS namespace, closed on drop.
#[cfg(target_os = "espidf")]
struct Namespace(nvs_handle_t);

#[cfg(target_os = "espidf")]
impl Namespace {
    fn open(name: &str, mode: nvs_open_mode_t) -> Result<Self, esp_err_t> {
        let name = c_name(name);
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `name` is NUL-terminated and outlives the call.
        esp_check(unsafe { nvs_open(name.as_ptr().cast(), mode, &mut handle) })?;
        Ok(Self(handle))
    }

    fn read_only(name: &str) -> Result<Self, esp_err_t> {
        Self::open(name, nvs_open_mode_t_NVS_READONLY)
    }

    fn read_write(name: &str) -> Result<Self, esp_err_t> {
        Self::open(name, nvs_open_mode_t_NVS_READWRITE)
    }

    fn commit(&self) -> Result<(), esp_err_t> {
        // SAFETY: the handle is open for as long as `self` lives.
        esp_check(unsafe { nvs_commit(self.0) })
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Namespace {
    fn drop(&mut self) {
        // SAFETY: opened in `Namespace::open`, closed exactly once here.
        unsafe { nvs_close(self.0) };
    }
}

#[cfg(target_os = "espidf")]
fn esp_check(ret: esp_err_t) -> Result<(), esp_err_t> {
    if ret == ESP_OK as esp_err_t { Ok(()) } else { Err(ret) }
}

/// NVS names are at most 15 bytes plus the terminator.
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

#[cfg(target_os = "espidf")]
fn storage_error(ret: esp_err_t) -> StorageError {
    // A namespace that was never written cannot be opened read-only,
    // which also surfaces as NOT_FOUND.
    if ret == ESP_ERR_NVS_NOT_FOUND as esp_err_t {
        StorageError::NotFound
    } else if ret == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t {
        StorageError::Full
    } else {
        StorageError::IoError
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<DeviceConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: DeviceConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                cfg.validate()?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(DeviceConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed: {}", e);
                Err(ConfigError::IoError)
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > CONFIG_BLOB_MAX {
            return Err(ConfigError::StorageFull);
        }
        // Handles are stateless; writing through a clone is writing the store.
        let mut store = self.clone();
        store
            .write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

// ── ESP-IDF backend ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let ns = Namespace::read_only(namespace).map_err(storage_error)?;
        let key = c_name(key);
        let mut size = buf.len();
        // SAFETY: `size` holds the capacity of `buf`; NVS writes at most
        // that many bytes and stores the blob length back into `size`.
        esp_check(unsafe {
            nvs_get_blob(ns.0, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
        })
        .map_err(storage_error)?;
        Ok(size)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let ns = Namespace::read_write(namespace).map_err(storage_error)?;
        let key = c_name(key);
        // SAFETY: `data` is valid for `data.len()` bytes.
        esp_check(unsafe {
            nvs_set_blob(ns.0, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
        })
        .and_then(|()| ns.commit())
        .map_err(storage_error)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let ns = Namespace::read_write(namespace).map_err(|_| StorageError::IoError)?;
        let key = c_name(key);
        // SAFETY: `key` is NUL-terminated.
        match esp_check(unsafe { nvs_erase_key(ns.0, key.as_ptr().cast()) }) {
            Ok(()) => ns.commit().map_err(|_| StorageError::IoError),
            Err(e) if storage_error(e) == StorageError::NotFound => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        let Ok(ns) = Namespace::read_only(namespace) else {
            return false;
        };
        let key = c_name(key);
        // SAFETY: a null out-pointer is allowed; only presence is reported.
        esp_check(unsafe { nvs_find_key(ns.0, key.as_ptr().cast(), core::ptr::null_mut()) })
            .is_ok()
    }
}

// ── Host backend ──────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = match std::fs::read(self.path(namespace, key)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound);
            }
            Err(_) => return Err(StorageError::IoError),
        };
        if data.len() > buf.len() {
            return Err(StorageError::IoError);
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let dir = self.root.join(namespace);
        std::fs::create_dir_all(&dir).map_err(|_| StorageError::IoError)?;
        let tmp = dir.join(format!(".{key}.tmp"));
        std::fs::write(&tmp, data).map_err(|_| StorageError::IoError)?;
        std::fs::rename(&tmp, dir.join(key)).map_err(|_| StorageError::IoError)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(namespace, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.path(namespace, key).is_file()
    }
}
