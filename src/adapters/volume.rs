//! Durable file volume.
//!
//! Implements [`VolumePort`].  On the device: the wear-levelled FAT
//! partition `storage`, mounted at `/spiflash` (formatted if the mount
//! fails).  It must be unmounted before every restart so the FAT is
//! consistent on the next boot.  On the host: a plain directory.

use log::info;

use crate::app::ports::{VolumeError, VolumePort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub const BASE_PATH: &str = "/spiflash";
pub const PARTITION_LABEL: &str = "storage";
const MAX_FILES: i32 = 4;

/// Host directory standing in for the partition.
#[cfg(not(target_os = "espidf"))]
pub const SIM_DIR: &str = ".netkey/spiflash";

#[cfg(target_os = "espidf")]
pub struct FatVolume {
    wl_handle: Option<wl_handle_t>,
}

#[cfg(target_os = "espidf")]
impl FatVolume {
    pub fn new() -> Self {
        Self { wl_handle: None }
    }
}

#[cfg(target_os = "espidf")]
impl Default for FatVolume {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl VolumePort for FatVolume {
    fn mount(&mut self) -> Result<(), VolumeError> {
        if self.wl_handle.is_some() {
            return Ok(());
        }
        let config = esp_vfs_fat_mount_config_t {
            format_if_mount_failed: true,
            max_files: MAX_FILES,
            allocation_unit_size: CONFIG_WL_SECTOR_SIZE as usize,
            ..Default::default()
        };
        let mut handle: wl_handle_t = -1;
        // SAFETY: both paths are NUL-terminated literals; `handle` outlives
        // the call.
        let ret = unsafe {
            esp_vfs_fat_spiflash_mount_rw_wl(
                c"/spiflash".as_ptr(),
                c"storage".as_ptr(),
                &config,
                &mut handle,
            )
        };
        if ret != ESP_OK as i32 {
            return Err(VolumeError::MountFailed(ret));
        }
        self.wl_handle = Some(handle);
        info!("Volume: FAT '{}' mounted at {}", PARTITION_LABEL, BASE_PATH);
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), VolumeError> {
        let Some(handle) = self.wl_handle else {
            return Err(VolumeError::NotMounted);
        };
        // SAFETY: `handle` came from a successful mount at the same path.
        let ret = unsafe { esp_vfs_fat_spiflash_unmount_rw_wl(c"/spiflash".as_ptr(), handle) };
        if ret != ESP_OK as i32 {
            return Err(VolumeError::UnmountFailed(ret));
        }
        self.wl_handle = None;
        info!("Volume: unmounted {}", BASE_PATH);
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.wl_handle.is_some()
    }
}

/// Host stand-in: a directory that is "mounted" once it exists.
#[cfg(not(target_os = "espidf"))]
pub struct FatVolume {
    root: std::path::PathBuf,
    mounted: bool,
}

#[cfg(not(target_os = "espidf"))]
impl FatVolume {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for FatVolume {
    fn default() -> Self {
        Self::new(SIM_DIR)
    }
}

#[cfg(not(target_os = "espidf"))]
impl VolumePort for FatVolume {
    fn mount(&mut self) -> Result<(), VolumeError> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            VolumeError::MountFailed(e.raw_os_error().unwrap_or(-1))
        })?;
        self.mounted = true;
        info!(
            "Volume(sim): {} ({} files max) at {}",
            PARTITION_LABEL,
            MAX_FILES,
            self.root.display()
        );
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), VolumeError> {
        if !self.mounted {
            return Err(VolumeError::NotMounted);
        }
        self.mounted = false;
        info!("Volume(sim): unmounted {}", BASE_PATH);
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }
}
