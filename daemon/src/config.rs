// This file is part of dfxd, an application to manage Dynamic Function eXchange packages together with device-tree overlays and DMA buffers.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// dfxd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// dfxd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

pub mod config_files;

use crate::config::config_files::{TomlSystemPaths, system_paths_from_file};
use log::{trace, warn};
use std::path::{Path, PathBuf};

/// The driver-decided location of fpga_manager objects. Typically `/sys/class/fpga_manager/`.
pub static FPGA_MANAGERS_DIR: &str = "/sys/class/fpga_manager/";

/// The fpga_manager device used for every package. The engine only drives a single region.
pub static DEFAULT_DEVICE_HANDLE: &str = "fpga0";

/// The character device which accepts a dma-buf file descriptor holding a bitstream.
pub static FPGA_DEVICE_NODE: &str = "/dev/fpga0";

/// The default location of the device-tree overlay directory within the config filesystem. Typically `/sys/kernel/config/device-tree/overlays/`, but often remounted to `/configfs/device-tree/overlays/`.
pub static OVERLAY_CONTROL_DIR: &str = "/sys/kernel/config/device-tree/overlays/";

/// The path of the file which can be written to in order to add an additional firmware search path
/// to the system. Typically `/sys/module/firmware_class/parameters/path`.
/// See
/// [https://docs.kernel.org/driver-api/firmware/fw_search_path.html](https://docs.kernel.org/driver-api/firmware/fw_search_path.html)
/// for more information
pub static FIRMWARE_LOC_CONTROL_PATH: &str = "/sys/module/firmware_class/parameters/path";

/// Directory holding the DMA heap character devices.
pub static DMA_HEAP_DIR: &str = "/dev/dma_heap/";

/// Heap tried first when no explicit heap was requested.
pub static DEFAULT_DMA_HEAP: &str = "reserved";

/// Device-tree view of the reserved memory carve-outs, used to find the default CMA region.
pub static RESERVED_MEMORY_DIR: &str = "/sys/firmware/devicetree/base/reserved-memory/";

/// Sysfs node of the Versal platform firmware, exposing `uid-read`, `firmware` and `meta-header-read`.
pub static VERSAL_FIRMWARE_DIR: &str = "/sys/devices/platform/firmware:versal-firmware/";

/// Vendor config, overridden by [`USER_CONFIG_FILE`].
pub static VENDOR_CONFIG_FILE: &str = "/usr/lib/dfxd/config.toml";

/// Administrator config. Takes precedence over [`VENDOR_CONFIG_FILE`].
pub static USER_CONFIG_FILE: &str = "/etc/dfxd/config.toml";

/// Every system location the engine touches, resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub fpga_managers_dir: PathBuf,
    pub device_handle: String,
    pub fpga_device_node: PathBuf,
    pub overlay_control_dir: PathBuf,
    pub firmware_search_path_control: PathBuf,
    pub dma_heap_dir: PathBuf,
    pub default_dma_heap: String,
    pub reserved_memory_dir: PathBuf,
    pub versal_firmware_dir: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        SystemPaths {
            fpga_managers_dir: PathBuf::from(FPGA_MANAGERS_DIR),
            device_handle: DEFAULT_DEVICE_HANDLE.to_string(),
            fpga_device_node: PathBuf::from(FPGA_DEVICE_NODE),
            overlay_control_dir: PathBuf::from(OVERLAY_CONTROL_DIR),
            firmware_search_path_control: PathBuf::from(FIRMWARE_LOC_CONTROL_PATH),
            dma_heap_dir: PathBuf::from(DMA_HEAP_DIR),
            default_dma_heap: DEFAULT_DMA_HEAP.to_string(),
            reserved_memory_dir: PathBuf::from(RESERVED_MEMORY_DIR),
            versal_firmware_dir: PathBuf::from(VERSAL_FIRMWARE_DIR),
        }
    }
}

impl SystemPaths {
    /// User config overrides vendor config and vendor config overrides hardcoded defaults.
    /// A missing or broken file is logged and skipped.
    pub fn from_config_files() -> SystemPaths {
        Self::from_files(Path::new(VENDOR_CONFIG_FILE), Path::new(USER_CONFIG_FILE))
    }

    pub fn from_files(vendor: &Path, user: &Path) -> SystemPaths {
        let vendor_config = system_paths_from_file(vendor).unwrap_or_else(|e| {
            warn!("Using hardcoded paths for vendor config because loading config failed: {e}");
            TomlSystemPaths::default()
        });
        let user_config = system_paths_from_file(user).unwrap_or_else(|e| {
            warn!("Using hardcoded paths for user config because loading config failed: {e}");
            TomlSystemPaths::default()
        });
        trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
        let merged = user_config.merge(vendor_config).apply(SystemPaths::default());
        trace!("Resulting config: {merged:?}");
        merged
    }

    /// Directory of the fpga_manager object in use, e.g. `/sys/class/fpga_manager/fpga0`.
    pub fn fpga_manager_dir(&self) -> PathBuf {
        self.fpga_managers_dir.join(&self.device_handle)
    }

    /// Configfs directory of an overlay handle.
    pub fn overlay_dir(&self, handle: &str) -> PathBuf {
        self.overlay_control_dir.join(handle)
    }
}
