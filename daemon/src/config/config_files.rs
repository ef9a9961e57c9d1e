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

use crate::config::SystemPaths;
use crate::error::DfxError;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// This is the top level struct which holds all sections
#[derive(Debug, Deserialize)]
pub(crate) struct TomlConfig {
    system_paths: Option<TomlSystemPaths>,
}

/// The `[system_paths]` section. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSystemPaths {
    fpga_managers_dir: Option<PathBuf>,
    device_handle: Option<String>,
    fpga_device_node: Option<PathBuf>,
    overlay_control_dir: Option<PathBuf>,
    firmware_search_path_control: Option<PathBuf>,
    dma_heap_dir: Option<PathBuf>,
    default_dma_heap: Option<String>,
    reserved_memory_dir: Option<PathBuf>,
    versal_firmware_dir: Option<PathBuf>,
}

impl TomlSystemPaths {
    pub(crate) fn merge(self, fallback: TomlSystemPaths) -> TomlSystemPaths {
        TomlSystemPaths {
            fpga_managers_dir: self.fpga_managers_dir.or(fallback.fpga_managers_dir),
            device_handle: self.device_handle.or(fallback.device_handle),
            fpga_device_node: self.fpga_device_node.or(fallback.fpga_device_node),
            overlay_control_dir: self.overlay_control_dir.or(fallback.overlay_control_dir),
            firmware_search_path_control: self
                .firmware_search_path_control
                .or(fallback.firmware_search_path_control),
            dma_heap_dir: self.dma_heap_dir.or(fallback.dma_heap_dir),
            default_dma_heap: self.default_dma_heap.or(fallback.default_dma_heap),
            reserved_memory_dir: self.reserved_memory_dir.or(fallback.reserved_memory_dir),
            versal_firmware_dir: self.versal_firmware_dir.or(fallback.versal_firmware_dir),
        }
    }

    /// Fill in every key that was not configured from `defaults`.
    pub(crate) fn apply(self, defaults: SystemPaths) -> SystemPaths {
        SystemPaths {
            fpga_managers_dir: self.fpga_managers_dir.unwrap_or(defaults.fpga_managers_dir),
            device_handle: self.device_handle.unwrap_or(defaults.device_handle),
            fpga_device_node: self.fpga_device_node.unwrap_or(defaults.fpga_device_node),
            overlay_control_dir: self
                .overlay_control_dir
                .unwrap_or(defaults.overlay_control_dir),
            firmware_search_path_control: self
                .firmware_search_path_control
                .unwrap_or(defaults.firmware_search_path_control),
            dma_heap_dir: self.dma_heap_dir.unwrap_or(defaults.dma_heap_dir),
            default_dma_heap: self.default_dma_heap.unwrap_or(defaults.default_dma_heap),
            reserved_memory_dir: self
                .reserved_memory_dir
                .unwrap_or(defaults.reserved_memory_dir),
            versal_firmware_dir: self
                .versal_firmware_dir
                .unwrap_or(defaults.versal_firmware_dir),
        }
    }
}

fn toml_str_to_config(file_path: &Path, toml_string: &str) -> Result<TomlConfig, DfxError> {
    toml::from_str(toml_string).map_err(|e| DfxError::TomlDe {
        file: file_path.into(),
        e,
    })
}

pub(crate) fn system_paths_from_file(file_path: &Path) -> Result<TomlSystemPaths, DfxError> {
    if !file_path.is_file() {
        return Err(DfxError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    trace!("Loading config from {file_path:?}");
    let config = toml_str_to_config(file_path, &fs_read(file_path)?)?;

    match config.system_paths {
        Some(system_paths) => Ok(system_paths),
        None => Err(DfxError::Internal(
            "config file did not contain a `[system_paths]` section.".to_string(),
        )),
    }
}
