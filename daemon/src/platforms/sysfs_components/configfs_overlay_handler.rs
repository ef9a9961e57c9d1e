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

//! Device-tree overlay handling through configfs.
//!
//! Overlays are managed in `<overlay_control_dir>/<handle>/`:
//! ```text
//! /sys/kernel/config/device-tree/overlays/my_overlay/
//! ├── dtbo       # Device tree blob (unused, overlays are requested by name)
//! ├── path       # Write overlay file name here to apply; read back to verify
//! └── status     # "applied" or "unapplied"
//!```
//!
//! The kernel populates `path` and `status` itself when the directory is created, so a plain
//! directory without them means the parent is not a configfs mount.

use crate::error::DfxError;
use crate::platforms::platform::OverlayHandler;
use crate::system_io::{fs_create_dir, fs_read_trimmed, fs_remove_dir, fs_write};
use log::{error, trace};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ConfigfsOverlayHandler {
    overlay_fs_path: PathBuf,
}

impl ConfigfsOverlayHandler {
    pub(crate) fn new(overlay_control_dir: &Path, overlay_handle: &str) -> Self {
        let overlay_fs_path = overlay_control_dir.join(overlay_handle);
        trace!("overlay_fs_path will be {overlay_fs_path:?}");
        ConfigfsOverlayHandler { overlay_fs_path }
    }
}

impl OverlayHandler for ConfigfsOverlayHandler {
    fn overlay_fs_path(&self) -> &Path {
        &self.overlay_fs_path
    }

    fn create(&self) -> Result<(), DfxError> {
        fs_create_dir(&self.overlay_fs_path)?;
        if !self.overlay_fs_path.join("path").exists() {
            if let Err(e) = fs_remove_dir(&self.overlay_fs_path) {
                error!("Failed to clean up {:?}: {e}", self.overlay_fs_path);
            }
            return Err(DfxError::Environment(format!(
                "Overlay at {:?} did not initialise a new overlay: the `path` virtual file did \
                 not get created by the kernel. Is the parent dir mounted as a configfs directory?",
                self.overlay_fs_path
            )));
        }
        Ok(())
    }

    fn write_path(&self, overlay_file: &str) -> Result<(), DfxError> {
        fs_write(&self.overlay_fs_path.join("path"), false, overlay_file)
    }

    fn read_path(&self) -> Result<String, DfxError> {
        fs_read_trimmed(&self.overlay_fs_path.join("path"))
    }

    fn status(&self) -> Result<String, DfxError> {
        if !self.exists() {
            return Ok("not present".into());
        }
        fs_read_trimmed(&self.overlay_fs_path.join("status"))
    }

    fn remove(&self) -> Result<(), DfxError> {
        fs_remove_dir(&self.overlay_fs_path)
    }
}
