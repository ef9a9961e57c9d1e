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

use crate::package::discovery::PackageFiles;
use crate::platforms::platform::{DmaBuffer, FpgaFamily};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Package flags. The raw value is also what gets written to the fpga_manager `flags`
/// attribute, so bits this type does not name are kept as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DfxFlags(u32);

impl DfxFlags {
    pub const NORMAL: DfxFlags = DfxFlags(0);
    /// The fabric was configured by firmware or the boot loader. No bitstream is loaded.
    pub const EXTERNAL_CONFIG: DfxFlags = DfxFlags(0x1);
    /// The bitstream is encrypted with a user supplied AES key.
    pub const ENCRYPTION_USER_KEY: DfxFlags = DfxFlags(0x20);

    pub fn from_bits(bits: u32) -> DfxFlags {
        DfxFlags(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: DfxFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_external_config(&self) -> bool {
        self.contains(DfxFlags::EXTERNAL_CONFIG)
    }

    pub fn uses_user_key(&self) -> bool {
        self.contains(DfxFlags::ENCRYPTION_USER_KEY)
    }
}

impl std::ops::BitOr for DfxFlags {
    type Output = DfxFlags;

    fn bitor(self, rhs: DfxFlags) -> DfxFlags {
        DfxFlags(self.0 | rhs.0)
    }
}

/// Everything known about one live package. Owned by the
/// [`PackageRegistry`](crate::package::registry::PackageRegistry), callers address it by id.
#[derive(Debug)]
pub struct PackageRecord {
    pub id: u64,
    pub family: FpgaFamily,
    pub flags: DfxFlags,
    /// Logical name used for the overlay directory names.
    pub name: String,
    pub files: PackageFiles,
    pub aes_key: Option<String>,
    /// Kernel buffer holding the bitstream, absent for externally configured fabric.
    pub dma_buffer: Option<Box<dyn DmaBuffer>>,
    pub image_overlay_dir: Option<PathBuf>,
    pub driver_overlay_dir: Option<PathBuf>,
    /// Device path given at init. Recorded for status only.
    pub device_path: Option<PathBuf>,
}

impl PackageRecord {
    pub fn new(id: u64, family: FpgaFamily, flags: DfxFlags) -> PackageRecord {
        PackageRecord {
            id,
            family,
            flags,
            name: String::new(),
            files: PackageFiles::default(),
            aes_key: None,
            dma_buffer: None,
            image_overlay_dir: None,
            driver_overlay_dir: None,
            device_path: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.image_overlay_dir.is_some()
    }

    pub fn drivers_loaded(&self) -> bool {
        self.driver_overlay_dir.is_some()
    }

    /// Close the bitstream buffer, if any. Safe to call more than once.
    pub fn release_buffer(&mut self) {
        if let Some(mut buffer) = self.dma_buffer.take() {
            buffer.close();
        }
    }
}

fn display_opt<T: std::fmt::Debug>(value: &Option<T>) -> String {
    match value {
        Some(v) => format!("{v:?}"),
        None => "-".to_string(),
    }
}

impl Display for PackageRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "id: {}", self.id)?;
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "platform: {}", self.family)?;
        writeln!(f, "flags: 0x{:x}", self.flags.bits())?;
        writeln!(f, "bitstream: {}", display_opt(&self.files.bitstream_path()))?;
        writeln!(f, "image_overlay: {}", display_opt(&self.files.image_overlay_path()))?;
        writeln!(f, "driver_overlay: {}", display_opt(&self.files.driver_overlay_path()))?;
        writeln!(f, "aes_key_file: {}", display_opt(&self.files.key_path()))?;
        writeln!(
            f,
            "dma_buffer: {}",
            match &self.dma_buffer {
                Some(buffer) => format!("{} bytes", buffer.len()),
                None => "-".to_string(),
            }
        )?;
        writeln!(f, "image_overlay_dir: {}", display_opt(&self.image_overlay_dir))?;
        writeln!(f, "driver_overlay_dir: {}", display_opt(&self.driver_overlay_dir))?;
        write!(f, "device_path: {}", display_opt(&self.device_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[gtest]
    fn flag_queries() {
        let flags = DfxFlags::from_bits(0x21);
        assert_that!(flags.is_external_config(), eq(true));
        assert_that!(flags.uses_user_key(), eq(true));
        assert_that!(DfxFlags::NORMAL.is_external_config(), eq(false));
        assert_that!(
            DfxFlags::EXTERNAL_CONFIG | DfxFlags::ENCRYPTION_USER_KEY,
            eq(flags)
        );
    }

    #[gtest]
    fn summary_lists_empty_fields() {
        let record = PackageRecord::new(3, FpgaFamily::Versal, DfxFlags::NORMAL);
        let summary = record.to_string();
        assert_that!(summary, contains_substring("id: 3"));
        assert_that!(summary, contains_substring("platform: versal"));
        assert_that!(summary, contains_substring("image_overlay_dir: -"));
        assert_that!(record.is_loaded(), eq(false));
    }
}
