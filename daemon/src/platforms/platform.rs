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

//! Platform abstraction layer for the package lifecycle engine.
//!
//! The engine never touches the kernel directly. Everything it needs from the FPGA subsystem
//! goes through the traits in this module:
//! - [`Platform`] - bundles the services for the one FPGA region the engine drives
//! - [`Fpga`] - the fpga_manager sysfs attributes and the dma-buf hand-off
//! - [`OverlayHandler`] - one configfs device-tree overlay directory
//! - [`DmaHeap`] and [`DmaBuffer`] - kernel-backed memory the FPGA manager can read from
//!
//! [`SysfsPlatform`](crate::platforms::sysfs::SysfsPlatform) is the production
//! implementation. `platforms::mock::MockPlatform` (behind the `mock` feature) stands in for
//! the kernel in tests.
//!
//! The silicon family is detected once from the fpga_manager `name` attribute and is carried as
//! a closed [`FpgaFamily`] enum. Every family-specific rule is a method on that enum.

use crate::config::SystemPaths;
use crate::error::DfxError;
use log::trace;
use std::fmt::{Debug, Display, Formatter};
use std::os::fd::RawFd;
use std::path::Path;

/// FPGA manager names reported by the Xilinx drivers.
pub static ZYNQMP_MANAGER_NAME: &str = "Xilinx ZynqMP FPGA Manager";
pub static VERSAL_MANAGER_NAME: &str = "Xilinx Versal FPGA Manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FpgaFamily {
    #[default]
    Unknown,
    ZynqMp,
    Versal,
}

impl FpgaFamily {
    /// Map an fpga_manager `name` attribute to a family. Trailing whitespace and NUL bytes, which
    /// some drivers leave in virtual files, are ignored.
    pub fn from_manager_name(name: &str) -> FpgaFamily {
        match name.trim_end_matches(['\n', '\0', ' ']) {
            n if n == ZYNQMP_MANAGER_NAME => FpgaFamily::ZynqMp,
            n if n == VERSAL_MANAGER_NAME => FpgaFamily::Versal,
            _ => FpgaFamily::Unknown,
        }
    }

    /// Lower-case extension (with dot) of a bitstream in a package directory.
    pub fn bitstream_extension(&self) -> Option<&'static str> {
        match self {
            FpgaFamily::ZynqMp => Some(".bin"),
            FpgaFamily::Versal => Some(".pdi"),
            FpgaFamily::Unknown => None,
        }
    }

    /// Whether the `.bit` format from older tool flows is also accepted.
    pub fn accepts_legacy_bit(&self) -> bool {
        matches!(self, FpgaFamily::ZynqMp)
    }

    /// The PCAP interface consumes whole 32-bit words.
    pub fn requires_word_alignment(&self) -> bool {
        matches!(self, FpgaFamily::ZynqMp)
    }

    /// Whether the firmware reports a phase/cause encoded error through the manager state.
    pub fn has_structured_errors(&self) -> bool {
        matches!(self, FpgaFamily::ZynqMp)
    }

    /// Whether the platform firmware exposes uid lists and PDI meta headers.
    pub fn has_firmware_queries(&self) -> bool {
        matches!(self, FpgaFamily::Versal)
    }
}

impl Display for FpgaFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FpgaFamily::Unknown => "unknown",
            FpgaFamily::ZynqMp => "zynqmp",
            FpgaFamily::Versal => "versal",
        };
        write!(f, "{name}")
    }
}

/// Read the manager name and resolve it to a supported family.
///
/// # Returns: `Result<FpgaFamily, DfxError>`
/// * `Ok(FpgaFamily)` - never [`FpgaFamily::Unknown`]
/// * `Err(DfxError::PlatformUnsupported)` - the manager is not one the engine knows how to drive
/// * `Err(DfxError::IORead)` - the `name` attribute could not be read
pub fn detect_family(fpga: &dyn Fpga) -> Result<FpgaFamily, DfxError> {
    let name = fpga.name()?;
    trace!("fpga manager reports name '{name}'");
    match FpgaFamily::from_manager_name(&name) {
        FpgaFamily::Unknown => Err(DfxError::PlatformUnsupported(name)),
        family => Ok(family),
    }
}

/// Interface to a Linux fpga_manager device.
pub trait Fpga {
    /// The sysfs name of the device, e.g. `fpga0`.
    fn device_handle(&self) -> &str;

    /// Contents of the `name` attribute.
    fn name(&self) -> Result<String, DfxError>;

    /// Contents of the `state` attribute. `"operating"` after a successful configuration.
    fn state(&self) -> Result<String, DfxError>;

    fn flags(&self) -> Result<u32, DfxError>;

    /// Write flags as hexadecimal and read them back. A mismatch is an error.
    fn set_flags(&self, flags: u32) -> Result<(), DfxError>;

    /// Write the AES user key used to decrypt the next bitstream.
    fn set_key(&self, key: &str) -> Result<(), DfxError>;

    /// Firmware error code reported with the last state: the final whitespace separated token of
    /// the `state` attribute parsed as `0x` hexadecimal or decimal. `0` when there is none.
    fn error_code(&self) -> Result<u32, DfxError> {
        let state = self.state()?;
        Ok(parse_error_token(&state))
    }

    /// Hand a filled dma-buf to the FPGA manager for configuration.
    fn load_dma_buffer(&self, buffer: &dyn DmaBuffer) -> Result<(), DfxError>;
}

pub(crate) fn parse_error_token(state: &str) -> u32 {
    let Some(token) = state.split_whitespace().last() else {
        return 0;
    };
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).unwrap_or(0),
        None => token.parse().unwrap_or(0),
    }
}

/// One configfs device-tree overlay directory.
pub trait OverlayHandler {
    /// Full path of the overlay directory, e.g. `/sys/kernel/config/device-tree/overlays/x_image_1`.
    fn overlay_fs_path(&self) -> &Path;

    fn exists(&self) -> bool {
        self.overlay_fs_path().is_dir()
    }

    /// Create the directory. Fails if it already exists or the kernel did not set it up as an
    /// overlay, in which case nothing is left behind.
    fn create(&self) -> Result<(), DfxError>;

    /// Request an overlay by writing its file name, resolved through the firmware search path.
    fn write_path(&self, overlay_file: &str) -> Result<(), DfxError>;

    /// The `path` attribute as the kernel reports it now.
    fn read_path(&self) -> Result<String, DfxError>;

    /// The `status` attribute, `"not present"` when the directory is gone.
    fn status(&self) -> Result<String, DfxError>;

    fn remove(&self) -> Result<(), DfxError>;
}

/// Source of dma-buf memory.
pub trait DmaHeap {
    /// Allocate `len` bytes, preferring `heap_hint` when given.
    fn allocate(&self, len: usize, heap_hint: Option<&Path>)
    -> Result<Box<dyn DmaBuffer>, DfxError>;
}

/// A CPU-mapped buffer which can be passed to a device.
pub trait DmaBuffer: Debug + Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The mapped bytes. Empty once closed.
    fn as_bytes(&self) -> &[u8];

    fn as_mut_bytes(&mut self) -> &mut [u8];

    /// Begin CPU read-write access.
    fn sync_start(&self) -> Result<(), DfxError>;

    /// End CPU read-write access. Must be called before the device reads the buffer.
    fn sync_end(&self) -> Result<(), DfxError>;

    /// Descriptor handed to the kernel. `None` for buffers that are not kernel backed, or closed.
    fn raw_fd(&self) -> Option<RawFd>;

    /// Release the mapping and descriptors. A second call does nothing.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// The kernel services used for one FPGA region.
pub trait Platform: Send {
    fn paths(&self) -> &SystemPaths;

    fn fpga(&self) -> &dyn Fpga;

    fn overlay_handler(&self, overlay_handle: &str) -> Box<dyn OverlayHandler + '_>;

    fn dma_heap(&self) -> &dyn DmaHeap;
}
