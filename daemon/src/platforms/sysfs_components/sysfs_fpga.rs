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

//! fpga_manager access through sysfs and the FPGA character device.
//!
//! ```text
//! /sys/class/fpga_manager/fpga0/
//! ├── flags   # hexadecimal, read/write
//! ├── key     # AES user key, write only
//! ├── name    # driver name, used to pick the FpgaFamily
//! └── state   # "operating" once configured, otherwise an error description
//! ```
//!
//! Bitstreams are not written through sysfs. The filled dma-buf descriptor is passed to the
//! `DFX_IOCTL_LOAD_DMA_BUFF` ioctl of `/dev/fpga0` and the driver configures the fabric from it.

use crate::error::DfxError;
use crate::platforms::platform::{DmaBuffer, Fpga};
use crate::system_io::{fs_read_trimmed, fs_write};
use log::{info, trace, warn};
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

mod ioctl {
    use nix::ioctl_readwrite;

    const DFX_IOC_MAGIC: u8 = b'R';
    const DFX_LOAD_DMA_BUFF: u8 = 1;

    ioctl_readwrite!(dfx_load_dma_buff, DFX_IOC_MAGIC, DFX_LOAD_DMA_BUFF, u32);
}

#[derive(Debug)]
pub struct SysfsFpga {
    device_handle: String,
    manager_dir: PathBuf,
    device_node: PathBuf,
}

impl SysfsFpga {
    pub(crate) fn new(device_handle: &str, manager_dir: &Path, device_node: &Path) -> SysfsFpga {
        SysfsFpga {
            device_handle: device_handle.to_owned(),
            manager_dir: manager_dir.to_owned(),
            device_node: device_node.to_owned(),
        }
    }

    fn attribute(&self, name: &str) -> PathBuf {
        self.manager_dir.join(name)
    }
}

impl Fpga for SysfsFpga {
    fn device_handle(&self) -> &str {
        &self.device_handle
    }

    fn name(&self) -> Result<String, DfxError> {
        fs_read_trimmed(&self.attribute("name"))
    }

    fn state(&self) -> Result<String, DfxError> {
        fs_read_trimmed(&self.attribute("state"))
    }

    fn flags(&self) -> Result<u32, DfxError> {
        let flag_path = self.attribute("flags");
        let contents = fs_read_trimmed(&flag_path)?;
        let trimmed = contents.trim().trim_start_matches("0x");
        u32::from_str_radix(trimmed, 16).map_err(|_| {
            DfxError::Internal(format!("Parsing flags '{contents}' from {flag_path:?} failed"))
        })
    }

    fn set_flags(&self, flags: u32) -> Result<(), DfxError> {
        let flag_path = self.attribute("flags");
        trace!("Writing 0x'{flags:X}' to '{flag_path:?}");
        fs_write(&flag_path, false, format!("{flags:x}"))?;

        match self.flags() {
            Ok(returned_flags) if returned_flags == flags => Ok(()),
            Ok(returned_flags) => Err(DfxError::ImageConfig(format!(
                "Setting {}'s flags to 0x{flags:X} failed. Resulting flags were 0x{returned_flags:X}",
                self.device_handle
            ))),
            Err(e) => Err(e),
        }
    }

    fn set_key(&self, key: &str) -> Result<(), DfxError> {
        trace!("Writing AES user key to {}", self.device_handle);
        fs_write(&self.attribute("key"), false, key)
    }

    fn load_dma_buffer(&self, buffer: &dyn DmaBuffer) -> Result<(), DfxError> {
        let Some(fd) = buffer.raw_fd() else {
            return Err(DfxError::DmaBuffer(
                "The bitstream buffer is closed or has no kernel descriptor".into(),
            ));
        };
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device_node)
            .map_err(|e| {
                DfxError::DeviceOpen(format!("Cannot open {:?}: {e}", self.device_node))
            })?;

        let mut buffer_fd = fd as u32;
        trace!(
            "Handing dma-buf fd {buffer_fd} ({} bytes) to {:?}",
            buffer.len(),
            self.device_node
        );
        // SAFETY: `device` is an open descriptor and `buffer_fd` lives for the whole call.
        match unsafe { ioctl::dfx_load_dma_buff(device.as_raw_fd(), &mut buffer_fd) } {
            Ok(_) => {
                info!("{} accepted the bitstream buffer", self.device_handle);
                Ok(())
            }
            Err(errno) => {
                warn!("DFX_IOCTL_LOAD_DMA_BUFF failed on {:?}: {errno}", self.device_node);
                Err(DfxError::ImageConfig(format!(
                    "{} rejected the bitstream buffer: {errno}",
                    self.device_handle
                )))
            }
        }
    }
}
