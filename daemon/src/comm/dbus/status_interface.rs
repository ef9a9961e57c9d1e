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

use crate::comm::dbus::SharedDfx;
use crate::error::DfxError;
use log::info;
use std::path::Path;
use zbus::{fdo, interface};

pub struct StatusInterface {
    dfx: SharedDfx,
}

impl StatusInterface {
    pub fn new(dfx: SharedDfx) -> Self {
        StatusInterface { dfx }
    }
}

#[interface(name = "org.dfxd.status")]
impl StatusInterface {
    async fn get_packages(&self) -> Result<Vec<u64>, fdo::Error> {
        info!("get_packages called");
        Ok(self.dfx.lock().await.packages())
    }

    async fn get_package_status(&self, id: u64) -> Result<String, fdo::Error> {
        info!("get_package_status called with id: {id}");
        Ok(self.dfx.lock().await.package_status(id)?)
    }

    async fn get_fpga_state(&self) -> Result<String, fdo::Error> {
        info!("get_fpga_state called");
        Ok(self.dfx.lock().await.fpga_state()?)
    }

    async fn get_fpga_flags(&self) -> Result<String, fdo::Error> {
        info!("get_fpga_flags called");
        let flags = self.dfx.lock().await.fpga_flags()?;
        Ok(format!("0x{flags:x}"))
    }

    async fn get_platform(&self) -> Result<String, fdo::Error> {
        info!("get_platform called");
        Ok(self.dfx.lock().await.family()?.to_string())
    }

    async fn get_active_uid_list(&self) -> Result<Vec<u32>, fdo::Error> {
        Ok(self.dfx.lock().await.active_uid_list()?)
    }

    async fn get_meta_header(&self, bitstream: &str, buf_size: u32) -> Result<Vec<u32>, fdo::Error> {
        if bitstream.is_empty() {
            return Err(DfxError::InvalidParam("A bitstream path is required.".into()).into());
        }
        let buf_size = usize::try_from(buf_size)
            .map_err(|e| DfxError::InvalidParam(format!("buf_size {buf_size}: {e}")))?;
        Ok(self
            .dfx
            .lock()
            .await
            .meta_header(Path::new(bitstream), buf_size)?)
    }
}
