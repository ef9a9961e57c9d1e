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


use zbus::{Result, proxy};

#[proxy(
    default_service = "org.dfxd",
    interface = "org.dfxd.status",
    default_path = "/org/dfxd/status"
)]
pub trait Status {
    async fn get_packages(&self) -> Result<Vec<u64>>;
    async fn get_package_status(&self, id: u64) -> Result<String>;
    async fn get_fpga_state(&self) -> Result<String>;
    async fn get_fpga_flags(&self) -> Result<String>;
    async fn get_platform(&self) -> Result<String>;
    async fn get_active_uid_list(&self) -> Result<Vec<u32>>;
    async fn get_meta_header(&self, bitstream: &str, buf_size: u32) -> Result<Vec<u32>>;
}
