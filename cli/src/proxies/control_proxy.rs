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
    interface = "org.dfxd.control",
    default_path = "/org/dfxd/control"
)]
pub trait Control {
    async fn init(
        &self,
        package_dir: &str,
        device_path: &str,
        flags: u32,
        heap_path: &str,
    ) -> Result<u64>;

    #[allow(clippy::too_many_arguments)]
    async fn init_files(
        &self,
        bitstream: &str,
        image_overlay: &str,
        driver_overlay: &str,
        key_file: &str,
        device_path: &str,
        flags: u32,
        heap_path: &str,
    ) -> Result<u64>;

    async fn load(&self, id: u64) -> Result<String>;
    async fn drivers_load(&self, id: u64) -> Result<String>;
    async fn remove(&self, id: u64) -> Result<String>;
    async fn destroy(&self, id: u64) -> Result<String>;
}
