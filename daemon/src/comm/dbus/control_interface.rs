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

use crate::comm::dbus::{SharedDfx, init_options, optional_path};
use crate::dfx::PackagePaths;
use crate::error::DfxError;
use log::{info, trace};
use std::path::Path;
use zbus::{fdo, interface};

pub struct ControlInterface {
    dfx: SharedDfx,
}

impl ControlInterface {
    pub fn new(dfx: SharedDfx) -> Self {
        ControlInterface { dfx }
    }
}

#[interface(name = "org.dfxd.control")]
impl ControlInterface {
    async fn init(
        &self,
        package_dir: &str,
        device_path: &str,
        flags: u32,
        heap_path: &str,
    ) -> Result<u64, fdo::Error> {
        info!("init called with package_dir: {package_dir} and flags: 0x{flags:x}");
        if package_dir.is_empty() {
            return Err(
                DfxError::InvalidParam("A package directory is required.".into()).into(),
            );
        }
        let options = init_options(device_path, flags, heap_path);
        let mut dfx = self.dfx.lock().await;
        trace!("Got engine lock.");
        Ok(dfx.init(Path::new(package_dir), &options)?)
    }

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
    ) -> Result<u64, fdo::Error> {
        info!(
            "init_files called with bitstream: {bitstream}, image_overlay: {image_overlay}, \
            driver_overlay: {driver_overlay}, key_file: {key_file} and flags: 0x{flags:x}"
        );
        let files = PackagePaths {
            bitstream: Path::new(bitstream),
            image_overlay: Path::new(image_overlay),
            driver_overlay: optional_path(driver_overlay),
            key_file: optional_path(key_file),
        };
        let options = init_options(device_path, flags, heap_path);
        let mut dfx = self.dfx.lock().await;
        trace!("Got engine lock.");
        Ok(dfx.init_files(files, &options)?)
    }

    async fn load(&self, id: u64) -> Result<String, fdo::Error> {
        let mut dfx = self.dfx.lock().await;
        dfx.load(id)?;
        let dir = dfx.package(id)?.image_overlay_dir.clone();
        Ok(format!("Package {id} loaded, image overlay applied at {dir:?}"))
    }

    async fn drivers_load(&self, id: u64) -> Result<String, fdo::Error> {
        let mut dfx = self.dfx.lock().await;
        dfx.drivers_load(id)?;
        let dir = dfx.package(id)?.driver_overlay_dir.clone();
        Ok(format!("Drivers of package {id} loaded, driver overlay applied at {dir:?}"))
    }

    async fn remove(&self, id: u64) -> Result<String, fdo::Error> {
        self.dfx.lock().await.remove(id)?;
        Ok(format!("Overlays of package {id} removed"))
    }

    async fn destroy(&self, id: u64) -> Result<String, fdo::Error> {
        self.dfx.lock().await.destroy(id)?;
        Ok(format!("Package {id} destroyed"))
    }
}
