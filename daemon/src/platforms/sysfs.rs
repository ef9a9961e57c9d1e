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

//! The production platform: the Linux fpga_manager class, configfs device-tree overlays and the
//! DMA heaps under `/dev/dma_heap`.
//!
//! Every location comes from the [`SystemPaths`] handed to [`SysfsPlatform::new`], so the same
//! code runs against a temporary directory tree in tests.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use dfxd::config::SystemPaths;
//! # use dfxd::platforms::platform::Platform;
//! # use dfxd::platforms::sysfs::SysfsPlatform;
//! # fn example() -> Result<(), dfxd::error::DfxError> {
//! let platform = SysfsPlatform::new(SystemPaths::from_config_files());
//! let state = platform.fpga().state()?;
//! # Ok(())
//! # }
//! ```

use crate::config::SystemPaths;
use crate::dma_buffer::DmaHeapAllocator;
use crate::platforms::platform::{DmaHeap, Fpga, OverlayHandler, Platform};
use crate::platforms::sysfs_components::configfs_overlay_handler::ConfigfsOverlayHandler;
use crate::platforms::sysfs_components::sysfs_fpga::SysfsFpga;
use log::trace;

#[derive(Debug)]
pub struct SysfsPlatform {
    paths: SystemPaths,
    fpga: SysfsFpga,
    heap: DmaHeapAllocator,
}

impl SysfsPlatform {
    pub fn new(paths: SystemPaths) -> Self {
        trace!("Creating sysfs platform for {}", paths.device_handle);
        let fpga = SysfsFpga::new(
            &paths.device_handle,
            &paths.fpga_manager_dir(),
            &paths.fpga_device_node,
        );
        let heap = DmaHeapAllocator::new(&paths);
        SysfsPlatform { paths, fpga, heap }
    }
}

impl Platform for SysfsPlatform {
    fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    fn fpga(&self) -> &dyn Fpga {
        &self.fpga
    }

    fn overlay_handler(&self, overlay_handle: &str) -> Box<dyn OverlayHandler + '_> {
        Box::new(ConfigfsOverlayHandler::new(
            &self.paths.overlay_control_dir,
            overlay_handle,
        ))
    }

    fn dma_heap(&self) -> &dyn DmaHeap {
        &self.heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::fs;

    #[gtest]
    fn components_follow_system_paths() {
        let root = tempfile::tempdir().unwrap();
        let managers = root.path().join("fpga_manager");
        fs::create_dir_all(managers.join("fpga1")).unwrap();
        fs::write(managers.join("fpga1/state"), "operating\n").unwrap();
        let paths = SystemPaths {
            fpga_managers_dir: managers,
            device_handle: "fpga1".into(),
            overlay_control_dir: root.path().join("overlays"),
            ..SystemPaths::default()
        };
        let expected_overlay = root.path().join("overlays/x_image_1");

        let platform = SysfsPlatform::new(paths);
        assert_that!(platform.fpga().device_handle(), eq("fpga1"));
        assert_that!(platform.fpga().state(), ok(eq("operating")));
        assert_that!(
            platform.overlay_handler("x_image_1").overlay_fs_path(),
            eq(expected_overlay.as_path())
        );
    }
}
