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

//! The `org.dfxd` system bus service.
//!
//! | object              | interface          | methods                                   |
//! |---------------------|--------------------|-------------------------------------------|
//! | `/org/dfxd/control` | `org.dfxd.control` | init, init_files, load, drivers_load, ... |
//! | `/org/dfxd/status`  | `org.dfxd.status`  | get_packages, get_package_status, ...     |
//!
//! Both objects share one engine behind a [`tokio::sync::Mutex`], so calls are handled one at a
//! time. Optional string arguments are absent when empty.

pub mod control_interface;
pub mod status_interface;

use crate::dfx::{Dfx, InitOptions};
use crate::package::record::DfxFlags;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub static SERVICE_NAME: &str = "org.dfxd";
pub static CONTROL_OBJECT_PATH: &str = "/org/dfxd/control";
pub static STATUS_OBJECT_PATH: &str = "/org/dfxd/status";

pub type SharedDfx = Arc<Mutex<Dfx>>;

pub fn shared(dfx: Dfx) -> SharedDfx {
    Arc::new(Mutex::new(dfx))
}

pub(crate) fn optional_path(arg: &str) -> Option<&Path> {
    match arg.is_empty() {
        true => None,
        false => Some(Path::new(arg)),
    }
}

pub(crate) fn init_options(device_path: &str, flags: u32, heap_path: &str) -> InitOptions {
    InitOptions {
        flags: DfxFlags::from_bits(flags),
        heap_path: optional_path(heap_path).map(PathBuf::from),
        device_path: optional_path(device_path).map(PathBuf::from),
    }
}
