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

use crate::proxies::control_proxy;
use std::path::{Path, PathBuf};
use zbus::Connection;

pub const EXTERNAL_CONFIG_FLAG: u32 = 0x1;
pub const ENCRYPTION_USER_KEY_FLAG: u32 = 0x20;

#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    pub external_config: bool,
    pub user_key: bool,
    pub heap: Option<PathBuf>,
    pub device: Option<PathBuf>,
}

impl PackageOptions {
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.external_config {
            flags |= EXTERNAL_CONFIG_FLAG;
        }
        if self.user_key {
            flags |= ENCRYPTION_USER_KEY_FLAG;
        }
        flags
    }
}

/// The daemon resolves paths against its own working directory, so send absolute ones.
/// Absent arguments travel as empty strings.
fn path_arg(path: Option<&Path>) -> Result<String, zbus::Error> {
    match path {
        None => Ok(String::new()),
        Some(p) => std::path::absolute(p)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|e| zbus::Error::Failure(format!("Cannot resolve {p:?}: {e}"))),
    }
}

pub async fn init_handler(dir: &Path, options: &PackageOptions) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    let id = proxy
        .init(
            &path_arg(Some(dir))?,
            &path_arg(options.device.as_deref())?,
            options.flags(),
            &path_arg(options.heap.as_deref())?,
        )
        .await?;
    Ok(id.to_string())
}

pub async fn init_files_handler(
    bitstream: &Path,
    overlay: &Path,
    driver_overlay: Option<&Path>,
    key: Option<&Path>,
    options: &PackageOptions,
) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    let id = proxy
        .init_files(
            &path_arg(Some(bitstream))?,
            &path_arg(Some(overlay))?,
            &path_arg(driver_overlay)?,
            &path_arg(key)?,
            &path_arg(options.device.as_deref())?,
            options.flags(),
            &path_arg(options.heap.as_deref())?,
        )
        .await?;
    Ok(id.to_string())
}

/// The control calls which only take a package id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    DriversLoad,
    Remove,
    Destroy,
}

pub async fn lifecycle_handler(operation: Operation, id: u64) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = control_proxy::ControlProxy::new(&connection).await?;
    match operation {
        Operation::Load => proxy.load(id).await,
        Operation::DriversLoad => proxy.drivers_load(id).await,
        Operation::Remove => proxy.remove(id).await,
        Operation::Destroy => proxy.destroy(id).await,
    }
}
