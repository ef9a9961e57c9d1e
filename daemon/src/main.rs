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

//! DFX daemon (dfxd) - System service for Dynamic Function eXchange packages.
//!
//! # DBus Service
//!
//! - **Service Name**: `org.dfxd`
//! - **Control Interface**: `/org/dfxd/control` - package lifecycle
//! - **Status Interface**: `/org/dfxd/status` - read-only queries
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! Kernel paths are read from `/usr/lib/dfxd/config.toml` and `/etc/dfxd/config.toml`, see
//! [`dfxd::config`].

use dfxd::comm::dbus::{
    CONTROL_OBJECT_PATH, SERVICE_NAME, STATUS_OBJECT_PATH, control_interface::ControlInterface,
    shared, status_interface::StatusInterface,
};
use dfxd::config::SystemPaths;
use dfxd::dfx::Dfx;
use dfxd::platforms::sysfs::SysfsPlatform;
use log::info;
use std::error::Error;
use std::future::pending;
use zbus::connection;

/// Main entry point for the dfxd daemon.
///
/// # Examples
///
/// ```bash
/// # Run with debug logging
/// RUST_LOG=debug dfxd
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths = SystemPaths::from_config_files();
    info!("Using {paths:?}");
    let dfx = shared(Dfx::new(Box::new(SysfsPlatform::new(paths))));

    let _conn = connection::Builder::system()?
        .name(SERVICE_NAME)?
        .serve_at(STATUS_OBJECT_PATH, StatusInterface::new(dfx.clone()))?
        .serve_at(CONTROL_OBJECT_PATH, ControlInterface::new(dfx))?
        .build()
        .await?;

    info!("Started {SERVICE_NAME} dbus service");
    pending::<()>().await;

    Ok(())
}
