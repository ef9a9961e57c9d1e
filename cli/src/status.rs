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

use crate::proxies::status_proxy;
use std::path::Path;
use zbus::Connection;

async fn status_proxy() -> Result<status_proxy::StatusProxy<'static>, zbus::Error> {
    let connection = Connection::system().await?;
    status_proxy::StatusProxy::new(&connection).await
}

async fn get_fpga_message(proxy: &status_proxy::StatusProxy<'_>) -> Result<String, zbus::Error> {
    let platform = proxy.get_platform().await?;
    let state = proxy.get_fpga_state().await?;
    let flags = proxy.get_fpga_flags().await?;
    Ok(format!(
        "---- FPGA ----\n\
        | platform | state | flags |\n\
        | {platform} | {state} | {flags} |\n"
    ))
}

pub async fn status_handler(id: Option<u64>) -> Result<String, zbus::Error> {
    let proxy = status_proxy().await?;
    let mut ret_string = get_fpga_message(&proxy).await?;
    let ids = match id {
        Some(id) => vec![id],
        None => proxy.get_packages().await?,
    };
    ret_string += "\n---- PACKAGES ----\n";
    if ids.is_empty() {
        ret_string += "none\n";
    }
    for id in ids {
        ret_string += &proxy.get_package_status(id).await?;
        ret_string += "\n\n";
    }
    Ok(ret_string.trim_end().to_string())
}

/// One line per node: `node_id unique_id parent_unique_id function_id`.
pub fn format_uid_list(words: &[u32]) -> String {
    words
        .chunks(4)
        .map(|node| {
            node.iter()
                .map(|w| format!("0x{w:08x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn uid_list_handler() -> Result<String, zbus::Error> {
    let words = status_proxy().await?.get_active_uid_list().await?;
    Ok(format_uid_list(&words))
}

pub async fn meta_header_handler(file: &Path, size: u32) -> Result<String, zbus::Error> {
    let file = std::path::absolute(file)
        .map_err(|e| zbus::Error::Failure(format!("Cannot resolve {file:?}: {e}")))?;
    let words = status_proxy()
        .await?
        .get_meta_header(&file.to_string_lossy(), size)
        .await?;
    Ok(words
        .iter()
        .map(|w| format!("0x{w:08x}"))
        .collect::<Vec<_>>()
        .join("\n"))
}
