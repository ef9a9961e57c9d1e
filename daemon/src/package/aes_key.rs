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

use crate::error::DfxError;
use crate::system_io::fs_read;
use log::trace;
use std::path::Path;

/// Longest key accepted, in characters: 256 bits written as hexadecimal.
pub const AES_KEY_MAX_LEN: usize = 64;

/// Pull the key out of `.nky` contents. The first line mentioning `Key` holds it as its last
/// space separated word, e.g. `Key 0 5f2a...;`. The content is not validated, the FPGA manager
/// rejects bad keys.
pub fn extract_key(contents: &str) -> Option<String> {
    let line = contents.lines().find(|line| line.contains("Key"))?;
    let key = line.trim_end().rsplit(' ').next()?;
    Some(key.chars().take(AES_KEY_MAX_LEN).collect())
}

pub fn read_aes_key(key_file: &Path) -> Result<String, DfxError> {
    trace!("Reading AES key from {key_file:?}");
    extract_key(&fs_read(key_file)?).ok_or_else(|| DfxError::KeyRead(key_file.to_owned()))
}
