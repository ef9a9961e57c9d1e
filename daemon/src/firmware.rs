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

//! The kernel firmware loader and the Versal platform firmware queries.
//!
//! Overlays and bitstreams are requested by file name only. The kernel resolves the name through
//! `/sys/module/firmware_class/parameters/path`, so that knob is pointed at the package
//! directory for the duration of a request.
//!
//! ```text
//! /sys/devices/platform/firmware:versal-firmware/
//! ├── firmware            # write a PDI file name to select it for meta-header-read
//! ├── meta-header-read    # binary, 32-bit words
//! └── uid-read            # binary, {node id, uid, parent uid, function id} per node
//! ```

use crate::config::SystemPaths;
use crate::error::DfxError;
use crate::platforms::platform::FpgaFamily;
use crate::system_io::{fs_file_size, fs_read_bytes, fs_write};
use log::{error, info, trace};
use std::path::Path;

pub fn set_search_path(paths: &SystemPaths, dir: &Path) -> Result<(), DfxError> {
    trace!("Pointing firmware lookups at {dir:?}");
    fs_write(
        &paths.firmware_search_path_control,
        false,
        dir.to_string_lossy(),
    )
}

pub fn clear_search_path(paths: &SystemPaths) -> Result<(), DfxError> {
    trace!("Clearing the firmware search path");
    fs_write(&paths.firmware_search_path_control, false, "")
}

/// Native-endian 32-bit words. A trailing partial word is dropped.
fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn require_firmware_queries(family: FpgaFamily) -> Result<(), DfxError> {
    match family.has_firmware_queries() {
        true => Ok(()),
        false => Err(DfxError::PlatformUnsupported(format!(
            "{family} (firmware queries need versal)"
        ))),
    }
}

/// The `{node id, unique id, parent unique id, function id}` entries of every active node.
///
/// # Returns: `Result<Vec<u32>, DfxError>`
/// * `Ok(Vec<u32>)` - the raw words, four per node
/// * `Err(DfxError::PlatformUnsupported)` - not a Versal device
/// * `Err(DfxError::IORead)` - the firmware interface is missing
pub fn active_uid_list(paths: &SystemPaths, family: FpgaFamily) -> Result<Vec<u32>, DfxError> {
    require_firmware_queries(family)?;
    let list = words(&fs_read_bytes(&paths.versal_firmware_dir.join("uid-read"))?);
    info!("Read {} uid words", list.len());
    Ok(list)
}

/// The meta header of a PDI as parsed by the platform firmware.
///
/// # Arguments
///
/// * `bitstream` - the PDI, looked up by the firmware through its directory
/// * `buf_size` - capacity of the caller's buffer, in words
///
/// # Returns: `Result<Vec<u32>, DfxError>`
/// * `Ok(Vec<u32>)` - at most `buf_size` words
/// * `Err(DfxError::PlatformUnsupported)` - not a Versal device
/// * `Err(DfxError::IORead)` - the PDI or the firmware interface cannot be read
/// * `Err(DfxError::InsufficientBuffer)` - the firmware returned more than `buf_size` words
pub fn meta_header(
    paths: &SystemPaths,
    family: FpgaFamily,
    bitstream: &Path,
    buf_size: usize,
) -> Result<Vec<u32>, DfxError> {
    require_firmware_queries(family)?;
    fs_file_size(bitstream)?;
    let (Some(dir), Some(name)) = (bitstream.parent(), bitstream.file_name()) else {
        return Err(DfxError::InvalidParam(format!(
            "{bitstream:?} is not a path to a file"
        )));
    };

    set_search_path(paths, dir)?;
    let result = fs_write(
        &paths.versal_firmware_dir.join("firmware"),
        false,
        name.to_string_lossy(),
    )
    .and_then(|_| fs_read_bytes(&paths.versal_firmware_dir.join("meta-header-read")));
    if let Err(e) = clear_search_path(paths) {
        error!("Failed to reset the firmware search path: {e}");
    }

    let header = words(&result?);
    if header.len() > buf_size {
        return Err(DfxError::InsufficientBuffer {
            needed: header.len(),
            capacity: buf_size,
        });
    }
    info!("Read {} meta header words for {bitstream:?}", header.len());
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::fs;

    struct FirmwareTree {
        _root: tempfile::TempDir,
        paths: SystemPaths,
    }

    fn tree() -> FirmwareTree {
        let root = tempfile::tempdir().unwrap();
        let firmware = root.path().join("versal-firmware");
        fs::create_dir(&firmware).unwrap();
        fs::write(firmware.join("firmware"), "").unwrap();
        fs::write(root.path().join("firmware_path"), "").unwrap();
        let paths = SystemPaths {
            firmware_search_path_control: root.path().join("firmware_path"),
            versal_firmware_dir: firmware,
            ..SystemPaths::default()
        };
        FirmwareTree { _root: root, paths }
    }

    fn to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[gtest]
    fn uid_list_is_read_as_words() {
        let tree = tree();
        fs::write(
            tree.paths.versal_firmware_dir.join("uid-read"),
            to_bytes(&[0x1c000001, 7, 0, 3]),
        )
        .unwrap();
        assert_that!(
            active_uid_list(&tree.paths, FpgaFamily::Versal),
            ok(elements_are![eq(&0x1c000001), eq(&7), eq(&0), eq(&3)])
        );
    }

    #[gtest]
    fn queries_need_versal() {
        let tree = tree();
        assert_that!(
            active_uid_list(&tree.paths, FpgaFamily::ZynqMp),
            err(displays_as(contains_substring("PlatformUnsupported")))
        );
    }

    #[gtest]
    fn meta_header_selects_pdi_and_resets_search_path() {
        let tree = tree();
        let package = tempfile::tempdir().unwrap();
        let pdi = package.path().join("x.pdi");
        fs::write(&pdi, "pdi").unwrap();
        fs::write(
            tree.paths.versal_firmware_dir.join("meta-header-read"),
            to_bytes(&[1, 2, 3]),
        )
        .unwrap();

        assert_that!(
            meta_header(&tree.paths, FpgaFamily::Versal, &pdi, 3),
            ok(elements_are![eq(&1), eq(&2), eq(&3)])
        );
        assert_that!(
            fs::read_to_string(tree.paths.versal_firmware_dir.join("firmware")).unwrap(),
            eq("x.pdi")
        );
        assert_that!(
            fs::read_to_string(&tree.paths.firmware_search_path_control).unwrap(),
            eq("")
        );
    }

    #[gtest]
    fn meta_header_too_large_for_buffer() {
        let tree = tree();
        let package = tempfile::tempdir().unwrap();
        let pdi = package.path().join("x.pdi");
        fs::write(&pdi, "pdi").unwrap();
        fs::write(
            tree.paths.versal_firmware_dir.join("meta-header-read"),
            to_bytes(&[1, 2, 3]),
        )
        .unwrap();
        assert_that!(
            meta_header(&tree.paths, FpgaFamily::Versal, &pdi, 2),
            err(displays_as(contains_substring("InsufficientBuffer")))
        );
    }

    #[gtest]
    fn meta_header_of_missing_pdi() {
        let tree = tree();
        assert_that!(
            meta_header(
                &tree.paths,
                FpgaFamily::Versal,
                Path::new("/nonexistent/x.pdi"),
                8
            ),
            err(displays_as(contains_substring("IORead")))
        );
    }

    #[gtest]
    fn partial_words_are_dropped() {
        assert_that!(words(&[1, 0, 0, 0, 9]).len(), eq(1));
    }
}
