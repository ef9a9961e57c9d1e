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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around standard file system operations which log at trace level and convert
//! failures into the matching `DfxError::IO*` variant, carrying the path involved.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use dfxd::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//!
//! # fn example() -> Result<(), dfxd::error::DfxError> {
//! let state = fs_read(Path::new("/sys/class/fpga_manager/fpga0/state"))?;
//! fs_write(Path::new("/sys/class/fpga_manager/fpga0/flags"), false, "0")?;
//! # Ok(())
//! # }
//! ```

use crate::error::DfxError;
use log::trace;
use std::fs::{File, OpenOptions, create_dir, remove_dir};
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, DfxError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(DfxError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, DfxError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(DfxError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Read a sysfs style attribute: the contents of the file with the trailing newline removed.
pub fn fs_read_trimmed(file_path: &Path) -> Result<String, DfxError> {
    Ok(fs_read(file_path)?.trim_end().to_string())
}

/// Write a string value to a file.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist; if `false`, file must already exist
/// * `value` - The string value to write (implements `AsRef<str>`)
///
/// # Returns: `Result<(), DfxError>`
/// * `Ok(())` - Write succeeded
/// * `Err(DfxError::IOWrite)` - If the write fails (permissions, file doesn't exist when create=false, etc.)
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), DfxError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .create(create)
        .read(false)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(DfxError::IOWrite {
            file: file_path.into(),
            e,
        }),
    }
}

/// Size in bytes of a regular file.
pub fn fs_file_size(file_path: &Path) -> Result<u64, DfxError> {
    std::fs::metadata(file_path)
        .map(|m| m.len())
        .map_err(|e| DfxError::IORead {
            file: file_path.into(),
            e,
        })
}

/// Fill `dest` with exactly `dest.len()` bytes from the start of a file.
///
/// # Returns: `Result<(), DfxError>`
/// * `Ok(())` - `dest` was completely filled
/// * `Err(DfxError::IORead)` - If the file cannot be opened or is shorter than `dest`
pub fn fs_read_exact(file_path: &Path, dest: &mut [u8]) -> Result<(), DfxError> {
    trace!("Attempting to read {} bytes from {file_path:?}", dest.len());
    File::open(file_path)
        .and_then(|mut f| f.read_exact(dest))
        .map_err(|e| DfxError::IORead {
            file: file_path.into(),
            e,
        })
}

/// Read a binary attribute completely.
pub fn fs_read_bytes(file_path: &Path) -> Result<Vec<u8>, DfxError> {
    trace!("Attempting to read bytes from {file_path:?}");
    std::fs::read(file_path).map_err(|e| DfxError::IORead {
        file: file_path.into(),
        e,
    })
}

/// Create a single directory. Unlike `create_dir_all`, this fails if the directory exists, which
/// is what a configfs overlay slot needs: an existing slot belongs to someone else.
///
/// # Returns: `Result<(), DfxError>`
/// * `Ok(())` - Directory created
/// * `Err(DfxError::IOCreate)` - If it already exists, the parent is missing, or permissions deny it
pub fn fs_create_dir(path: &Path) -> Result<(), DfxError> {
    trace!("Attempting to Create '{path:?}'");
    match create_dir(path) {
        Ok(_) => {
            trace!("Directory created at {path:?}.");
            Ok(())
        }
        Err(e) => Err(DfxError::IOCreate {
            file: path.into(),
            e,
        }),
    }
}

/// Remove an empty directory. Configfs overlay directories count as empty for this purpose.
///
/// # Returns: `Result<(), DfxError>`
/// * `Ok(())` - Directory removed successfully
/// * `Err(DfxError::IODelete)` - If removal fails (not empty, doesn't exist, permissions, etc.)
pub fn fs_remove_dir(path: &Path) -> Result<(), DfxError> {
    trace!("Attempting to delete '{path:?}'");
    match remove_dir(path) {
        Ok(_) => {
            trace!("Deleted {path:?}");
            Ok(())
        }
        Err(e) => Err(DfxError::IODelete {
            file: path.into(),
            e,
        }),
    }
}

/// Read the contents of a directory and return entry names.
///
/// Entries that cannot be read are silently skipped. The order is the order the file system
/// returns, callers that care must sort.
///
/// # Returns: `Result<Vec<String>, DfxError>`
/// * `Ok(Vec<String>)` - List of entry names in the directory (files and subdirectories)
/// * `Err(DfxError::IOReadDir)` - If the directory cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read_dir(dir: &Path) -> Result<Vec<String>, DfxError> {
    trace!("Attempting to read directory '{dir:?}'");
    std::fs::read_dir(dir).map_or_else(
        |e| {
            Err(DfxError::IOReadDir {
                dir: dir.to_owned(),
                e,
            })
        },
        |iter| {
            let ret = iter
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            trace!("Dir reading done.");
            Ok(ret)
        },
    )
}
