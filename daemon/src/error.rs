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

//! Error types for the package lifecycle engine.
//!
//! Every failure the engine can report is a [`DfxError`]. Each kind maps to a stable negative
//! code through [`DfxError::code`], which lives in its own code space and never overlaps with
//! errno. Codes 0x1 to 0x10 follow the established DFX error numbering.

use log::error;
use std::path::PathBuf;
use zbus::fdo;

/// Failures found while classifying the files of a package.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("DiscoveryError::DuplicateBitstream: {dir:?} has multiple bitstream files: {files:?}")]
    DuplicateBitstream { dir: PathBuf, files: Vec<String> },
    #[error("DiscoveryError::DuplicateOverlay: {dir:?} has multiple image overlay files: {files:?}")]
    DuplicateOverlay { dir: PathBuf, files: Vec<String> },
    #[error(
        "DiscoveryError::DuplicateDriverOverlay: {dir:?} has multiple driver overlay files: {files:?}"
    )]
    DuplicateDriverOverlay { dir: PathBuf, files: Vec<String> },
    #[error("DiscoveryError::DuplicateKey: {dir:?} has multiple AES key files: {files:?}")]
    DuplicateKey { dir: PathBuf, files: Vec<String> },
    #[error("DiscoveryError::InvalidPackage: {0}")]
    InvalidPackage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DfxError {
    #[error("DfxError::InvalidParam: {0}")]
    InvalidParam(String),
    #[error("DfxError::PlatformUnsupported: FPGA manager '{0}' is not a supported platform")]
    PlatformUnsupported(String),
    #[error("DfxError::InvalidPackageId: {0} is not a valid package id")]
    InvalidPackageId(u64),
    #[error("DfxError::PackageNotFound: no package with id {0}")]
    PackageNotFound(u64),
    #[error("DfxError::InvalidState: {0}")]
    InvalidState(String),
    #[error("DfxError::Environment: {0}")]
    Environment(String),
    #[error("DfxError::Discovery: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("DfxError::KeyRead: no AES key line found in {0:?}")]
    KeyRead(PathBuf),
    #[error("DfxError::DeviceOpen: {0}")]
    DeviceOpen(String),
    #[error("DfxError::Alloc: {0}")]
    Alloc(String),
    #[error("DfxError::Map: failed to map {len} bytes of dma-buf: {e}")]
    Map { len: usize, e: std::io::Error },
    #[error("DfxError::DmaBuffer: {0}")]
    DmaBuffer(String),
    #[error("DfxError::ImageConfig: {0}")]
    ImageConfig(String),
    #[error("DfxError::DriverConfig: {0}")]
    DriverConfig(String),
    #[error("DfxError::NoDriverOverlay: package {0} has no driver overlay")]
    NoDriverOverlay(u64),
    #[error("DfxError::InsufficientBuffer: {needed} words returned but buffer holds {capacity}")]
    InsufficientBuffer { needed: usize, capacity: usize },
    #[error("DfxError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("DfxError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error("DfxError::IOCreate: An IO error occurred when creating {file:?}: {e}")]
    IOCreate { file: PathBuf, e: std::io::Error },
    #[error("DfxError::IODelete: An IO error occurred when deleting {file:?}: {e}")]
    IODelete { file: PathBuf, e: std::io::Error },
    #[error("DfxError::IOReadDir: An IO error occurred when reading directory {dir:?}: {e}")]
    IOReadDir { dir: PathBuf, e: std::io::Error },
    #[error("DfxError::TomlDe: Failed to parse config from {file:?}: {e}")]
    TomlDe {
        file: PathBuf,
        e: toml::de::Error,
    },
    #[error("DfxError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl DfxError {
    /// The negative code reported to callers for this kind of failure.
    pub fn code(&self) -> i32 {
        let code = match self {
            DfxError::PlatformUnsupported(..) => 0x1,
            DfxError::Environment(..) => 0x2,
            DfxError::Discovery(DiscoveryError::DuplicateBitstream { .. }) => 0x3,
            DfxError::Discovery(DiscoveryError::DuplicateOverlay { .. }) => 0x4,
            DfxError::Discovery(DiscoveryError::InvalidPackage(..)) => 0x5,
            DfxError::KeyRead(..) => 0x6,
            DfxError::Alloc(..) => 0x7,
            DfxError::InvalidPackageId(..) => 0x8,
            DfxError::PackageNotFound(..) => 0x9,
            DfxError::DeviceOpen(..) => 0xA,
            DfxError::ImageConfig(..) => 0xB,
            DfxError::DriverConfig(..) => 0xC,
            DfxError::NoDriverOverlay(..) => 0xD,
            DfxError::IODelete { .. } => 0xE,
            DfxError::IORead { .. } => 0xF,
            DfxError::InsufficientBuffer { .. } => 0x10,
            DfxError::InvalidParam(..) => 0x11,
            DfxError::Discovery(DiscoveryError::DuplicateDriverOverlay { .. }) => 0x12,
            DfxError::Discovery(DiscoveryError::DuplicateKey { .. }) => 0x13,
            DfxError::InvalidState(..) => 0x14,
            DfxError::Map { .. } => 0x15,
            DfxError::DmaBuffer(..) => 0x16,
            DfxError::IOWrite { .. } => 0x17,
            DfxError::IOCreate { .. } => 0x18,
            DfxError::IOReadDir { .. } => 0x19,
            DfxError::TomlDe { .. } | DfxError::Internal(..) => 0x1F,
        };
        -code
    }
}

impl From<DfxError> for fdo::Error {
    fn from(err: DfxError) -> Self {
        error!("{err}");
        let message = format!("{err} (code {})", err.code());
        match err {
            DfxError::InvalidParam(..)
            | DfxError::InvalidPackageId(..)
            | DfxError::PackageNotFound(..) => fdo::Error::InvalidArgs(message),
            DfxError::IORead { .. }
            | DfxError::IOWrite { .. }
            | DfxError::IOCreate { .. }
            | DfxError::IODelete { .. }
            | DfxError::IOReadDir { .. } => fdo::Error::IOError(message),
            _ => fdo::Error::Failed(message),
        }
    }
}
