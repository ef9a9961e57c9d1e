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


//! Shared fixtures: an engine driving a mock kernel tree rooted in a temporary directory.

use dfxd::dfx::Dfx;
use dfxd::platforms::mock::{MockKernel, MockPlatform};
use dfxd::platforms::platform::FpgaFamily;
use rstest::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Contents written to every bitstream file.
pub static BITSTREAM: &[u8] = &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99];

pub struct Board {
    pub root: TempDir,
    pub kernel: MockKernel,
    pub dfx: Dfx,
}

impl Board {
    pub fn new(family: FpgaFamily) -> Board {
        let root = tempfile::tempdir().expect("failed to create a temporary directory");
        let platform = MockPlatform::new(&root.path().join("sys"), family)
            .expect("failed to lay out the mock kernel tree");
        let kernel = platform.kernel();
        Board {
            root,
            kernel,
            dfx: Dfx::new(Box::new(platform)),
        }
    }

    /// Create a package directory `name` holding `files`. Bitstreams get [`BITSTREAM`], other
    /// files are empty.
    pub fn package(&self, name: &str, files: &[&str]) -> PathBuf {
        let dir = self.root.path().join(name);
        fs::create_dir_all(&dir).expect("failed to create the package directory");
        for file in files {
            let contents: &[u8] = match is_bitstream(file) {
                true => BITSTREAM,
                false => b"",
            };
            fs::write(dir.join(file), contents).expect("failed to write a package file");
        }
        dir
    }
}

fn is_bitstream(file: &str) -> bool {
    [".bin", ".pdi", ".bit"].iter().any(|ext| file.ends_with(ext))
}

#[fixture]
pub fn versal() -> Board {
    Board::new(FpgaFamily::Versal)
}

#[fixture]
pub fn zynqmp() -> Board {
    Board::new(FpgaFamily::ZynqMp)
}
