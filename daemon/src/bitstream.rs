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

//! Staging of a bitstream in a DMA buffer.
//!
//! On families which consume whole words the buffer is padded at the front:
//! ```text
//! | 0xFF * pad | bitstream (len bytes) |   pad = (4 - len % 4) % 4
//! ```
//! Other families get the file verbatim.

use crate::error::DfxError;
use crate::platforms::platform::{DmaBuffer, DmaHeap, FpgaFamily};
use crate::system_io::{fs_file_size, fs_read_exact};
use log::{debug, error, trace};
use std::path::Path;

pub const FPGA_WORD_SIZE: usize = 4;
/// Filler placed in front of the bitstream.
pub const FPGA_DUMMY_BYTE: u8 = 0xFF;

pub fn word_align_padding(len: usize) -> usize {
    (FPGA_WORD_SIZE - len % FPGA_WORD_SIZE) % FPGA_WORD_SIZE
}

/// Allocate a buffer for `bitstream` and fill it.
///
/// # Arguments
///
/// * `family` - decides whether the contents are word aligned
/// * `bitstream` - the file to stage
/// * `heap` - where the buffer comes from
/// * `heap_hint` - heap to try first, see [`DmaHeap::allocate`]
///
/// # Returns: `Result<Box<dyn DmaBuffer>, DfxError>`
/// * `Ok(Box<dyn DmaBuffer>)` - synced and ready for the FPGA manager
/// * `Err(DfxError::IORead)` - the bitstream cannot be read
/// * `Err(DfxError::DeviceOpen)` / `Err(DfxError::Alloc)` / `Err(DfxError::Map)` - from the heap
/// * `Err(DfxError::DmaBuffer)` - filling the buffer failed, it has been closed again
pub fn prepare(
    family: FpgaFamily,
    bitstream: &Path,
    heap: &dyn DmaHeap,
    heap_hint: Option<&Path>,
) -> Result<Box<dyn DmaBuffer>, DfxError> {
    let file_len = usize::try_from(fs_file_size(bitstream)?).map_err(|_| {
        DfxError::DmaBuffer(format!("{bitstream:?} is too large to be mapped"))
    })?;
    let pad = match family.requires_word_alignment() {
        true => word_align_padding(file_len),
        false => 0,
    };
    debug!("Staging {bitstream:?}: {file_len} bytes with {pad} bytes of padding");

    let mut buffer = heap.allocate(file_len + pad, heap_hint)?;
    if let Err(e) = fill(buffer.as_mut(), bitstream, pad, file_len) {
        error!("Staging {bitstream:?} failed, releasing its buffer");
        buffer.close();
        return Err(DfxError::DmaBuffer(format!(
            "Copying {bitstream:?} into the DMA buffer failed: {e}"
        )));
    }
    Ok(buffer)
}

fn fill(
    buffer: &mut dyn DmaBuffer,
    bitstream: &Path,
    pad: usize,
    file_len: usize,
) -> Result<(), DfxError> {
    let expected = pad + file_len;
    if buffer.len() < expected {
        return Err(DfxError::DmaBuffer(format!(
            "buffer holds {} bytes, {expected} needed",
            buffer.len()
        )));
    }
    buffer.sync_start()?;
    let bytes = buffer.as_mut_bytes();
    bytes[..pad].fill(FPGA_DUMMY_BYTE);
    let copied = fs_read_exact(bitstream, &mut bytes[pad..expected]);
    // CPU access ends even when the copy failed.
    let synced = buffer.sync_end();
    copied?;
    synced?;
    trace!("Copied {file_len} bytes after {pad} bytes of padding");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::platform::Platform;
    use googletest::prelude::*;
    use rstest::*;
    use std::fs;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[gtest]
    #[rstest]
    #[case(0, 0)]
    #[case(1, 3)]
    #[case(2, 2)]
    #[case(3, 1)]
    #[case(4, 0)]
    #[case(1025, 3)]
    fn padding(#[case] len: usize, #[case] expected: usize) {
        assert_that!(word_align_padding(len), eq(expected));
    }

    #[gtest]
    #[rstest]
    fn word_aligned_staging(#[values(1, 2, 3, 4, 5, 6, 7, 8, 13)] len: usize) {
        let root = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(root.path(), FpgaFamily::ZynqMp).unwrap();
        let file = root.path().join("x.bin");
        let original = content(len);
        fs::write(&file, &original).unwrap();

        let buffer = prepare(FpgaFamily::ZynqMp, &file, platform.dma_heap(), None).unwrap();
        let pad = (4 - len % 4) % 4;
        let bytes = buffer.as_bytes();
        assert_that!(bytes.len(), eq(len + pad));
        assert_that!(bytes.len() % FPGA_WORD_SIZE, eq(0));
        assert_that!(bytes[..pad].iter().all(|b| *b == FPGA_DUMMY_BYTE), eq(true));
        assert_that!(&bytes[pad..], eq(original.as_slice()));
    }

    #[gtest]
    #[rstest]
    fn verbatim_staging(#[values(1, 2, 3, 4, 5, 9)] len: usize) {
        let root = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(root.path(), FpgaFamily::Versal).unwrap();
        let file = root.path().join("x.pdi");
        let original = content(len);
        fs::write(&file, &original).unwrap();

        let buffer = prepare(FpgaFamily::Versal, &file, platform.dma_heap(), None).unwrap();
        assert_that!(buffer.as_bytes(), eq(original.as_slice()));
    }

    #[gtest]
    fn missing_bitstream_allocates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(root.path(), FpgaFamily::Versal).unwrap();
        let kernel = platform.kernel();
        let result = prepare(
            FpgaFamily::Versal,
            &root.path().join("gone.pdi"),
            platform.dma_heap(),
            None,
        );
        assert_that!(
            result.map(|_| ()),
            err(displays_as(contains_substring("IORead")))
        );
        assert_that!(kernel.live_buffers(), eq(0));
    }

    #[gtest]
    fn allocation_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let platform = MockPlatform::new(root.path(), FpgaFamily::Versal).unwrap();
        let file = root.path().join("x.pdi");
        fs::write(&file, content(8)).unwrap();
        platform.kernel().fail_allocations(true);
        assert_that!(
            prepare(FpgaFamily::Versal, &file, platform.dma_heap(), None).map(|_| ()),
            err(displays_as(contains_substring("Alloc")))
        );
    }
}
