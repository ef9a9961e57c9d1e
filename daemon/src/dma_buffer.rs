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

//! DMA heap allocation and the CPU mapping of the resulting dma-buf.
//!
//! A heap is picked in this order:
//! 1. the heap path supplied by the caller, if it can be opened
//! 2. `<dma_heap_dir>/<default_dma_heap>`, normally `/dev/dma_heap/reserved`
//! 3. the first `cma_reserved@*` heap whose reserved-memory device-tree node carries
//!    `linux,cma-default`
//!
//! The heap hands back a dma-buf descriptor which is mapped shared and read-write. The
//! [`DmaBufferChannel`] owns the heap descriptor, the buffer descriptor and the mapping and
//! releases them in reverse order.

use crate::config::SystemPaths;
use crate::error::DfxError;
use crate::platforms::platform::{DmaBuffer, DmaHeap};
use crate::system_io::fs_read_dir;
use log::{debug, trace, warn};
use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

mod ioctl {
    use nix::{ioctl_readwrite, ioctl_write_ptr};

    /// `struct dma_heap_allocation_data` from `linux/dma-heap.h`.
    #[repr(C)]
    #[derive(Debug, Default)]
    pub struct DmaHeapAllocationData {
        pub len: u64,
        pub fd: u32,
        pub fd_flags: u32,
        pub heap_flags: u64,
    }

    /// `struct dma_buf_sync` from `linux/dma-buf.h`.
    #[repr(C)]
    #[derive(Debug, Default)]
    pub struct DmaBufSync {
        pub flags: u64,
    }

    pub const DMA_BUF_SYNC_READ: u64 = 1 << 0;
    pub const DMA_BUF_SYNC_WRITE: u64 = 1 << 1;
    pub const DMA_BUF_SYNC_RW: u64 = DMA_BUF_SYNC_READ | DMA_BUF_SYNC_WRITE;
    pub const DMA_BUF_SYNC_START: u64 = 0;
    pub const DMA_BUF_SYNC_END: u64 = 1 << 2;

    ioctl_readwrite!(dma_heap_alloc, b'H', 0x0, DmaHeapAllocationData);
    ioctl_write_ptr!(dma_buf_sync, b'b', 0, DmaBufSync);
}

/// Prefix of the reserved CMA heaps created from device-tree `reserved-memory` nodes.
pub static CMA_RESERVED_PREFIX: &str = "cma_reserved@";

/// Allocates dma-bufs from the DMA heaps described by [`SystemPaths`].
#[derive(Debug, Clone)]
pub struct DmaHeapAllocator {
    dma_heap_dir: PathBuf,
    default_heap: String,
    reserved_memory_dir: PathBuf,
}

impl DmaHeapAllocator {
    pub fn new(paths: &SystemPaths) -> Self {
        DmaHeapAllocator {
            dma_heap_dir: paths.dma_heap_dir.clone(),
            default_heap: paths.default_dma_heap.clone(),
            reserved_memory_dir: paths.reserved_memory_dir.clone(),
        }
    }

    /// Open the heap device to allocate from.
    ///
    /// # Returns: `Result<(File, PathBuf), DfxError>`
    /// * `Ok((File, PathBuf))` - the opened heap and where it was found
    /// * `Err(DfxError::DeviceOpen)` - no candidate could be opened
    pub fn resolve_heap(&self, heap_hint: Option<&Path>) -> Result<(File, PathBuf), DfxError> {
        if let Some(hint) = heap_hint {
            match open_heap(hint) {
                Ok(file) => return Ok((file, hint.to_owned())),
                Err(e) => warn!("Requested heap {hint:?} cannot be opened: {e}"),
            }
        }

        let default_heap = self.dma_heap_dir.join(&self.default_heap);
        if let Ok(file) = open_heap(&default_heap) {
            return Ok((file, default_heap));
        }
        trace!("Default heap {default_heap:?} unavailable, scanning {:?}", self.dma_heap_dir);

        let mut candidates: Vec<String> = fs_read_dir(&self.dma_heap_dir)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name.starts_with(CMA_RESERVED_PREFIX))
            .collect();
        candidates.sort();
        for name in candidates {
            if !self
                .reserved_memory_dir
                .join(&name)
                .join("linux,cma-default")
                .exists()
            {
                trace!("{name} is not the default CMA region");
                continue;
            }
            let path = self.dma_heap_dir.join(&name);
            if let Ok(file) = open_heap(&path) {
                return Ok((file, path));
            }
        }

        Err(DfxError::DeviceOpen(format!(
            "No usable DMA heap: tried {heap_hint:?}, {default_heap:?} and the default CMA \
             region under {:?}",
            self.dma_heap_dir
        )))
    }
}

fn open_heap(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

impl DmaHeap for DmaHeapAllocator {
    fn allocate(
        &self,
        len: usize,
        heap_hint: Option<&Path>,
    ) -> Result<Box<dyn DmaBuffer>, DfxError> {
        let (heap, heap_path) = self.resolve_heap(heap_hint)?;
        debug!("Allocating {len} bytes from {heap_path:?}");
        Ok(Box::new(DmaBufferChannel::allocate(heap, heap_path, len)?))
    }
}

/// A mapped dma-buf together with the heap it came from.
#[derive(Debug)]
pub struct DmaBufferChannel {
    map: Option<MmapMut>,
    buffer: Option<OwnedFd>,
    heap: Option<File>,
    heap_path: PathBuf,
    len: usize,
}

impl DmaBufferChannel {
    /// Allocate `len` bytes from an opened heap and map them.
    ///
    /// # Returns: `Result<DmaBufferChannel, DfxError>`
    /// * `Ok(DmaBufferChannel)` - mapped read-write and shared
    /// * `Err(DfxError::Alloc)` - zero length, or the heap refused the allocation
    /// * `Err(DfxError::Map)` - mapping failed, the buffer descriptor has been closed
    pub fn allocate(heap: File, heap_path: PathBuf, len: usize) -> Result<Self, DfxError> {
        if len == 0 {
            return Err(DfxError::Alloc(format!(
                "Refusing a zero byte allocation from {heap_path:?}"
            )));
        }
        let mut data = ioctl::DmaHeapAllocationData {
            len: len as u64,
            fd: 0,
            fd_flags: (OFlag::O_RDWR | OFlag::O_CLOEXEC).bits() as u32,
            heap_flags: 0,
        };
        // SAFETY: `heap` is an open descriptor and `data` matches the kernel layout.
        unsafe { ioctl::dma_heap_alloc(heap.as_raw_fd(), &mut data) }.map_err(|errno| {
            DfxError::Alloc(format!(
                "DMA_HEAP_IOCTL_ALLOC of {len} bytes from {heap_path:?} failed: {errno}"
            ))
        })?;

        let raw_fd = data.fd as RawFd;
        let (buffer, len) = adopt_buffer(raw_fd, data.len, &heap_path)?;

        // SAFETY: the dma-buf stays open for as long as the mapping, see `close`.
        let map = match unsafe { MmapOptions::new().len(len).map_mut(&buffer) } {
            Ok(map) => map,
            Err(e) => {
                drop(buffer);
                return Err(DfxError::Map { len, e });
            }
        };
        trace!("Mapped dma-buf fd {raw_fd} ({len} bytes) from {heap_path:?}");

        Ok(DmaBufferChannel {
            map: Some(map),
            buffer: Some(buffer),
            heap: Some(heap),
            heap_path,
            len,
        })
    }

    fn sync(&self, flags: u64) -> Result<(), DfxError> {
        let Some(buffer) = &self.buffer else {
            return Err(DfxError::DmaBuffer("sync on a closed dma-buf".into()));
        };
        let sync = ioctl::DmaBufSync { flags };
        // SAFETY: `buffer` is an open dma-buf descriptor.
        unsafe { ioctl::dma_buf_sync(buffer.as_raw_fd(), &sync) }
            .map(|_| ())
            .map_err(|errno| {
                DfxError::DmaBuffer(format!("DMA_BUF_IOCTL_SYNC 0x{flags:x} failed: {errno}"))
            })
    }
}

/// Take ownership of the descriptor the heap handed back before judging the allocation, so a
/// rejected buffer is still closed.
fn adopt_buffer(raw_fd: RawFd, len: u64, heap_path: &Path) -> Result<(OwnedFd, usize), DfxError> {
    if raw_fd < 0 {
        return Err(DfxError::Alloc(format!(
            "{heap_path:?} returned invalid fd {raw_fd}"
        )));
    }
    // SAFETY: the kernel just created this descriptor for us and nothing else owns it.
    let buffer = unsafe { OwnedFd::from_raw_fd(raw_fd) };
    if len == 0 {
        return Err(DfxError::Alloc(format!(
            "{heap_path:?} returned fd {raw_fd} with length 0"
        )));
    }
    Ok((buffer, len as usize))
}

impl DmaBuffer for DmaBufferChannel {
    fn len(&self) -> usize {
        if self.map.is_some() { self.len } else { 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.map.as_deref_mut().unwrap_or(&mut [])
    }

    fn sync_start(&self) -> Result<(), DfxError> {
        self.sync(ioctl::DMA_BUF_SYNC_START | ioctl::DMA_BUF_SYNC_RW)
    }

    fn sync_end(&self) -> Result<(), DfxError> {
        self.sync(ioctl::DMA_BUF_SYNC_END | ioctl::DMA_BUF_SYNC_RW)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.buffer.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn close(&mut self) {
        if let Some(map) = self.map.take() {
            drop(map);
            trace!("Unmapped dma-buf from {:?}", self.heap_path);
        }
        if let Some(buffer) = self.buffer.take() {
            drop(buffer);
            trace!("Closed dma-buf descriptor");
        }
        if let Some(heap) = self.heap.take() {
            drop(heap);
            trace!("Closed heap {:?}", self.heap_path);
        }
    }

    fn is_closed(&self) -> bool {
        self.map.is_none() && self.buffer.is_none() && self.heap.is_none()
    }
}

impl Drop for DmaBufferChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use std::fs;
    use std::io::Read;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;

    struct HeapTree {
        _root: tempfile::TempDir,
        allocator: DmaHeapAllocator,
        heaps: PathBuf,
        reserved: PathBuf,
    }

    fn heap_tree() -> HeapTree {
        let root = tempfile::tempdir().unwrap();
        let heaps = root.path().join("dma_heap");
        let reserved = root.path().join("reserved-memory");
        fs::create_dir(&heaps).unwrap();
        fs::create_dir(&reserved).unwrap();
        let paths = SystemPaths {
            dma_heap_dir: heaps.clone(),
            reserved_memory_dir: reserved.clone(),
            ..SystemPaths::default()
        };
        HeapTree {
            allocator: DmaHeapAllocator::new(&paths),
            _root: root,
            heaps,
            reserved,
        }
    }

    #[gtest]
    fn hint_wins_when_it_opens() {
        let tree = heap_tree();
        let hint = tree.heaps.join("custom");
        fs::write(&hint, "").unwrap();
        fs::write(tree.heaps.join("reserved"), "").unwrap();
        let (_, path) = tree.allocator.resolve_heap(Some(&hint)).unwrap();
        assert_that!(path, eq(&hint));
    }

    #[gtest]
    fn falls_back_to_default_heap() {
        let tree = heap_tree();
        fs::write(tree.heaps.join("reserved"), "").unwrap();
        let (_, path) = tree
            .allocator
            .resolve_heap(Some(Path::new("/nonexistent/heap")))
            .unwrap();
        assert_that!(path, eq(&tree.heaps.join("reserved")));
    }

    #[gtest]
    fn scans_for_default_cma_region() {
        let tree = heap_tree();
        fs::write(tree.heaps.join("cma_reserved@10000000"), "").unwrap();
        fs::write(tree.heaps.join("cma_reserved@20000000"), "").unwrap();
        fs::write(tree.heaps.join("system"), "").unwrap();
        let node = tree.reserved.join("cma_reserved@20000000");
        fs::create_dir(&node).unwrap();
        fs::write(node.join("linux,cma-default"), "").unwrap();

        let (_, path) = tree.allocator.resolve_heap(None).unwrap();
        assert_that!(path, eq(&tree.heaps.join("cma_reserved@20000000")));
    }

    #[gtest]
    fn no_heap_is_device_open_error() {
        let tree = heap_tree();
        fs::write(tree.heaps.join("cma_reserved@10000000"), "").unwrap();
        let result = tree.allocator.resolve_heap(None);
        assert_that!(
            result.map(|(_, p)| p),
            err(displays_as(contains_substring("No usable DMA heap")))
        );
    }

    /// A channel over a plain file, mapped like a dma-buf would be.
    fn file_backed_channel(tree: &HeapTree, len: usize) -> DmaBufferChannel {
        let heap_path = tree.heaps.join("reserved");
        fs::write(&heap_path, "").unwrap();
        let backing = tree.heaps.join("buffer");
        let buffer = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&backing)
            .unwrap();
        buffer.set_len(len as u64).unwrap();
        // SAFETY: the file is private to the test and outlives the mapping.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&buffer) }.unwrap();
        DmaBufferChannel {
            map: Some(map),
            buffer: Some(OwnedFd::from(buffer)),
            heap: Some(File::open(&heap_path).unwrap()),
            heap_path,
            len,
        }
    }

    #[gtest]
    fn close_twice_releases_everything_once() {
        let tree = heap_tree();
        let mut channel = file_backed_channel(&tree, 16);
        channel.as_mut_bytes().copy_from_slice(&[0xA5; 16]);
        assert_that!(channel.len(), eq(16));
        assert_that!(channel.raw_fd(), some(ge(0)));

        channel.close();
        assert_that!(channel.is_closed(), eq(true));
        assert_that!(channel.len(), eq(0));
        assert_that!(channel.as_bytes(), is_empty());
        assert_that!(channel.raw_fd(), none());

        channel.close();
        assert_that!(channel.is_closed(), eq(true));
        assert_that!(
            channel.sync_start(),
            err(displays_as(contains_substring("closed dma-buf")))
        );
        drop(channel);

        assert_that!(fs::read(tree.heaps.join("buffer")).unwrap(), eq(&vec![0xA5; 16]));
    }

    #[gtest]
    fn drop_without_close_releases_the_buffer() {
        let tree = heap_tree();
        let mut channel = file_backed_channel(&tree, 8);
        channel.as_mut_bytes()[0] = 0x42;
        drop(channel);
        assert_that!(fs::read(tree.heaps.join("buffer")).unwrap()[0], eq(0x42));
    }

    #[gtest]
    fn empty_allocation_closes_the_returned_fd() {
        let (kept, handed_out) = UnixStream::pair().unwrap();
        let raw_fd = handed_out.into_raw_fd();
        assert_that!(
            adopt_buffer(raw_fd, 0, Path::new("/dev/dma_heap/reserved")).map(|_| ()),
            err(displays_as(contains_substring("length 0")))
        );
        // EOF only once every other end is closed.
        let mut rest = vec![];
        assert_that!((&kept).read_to_end(&mut rest), ok(eq(&0)));
    }

    #[gtest]
    fn negative_fd_is_rejected() {
        assert_that!(
            adopt_buffer(-1, 4096, Path::new("/dev/dma_heap/reserved")).map(|_| ()),
            err(displays_as(contains_substring("invalid fd")))
        );
    }

    #[gtest]
    fn zero_length_is_rejected_before_ioctl() {
        let tree = heap_tree();
        let heap = tree.heaps.join("reserved");
        fs::write(&heap, "").unwrap();
        let file = File::open(&heap).unwrap();
        assert_that!(
            DmaBufferChannel::allocate(file, heap, 0).map(|_| ()),
            err(displays_as(contains_substring("zero byte allocation")))
        );
    }
}
