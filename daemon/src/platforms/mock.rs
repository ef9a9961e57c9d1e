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

//! A platform that plays the kernel's part in a plain directory tree.
//!
//! Attribute files live where [`SystemPaths`] says they do, rooted in a directory chosen by the
//! caller (normally a temporary one):
//! ```text
//! <root>/
//! ├── fpga_manager/fpga0/{name,state,flags,key}
//! ├── overlays/                 # configfs stand-in
//! ├── firmware_class_path       # firmware search path knob
//! ├── dma_heap/
//! ├── reserved-memory/
//! └── versal-firmware/{firmware,uid-read,meta-header-read}
//! ```
//!
//! What the real kernel would do in reaction to writes is simulated and can be steered through
//! a [`MockKernel`] handle:
//! - a bitstream handed over through `load_dma_buffer` is recorded and `state` is set to the
//!   configured post-load state (`operating` unless told otherwise)
//! - an overlay directory is populated with `path` and `status` on creation, and `path` keeps
//!   the written name unless that name was marked as rejected
//! - DMA buffers are plain memory, the number of buffers still open is tracked

use crate::config::SystemPaths;
use crate::error::DfxError;
use crate::platforms::platform::{DmaBuffer, DmaHeap, Fpga, FpgaFamily, OverlayHandler, Platform};
use crate::platforms::platform::{VERSAL_MANAGER_NAME, ZYNQMP_MANAGER_NAME};
use crate::platforms::sysfs_components::sysfs_fpga::SysfsFpga;
use crate::system_io::{fs_create_dir, fs_read_trimmed, fs_write};
use log::trace;
use std::fs;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct KernelState {
    post_load_state: String,
    rejected_overlays: Vec<String>,
    fail_allocations: bool,
    loaded_bitstreams: Vec<Vec<u8>>,
    overlay_events: Vec<String>,
    live_buffers: usize,
}

impl Default for KernelState {
    fn default() -> Self {
        KernelState {
            post_load_state: "operating".into(),
            rejected_overlays: vec![],
            fail_allocations: false,
            loaded_bitstreams: vec![],
            overlay_events: vec![],
            live_buffers: 0,
        }
    }
}

/// Shared handle on the simulated kernel. Stays usable after the platform has been moved into
/// the engine.
#[derive(Debug, Clone)]
pub struct MockKernel {
    state: Arc<Mutex<KernelState>>,
    paths: SystemPaths,
}

impl MockKernel {
    fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    /// What `state` reads after the next bitstream hand-off, e.g. `"write error 0x1A04"`.
    pub fn set_post_load_state(&self, state: &str) {
        self.lock().post_load_state = state.to_string();
    }

    /// The kernel will clear `path` instead of applying this overlay file.
    pub fn reject_overlay(&self, overlay_file: &str) {
        self.lock().rejected_overlays.push(overlay_file.to_string());
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.lock().fail_allocations = fail;
    }

    /// Every buffer passed to the FPGA, oldest first.
    pub fn loaded_bitstreams(&self) -> Vec<Vec<u8>> {
        self.lock().loaded_bitstreams.clone()
    }

    /// `create <handle>` and `remove <handle>` in the order they happened.
    pub fn overlay_events(&self) -> Vec<String> {
        self.lock().overlay_events.clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.lock().live_buffers
    }

    /// Handles of the overlay directories that currently exist.
    pub fn overlay_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = fs::read_dir(&self.paths.overlay_control_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    pub fn firmware_search_path(&self) -> String {
        fs_read_trimmed(&self.paths.firmware_search_path_control).unwrap_or_default()
    }

    pub fn fpga_flags(&self) -> String {
        fs_read_trimmed(&self.paths.fpga_manager_dir().join("flags")).unwrap_or_default()
    }

    pub fn fpga_key(&self) -> String {
        fs_read_trimmed(&self.paths.fpga_manager_dir().join("key")).unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct MockPlatform {
    kernel: MockKernel,
    fpga: MockFpga,
    heap: MockHeap,
}

impl MockPlatform {
    /// Lay out the attribute tree under `root` for an FPGA of `family`.
    ///
    /// # Returns: `Result<MockPlatform, DfxError>`
    /// * `Ok(MockPlatform)` - the tree is ready and `state` reads `unknown`
    /// * `Err(DfxError::IOCreate)` / `Err(DfxError::IOWrite)` - `root` is not writable
    pub fn new(root: &Path, family: FpgaFamily) -> Result<MockPlatform, DfxError> {
        let paths = SystemPaths {
            fpga_managers_dir: root.join("fpga_manager"),
            fpga_device_node: root.join("fpga0"),
            overlay_control_dir: root.join("overlays"),
            firmware_search_path_control: root.join("firmware_class_path"),
            dma_heap_dir: root.join("dma_heap"),
            reserved_memory_dir: root.join("reserved-memory"),
            versal_firmware_dir: root.join("versal-firmware"),
            ..SystemPaths::default()
        };
        let manager_name = match family {
            FpgaFamily::ZynqMp => ZYNQMP_MANAGER_NAME,
            FpgaFamily::Versal => VERSAL_MANAGER_NAME,
            FpgaFamily::Unknown => "Altera SOCFPGA FPGA Manager",
        };

        if !root.is_dir() {
            fs_create_dir(root)?;
        }
        fs_create_dir(&paths.fpga_managers_dir)?;
        fs_create_dir(&paths.fpga_manager_dir())?;
        fs_create_dir(&paths.overlay_control_dir)?;
        fs_create_dir(&paths.dma_heap_dir)?;
        fs_create_dir(&paths.reserved_memory_dir)?;
        fs_create_dir(&paths.versal_firmware_dir)?;
        let manager = paths.fpga_manager_dir();
        fs_write(&manager.join("name"), true, format!("{manager_name}\n"))?;
        fs_write(&manager.join("state"), true, "unknown\n")?;
        fs_write(&manager.join("flags"), true, "0\n")?;
        fs_write(&manager.join("key"), true, "")?;
        fs_write(&paths.firmware_search_path_control, true, "")?;
        fs_write(&paths.versal_firmware_dir.join("firmware"), true, "")?;
        trace!("Mock {family} platform laid out under {root:?}");

        let kernel = MockKernel {
            state: Arc::new(Mutex::new(KernelState::default())),
            paths: paths.clone(),
        };
        Ok(MockPlatform {
            fpga: MockFpga {
                sysfs: SysfsFpga::new(&paths.device_handle, &manager, &paths.fpga_device_node),
                kernel: kernel.clone(),
            },
            heap: MockHeap {
                kernel: kernel.clone(),
            },
            kernel,
        })
    }

    pub fn kernel(&self) -> MockKernel {
        self.kernel.clone()
    }
}

impl Platform for MockPlatform {
    fn paths(&self) -> &SystemPaths {
        &self.kernel.paths
    }

    fn fpga(&self) -> &dyn Fpga {
        &self.fpga
    }

    fn overlay_handler(&self, overlay_handle: &str) -> Box<dyn OverlayHandler + '_> {
        Box::new(MockOverlayHandler {
            handle: overlay_handle.to_string(),
            overlay_fs_path: self.kernel.paths.overlay_dir(overlay_handle),
            kernel: &self.kernel,
        })
    }

    fn dma_heap(&self) -> &dyn DmaHeap {
        &self.heap
    }
}

/// Real attribute files, simulated dma-buf hand-off.
#[derive(Debug)]
struct MockFpga {
    sysfs: SysfsFpga,
    kernel: MockKernel,
}

impl Fpga for MockFpga {
    fn device_handle(&self) -> &str {
        self.sysfs.device_handle()
    }

    fn name(&self) -> Result<String, DfxError> {
        self.sysfs.name()
    }

    fn state(&self) -> Result<String, DfxError> {
        self.sysfs.state()
    }

    fn flags(&self) -> Result<u32, DfxError> {
        self.sysfs.flags()
    }

    fn set_flags(&self, flags: u32) -> Result<(), DfxError> {
        self.sysfs.set_flags(flags)
    }

    fn set_key(&self, key: &str) -> Result<(), DfxError> {
        self.sysfs.set_key(key)
    }

    fn load_dma_buffer(&self, buffer: &dyn DmaBuffer) -> Result<(), DfxError> {
        if buffer.is_closed() {
            return Err(DfxError::DmaBuffer("The bitstream buffer is closed".into()));
        }
        let post_load_state = {
            let mut state = self.kernel.lock();
            state.loaded_bitstreams.push(buffer.as_bytes().to_vec());
            state.post_load_state.clone()
        };
        fs_write(
            &self.kernel.paths.fpga_manager_dir().join("state"),
            false,
            format!("{post_load_state}\n"),
        )
    }
}

struct MockOverlayHandler<'a> {
    handle: String,
    overlay_fs_path: PathBuf,
    kernel: &'a MockKernel,
}

impl OverlayHandler for MockOverlayHandler<'_> {
    fn overlay_fs_path(&self) -> &Path {
        &self.overlay_fs_path
    }

    fn create(&self) -> Result<(), DfxError> {
        fs_create_dir(&self.overlay_fs_path)?;
        fs_write(&self.overlay_fs_path.join("path"), true, "")?;
        fs_write(&self.overlay_fs_path.join("status"), true, "unapplied")?;
        self.kernel
            .lock()
            .overlay_events
            .push(format!("create {}", self.handle));
        Ok(())
    }

    fn write_path(&self, overlay_file: &str) -> Result<(), DfxError> {
        let rejected = self
            .kernel
            .lock()
            .rejected_overlays
            .iter()
            .any(|name| name == overlay_file);
        let (path, status) = match rejected {
            true => ("", "unapplied"),
            false => (overlay_file, "applied"),
        };
        fs_write(&self.overlay_fs_path.join("path"), false, path)?;
        fs_write(&self.overlay_fs_path.join("status"), false, status)
    }

    fn read_path(&self) -> Result<String, DfxError> {
        fs_read_trimmed(&self.overlay_fs_path.join("path"))
    }

    fn status(&self) -> Result<String, DfxError> {
        if !self.exists() {
            return Ok("not present".into());
        }
        fs_read_trimmed(&self.overlay_fs_path.join("status"))
    }

    fn remove(&self) -> Result<(), DfxError> {
        fs::remove_dir_all(&self.overlay_fs_path).map_err(|e| DfxError::IODelete {
            file: self.overlay_fs_path.clone(),
            e,
        })?;
        self.kernel
            .lock()
            .overlay_events
            .push(format!("remove {}", self.handle));
        Ok(())
    }
}

#[derive(Debug)]
struct MockHeap {
    kernel: MockKernel,
}

impl DmaHeap for MockHeap {
    fn allocate(
        &self,
        len: usize,
        heap_hint: Option<&Path>,
    ) -> Result<Box<dyn DmaBuffer>, DfxError> {
        let mut state = self.kernel.lock();
        if state.fail_allocations || len == 0 {
            return Err(DfxError::Alloc(format!(
                "Mock heap refused {len} bytes (hint {heap_hint:?})"
            )));
        }
        state.live_buffers += 1;
        Ok(Box::new(MockDmaBuffer {
            data: Some(vec![0; len]),
            syncing: Mutex::new(false),
            kernel: self.kernel.clone(),
        }))
    }
}

/// Heap memory standing in for a dma-buf. The sync calls must pair up.
#[derive(Debug)]
pub struct MockDmaBuffer {
    data: Option<Vec<u8>>,
    syncing: Mutex<bool>,
    kernel: MockKernel,
}

impl MockDmaBuffer {
    fn set_syncing(&self, start: bool) -> Result<(), DfxError> {
        let mut syncing = self.syncing.lock().unwrap_or_else(PoisonError::into_inner);
        if self.data.is_none() || *syncing == start {
            return Err(DfxError::DmaBuffer(format!(
                "Unbalanced sync (start: {start}) on mock buffer"
            )));
        }
        *syncing = start;
        Ok(())
    }
}

impl DmaBuffer for MockDmaBuffer {
    fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    fn sync_start(&self) -> Result<(), DfxError> {
        self.set_syncing(true)
    }

    fn sync_end(&self) -> Result<(), DfxError> {
        self.set_syncing(false)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    fn close(&mut self) {
        if self.data.take().is_some() {
            let mut state = self.kernel.lock();
            state.live_buffers = state.live_buffers.saturating_sub(1);
        }
    }

    fn is_closed(&self) -> bool {
        self.data.is_none()
    }
}

impl Drop for MockDmaBuffer {
    fn drop(&mut self) {
        self.close();
    }
}
