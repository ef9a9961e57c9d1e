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

//! The package lifecycle engine.
//!
//! ```text
//!  init / init_files ──> load ──> drivers_load
//!         │               │            │
//!         │               └─< remove <─┘
//!         └──────────────> destroy
//! ```
//!
//! A package is addressed by the id `init` returns. `init` discovers the package files, reads the
//! AES key and stages the bitstream in a DMA buffer. `load` hands the buffer to the FPGA manager
//! and applies the image overlay, `drivers_load` applies the driver overlay. `remove` takes the
//! overlays away again (drivers first) and `destroy` releases the buffer and forgets the id.
//!
//! A failing `init` leaves nothing behind. A failing `load` or `drivers_load` rolls back its
//! overlay but keeps the package, so it can be inspected, retried or destroyed.
//!
//! Every call blocks. The engine is not synchronised itself: all calls for one FPGA must be
//! serialised by the owner, see [`crate::comm::dbus`].

use crate::bitstream;
use crate::error::{DfxError, DiscoveryError};
use crate::firmware;
use crate::overlay::{self, OverlayKind, OverlayRequest, overlay_handle};
use crate::package::aes_key::read_aes_key;
use crate::package::discovery::{PackageFiles, from_explicit_files, scan_directory};
use crate::package::record::{DfxFlags, PackageRecord};
use crate::package::registry::PackageRegistry;
use crate::platforms::platform::{FpgaFamily, Platform, detect_family};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// Settings shared by both ways of creating a package.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub flags: DfxFlags,
    /// DMA heap to try before the default ones.
    pub heap_path: Option<PathBuf>,
    /// Recorded for status, not used otherwise.
    pub device_path: Option<PathBuf>,
}

/// A package given as individual files instead of a directory.
#[derive(Debug, Clone, Copy)]
pub struct PackagePaths<'a> {
    pub bitstream: &'a Path,
    pub image_overlay: &'a Path,
    pub driver_overlay: Option<&'a Path>,
    pub key_file: Option<&'a Path>,
}

pub struct Dfx {
    platform: Box<dyn Platform>,
    registry: PackageRegistry,
}

impl Dfx {
    pub fn new(platform: Box<dyn Platform>) -> Self {
        Dfx {
            platform,
            registry: PackageRegistry::new(),
        }
    }

    /// Create a package from the files in `package_dir`.
    ///
    /// # Returns: `Result<u64, DfxError>`
    /// * `Ok(u64)` - the id of the new package, at least 1
    /// * `Err(DfxError::PlatformUnsupported)` - the FPGA manager is not a known family
    /// * `Err(DfxError::Discovery)` - the directory does not hold a valid package
    /// * `Err(DfxError::KeyRead)` / `Err(DfxError::InvalidParam)` - a user key was requested
    ///   but cannot be found
    /// * `Err(DfxError::DeviceOpen)` / `Err(DfxError::Alloc)` / `Err(DfxError::Map)` /
    ///   `Err(DfxError::DmaBuffer)` - the bitstream could not be staged
    pub fn init(&mut self, package_dir: &Path, options: &InitOptions) -> Result<u64, DfxError> {
        info!("init called with package_dir: {package_dir:?}, options: {options:?}");
        self.init_common(options, |family| scan_directory(package_dir, family))
    }

    /// Create a package from explicitly named files. Same results as [`Dfx::init`], with
    /// `DfxError::InvalidParam` for a missing file or a wrong extension.
    pub fn init_files(
        &mut self,
        files: PackagePaths,
        options: &InitOptions,
    ) -> Result<u64, DfxError> {
        info!("init_files called with files: {files:?}, options: {options:?}");
        self.init_common(options, |_| {
            from_explicit_files(
                files.bitstream,
                files.image_overlay,
                files.driver_overlay,
                files.key_file,
            )
        })
    }

    fn init_common(
        &mut self,
        options: &InitOptions,
        discover: impl FnOnce(FpgaFamily) -> Result<PackageFiles, DfxError>,
    ) -> Result<u64, DfxError> {
        let family = detect_family(self.platform.fpga())?;
        let id = self.registry.create(
            &self.platform.paths().overlay_control_dir,
            family,
            options.flags,
        )?;
        match self.populate(id, family, options, discover) {
            Ok(()) => {
                info!("Package {id} created");
                Ok(id)
            }
            Err(e) => {
                error!("Creating package {id} failed: {e}");
                if let Ok(mut record) = self.registry.remove(id) {
                    record.release_buffer();
                }
                Err(e)
            }
        }
    }

    fn populate(
        &mut self,
        id: u64,
        family: FpgaFamily,
        options: &InitOptions,
        discover: impl FnOnce(FpgaFamily) -> Result<PackageFiles, DfxError>,
    ) -> Result<(), DfxError> {
        let files = discover(family)?;
        let name = files.package_name().ok_or_else(|| {
            DiscoveryError::InvalidPackage(format!(
                "cannot derive a package name from {:?}",
                files.image_overlay_path()
            ))
        })?;

        let aes_key = match options.flags.uses_user_key() {
            true => {
                let key_file = files.key_path().ok_or_else(|| {
                    DfxError::InvalidParam(
                        "A user key was requested but the package has no .nky file".into(),
                    )
                })?;
                Some(read_aes_key(key_file)?)
            }
            false => None,
        };

        let dma_buffer = match options.flags.is_external_config() {
            true => None,
            false => {
                let bitstream = files.bitstream_path().ok_or_else(|| {
                    DiscoveryError::InvalidPackage(format!(
                        "{name} has no bitstream and the fabric is not externally configured"
                    ))
                })?;
                Some(bitstream::prepare(
                    family,
                    bitstream,
                    self.platform.dma_heap(),
                    options.heap_path.as_deref(),
                )?)
            }
        };

        let record = self.registry.get_mut(id)?;
        record.name = name;
        record.files = files;
        record.aes_key = aes_key;
        record.dma_buffer = dma_buffer;
        record.device_path = options.device_path.clone();
        Ok(())
    }

    /// Configure the fabric with the package bitstream and apply its image overlay.
    ///
    /// # Returns: `Result<(), DfxError>`
    /// * `Ok(())` - the image overlay is applied
    /// * `Err(DfxError::InvalidPackageId)` / `Err(DfxError::PackageNotFound)` - bad id
    /// * `Err(DfxError::InvalidState)` - the image overlay is already applied
    /// * `Err(DfxError::DeviceOpen)` / `Err(DfxError::ImageConfig)` - the FPGA did not accept
    ///   the bitstream or the overlay, nothing is left applied
    pub fn load(&mut self, id: u64) -> Result<(), DfxError> {
        info!("load called with id: {id}");
        let record = self.registry.get(id)?;
        if record.is_loaded() {
            return Err(DfxError::InvalidState(format!(
                "package {id} is already loaded at {:?}, remove it first",
                record.image_overlay_dir
            )));
        }
        let overlay = record.files.image_overlay.as_ref().ok_or_else(|| {
            DfxError::Internal(format!("package {id} has no image overlay"))
        })?;

        let external = record.flags.is_external_config();
        if !external {
            self.configure_fabric(record)?;
        }

        let request = OverlayRequest {
            kind: OverlayKind::Image,
            handle: overlay_handle(&record.name, OverlayKind::Image, id),
            overlay,
            family: record.family,
            check_fpga_state: !external,
        };
        let dir = overlay::apply(self.platform.as_ref(), &request)?;
        self.registry.get_mut(id)?.image_overlay_dir = Some(dir);
        Ok(())
    }

    fn configure_fabric(&self, record: &PackageRecord) -> Result<(), DfxError> {
        let fpga = self.platform.fpga();
        fpga.set_flags(record.flags.bits())?;
        if record.flags.uses_user_key() {
            let key = record.aes_key.as_deref().ok_or_else(|| {
                DfxError::Internal(format!("package {} has no AES key", record.id))
            })?;
            fpga.set_key(key)?;
        }
        let buffer = record.dma_buffer.as_deref().ok_or_else(|| {
            DfxError::DmaBuffer(format!("package {} has no bitstream buffer", record.id))
        })?;
        info!(
            "Handing {} bytes of {} to {}",
            buffer.len(),
            record.name,
            fpga.device_handle()
        );
        fpga.load_dma_buffer(buffer)
    }

    /// Apply the driver overlay of a package.
    ///
    /// # Returns: `Result<(), DfxError>`
    /// * `Ok(())` - the driver overlay is applied
    /// * `Err(DfxError::NoDriverOverlay)` - the package has none
    /// * `Err(DfxError::InvalidState)` - it is already applied
    /// * `Err(DfxError::DriverConfig)` - the kernel did not accept it, nothing is left applied
    pub fn drivers_load(&mut self, id: u64) -> Result<(), DfxError> {
        info!("drivers_load called with id: {id}");
        let record = self.registry.get(id)?;
        if record.drivers_loaded() {
            return Err(DfxError::InvalidState(format!(
                "drivers of package {id} are already loaded at {:?}",
                record.driver_overlay_dir
            )));
        }
        let overlay = record
            .files
            .driver_overlay
            .as_ref()
            .ok_or(DfxError::NoDriverOverlay(id))?;
        if !record.is_loaded() {
            warn!("Loading drivers of package {id} before its image");
        }

        let request = OverlayRequest {
            kind: OverlayKind::Driver,
            handle: overlay_handle(&record.name, OverlayKind::Driver, id),
            overlay,
            family: record.family,
            check_fpga_state: false,
        };
        let dir = overlay::apply(self.platform.as_ref(), &request)?;
        self.registry.get_mut(id)?.driver_overlay_dir = Some(dir);
        Ok(())
    }

    /// Remove the overlays of a package, the driver overlay first. Overlays that were never
    /// applied, or that disappeared, are skipped.
    pub fn remove(&mut self, id: u64) -> Result<(), DfxError> {
        info!("remove called with id: {id}");
        let record = self.registry.get_mut(id)?;
        if let Some(dir) = &record.driver_overlay_dir {
            overlay::remove(self.platform.as_ref(), dir)?;
            record.driver_overlay_dir = None;
        }
        if let Some(dir) = &record.image_overlay_dir {
            overlay::remove(self.platform.as_ref(), dir)?;
            record.image_overlay_dir = None;
        }
        Ok(())
    }

    /// Release the bitstream buffer and forget the package. Applied overlays stay applied.
    pub fn destroy(&mut self, id: u64) -> Result<(), DfxError> {
        info!("destroy called with id: {id}");
        let mut record = self.registry.remove(id)?;
        if record.is_loaded() || record.drivers_loaded() {
            warn!("Package {id} is destroyed while its overlays are still applied");
        }
        record.release_buffer();
        info!("Package {id} destroyed");
        Ok(())
    }

    pub fn package(&self, id: u64) -> Result<&PackageRecord, DfxError> {
        self.registry.get(id)
    }

    /// Ids of the live packages in ascending order.
    pub fn packages(&self) -> Vec<u64> {
        self.registry.ids()
    }

    /// Human readable summary of a package, including the kernel's view of its overlays.
    pub fn package_status(&self, id: u64) -> Result<String, DfxError> {
        let record = self.registry.get(id)?;
        let mut status = record.to_string();
        for dir in [&record.image_overlay_dir, &record.driver_overlay_dir]
            .into_iter()
            .flatten()
        {
            let handle = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let overlay_status = self.platform.overlay_handler(&handle).status()?;
            status.push_str(&format!("\n{handle}: {overlay_status}"));
        }
        Ok(status)
    }

    pub fn fpga_state(&self) -> Result<String, DfxError> {
        self.platform.fpga().state()
    }

    pub fn fpga_flags(&self) -> Result<u32, DfxError> {
        self.platform.fpga().flags()
    }

    pub fn family(&self) -> Result<FpgaFamily, DfxError> {
        detect_family(self.platform.fpga())
    }

    /// See [`firmware::active_uid_list`].
    pub fn active_uid_list(&self) -> Result<Vec<u32>, DfxError> {
        info!("get_active_uid_list called");
        firmware::active_uid_list(self.platform.paths(), self.family()?)
    }

    /// See [`firmware::meta_header`].
    pub fn meta_header(&self, bitstream: &Path, buf_size: usize) -> Result<Vec<u32>, DfxError> {
        info!("get_meta_header called with bitstream: {bitstream:?}, buf_size: {buf_size}");
        firmware::meta_header(self.platform.paths(), self.family()?, bitstream, buf_size)
    }
}
