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

//! Application and removal of a package's device-tree overlays.
//!
//! Applying an overlay walks `Absent -> Created -> PathWritten -> Verified`. Any failure after
//! `Created` rolls back: the directory is removed again and, for image overlays, the firmware
//! search path is cleared. Rollback problems are logged and never replace the original error.
//!
//! Overlay directories are named `<package name>_<kind>_<package id>`.

use crate::diagnostics::describe_error;
use crate::error::DfxError;
use crate::firmware::{clear_search_path, set_search_path};
use crate::package::discovery::PackageFile;
use crate::platforms::platform::{FpgaFamily, OverlayHandler, Platform};
use log::{error, info, trace, warn};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// The FPGA manager `state` once the fabric is configured.
pub static OPERATING_STATE: &str = "operating";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// Describes the reconfigured region, applying it configures the fabric.
    Image,
    /// Binds drivers to the logic in the region.
    Driver,
}

impl OverlayKind {
    fn config_error(&self, message: String) -> DfxError {
        match self {
            OverlayKind::Image => DfxError::ImageConfig(message),
            OverlayKind::Driver => DfxError::DriverConfig(message),
        }
    }
}

impl Display for OverlayKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayKind::Image => write!(f, "image"),
            OverlayKind::Driver => write!(f, "driver"),
        }
    }
}

pub fn overlay_handle(package_name: &str, kind: OverlayKind, id: u64) -> String {
    format!("{package_name}_{kind}_{id}")
}

/// One overlay to apply.
#[derive(Debug)]
pub struct OverlayRequest<'a> {
    pub kind: OverlayKind,
    pub handle: String,
    pub overlay: &'a PackageFile,
    pub family: FpgaFamily,
    /// Require the FPGA manager to report [`OPERATING_STATE`] once the overlay is written.
    pub check_fpga_state: bool,
}

/// Apply an overlay and verify that it took.
///
/// # Returns: `Result<PathBuf, DfxError>`
/// * `Ok(PathBuf)` - the overlay directory, now holding the applied overlay
/// * `Err(DfxError::IOCreate)` / `Err(DfxError::Environment)` - the directory could not be made
/// * `Err(DfxError::ImageConfig)` / `Err(DfxError::DriverConfig)` - the kernel or the FPGA
///   refused the overlay, the directory has been removed
/// * `Err(DfxError::IOWrite)` - the firmware search path could not be set, the directory has
///   been removed
pub fn apply(platform: &dyn Platform, request: &OverlayRequest) -> Result<PathBuf, DfxError> {
    let handler = platform.overlay_handler(&request.handle);
    info!(
        "Applying {} overlay {} via {:?}",
        request.kind,
        request.overlay.name,
        handler.overlay_fs_path()
    );
    handler.create()?;
    trace!("{} created", request.handle);

    match write_and_verify(platform, handler.as_ref(), request) {
        Ok(()) => {
            info!("{} overlay {} applied", request.kind, request.handle);
            Ok(handler.overlay_fs_path().to_owned())
        }
        Err(e) => {
            error!("{} overlay {} failed: {e}", request.kind, request.handle);
            roll_back(platform, handler.as_ref(), request.kind);
            Err(e)
        }
    }
}

fn write_and_verify(
    platform: &dyn Platform,
    handler: &dyn OverlayHandler,
    request: &OverlayRequest,
) -> Result<(), DfxError> {
    set_search_path(platform.paths(), request.overlay.directory())?;

    handler.write_path(&request.overlay.name).map_err(|e| {
        request
            .kind
            .config_error(format!("{} rejected {}: {e}", request.handle, request.overlay.name))
    })?;

    if request.check_fpga_state {
        check_operating(platform, request)?;
    }

    let applied = handler.read_path()?;
    if applied != request.overlay.name {
        return Err(request.kind.config_error(format!(
            "{} reads back '{applied}' instead of '{}', status: {}",
            request.handle,
            request.overlay.name,
            handler.status().unwrap_or_default()
        )));
    }
    Ok(())
}

fn check_operating(platform: &dyn Platform, request: &OverlayRequest) -> Result<(), DfxError> {
    let fpga = platform.fpga();
    let state = fpga.state()?;
    if state == OPERATING_STATE {
        trace!("{} is {OPERATING_STATE}", fpga.device_handle());
        return Ok(());
    }
    let code = fpga.error_code().unwrap_or_else(|e| {
        warn!("Could not read the error code of {}: {e}", fpga.device_handle());
        0
    });
    let mut message = format!(
        "{} reports '{state}' after applying {}, error code 0x{code:x}",
        fpga.device_handle(),
        request.overlay.name
    );
    if let Some(diagnostic) = describe_error(request.family, code) {
        error!("{}: {diagnostic}", fpga.device_handle());
        message = format!("{message} ({diagnostic})");
    }
    Err(request.kind.config_error(message))
}

fn roll_back(platform: &dyn Platform, handler: &dyn OverlayHandler, kind: OverlayKind) {
    if handler.exists() {
        if let Err(e) = handler.remove() {
            error!("Rolling back {:?} failed: {e}", handler.overlay_fs_path());
        }
    }
    if kind == OverlayKind::Image {
        if let Err(e) = clear_search_path(platform.paths()) {
            error!("Clearing the firmware search path failed: {e}");
        }
    }
}

/// Remove an overlay directory if it is still there.
pub fn remove(platform: &dyn Platform, overlay_dir: &Path) -> Result<(), DfxError> {
    let Some(handle) = overlay_dir.file_name() else {
        return Err(DfxError::Internal(format!(
            "{overlay_dir:?} is not an overlay directory"
        )));
    };
    let handler = platform.overlay_handler(&handle.to_string_lossy());
    if !handler.exists() {
        trace!("{overlay_dir:?} is already gone");
        return Ok(());
    }
    handler.remove()?;
    info!("Removed overlay {overlay_dir:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockKernel, MockPlatform};
    use googletest::prelude::*;
    use rstest::*;
    use std::fs;

    struct Setup {
        root: tempfile::TempDir,
        platform: MockPlatform,
        kernel: MockKernel,
        overlay: PackageFile,
    }

    #[fixture]
    fn setup() -> Setup {
        let root = tempfile::tempdir().unwrap();
        let package = root.path().join("package");
        fs::create_dir(&package).unwrap();
        fs::write(package.join("x_i.dtbo"), "").unwrap();
        let platform = MockPlatform::new(&root.path().join("sys"), FpgaFamily::ZynqMp).unwrap();
        let kernel = platform.kernel();
        let overlay = PackageFile {
            name: "x_i.dtbo".into(),
            path: package.join("x_i.dtbo"),
        };
        Setup {
            root,
            platform,
            kernel,
            overlay,
        }
    }

    fn request(setup: &Setup, kind: OverlayKind, check_fpga_state: bool) -> OverlayRequest<'_> {
        OverlayRequest {
            kind,
            handle: overlay_handle("x", kind, 1),
            overlay: &setup.overlay,
            family: FpgaFamily::ZynqMp,
            check_fpga_state,
        }
    }

    fn set_state(setup: &Setup, state: &str) {
        fs::write(
            setup.kernel.paths().fpga_manager_dir().join("state"),
            state,
        )
        .unwrap();
    }

    #[gtest]
    #[rstest]
    #[case::image("x", OverlayKind::Image, 3, "x_image_3")]
    #[case::driver("pkg", OverlayKind::Driver, 12, "pkg_driver_12")]
    fn handles(
        #[case] name: &str,
        #[case] kind: OverlayKind,
        #[case] id: u64,
        #[case] expected: &str,
    ) {
        assert_that!(overlay_handle(name, kind, id), eq(expected));
    }

    #[gtest]
    #[rstest]
    fn image_overlay_applies(setup: Setup) {
        set_state(&setup, "operating\n");
        let package_dir = setup.root.path().join("package").to_string_lossy().into_owned();
        let dir = apply(&setup.platform, &request(&setup, OverlayKind::Image, true)).unwrap();
        assert_that!(dir.ends_with("x_image_1"), eq(true));
        assert_that!(setup.kernel.overlay_dirs(), elements_are![eq("x_image_1")]);
        assert_that!(setup.kernel.firmware_search_path(), eq(&package_dir));
    }

    #[gtest]
    #[rstest]
    fn failed_configuration_rolls_back(setup: Setup) {
        set_state(&setup, "write error 0x1A04\n");
        let result = apply(&setup.platform, &request(&setup, OverlayKind::Image, true));
        assert_that!(
            result,
            err(displays_as(all![
                contains_substring("ImageConfig"),
                contains_substring("Bitstream format error")
            ]))
        );
        assert_that!(setup.kernel.overlay_dirs(), is_empty());
        assert_that!(setup.kernel.firmware_search_path(), eq(""));
    }

    #[gtest]
    #[rstest]
    fn state_is_ignored_without_check(setup: Setup) {
        set_state(&setup, "unknown\n");
        let result = apply(&setup.platform, &request(&setup, OverlayKind::Image, false));
        assert_that!(result, ok(anything()));
    }

    #[gtest]
    #[rstest]
    fn rejected_driver_overlay_rolls_back(setup: Setup) {
        setup.kernel.reject_overlay("x_i.dtbo");
        let result = apply(&setup.platform, &request(&setup, OverlayKind::Driver, false));
        assert_that!(
            result,
            err(displays_as(contains_substring("DriverConfig")))
        );
        assert_that!(setup.kernel.overlay_dirs(), is_empty());
    }

    #[gtest]
    #[rstest]
    fn existing_directory_is_left_alone(setup: Setup) {
        fs::create_dir(setup.kernel.paths().overlay_dir("x_image_1")).unwrap();
        let result = apply(&setup.platform, &request(&setup, OverlayKind::Image, false));
        assert_that!(result, err(displays_as(contains_substring("IOCreate"))));
        assert_that!(setup.kernel.overlay_dirs(), elements_are![eq("x_image_1")]);
    }

    #[gtest]
    #[rstest]
    fn remove_tolerates_absence(setup: Setup) {
        let dir = setup.kernel.paths().overlay_dir("x_image_1");
        assert_that!(remove(&setup.platform, &dir), ok(anything()));
        setup.platform.overlay_handler("x_image_1").create().unwrap();
        assert_that!(remove(&setup.platform, &dir), ok(anything()));
        assert_that!(dir.exists(), eq(false));
    }
}
