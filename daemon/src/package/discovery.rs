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

//! Classification of the files that make up a package.
//!
//! A package directory is scanned by file name only, compared in lower case:
//!
//! | suffix                                  | category       |
//! |-----------------------------------------|----------------|
//! | `.bin` (ZynqMP), `.pdi` (Versal)        | bitstream      |
//! | `.bit` (ZynqMP only)                    | bitstream      |
//! | `_i.dtbo`, or `.dtbo` without `_d`      | image overlay  |
//! | `_d.dtbo`                               | driver overlay |
//! | `.nky`                                  | AES key        |
//!
//! Names of four characters or less are ignored. Each category may hold at most one file and
//! the image overlay is mandatory.

use crate::error::{DfxError, DiscoveryError};
use crate::platforms::platform::FpgaFamily;
use crate::system_io::fs_read_dir;
use log::{debug, trace};
use std::path::{Path, PathBuf};

pub static IMAGE_OVERLAY_SUFFIX: &str = "_i.dtbo";
pub static DRIVER_OVERLAY_SUFFIX: &str = "_d.dtbo";
pub static OVERLAY_EXTENSION: &str = ".dtbo";
pub static KEY_EXTENSION: &str = ".nky";
pub static LEGACY_BITSTREAM_EXTENSION: &str = ".bit";
pub static BITSTREAM_EXTENSIONS: [&str; 3] = [".bit", ".bin", ".pdi"];

/// A file of a package: its bare file name and its absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub name: String,
    pub path: PathBuf,
}

impl PackageFile {
    fn from_path(path: &Path) -> Result<PackageFile, DfxError> {
        let path = std::path::absolute(path)
            .map_err(|e| DfxError::InvalidParam(format!("{path:?} cannot be resolved: {e}")))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DfxError::InvalidParam(format!("{path:?} has no file name")))?;
        Ok(PackageFile { name, path })
    }

    /// Directory the file lives in, used as firmware search path when loading it.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFiles {
    pub bitstream: Option<PackageFile>,
    pub image_overlay: Option<PackageFile>,
    pub driver_overlay: Option<PackageFile>,
    pub key: Option<PackageFile>,
}

impl PackageFiles {
    pub fn bitstream_path(&self) -> Option<&Path> {
        self.bitstream.as_ref().map(|f| f.path.as_path())
    }

    pub fn image_overlay_path(&self) -> Option<&Path> {
        self.image_overlay.as_ref().map(|f| f.path.as_path())
    }

    pub fn driver_overlay_path(&self) -> Option<&Path> {
        self.driver_overlay.as_ref().map(|f| f.path.as_path())
    }

    pub fn key_path(&self) -> Option<&Path> {
        self.key.as_ref().map(|f| f.path.as_path())
    }

    /// Logical package name: the image overlay's file stem without its `_i` marker or any
    /// trailing separator, so `design_i.dtbo` and `design.dtbo` both name `design`.
    pub fn package_name(&self) -> Option<String> {
        let overlay = self.image_overlay.as_ref()?;
        let stem = Path::new(&overlay.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())?;
        let stem = stem
            .strip_suffix("_i")
            .or_else(|| stem.strip_suffix("_I"))
            .unwrap_or(&stem);
        let name = stem.trim_end_matches(['_', '-', '.']);
        match name.is_empty() {
            true => None,
            false => Some(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Bitstream,
    ImageOverlay,
    DriverOverlay,
    Key,
}

fn classify(name: &str, family: FpgaFamily) -> Option<Category> {
    if name.len() <= 4 {
        return None;
    }
    let lower = name.to_lowercase();
    if family
        .bitstream_extension()
        .is_some_and(|ext| lower.ends_with(ext))
    {
        Some(Category::Bitstream)
    } else if family.accepts_legacy_bit() && lower.ends_with(LEGACY_BITSTREAM_EXTENSION) {
        Some(Category::Bitstream)
    } else if lower.ends_with(IMAGE_OVERLAY_SUFFIX) {
        Some(Category::ImageOverlay)
    } else if lower.ends_with(DRIVER_OVERLAY_SUFFIX) {
        Some(Category::DriverOverlay)
    } else if lower.ends_with(OVERLAY_EXTENSION) {
        Some(Category::ImageOverlay)
    } else if lower.ends_with(KEY_EXTENSION) {
        Some(Category::Key)
    } else {
        None
    }
}

fn single(
    dir: &Path,
    mut found: Vec<PackageFile>,
    duplicate: fn(PathBuf, Vec<String>) -> DiscoveryError,
) -> Result<Option<PackageFile>, DiscoveryError> {
    match found.len() {
        0 | 1 => Ok(found.pop()),
        _ => {
            let mut names: Vec<String> = found.into_iter().map(|f| f.name).collect();
            names.sort();
            Err(duplicate(dir.to_owned(), names))
        }
    }
}

/// Classify the entries of a package directory.
///
/// # Arguments
///
/// * `dir` - the package directory
/// * `family` - decides which bitstream extensions are recognised
///
/// # Returns: `Result<PackageFiles, DfxError>`
/// * `Ok(PackageFiles)` - with `image_overlay` always set
/// * `Err(DfxError::Discovery)` - a duplicate in some category, or no image overlay
/// * `Err(DfxError::IOReadDir)` - the directory cannot be listed
pub fn scan_directory(dir: &Path, family: FpgaFamily) -> Result<PackageFiles, DfxError> {
    let dir = std::path::absolute(dir)
        .map_err(|e| DfxError::InvalidParam(format!("{dir:?} cannot be resolved: {e}")))?;
    let mut bitstreams = vec![];
    let mut image_overlays = vec![];
    let mut driver_overlays = vec![];
    let mut keys = vec![];

    for name in fs_read_dir(&dir)? {
        let Some(category) = classify(&name, family) else {
            trace!("Ignoring {name}");
            continue;
        };
        let path = dir.join(&name);
        if path.is_dir() {
            trace!("Ignoring directory {name}");
            continue;
        }
        trace!("{name} is {category:?}");
        let file = PackageFile { name, path };
        match category {
            Category::Bitstream => bitstreams.push(file),
            Category::ImageOverlay => image_overlays.push(file),
            Category::DriverOverlay => driver_overlays.push(file),
            Category::Key => keys.push(file),
        }
    }

    let files = PackageFiles {
        bitstream: single(&dir, bitstreams, |dir, files| {
            DiscoveryError::DuplicateBitstream { dir, files }
        })?,
        image_overlay: single(&dir, image_overlays, |dir, files| {
            DiscoveryError::DuplicateOverlay { dir, files }
        })?,
        driver_overlay: single(&dir, driver_overlays, |dir, files| {
            DiscoveryError::DuplicateDriverOverlay { dir, files }
        })?,
        key: single(&dir, keys, |dir, files| DiscoveryError::DuplicateKey {
            dir,
            files,
        })?,
    };

    if files.image_overlay.is_none() {
        return Err(DiscoveryError::InvalidPackage(format!(
            "{dir:?} does not contain an image overlay (*{OVERLAY_EXTENSION})"
        ))
        .into());
    }
    debug!("Package {dir:?} contains {files:?}");
    Ok(files)
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

fn explicit_file(path: &Path, what: &str, extensions: &[&str]) -> Result<PackageFile, DfxError> {
    if !path.is_file() {
        return Err(DfxError::InvalidParam(format!(
            "{what} {path:?} does not exist or is not a file"
        )));
    }
    let file = PackageFile::from_path(path)?;
    if !has_extension(&file.name, extensions) {
        return Err(DfxError::InvalidParam(format!(
            "{what} {path:?} must end in one of {extensions:?}"
        )));
    }
    Ok(file)
}

/// Validate a package given as individual files.
///
/// # Returns: `Result<PackageFiles, DfxError>`
/// * `Ok(PackageFiles)` - every given file exists and carries the expected extension
/// * `Err(DfxError::InvalidParam)` - naming the first offending file
pub fn from_explicit_files(
    bitstream: &Path,
    image_overlay: &Path,
    driver_overlay: Option<&Path>,
    key_file: Option<&Path>,
) -> Result<PackageFiles, DfxError> {
    Ok(PackageFiles {
        bitstream: Some(explicit_file(bitstream, "bitstream", &BITSTREAM_EXTENSIONS)?),
        image_overlay: Some(explicit_file(
            image_overlay,
            "image overlay",
            &[OVERLAY_EXTENSION],
        )?),
        driver_overlay: driver_overlay
            .map(|p| explicit_file(p, "driver overlay", &[OVERLAY_EXTENSION]))
            .transpose()?,
        key: key_file
            .map(|p| explicit_file(p, "AES key file", &[KEY_EXTENSION]))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;
    use std::fs;

    fn package(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"\x00").unwrap();
        }
        dir
    }

    #[gtest]
    #[rstest]
    #[case::versal_pdi("x.pdi", FpgaFamily::Versal, Some(Category::Bitstream))]
    #[case::versal_ignores_bin("x.bin", FpgaFamily::Versal, None)]
    #[case::versal_ignores_bit("x.bit", FpgaFamily::Versal, None)]
    #[case::zynqmp_bin("design.BIN", FpgaFamily::ZynqMp, Some(Category::Bitstream))]
    #[case::zynqmp_bit("design.bit", FpgaFamily::ZynqMp, Some(Category::Bitstream))]
    #[case::image("x_i.dtbo", FpgaFamily::Versal, Some(Category::ImageOverlay))]
    #[case::generic("x.dtbo", FpgaFamily::Versal, Some(Category::ImageOverlay))]
    #[case::driver("x_D.dtbo", FpgaFamily::Versal, Some(Category::DriverOverlay))]
    #[case::key("aes.nky", FpgaFamily::ZynqMp, Some(Category::Key))]
    #[case::too_short(".bin", FpgaFamily::ZynqMp, None)]
    #[case::other("readme.txt", FpgaFamily::ZynqMp, None)]
    fn classification(
        #[case] name: &str,
        #[case] family: FpgaFamily,
        #[case] expected: Option<Category>,
    ) {
        assert_that!(classify(name, family), eq(expected));
    }

    #[gtest]
    fn complete_package() {
        let dir = package(&["x.pdi", "x_i.dtbo", "x_d.dtbo", "k.nky", "notes.txt"]);
        let files = scan_directory(dir.path(), FpgaFamily::Versal).unwrap();
        let bitstream = dir.path().join("x.pdi");
        assert_that!(files.bitstream_path(), some(eq(bitstream.as_path())));
        assert_that!(files.image_overlay.as_ref().map(|f| f.name.as_str()), some(eq("x_i.dtbo")));
        assert_that!(files.driver_overlay.as_ref().map(|f| f.name.as_str()), some(eq("x_d.dtbo")));
        assert_that!(files.key.as_ref().map(|f| f.name.as_str()), some(eq("k.nky")));
        assert_that!(files.package_name(), some(eq("x")));
    }

    #[gtest]
    #[rstest]
    #[case::ab(&["a.bin", "b.bin", "a_i.dtbo"])]
    #[case::ba(&["b.bin", "a_i.dtbo", "a.bin"])]
    #[case::legacy(&["a_i.dtbo", "a.bit", "b.bin"])]
    fn duplicate_bitstream(#[case] names: &[&str]) {
        let dir = package(names);
        let result = scan_directory(dir.path(), FpgaFamily::ZynqMp);
        assert_that!(
            result,
            err(displays_as(contains_substring("DuplicateBitstream")))
        );
    }

    #[gtest]
    #[rstest]
    #[case::image(&["a_i.dtbo", "b.dtbo"], "DuplicateOverlay:")]
    #[case::driver(&["a_i.dtbo", "a_d.dtbo", "b_d.dtbo"], "DuplicateDriverOverlay")]
    #[case::key(&["a_i.dtbo", "a.nky", "b.nky"], "DuplicateKey")]
    #[case::no_overlay(&["a.pdi", "a_d.dtbo"], "InvalidPackage")]
    #[case::empty(&[], "InvalidPackage")]
    fn should_fail(#[case] names: &[&str], #[case] message: &str) {
        let dir = package(names);
        assert_that!(
            scan_directory(dir.path(), FpgaFamily::Versal),
            err(displays_as(contains_substring(message)))
        );
    }

    #[gtest]
    fn overlay_only_package_is_valid() {
        let dir = package(&["shell.dtbo"]);
        let files = scan_directory(dir.path(), FpgaFamily::Versal).unwrap();
        assert_that!(files.bitstream, none());
        assert_that!(files.package_name(), some(eq("shell")));
    }

    #[gtest]
    fn subdirectories_are_skipped() {
        let dir = package(&["x_i.dtbo"]);
        fs::create_dir(dir.path().join("old.pdi")).unwrap();
        let files = scan_directory(dir.path(), FpgaFamily::Versal).unwrap();
        assert_that!(files.bitstream, none());
    }

    #[gtest]
    fn explicit_files_are_validated() {
        let dir = package(&["x.PDI", "x.dtbo", "drv.dtbo", "x.nky", "x.txt"]);
        let p = |n: &str| dir.path().join(n);

        let files = from_explicit_files(&p("x.PDI"), &p("x.dtbo"), Some(p("drv.dtbo").as_path()), None);
        assert_that!(files, ok(anything()));

        assert_that!(
            from_explicit_files(&p("x.txt"), &p("x.dtbo"), None, None),
            err(displays_as(contains_substring("bitstream")))
        );
        assert_that!(
            from_explicit_files(&p("x.PDI"), &p("missing.dtbo"), None, None),
            err(displays_as(contains_substring("missing.dtbo")))
        );
        assert_that!(
            from_explicit_files(&p("x.PDI"), &p("x.dtbo"), None, Some(p("x.txt").as_path())),
            err(displays_as(contains_substring("AES key file")))
        );
    }

    #[gtest]
    #[rstest]
    #[case::image_marker("design_i.dtbo", Some("design"))]
    #[case::upper_case_marker("design_I.dtbo", Some("design"))]
    #[case::plain("design.dtbo", Some("design"))]
    #[case::marker_only_at_the_end("multi_io.dtbo", Some("multi_io"))]
    #[case::trailing_separator("design_.dtbo", Some("design"))]
    #[case::only_marker("_i.dtbo", None)]
    #[case::only_separator("__.dtbo", None)]
    fn package_name(#[case] overlay: &str, #[case] expected: Option<&str>) {
        let files = PackageFiles {
            image_overlay: Some(PackageFile {
                name: overlay.to_string(),
                path: PathBuf::from("/pkg").join(overlay),
            }),
            ..Default::default()
        };
        let name = files.package_name();
        assert_that!(name.as_deref(), eq(expected));
    }
}
