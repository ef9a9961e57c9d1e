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

pub mod common;

use crate::common::{BITSTREAM, Board, versal, zynqmp};
use dfxd::dfx::{InitOptions, PackagePaths};
use dfxd::package::record::DfxFlags;
use googletest::prelude::*;
use rstest::*;
use std::fs;

fn external() -> InitOptions {
    InitOptions {
        flags: DfxFlags::EXTERNAL_CONFIG,
        ..InitOptions::default()
    }
}

#[gtest]
#[rstest]
fn happy_path(mut versal: Board) {
    let package = versal.package("design", &["design.pdi", "design.dtbo"]);

    let id = versal.dfx.init(&package, &InitOptions::default()).unwrap();
    assert_that!(id, eq(1));
    assert_that!(versal.kernel.live_buffers(), eq(1));

    assert_that!(versal.dfx.load(id), ok(anything()));
    assert_that!(versal.kernel.loaded_bitstreams(), elements_are![eq(BITSTREAM)]);
    assert_that!(versal.kernel.overlay_dirs(), elements_are![eq("design_image_1")]);
    assert_that!(versal.dfx.package(id).unwrap().is_loaded(), eq(true));

    assert_that!(versal.dfx.remove(id), ok(anything()));
    assert_that!(versal.kernel.overlay_dirs(), is_empty());

    assert_that!(versal.dfx.destroy(id), ok(anything()));
    assert_that!(versal.kernel.live_buffers(), eq(0));
    assert_that!(
        versal.dfx.package(id).map(|_| ()),
        err(displays_as(contains_substring("PackageNotFound")))
    );
}

#[gtest]
#[rstest]
fn zynqmp_bitstream_is_word_aligned(mut zynqmp: Board) {
    let package = zynqmp.package("design", &["design.bin", "design.dtbo"]);
    let id = zynqmp.dfx.init(&package, &InitOptions::default()).unwrap();
    zynqmp.dfx.load(id).unwrap();

    let mut expected = vec![0xFF, 0xFF];
    expected.extend_from_slice(BITSTREAM);
    assert_that!(zynqmp.kernel.loaded_bitstreams(), elements_are![eq(&expected)]);
    assert_that!(zynqmp.kernel.fpga_flags(), eq("0"));
}

#[gtest]
#[rstest]
#[case::sorted(&["a.bin", "b.bin", "x_i.dtbo"])]
#[case::reversed(&["x_i.dtbo", "b.bin", "a.bin"])]
#[case::legacy_bit(&["a.bit", "x_i.dtbo", "b.bin"])]
fn duplicate_bitstream_leaves_no_record(mut zynqmp: Board, #[case] files: &[&str]) {
    let package = zynqmp.package("dup", files);
    assert_that!(
        zynqmp.dfx.init(&package, &InitOptions::default()),
        err(displays_as(contains_substring("DuplicateBitstream")))
    );
    assert_that!(zynqmp.dfx.packages(), is_empty());
    assert_that!(zynqmp.kernel.live_buffers(), eq(0));
}

#[gtest]
#[rstest]
fn externally_configured_fabric(mut versal: Board) {
    let package = versal.package("shell", &["shell.dtbo"]);
    let id = versal.dfx.init(&package, &external()).unwrap();
    assert_that!(versal.kernel.live_buffers(), eq(0));
    assert_that!(versal.dfx.package(id).unwrap().dma_buffer.is_none(), eq(true));

    // The fabric never reports operating, the state check is skipped.
    assert_that!(versal.dfx.load(id), ok(anything()));
    assert_that!(versal.kernel.loaded_bitstreams(), is_empty());
    assert_that!(versal.kernel.fpga_flags(), eq("0"));
    assert_that!(versal.kernel.overlay_dirs(), elements_are![eq("shell_image_1")]);
}

#[gtest]
#[rstest]
fn failed_configuration_keeps_the_package(mut zynqmp: Board) {
    let package = zynqmp.package("design", &["design.bin", "design.dtbo"]);
    let id = zynqmp.dfx.init(&package, &InitOptions::default()).unwrap();
    zynqmp.kernel.set_post_load_state("write error 0x0804");

    assert_that!(
        zynqmp.dfx.load(id),
        err(displays_as(all![
            contains_substring("ImageConfig"),
            contains_substring("Image write: Failed to authenticate the image headers")
        ]))
    );
    assert_that!(zynqmp.kernel.overlay_dirs(), is_empty());
    assert_that!(zynqmp.kernel.firmware_search_path(), eq(""));
    assert_that!(zynqmp.dfx.packages(), elements_are![eq(&id)]);
    assert_that!(zynqmp.dfx.package(id).unwrap().is_loaded(), eq(false));

    zynqmp.kernel.set_post_load_state("operating");
    assert_that!(zynqmp.dfx.load(id), ok(anything()));
    assert_that!(zynqmp.kernel.loaded_bitstreams().len(), eq(2));
}

#[gtest]
#[rstest]
fn overlays_are_removed_drivers_first(mut versal: Board) {
    let package = versal.package("design", &["design.pdi", "design.dtbo", "design_d.dtbo"]);
    let id = versal.dfx.init(&package, &InitOptions::default()).unwrap();
    versal.dfx.load(id).unwrap();
    versal.dfx.drivers_load(id).unwrap();
    assert_that!(
        versal.kernel.overlay_dirs(),
        elements_are![eq("design_driver_1"), eq("design_image_1")]
    );

    versal.dfx.remove(id).unwrap();
    assert_that!(
        versal.kernel.overlay_events(),
        elements_are![
            eq("create design_image_1"),
            eq("create design_driver_1"),
            eq("remove design_driver_1"),
            eq("remove design_image_1")
        ]
    );
    // Nothing left to remove.
    assert_that!(versal.dfx.remove(id), ok(anything()));
}

#[gtest]
#[rstest]
fn rejected_driver_overlay_keeps_the_image(mut versal: Board) {
    let package = versal.package("design", &["design.pdi", "design.dtbo", "design_d.dtbo"]);
    let id = versal.dfx.init(&package, &InitOptions::default()).unwrap();
    versal.dfx.load(id).unwrap();
    versal.kernel.reject_overlay("design_d.dtbo");

    assert_that!(
        versal.dfx.drivers_load(id),
        err(displays_as(contains_substring("DriverConfig")))
    );
    assert_that!(versal.kernel.overlay_dirs(), elements_are![eq("design_image_1")]);
    assert_that!(versal.dfx.package(id).unwrap().drivers_loaded(), eq(false));
}

#[gtest]
#[rstest]
fn ids_grow_past_every_live_package(mut versal: Board) {
    let package = versal.package("shell", &["shell.dtbo"]);
    let first = versal.dfx.init(&package, &external()).unwrap();
    let second = versal.dfx.init(&package, &external()).unwrap();
    let third = versal.dfx.init(&package, &external()).unwrap();
    assert_that!((first, second, third), eq((1, 2, 3)));

    versal.dfx.destroy(second).unwrap();
    assert_that!(versal.dfx.init(&package, &external()), ok(eq(&4)));

    for id in versal.dfx.packages() {
        versal.dfx.destroy(id).unwrap();
    }
    assert_that!(versal.dfx.init(&package, &external()), ok(eq(&1)));
}

#[gtest]
#[rstest]
fn packages_from_explicit_files(mut versal: Board) {
    let package = versal.package("files", &["top.pdi", "top_i.dtbo", "top_d.dtbo"]);
    let files = PackagePaths {
        bitstream: &package.join("top.pdi"),
        image_overlay: &package.join("top_i.dtbo"),
        driver_overlay: Some(&package.join("top_d.dtbo")),
        key_file: None,
    };
    let id = versal.dfx.init_files(files, &InitOptions::default()).unwrap();
    versal.dfx.load(id).unwrap();
    versal.dfx.drivers_load(id).unwrap();
    assert_that!(
        versal.kernel.overlay_dirs(),
        elements_are![eq("top_driver_1"), eq("top_image_1")]
    );
}

#[gtest]
#[rstest]
fn explicit_files_must_exist(mut versal: Board) {
    let package = versal.package("files", &["top_i.dtbo"]);
    let files = PackagePaths {
        bitstream: &package.join("top.pdi"),
        image_overlay: &package.join("top_i.dtbo"),
        driver_overlay: None,
        key_file: None,
    };
    assert_that!(
        versal.dfx.init_files(files, &InitOptions::default()),
        err(displays_as(contains_substring("InvalidParam")))
    );
    assert_that!(versal.dfx.packages(), is_empty());
}

#[gtest]
#[rstest]
fn encrypted_bitstream_gets_its_key(mut zynqmp: Board) {
    let package = zynqmp.package("secure", &["secure.bin", "secure.dtbo"]);
    fs::write(
        package.join("secure.nky"),
        "Device xck26;\nKey 0 00112233445566778899AABBCCDDEEFF;\n",
    )
    .unwrap();
    let options = InitOptions {
        flags: DfxFlags::ENCRYPTION_USER_KEY,
        ..InitOptions::default()
    };
    let id = zynqmp.dfx.init(&package, &options).unwrap();
    zynqmp.dfx.load(id).unwrap();
    assert_that!(zynqmp.kernel.fpga_flags(), eq("20"));
    assert_that!(
        zynqmp.kernel.fpga_key(),
        eq("00112233445566778899AABBCCDDEEFF;")
    );
}

#[gtest]
#[rstest]
fn versal_firmware_queries(versal: Board) {
    let firmware = versal.kernel.paths().versal_firmware_dir.clone();
    let words: Vec<u8> = [0x18700000u32, 1, 0, 2]
        .iter()
        .flat_map(|w| w.to_ne_bytes())
        .collect();
    fs::write(firmware.join("uid-read"), &words).unwrap();
    fs::write(firmware.join("meta-header-read"), &words).unwrap();
    let package = versal.package("design", &["design.pdi"]);

    assert_that!(versal.dfx.active_uid_list(), ok(len(eq(4))));
    assert_that!(
        versal.dfx.meta_header(&package.join("design.pdi"), 4),
        ok(elements_are![eq(&0x18700000), eq(&1), eq(&0), eq(&2)])
    );
    assert_that!(
        versal.dfx.meta_header(&package.join("design.pdi"), 3),
        err(displays_as(contains_substring("InsufficientBuffer")))
    );
}

#[gtest]
#[rstest]
fn zynqmp_has_no_firmware_queries(zynqmp: Board) {
    assert_that!(
        zynqmp.dfx.active_uid_list(),
        err(displays_as(contains_substring("PlatformUnsupported")))
    );
}
