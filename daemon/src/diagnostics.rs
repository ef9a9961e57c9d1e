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

//! Human readable decoding of the error codes the ZynqMP PMU firmware reports after a failed
//! configuration.
//!
//! The low byte of the code is the phase in which configuration stopped, the next byte is the
//! cause. Either may be missing from the tables below, in which case that part is left out.

use crate::platforms::platform::FpgaFamily;

static ZYNQMP_PHASES: [(u32, &str); 6] = [
    (0x2, "Image validation"),
    (0x3, "Image pre-configuration"),
    (0x4, "Image write"),
    (0x5, "Image post-configuration"),
    (0x6, "Operation not supported"),
    (0x8, "Invalid input parameters"),
];

static ZYNQMP_CAUSES: [(u32, &str); 28] = [
    (0x02, "Failed to initialize the CSUDMA module"),
    (0x03, "Failed to power-up the PL"),
    (0x04, "Failed to perform the PS-PL isolation"),
    (0x05, "Failed to initialize the PCAP IP"),
    (0x06, "PL configuration failed"),
    (0x07, "Incorrect user crypto flags"),
    (0x08, "Failed to authenticate the image headers"),
    (0x09, "Only encrypted images are supported"),
    (0x0A, "Image authentication failed"),
    (0x0B, "Firmware internal error"),
    (0x0C, "Incorrect user crypto flags"),
    (0x0D, "Only secure images are supported"),
    (0x0E, "Image header authentication failed"),
    (0x0F, "Decryption failed due to wrong key source"),
    (0x10, "DDR image authentication failed due to invalid keys"),
    (0x11, "Failed to authenticate DDR image partition"),
    (0x12, "DDR image authentication failed"),
    (0x13, "OCM image authentication failed due to invalid keys"),
    (0x14, "Failed to authenticate OCM image partition"),
    (0x15, "OCM image authentication failed"),
    (0x16, "Failed to get the PCAP done status"),
    (0x17, "Image AES decryption failed"),
    (0x18, "PCAP failed to transfer the image"),
    (0x19, "PL is in an unknown state"),
    (0x1A, "Bitstream format error"),
    (0x1B, "Received an unaligned bitstream address"),
    (0x1C, "AES initialization failed"),
    (0x1D, "Only secure image configuration is supported"),
];

fn lookup(table: &[(u32, &'static str)], key: u32) -> Option<&'static str> {
    table
        .iter()
        .find_map(|(code, text)| (*code == key).then_some(*text))
}

/// Decode a ZynqMP firmware error code.
///
/// Returns `None` when neither the phase nor the cause is known.
pub fn describe_zynqmp_error(code: u32) -> Option<String> {
    let phase = lookup(&ZYNQMP_PHASES, code & 0xFF);
    let cause = lookup(&ZYNQMP_CAUSES, (code >> 8) & 0xFF);
    match (phase, cause) {
        (Some(phase), Some(cause)) => Some(format!("{phase}: {cause}")),
        (Some(phase), None) => Some(phase.to_string()),
        (None, Some(cause)) => Some(cause.to_string()),
        (None, None) => None,
    }
}

/// The text to attach to a configuration failure on `family`, if it structures its error codes.
pub fn describe_error(family: FpgaFamily, code: u32) -> Option<String> {
    match family.has_structured_errors() {
        true => describe_zynqmp_error(code),
        false => None,
    }
}
