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

//! dfxd manages Dynamic Function eXchange packages on Xilinx ZynqMP and Versal devices.
//!
//! A package is a directory (or a set of files) holding a partial bitstream, an image overlay,
//! optionally a driver overlay and an AES key file. The [`dfx::Dfx`] engine takes a package
//! through its lifecycle using the kernel services behind [`platforms::platform::Platform`]:
//!
//! - the fpga_manager sysfs class, which receives the bitstream as a dma-buf
//! - the device-tree overlay configfs
//! - the DMA heaps in `/dev/dma_heap`
//!
//! The daemon binary exposes the engine on the system bus, see [`comm::dbus`].

pub mod bitstream;
pub mod comm;
pub mod config;
pub mod dfx;
pub mod diagnostics;
pub mod dma_buffer;
pub mod error;
pub mod firmware;
pub mod overlay;
pub mod package;
pub mod platforms;
pub mod system_io;
