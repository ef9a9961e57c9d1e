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

//! The set of live packages.
//!
//! Ids start at 1 and a new id is always one more than the highest live id, so an id is never
//! handed out twice while its record exists. The id of the newest package comes back once that
//! package has been destroyed.

use crate::error::DfxError;
use crate::package::record::{DfxFlags, PackageRecord};
use crate::platforms::platform::FpgaFamily;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct PackageRegistry {
    records: BTreeMap<u64, PackageRecord>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty record and return its id.
    ///
    /// # Returns: `Result<u64, DfxError>`
    /// * `Ok(u64)` - the new id, `1` for an empty registry
    /// * `Err(DfxError::Environment)` - `overlay_root` is not a directory, so overlays could never
    ///   be applied
    pub fn create(
        &mut self,
        overlay_root: &Path,
        family: FpgaFamily,
        flags: DfxFlags,
    ) -> Result<u64, DfxError> {
        if !overlay_root.is_dir() {
            return Err(DfxError::Environment(format!(
                "The overlay root {overlay_root:?} is not available. Is configfs mounted?"
            )));
        }
        let id = self.next_id();
        self.records
            .insert(id, PackageRecord::new(id, family, flags));
        debug!("Created package record {id}");
        Ok(id)
    }

    fn next_id(&self) -> u64 {
        self.records.keys().next_back().map_or(1, |last| last + 1)
    }

    fn check_id(id: u64) -> Result<(), DfxError> {
        match id {
            0 => Err(DfxError::InvalidPackageId(id)),
            _ => Ok(()),
        }
    }

    pub fn get(&self, id: u64) -> Result<&PackageRecord, DfxError> {
        Self::check_id(id)?;
        self.records.get(&id).ok_or(DfxError::PackageNotFound(id))
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut PackageRecord, DfxError> {
        Self::check_id(id)?;
        self.records.get_mut(&id).ok_or(DfxError::PackageNotFound(id))
    }

    /// Detach a record and hand it to the caller for teardown.
    pub fn remove(&mut self, id: u64) -> Result<PackageRecord, DfxError> {
        Self::check_id(id)?;
        let record = self
            .records
            .remove(&id)
            .ok_or(DfxError::PackageNotFound(id))?;
        trace!("Removed package record {id}");
        Ok(record)
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }
}
