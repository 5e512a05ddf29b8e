/*
 * This file is part of bayled.
 *
 * Copyright (C) 2025 Bayled contributors
 *
 * Bayled is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Bayled is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with bayled. If not, see <https://www.gnu.org/licenses/>.
 */

//! Device enumeration and statistics.
//!
//! The chassis has exactly four bays wired to ATA ports 1..4, target 0. This
//! is not a general-purpose storage enumerator: a disk that matches none of
//! the four identities violates the hardware model and is fatal.
//!
//! Counters come from `/sys/block/<dev>/stat` (sectors, converted to bytes);
//! the bay identity is parsed from the `ataN` component of the device's
//! canonical sysfs path. Change detection is by comparing the discovered
//! device-name set between snapshots.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{LedError, Result};
use crate::variant::LedLayout;

/// Four bays in the EX48x/EX49x chassis. Fixed by the hardware.
pub const MAX_BAYS: usize = 4;

/// Cumulative counters for one monitored disk, as of one snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskCounters {
    pub device: String,
    pub path_id: u32,
    pub target_id: u32,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// One full pass over the monitored device class.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub disks: Vec<DiskCounters>,
}

/// Outcome of re-sampling device statistics mid-run.
#[derive(Debug)]
pub enum PollOutcome {
    /// Same device set; fresh counters attached.
    Unchanged(Snapshot),
    /// A device appeared or disappeared; the whole pipeline must rebuild.
    TopologyChanged,
}

/// Device-statistics provider seam. The production implementation reads
/// sysfs; tests script it.
pub trait StatsProvider: Send {
    /// Full enumeration pass; resets the change-detection baseline.
    fn rescan(&mut self) -> Result<Snapshot>;
    /// Re-sample against the last `rescan` baseline. Hard query failures
    /// come back as errors and are fatal to the process.
    fn poll(&mut self) -> Result<PollOutcome>;
}

/// One physical bay with a monitored disk in it. Owned by the supervisor;
/// each monitor task gets a copy for its own slot only.
#[derive(Clone, Debug)]
pub struct DriveSlot {
    /// Bay number 1..=4, derived from the bus path and never reassigned.
    pub slot: usize,
    pub path_id: u32,
    pub target_id: u32,
    pub device: String,
    /// Baseline counters from enumeration time.
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// LED bits per the active board variant.
    pub blue: u8,
    pub red: u8,
}

/// Classify a snapshot into bays and attach the variant's LED bits.
/// Bus path N, target 0 maps to bay N; anything else violates the fixed
/// topology. An empty snapshot is fatal to the caller.
pub fn build_slots(snapshot: &Snapshot, layout: &LedLayout) -> Result<Vec<DriveSlot>> {
    if snapshot.disks.is_empty() {
        return Err(LedError::NoDevices);
    }
    if snapshot.disks.len() > MAX_BAYS {
        return Err(LedError::device_query(format!(
            "{} devices matched the monitor filter, chassis has {}",
            snapshot.disks.len(),
            MAX_BAYS
        )));
    }

    let mut slots = Vec::with_capacity(snapshot.disks.len());
    let mut occupied = [false; MAX_BAYS];
    for disk in &snapshot.disks {
        let bay = match (disk.path_id, disk.target_id) {
            (p @ 1..=4, 0) => p as usize,
            _ => {
                return Err(LedError::UnknownTopology {
                    device: disk.device.clone(),
                    path_id: disk.path_id,
                    target_id: disk.target_id,
                })
            }
        };
        // one disk per bay; a second claimant means the identity model broke
        if occupied[bay - 1] {
            return Err(LedError::UnknownTopology {
                device: disk.device.clone(),
                path_id: disk.path_id,
                target_id: disk.target_id,
            });
        }
        occupied[bay - 1] = true;
        slots.push(DriveSlot {
            slot: bay,
            path_id: disk.path_id,
            target_id: disk.target_id,
            device: disk.device.clone(),
            bytes_read: disk.bytes_read,
            bytes_written: disk.bytes_written,
            blue: layout.blue[bay - 1],
            red: layout.red[bay - 1],
        });
        info!(
            "Now monitoring {} in server bay {} for activity",
            disk.device, bay
        );
    }
    Ok(slots)
}

/// Production statistics provider over `/sys/block`.
pub struct SysBlockStats {
    root: PathBuf,
    baseline: BTreeSet<String>,
}

impl SysBlockStats {
    pub fn new() -> Self {
        Self::with_root("/sys/block")
    }

    /// Rooted constructor so tests can point at a fake sysfs tree.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        SysBlockStats {
            root: root.into(),
            baseline: BTreeSet::new(),
        }
    }

    fn scan(&self) -> Result<Snapshot> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| LedError::device_query(format!("{}: {}", self.root.display(), e)))?;

        let mut disks = Vec::new();
        for ent in entries.flatten() {
            let name = ent.file_name().to_string_lossy().into_owned();
            let dir = ent.path();

            // class filter: only ATA-attached whole disks
            let Some(path_id) = ata_path_id(&dir) else {
                continue;
            };
            let (bytes_read, bytes_written) = read_stat_bytes(&dir.join("stat"))?;

            debug!(
                device = name.as_str(),
                path_id, bytes_read, bytes_written, "matched monitored disk"
            );
            disks.push(DiskCounters {
                device: format!("/dev/{name}"),
                path_id,
                // ATA whole disks sit at target 0 on their port
                target_id: 0,
                bytes_read,
                bytes_written,
            });
        }
        disks.sort_by(|a, b| a.device.cmp(&b.device));
        Ok(Snapshot { disks })
    }

    fn names(snapshot: &Snapshot) -> BTreeSet<String> {
        snapshot.disks.iter().map(|d| d.device.clone()).collect()
    }
}

impl Default for SysBlockStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for SysBlockStats {
    fn rescan(&mut self) -> Result<Snapshot> {
        let snapshot = self.scan()?;
        self.baseline = Self::names(&snapshot);
        Ok(snapshot)
    }

    fn poll(&mut self) -> Result<PollOutcome> {
        let snapshot = self.scan()?;
        if Self::names(&snapshot) != self.baseline {
            return Ok(PollOutcome::TopologyChanged);
        }
        Ok(PollOutcome::Unchanged(snapshot))
    }
}

/// Extract the ATA port number from a block device's canonical sysfs path.
/// Returns None for devices that are not ATA-attached (loop, nvme, ...).
fn ata_path_id(block_dir: &Path) -> Option<u32> {
    let device = fs::canonicalize(block_dir.join("device")).ok()?;
    for comp in device.components() {
        let s = comp.as_os_str().to_string_lossy();
        if let Some(rest) = s.strip_prefix("ata") {
            if let Ok(n) = rest.parse::<u32>() {
                return Some(n);
            }
        }
    }
    None
}

/// Parse `/sys/block/<dev>/stat`: field 3 is sectors read, field 7 sectors
/// written; sectors are 512 bytes regardless of the device's logical block
/// size.
fn read_stat_bytes(path: &Path) -> Result<(u64, u64)> {
    let raw = fs::read_to_string(path)
        .map_err(|e| LedError::device_query(format!("{}: {}", path.display(), e)))?;
    let fields: Vec<u64> = raw
        .split_whitespace()
        .map(|f| f.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| {
            LedError::device_query(format!("{}: malformed stat field: {}", path.display(), e))
        })?;
    if fields.len() < 7 {
        return Err(LedError::device_query(format!(
            "{}: short stat line ({} fields)",
            path.display(),
            fields.len()
        )));
    }
    Ok((fields[2] * 512, fields[6] * 512))
}
