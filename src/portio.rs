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

//! Raw I/O-port access.
//!
//! All register programming in this daemon goes through the [`PortIo`] trait:
//! unbuffered single-port reads and writes, no retries. The production
//! implementation is a handle on `/dev/port`, where the file offset is the
//! port number; it is opened once at startup (this needs root) and released
//! when dropped. Any access failure is unrecoverable for the process.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;

use crate::error::{LedError, Result};

/// Port-level read/write primitives. Kept behind a trait so the chipset and
/// LED code can be exercised against a scripted register space in tests.
#[cfg_attr(test, mockall::automock)]
pub trait PortIo: Send {
    fn read8(&mut self, port: u16) -> Result<u8>;
    fn write8(&mut self, port: u16, value: u8) -> Result<()>;
    fn read32(&mut self, port: u16) -> Result<u32>;
    fn write32(&mut self, port: u16, value: u32) -> Result<()>;
}

/// The raw port grant: a read/write handle on `/dev/port`.
pub struct DevPort {
    file: File,
}

impl DevPort {
    pub const PATH: &'static str = "/dev/port";

    /// Acquire the port grant. Fails with `PortGrant` when the device is
    /// missing or we lack the privilege to open it.
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(Self::PATH)
            .map_err(|source| LedError::PortGrant {
                path: Self::PATH.to_string(),
                source,
            })?;
        Ok(DevPort { file })
    }
}

impl PortIo for DevPort {
    fn read8(&mut self, port: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.file
            .read_exact_at(&mut buf, u64::from(port))
            .map_err(|source| LedError::PortAccess { port, source })?;
        Ok(buf[0])
    }

    fn write8(&mut self, port: u16, value: u8) -> Result<()> {
        self.file
            .write_all_at(&[value], u64::from(port))
            .map_err(|source| LedError::PortAccess { port, source })
    }

    fn read32(&mut self, port: u16) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.file
            .read_exact_at(&mut buf, u64::from(port))
            .map_err(|source| LedError::PortAccess { port, source })?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write32(&mut self, port: u16, value: u32) -> Result<()> {
        self.file
            .write_all_at(&value.to_le_bytes(), u64::from(port))
            .map_err(|source| LedError::PortAccess { port, source })
    }
}

/// OR a GPIO bit number into one of the two 32-bit aggregates: `lo` covers
/// bits 0..=31, `hi` covers bits 32..=60 of the second register bank.
pub fn set_bits32(bit: u8, lo: &mut u32, hi: &mut u32) {
    if bit < 32 {
        *lo |= 1 << bit;
    } else {
        *hi |= 1 << (bit - 32);
    }
}

/// Read-modify-write a 32-bit register, setting (`enable`) or clearing the
/// bits in `mask`. The write is elided when the value would not change.
pub fn apply_bits(io: &mut dyn PortIo, port: u16, mask: u32, enable: bool) -> Result<()> {
    let val = io.read32(port)?;
    let new = if enable { val | mask } else { val & !mask };
    if new != val {
        io.write32(port, new)?;
    }
    Ok(())
}
