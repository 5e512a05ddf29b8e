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

//! Shared test doubles: a scripted register space standing in for `/dev/port`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::portio::PortIo;

/// In-memory register space emulating the port protocols the daemon speaks:
/// the PCI config address/data pair, super-I/O index/data pairs at 0x2E and
/// 0x4E, and plain 8/32-bit registers everywhere else. All writes are logged
/// so tests can assert on exact bus traffic.
pub struct FakePort {
    /// Plain 32-bit registers (GPIO bank), keyed by port. Unknown ports read 0.
    pub regs: HashMap<u16, u32>,
    /// Plain 8-bit registers (SCH5127 runtime block).
    pub regs8: HashMap<u16, u8>,
    /// Super-I/O config space: (index-port, index) -> value.
    pub sio_regs: HashMap<(u16, u8), u8>,
    /// PCI config dwords keyed by the value written to 0x0CF8.
    pub pci: HashMap<u32, u32>,
    /// Log of 32-bit writes (port, value).
    pub writes: Vec<(u16, u32)>,
    /// Log of plain 8-bit writes (port, value); excludes super-I/O traffic.
    pub writes8: Vec<(u16, u8)>,

    pci_select: u32,
    sio_index: HashMap<u16, u8>,
}

const SIO_PORTS: [u16; 2] = [0x2E, 0x4E];

impl FakePort {
    pub fn new() -> Self {
        FakePort {
            regs: HashMap::new(),
            regs8: HashMap::new(),
            sio_regs: HashMap::new(),
            pci: HashMap::new(),
            writes: Vec::new(),
            writes8: Vec::new(),
            pci_select: 0,
            sio_index: HashMap::new(),
        }
    }

    fn sio_addr_for_data(port: u16) -> Option<u16> {
        SIO_PORTS.iter().copied().find(|addr| addr + 1 == port)
    }
}

impl Default for FakePort {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable handle on a [`FakePort`]. Lets a test keep inspecting the
/// register space after moving a `Box<dyn PortIo>` into a controller.
#[derive(Clone)]
pub struct SharedPort(pub Arc<Mutex<FakePort>>);

impl SharedPort {
    pub fn new(port: FakePort) -> Self {
        SharedPort(Arc::new(Mutex::new(port)))
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, FakePort> {
        self.0.lock()
    }
}

impl PortIo for SharedPort {
    fn read8(&mut self, port: u16) -> Result<u8> {
        self.0.lock().read8(port)
    }

    fn write8(&mut self, port: u16, value: u8) -> Result<()> {
        self.0.lock().write8(port, value)
    }

    fn read32(&mut self, port: u16) -> Result<u32> {
        self.0.lock().read32(port)
    }

    fn write32(&mut self, port: u16, value: u32) -> Result<()> {
        self.0.lock().write32(port, value)
    }
}

impl PortIo for FakePort {
    fn read8(&mut self, port: u16) -> Result<u8> {
        if let Some(addr) = Self::sio_addr_for_data(port) {
            let index = self.sio_index.get(&addr).copied().unwrap_or(0);
            return Ok(self.sio_regs.get(&(addr, index)).copied().unwrap_or(0));
        }
        Ok(self.regs8.get(&port).copied().unwrap_or(0))
    }

    fn write8(&mut self, port: u16, value: u8) -> Result<()> {
        if SIO_PORTS.contains(&port) {
            self.sio_index.insert(port, value);
            return Ok(());
        }
        if let Some(addr) = Self::sio_addr_for_data(port) {
            let index = self.sio_index.get(&addr).copied().unwrap_or(0);
            self.sio_regs.insert((addr, index), value);
            return Ok(());
        }
        self.writes8.push((port, value));
        self.regs8.insert(port, value);
        Ok(())
    }

    fn read32(&mut self, port: u16) -> Result<u32> {
        if port == crate::chipset::PCI_CONFIG_DATA {
            return Ok(self.pci.get(&self.pci_select).copied().unwrap_or(0));
        }
        Ok(self.regs.get(&port).copied().unwrap_or(0))
    }

    fn write32(&mut self, port: u16, value: u32) -> Result<()> {
        self.writes.push((port, value));
        if port == crate::chipset::PCI_CONFIG_ADDRESS {
            self.pci_select = value;
            return Ok(());
        }
        self.regs.insert(port, value);
        Ok(())
    }
}
