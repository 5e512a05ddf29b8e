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

//! Chipset probing and initialization.
//!
//! Locates the southbridge GPIO bank through PCI configuration space,
//! finds the SCH5127 runtime register block through the super-I/O
//! index/data handshake, disables its watchdog, and claims the variant's
//! LED pins as GPIO outputs. A failed probe mutates no global state; the
//! caller decides whether a mismatch blocks startup.

use tracing::debug;

use crate::error::{LedError, Result};
use crate::portio::{apply_bits, set_bits32, PortIo};
use crate::variant::BoardVariant;

// PCI configuration address/data port pair
pub const PCI_CONFIG_ADDRESS: u16 = 0x0CF8;
pub const PCI_CONFIG_DATA: u16 = 0x0CFC;

// enable | bus 0 | device 31 | function 0 | register
const CONF_VENDOR_ID: u32 = 0x8000_F800; // register 0x00
const CONF_GPIOBASE: u32 = 0x8000_F848; // register 0x48

/// Southbridge GPIO register offsets, relative to the GPIO base.
pub mod gpio {
    pub const USE_SEL: u16 = 0x00; // GPIO Use Select (1 = GPIO, 0 = native)
    pub const IO_SEL: u16 = 0x04; // Input/Output Select (0 = output)
    pub const LVL: u16 = 0x0C; // GPIO Level for input or output
    pub const BLINK: u16 = 0x18; // GPO Blink Enable
    pub const USE_SEL2: u16 = 0x30; // Use Select 2 [60:32]
    pub const IO_SEL2: u16 = 0x34; // Input/Output Select 2 [60:32]
    pub const LVL2: u16 = 0x38; // Level 2 [60:32]
}

/// SCH5127 runtime register offsets, relative to the runtime base.
pub mod sio {
    pub const GP1: u16 = 0x4B; // General Purpose I/O Data Register 1

    pub const WDT_TIME_OUT: u16 = 0x65;
    pub const WDT_VAL: u16 = 0x66;
    pub const WDT_CFG: u16 = 0x67;
    pub const WDT_CTRL: u16 = 0x68;

    pub const HWM_INDEX: u16 = 0x70; // hardware-monitor index register
    pub const HWM_DATA: u16 = 0x71; // hardware-monitor data register
}

// Super-I/O configuration-mode index registers
const IDX_LDN: u8 = 0x07; // logical device number
const IDX_ID: u8 = 0x20; // device identification
const IDX_BASE_MSB: u8 = 0x60;
const IDX_BASE_LSB: u8 = 0x61;
const IDX_ENTER: u8 = 0x55;
const IDX_EXIT: u8 = 0xAA;

// Logical device 0x0A holds the runtime register base.
const LDN_RUNTIME: u8 = 0x0A;

// Candidate super-I/O base ports. Some boards expose the chip at 0x4E; the
// sentinel read from index 0x26 at 0x2E tells us to switch.
const SIO_PRIMARY: u16 = 0x2E;
const SIO_ALTERNATE: u16 = 0x4E;
const SIO_SWITCH_SENTINEL: u8 = 0x4E;

/// Chipset-derived base addresses, valid from a successful probe until the
/// next re-initialization. Never partially updated: `probe` either returns a
/// complete context or an error.
#[derive(Clone, Copy, Debug)]
pub struct HardwareContext {
    pub variant: BoardVariant,
    pub gpio_base: u16,
    pub sio_runtime_base: u16,
}

impl HardwareContext {
    /// Probe the chipset for `variant` and derive the register bases.
    /// A vendor/device mismatch or a malformed GPIO base register is a
    /// detection signal, reported as an error without touching any LED state.
    pub fn probe(io: &mut dyn PortIo, variant: BoardVariant) -> Result<Self> {
        let layout = variant.layout();

        // vendor/device identification at bus 0, device 31, function 0
        io.write32(PCI_CONFIG_ADDRESS, CONF_VENDOR_ID)?;
        let did_vid = io.read32(PCI_CONFIG_DATA)?;
        if did_vid != layout.pci_id {
            return Err(LedError::ChipsetMismatch {
                expected: layout.pci_id,
                found: did_vid,
            });
        }

        io.write32(PCI_CONFIG_ADDRESS, CONF_GPIOBASE)?;
        let raw_base = io.read32(PCI_CONFIG_DATA)?;
        debug!(raw_base = format_args!("{:#010x}", raw_base), "GPIO base register");

        // Only bits 15:6 carry the address; bit 0 is hardwired to 1 as the
        // I/O-space marker and everything else must read zero.
        if raw_base & 0xFFFF_007F != 0x1 {
            return Err(LedError::GpioBasePattern { raw: raw_base });
        }
        let gpio_base = (raw_base & !0x1) as u16;

        let sio_runtime_base = locate_sio_runtime_base(io)?;
        debug!(
            gpio_base = format_args!("{:#06x}", gpio_base),
            sio_runtime_base = format_args!("{:#06x}", sio_runtime_base),
            board = variant.name(),
            "chipset probe complete"
        );

        // A stale watchdog would reset LED state underneath us.
        for reg in [sio::WDT_TIME_OUT, sio::WDT_VAL, sio::WDT_CFG, sio::WDT_CTRL] {
            io.write8(sio_runtime_base + reg, 0)?;
        }

        Ok(HardwareContext {
            variant,
            gpio_base,
            sio_runtime_base,
        })
    }

    /// Claim every LED pin of the active variant as a GPIO output: use-select
    /// bits ORed in, input/output select cleared to output. Run once per
    /// (re)initialization, after `probe`.
    pub fn claim_led_outputs(&self, io: &mut dyn PortIo) -> Result<()> {
        let (mut lo, mut hi) = (0u32, 0u32);
        for &bit in self.variant.layout().gpio_claim {
            set_bits32(bit, &mut lo, &mut hi);
        }

        apply_bits(io, self.gpio_base + gpio::USE_SEL, lo, true)?;
        apply_bits(io, self.gpio_base + gpio::USE_SEL2, hi, true)?;
        apply_bits(io, self.gpio_base + gpio::IO_SEL, lo, false)?;
        apply_bits(io, self.gpio_base + gpio::IO_SEL2, hi, false)?;
        Ok(())
    }
}

/// Run the two-address super-I/O handshake and return the runtime register
/// base of the hardware-monitor logical device.
fn locate_sio_runtime_base(io: &mut dyn PortIo) -> Result<u16> {
    let mut addr = SIO_PRIMARY;
    let mut data = addr + 1;

    io.write8(addr, IDX_ENTER)?;

    io.write8(addr, IDX_ID)?;
    let device_id = io.read8(data)?;
    debug!(device_id = format_args!("{:#04x}", device_id), "super-I/O identification");

    io.write8(addr, 0x26)?;
    let probe = io.read8(data)?;
    if probe == SIO_SWITCH_SENTINEL {
        // board exposes the controller at the alternate address
        io.write8(addr, IDX_EXIT)?;
        addr = SIO_ALTERNATE;
        data = addr + 1;
        debug!("switching super-I/O access to {:#04x}", addr);
        io.write8(addr, IDX_ENTER)?;
    }

    io.write8(addr, IDX_LDN)?;
    io.write8(data, LDN_RUNTIME)?;

    io.write8(addr, IDX_BASE_MSB)?;
    let msb = io.read8(data)?;
    io.write8(addr, IDX_BASE_LSB)?;
    let lsb = io.read8(data)?;

    io.write8(addr, IDX_EXIT)?;

    Ok(u16::from(msb) << 8 | u16::from(lsb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakePort;

    #[test]
    fn test_probe_success_clears_bit0() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0x2916_8086);
        port.pci.insert(CONF_GPIOBASE, 0x0000_0481); // base 0x480, marker bit set
        port.sio_regs.insert((SIO_PRIMARY, IDX_BASE_MSB), 0x08);
        port.sio_regs.insert((SIO_PRIMARY, IDX_BASE_LSB), 0x00);

        let ctx = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap();
        assert_eq!(ctx.gpio_base, 0x0480);
        assert_eq!(ctx.sio_runtime_base, 0x0800);
        // watchdog registers zeroed
        for reg in [sio::WDT_TIME_OUT, sio::WDT_VAL, sio::WDT_CFG, sio::WDT_CTRL] {
            assert!(port.writes8.contains(&(0x0800 + reg, 0)));
        }
    }

    #[test]
    fn test_probe_mismatched_id_fails_without_mutation() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0xFFFF_FFFF);

        let err = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap_err();
        match err {
            LedError::ChipsetMismatch { expected, found } => {
                assert_eq!(expected, 0x2916_8086);
                assert_eq!(found, 0xFFFF_FFFF);
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing beyond the config-space selects may have been written
        assert!(port.writes8.is_empty());
        assert!(port.writes.iter().all(|(p, _)| *p == PCI_CONFIG_ADDRESS));
    }

    #[test]
    fn test_probe_rejects_reserved_gpio_base_bits() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0x2916_8086);
        port.pci.insert(CONF_GPIOBASE, 0x0000_0483); // reserved bit 1 set

        let err = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap_err();
        assert!(matches!(err, LedError::GpioBasePattern { raw: 0x0000_0483 }));
        assert!(port.writes8.is_empty());
    }

    #[test]
    fn test_probe_rejects_missing_io_space_marker() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0x2916_8086);
        port.pci.insert(CONF_GPIOBASE, 0x0000_0480); // bit 0 not hardwired

        let err = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap_err();
        assert!(matches!(err, LedError::GpioBasePattern { .. }));
    }

    #[test]
    fn test_probe_switches_to_alternate_sio_port() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0x2916_8086);
        port.pci.insert(CONF_GPIOBASE, 0x0000_0481);
        // sentinel at the primary port tells us the chip lives at 0x4E
        port.sio_regs.insert((SIO_PRIMARY, 0x26), SIO_SWITCH_SENTINEL);
        port.sio_regs.insert((SIO_ALTERNATE, IDX_BASE_MSB), 0x0A);
        port.sio_regs.insert((SIO_ALTERNATE, IDX_BASE_LSB), 0x20);

        let ctx = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap();
        assert_eq!(ctx.sio_runtime_base, 0x0A20);
        // the logical device select must have happened at the alternate port
        assert_eq!(port.sio_regs.get(&(SIO_ALTERNATE, IDX_LDN)), Some(&LDN_RUNTIME));
    }

    #[test]
    fn test_probe_succeeds_for_all_variants() {
        for variant in BoardVariant::ALL {
            let mut port = FakePort::new();
            port.pci.insert(CONF_VENDOR_ID, variant.layout().pci_id);
            port.pci.insert(CONF_GPIOBASE, 0x0000_0481);
            let ctx = HardwareContext::probe(&mut port, variant).unwrap();
            assert_eq!(ctx.gpio_base & 0x1, 0);
        }
    }

    #[test]
    fn test_claim_led_outputs_sets_use_and_direction() {
        let mut port = FakePort::new();
        port.pci.insert(CONF_VENDOR_ID, 0x2916_8086);
        port.pci.insert(CONF_GPIOBASE, 0x0000_0481);
        // all direction bits start as inputs so the claim must clear them
        port.regs.insert(0x0480 + gpio::IO_SEL, 0xFFFF_FFFF);
        port.regs.insert(0x0480 + gpio::IO_SEL2, 0xFFFF_FFFF);

        let ctx = HardwareContext::probe(&mut port, BoardVariant::HpEx49x).unwrap();
        ctx.claim_led_outputs(&mut port).unwrap();

        let (mut lo, mut hi) = (0u32, 0u32);
        for &bit in BoardVariant::HpEx49x.layout().gpio_claim {
            set_bits32(bit, &mut lo, &mut hi);
        }
        assert_eq!(port.regs[&(0x0480 + gpio::USE_SEL)] & lo, lo);
        assert_eq!(port.regs[&(0x0480 + gpio::USE_SEL2)] & hi, hi);
        assert_eq!(port.regs[&(0x0480 + gpio::IO_SEL)] & lo, 0);
        assert_eq!(port.regs[&(0x0480 + gpio::IO_SEL2)] & hi, 0);
    }
}
