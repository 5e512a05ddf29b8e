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

//! Board variant descriptors.
//!
//! Four boards share this daemon. They differ only in the LPC bridge PCI id,
//! in which register space carries the drive LEDs, and in the bit maps. One
//! descriptor per board feeds the single generic LED driver; there are no
//! per-variant code paths.
//!
//! Drive LED bits for the super-I/O family are encoded as
//! `register << 4 | bit` against the SCH5127 GP data registers. Chassis LED
//! bits are plain southbridge GPIO bit numbers on every board.

use serde::{Deserialize, Serialize};

use crate::disks::MAX_BAYS;

/// Which register space carries the per-drive LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterFamily {
    /// Southbridge GPIO level registers, active-low.
    Gpio,
    /// SCH5127 general-purpose data registers, active-high.
    SioGp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardVariant {
    /// HP MediaSmart EX48x/EX49x (default).
    HpEx49x,
    /// Acer Altos easyStore.
    AcerAltos,
    /// Lenovo/Acer H340.
    H340,
    /// Lenovo H341/H342.
    H341,
}

/// Per-variant LED bit maps and register-space selector.
pub struct LedLayout {
    /// Expected LPC bridge vendor/device dword at PCI 0:31.0 register 0x00.
    pub pci_id: u32,
    pub family: RegisterFamily,
    /// Blue activity LED per bay, bay order 1..=4.
    pub blue: [u8; MAX_BAYS],
    /// Red fault/activity LED per bay, bay order 1..=4.
    pub red: [u8; MAX_BAYS],
    /// Chassis (front panel) indicator, blink capable. Always GPIO bits.
    pub chassis_blue: u8,
    pub chassis_red: u8,
    /// GPIO bits to claim as outputs at initialization: the chassis pair,
    /// USB/power indicators, and (GPIO family only) the drive LEDs.
    pub gpio_claim: &'static [u8],
}

// ISA bridge: Intel 82801IR (ICH9R) LPC Interface Controller [8086:2916]
const ID_ICH9R: u32 = 0x2916_8086;
// ISA bridge: Intel 82801GB (ICH7) LPC Interface Controller [8086:27b8]
const ID_ICH7: u32 = 0x27B8_8086;

static HPEX49X: LedLayout = LedLayout {
    pci_id: ID_ICH9R,
    family: RegisterFamily::Gpio,
    blue: [22, 21, 13, 57],
    red: [4, 5, 38, 39],
    chassis_blue: 28,
    chassis_red: 27,
    // drive LEDs, USB device indicator, chassis pair
    gpio_claim: &[22, 21, 13, 57, 4, 5, 38, 39, 7, 28, 27],
};

static ACER_ALTOS: LedLayout = LedLayout {
    pci_id: ID_ICH7,
    family: RegisterFamily::SioGp,
    blue: [0x14, 0x50, 0x52, 0x56],
    red: [0x11, 0x51, 0x53, 0x57],
    chassis_blue: 20,
    chassis_red: 24,
    // USB device, USB LED, power LED, chassis pair
    gpio_claim: &[6, 27, 25, 20, 24],
};

static H340: LedLayout = LedLayout {
    pci_id: ID_ICH7,
    family: RegisterFamily::SioGp,
    blue: [0x56, 0x52, 0x50, 0x14],
    red: [0x57, 0x53, 0x51, 0x11],
    chassis_blue: 20,
    chassis_red: 24,
    gpio_claim: &[6, 27, 25, 20, 24],
};

static H341: LedLayout = LedLayout {
    pci_id: ID_ICH9R,
    family: RegisterFamily::SioGp,
    blue: [0x4B, 0x4C, 0x52, 0x50],
    red: [0x59, 0x58, 0x4E, 0x51],
    chassis_blue: 10,
    chassis_red: 24,
    gpio_claim: &[6, 18, 27, 24, 10],
};

impl BoardVariant {
    pub fn layout(self) -> &'static LedLayout {
        match self {
            BoardVariant::HpEx49x => &HPEX49X,
            BoardVariant::AcerAltos => &ACER_ALTOS,
            BoardVariant::H340 => &H340,
            BoardVariant::H341 => &H341,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BoardVariant::HpEx49x => "HP MediaSmart EX48x/EX49x",
            BoardVariant::AcerAltos => "Acer Altos easyStore",
            BoardVariant::H340 => "Lenovo H340",
            BoardVariant::H341 => "Lenovo H341/H342",
        }
    }

    pub const ALL: [BoardVariant; 4] = [
        BoardVariant::HpEx49x,
        BoardVariant::AcerAltos,
        BoardVariant::H340,
        BoardVariant::H341,
    ];
}

impl Default for BoardVariant {
    fn default() -> Self {
        BoardVariant::HpEx49x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bit_assignments_distinct_per_variant() {
        for variant in BoardVariant::ALL {
            let layout = variant.layout();
            let mut seen = HashSet::new();
            for bit in layout.blue.iter().chain(layout.red.iter()) {
                assert!(
                    seen.insert(*bit),
                    "{}: duplicate LED bit {:#04x}",
                    variant.name(),
                    bit
                );
            }
        }
    }

    #[test]
    fn test_family_selection() {
        assert_eq!(BoardVariant::HpEx49x.layout().family, RegisterFamily::Gpio);
        assert_eq!(
            BoardVariant::AcerAltos.layout().family,
            RegisterFamily::SioGp
        );
        assert_eq!(BoardVariant::H340.layout().family, RegisterFamily::SioGp);
        assert_eq!(BoardVariant::H341.layout().family, RegisterFamily::SioGp);
    }

    #[test]
    fn test_pci_ids() {
        assert_eq!(BoardVariant::HpEx49x.layout().pci_id, 0x2916_8086);
        assert_eq!(BoardVariant::AcerAltos.layout().pci_id, 0x27B8_8086);
        assert_eq!(BoardVariant::H340.layout().pci_id, 0x27B8_8086);
        assert_eq!(BoardVariant::H341.layout().pci_id, 0x2916_8086);
    }

    #[test]
    fn test_sio_gp_bits_decode_to_valid_registers() {
        // encoded as reg << 4 | bit: register index must land in GP1..GP6
        for variant in [BoardVariant::AcerAltos, BoardVariant::H340, BoardVariant::H341] {
            let layout = variant.layout();
            for bit in layout.blue.iter().chain(layout.red.iter()) {
                let reg = (bit >> 4) as i32 - 1;
                assert!(
                    (0..6).contains(&reg),
                    "{}: bit {:#04x} decodes outside GP1..GP6",
                    variant.name(),
                    bit
                );
                // masks go through 32-bit accesses, so up to 16 bit positions fit
                assert!((bit & 0xF) < 16);
            }
        }
    }

    #[test]
    fn test_chassis_bits_fit_first_gpio_bank() {
        for variant in BoardVariant::ALL {
            let layout = variant.layout();
            assert!(layout.chassis_blue < 32);
            assert!(layout.chassis_red < 32);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&BoardVariant::AcerAltos).unwrap();
        assert_eq!(json, "\"acer-altos\"");
        let back: BoardVariant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BoardVariant::AcerAltos);
    }
}
