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

//! LED driver.
//!
//! One driver serves all board variants: the active [`LedLayout`] decides
//! whether a drive LED bit lands in the southbridge GPIO level registers
//! (active-low) or in the SCH5127 general-purpose data registers
//! (active-high, `register << 4 | bit` encoding). Chassis LEDs are GPIO
//! bits on every board and are the only blink-capable outputs.
//!
//! All register traffic is serialized through one mutex. Acquisition is
//! bounded: a timeout means a peer thread wedged mid-transaction, the
//! register space can no longer be trusted, and the whole daemon is asked
//! to stop.
//!
//! [`LedLayout`]: crate::variant::LedLayout

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::chipset::{gpio, sio, HardwareContext};
use crate::disks::{DriveSlot, MAX_BAYS};
use crate::error::{LedError, Result};
use crate::portio::{apply_bits, PortIo};
use crate::supervisor::RunFlags;
use crate::variant::{BoardVariant, RegisterFamily};

/// Bounded wait for the register lock. Register transactions are a handful
/// of port cycles; anything that holds the lock longer than this is wedged.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// PWM3 duty cycle per brightness level 0..=9, written through the SCH5127
/// hardware-monitor index/data pair.
const BRIGHTNESS_DUTY: [u8; 10] = [
    0x00, 0xBE, 0xC3, 0xCB, 0xD3, 0xDB, 0xE3, 0xEB, 0xF3, 0xFF,
];

// Hardware-monitor register holding the PWM3 current duty cycle.
const HWM_PWM3_DUTY_CYCLE: u8 = 0x32;

/// Which LED(s) of a pair an operation addresses. `Both` lights blue and
/// red together (purple on the real chassis).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedColor {
    Blue,
    Red,
    Both,
}

impl LedColor {
    fn has_blue(self) -> bool {
        matches!(self, LedColor::Blue | LedColor::Both)
    }

    fn has_red(self) -> bool {
        matches!(self, LedColor::Red | LedColor::Both)
    }
}

/// Target state for a chassis LED. Drive LEDs only know on/off; blinking
/// is done in software by the monitor tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedState {
    Off,
    On,
    Blink,
}

struct LedHardware {
    io: Box<dyn PortIo>,
    /// Populated by `initialize`; `None` until the first successful probe.
    ctx: Option<HardwareContext>,
}

/// Shared LED register driver. One instance per process, shared across the
/// monitor tasks and the supervisor.
pub struct LedController {
    inner: Mutex<LedHardware>,
    flags: Arc<RunFlags>,
}

impl LedController {
    pub fn new(io: Box<dyn PortIo>, flags: Arc<RunFlags>) -> Self {
        LedController {
            inner: Mutex::new(LedHardware { io, ctx: None }),
            flags,
        }
    }

    /// Probe the chipset for `variant` and claim its LED pins as outputs.
    /// Must succeed before any LED operation; also re-run after a topology
    /// rebuild so the register bases are re-derived from scratch.
    pub fn initialize(&self, variant: BoardVariant) -> Result<()> {
        let mut hw = self.lock()?;
        let ctx = HardwareContext::probe(hw.io.as_mut(), variant)?;
        ctx.claim_led_outputs(hw.io.as_mut())?;
        hw.ctx = Some(ctx);
        info!(board = variant.name(), "LED hardware initialized");
        Ok(())
    }

    /// Switch a drive-bay LED on or off through the active variant's
    /// register family.
    pub fn set_drive_led(&self, color: LedColor, on: bool, slot: &DriveSlot) -> Result<()> {
        let mut hw = self.lock()?;
        let ctx = Self::context(&hw)?;
        if color.has_blue() {
            drive_bit(hw.io.as_mut(), &ctx, slot.blue, on)?;
        }
        if color.has_red() {
            drive_bit(hw.io.as_mut(), &ctx, slot.red, on)?;
        }
        Ok(())
    }

    /// Drive the front-panel chassis LED pair. `Blink` hands the pin to the
    /// southbridge blink generator; `On`/`Off` take it back and set the
    /// level directly.
    pub fn set_chassis_led(&self, color: LedColor, state: LedState) -> Result<()> {
        let mut hw = self.lock()?;
        let ctx = Self::context(&hw)?;
        let layout = ctx.variant.layout();

        let lit = state == LedState::On;
        if color.has_blue() {
            gpio_level(hw.io.as_mut(), &ctx, layout.chassis_blue, !lit)?;
        }
        if color.has_red() {
            gpio_level(hw.io.as_mut(), &ctx, layout.chassis_red, !lit)?;
        }

        let mut mask = 0u32;
        if color.has_blue() {
            mask |= 1 << layout.chassis_blue;
        }
        if color.has_red() {
            mask |= 1 << layout.chassis_red;
        }
        apply_bits(
            hw.io.as_mut(),
            ctx.gpio_base + gpio::BLINK,
            mask,
            state == LedState::Blink,
        )
    }

    /// Set the LED brightness, 0 (dark) to 9 (full). Out-of-range values
    /// clamp to full.
    pub fn set_brightness(&self, level: u8) -> Result<()> {
        let level = usize::from(level).min(BRIGHTNESS_DUTY.len() - 1);
        let mut hw = self.lock()?;
        let ctx = Self::context(&hw)?;
        hw.io
            .write8(ctx.sio_runtime_base + sio::HWM_INDEX, HWM_PWM3_DUTY_CYCLE)?;
        hw.io
            .write8(ctx.sio_runtime_base + sio::HWM_DATA, BRIGHTNESS_DUTY[level])?;
        debug!(level, duty = BRIGHTNESS_DUTY[level], "LED brightness set");
        Ok(())
    }

    /// Best-effort extinguish of every LED the daemon may have touched:
    /// all four bay pairs and the chassis pair. Used on the way out and
    /// between monitor generations; never fails the shutdown path.
    pub fn force_all_off(&self) {
        let Some(mut hw) = self.inner.try_lock_for(LOCK_TIMEOUT) else {
            warn!("LED register lock unavailable; leaving LED state as-is");
            return;
        };
        let Some(ctx) = hw.ctx else {
            return;
        };
        let layout = ctx.variant.layout();

        for bay in 0..MAX_BAYS {
            for bit in [layout.blue[bay], layout.red[bay]] {
                if let Err(e) = drive_bit(hw.io.as_mut(), &ctx, bit, false) {
                    warn!(bay = bay + 1, error = %e, "failed to clear bay LED");
                }
            }
        }

        let chassis = (1u32 << layout.chassis_blue) | (1u32 << layout.chassis_red);
        for (offset, raised) in [(gpio::BLINK, false), (gpio::LVL, true)] {
            // level registers idle high (off) for the chassis pair
            let port = ctx.gpio_base + offset;
            if let Err(e) = apply_bits(hw.io.as_mut(), port, chassis, raised) {
                warn!(port = format_args!("{port:#06x}"), error = %e, "failed to clear chassis LED");
            }
        }
    }

    fn context(hw: &LedHardware) -> Result<HardwareContext> {
        hw.ctx
            .ok_or_else(|| LedError::config("LED controller used before hardware initialization"))
    }

    /// Acquire the register lock within [`LOCK_TIMEOUT`]. On timeout the
    /// register space is considered corrupt and process shutdown is flagged
    /// before the error is returned.
    fn lock(&self) -> Result<MutexGuard<'_, LedHardware>> {
        match self.inner.try_lock_for(LOCK_TIMEOUT) {
            Some(guard) => Ok(guard),
            None => {
                error!(
                    "LED register lock not acquired within {:?}; requesting shutdown",
                    LOCK_TIMEOUT
                );
                self.flags.request_terminate();
                Err(LedError::LockTimeout)
            }
        }
    }
}

/// Route one drive LED bit through the variant's register family.
fn drive_bit(io: &mut dyn PortIo, ctx: &HardwareContext, bit: u8, on: bool) -> Result<()> {
    match ctx.variant.layout().family {
        // southbridge GPIO levels are active-low
        RegisterFamily::Gpio => gpio_level(io, ctx, bit, !on),
        RegisterFamily::SioGp => {
            let reg = u16::from((bit >> 4) & 0xF) - 1;
            apply_bits(
                io,
                ctx.sio_runtime_base + sio::GP1 + reg,
                1 << (bit & 0xF),
                on,
            )
        }
    }
}

/// Raise or drop one southbridge GPIO level bit, picking the register bank
/// by bit number.
fn gpio_level(io: &mut dyn PortIo, ctx: &HardwareContext, bit: u8, raised: bool) -> Result<()> {
    let offset = if bit < 32 { gpio::LVL } else { gpio::LVL2 };
    apply_bits(io, ctx.gpio_base + offset, 1 << (bit % 32), raised)
}
