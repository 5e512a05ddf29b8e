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

//! Per-bay drive activity monitors.
//!
//! One task per occupied bay. Each task polls the shared statistics
//! provider, diffs the byte counters of its own disk against the previous
//! sample, and translates the delta into LED transitions:
//!
//!   read + write  -> blue on, red off, with an off/on pulse when the LED
//!                    is already lit so back-to-back activity stays visible
//!   read only     -> blue and red together (purple)
//!   write only    -> blue on, red off
//!   idle          -> after [`IDLE_DELAY`], both off
//!
//! Tasks never decide process fate on their own: every exit condition is
//! raised through [`RunFlags`] and the supervisor reacts.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::disks::{DriveSlot, PollOutcome, StatsProvider};
use crate::error::{LedError, Result};
use crate::leds::{LedColor, LedController};
use crate::supervisor::RunFlags;

/// Pacing delay after an LED transition; also the width of the off pulse
/// between back-to-back activity samples.
pub const BLINK_DELAY: Duration = Duration::from_micros(8_500);

/// Sampling delay while the disk is idle.
pub const IDLE_DELAY: Duration = Duration::from_millis(50);

/// What one counter delta says the disk was doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Activity {
    Both,
    ReadOnly,
    WriteOnly,
    Idle,
}

fn classify(prev: (u64, u64), cur: (u64, u64)) -> Activity {
    match (cur.0 > prev.0, cur.1 > prev.1) {
        (true, true) => Activity::Both,
        (true, false) => Activity::ReadOnly,
        (false, true) => Activity::WriteOnly,
        (false, false) => Activity::Idle,
    }
}

/// Monitor task for one bay. Consumed by [`DriveMonitor::spawn`] or, in
/// tests, driven to completion with [`DriveMonitor::run`].
pub struct DriveMonitor {
    slot: DriveSlot,
    stats: Arc<Mutex<dyn StatsProvider>>,
    leds: Arc<LedController>,
    flags: Arc<RunFlags>,
    /// Pool generation this task belongs to. A detached thread from an
    /// earlier generation sees a stale stamp and stays stopped even after
    /// the supervisor clears the pool flag for a rebuild.
    generation: u64,
}

impl DriveMonitor {
    pub fn new(
        slot: DriveSlot,
        stats: Arc<Mutex<dyn StatsProvider>>,
        leds: Arc<LedController>,
        flags: Arc<RunFlags>,
    ) -> Self {
        let generation = flags.generation();
        DriveMonitor {
            slot,
            stats,
            leds,
            flags,
            generation,
        }
    }

    /// Run on a named thread; the name shows up in journal output.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("bay{}", self.slot.slot))
            .spawn(move || self.run())
    }

    pub fn run(self) {
        debug!(
            device = self.slot.device.as_str(),
            bay = self.slot.slot,
            "monitor task started"
        );

        let mut last_read = self.slot.bytes_read;
        let mut last_write = self.slot.bytes_written;
        let mut lit = false;

        loop {
            if self.flags.stop_requested_for(self.generation) {
                break;
            }

            let sample = {
                let mut provider = self.stats.lock();
                // re-check under the lock: a peer may have flagged, or the
                // pool may have been rebuilt, while we waited
                if self.flags.stop_requested_for(self.generation) {
                    break;
                }
                match provider.poll() {
                    Ok(PollOutcome::Unchanged(snapshot)) => snapshot
                        .disks
                        .iter()
                        .find(|d| {
                            d.path_id == self.slot.path_id && d.target_id == self.slot.target_id
                        })
                        .map(|d| (d.bytes_read, d.bytes_written)),
                    Ok(PollOutcome::TopologyChanged) => {
                        info!(
                            bay = self.slot.slot,
                            "device set changed; stopping monitor pool for rebuild"
                        );
                        self.flags.flag_topology_change();
                        break;
                    }
                    Err(e) => {
                        error!(bay = self.slot.slot, error = %e, "device statistics query failed");
                        self.flags.flag_fatal();
                        break;
                    }
                }
            };

            let Some((read, written)) = sample else {
                warn!(
                    device = self.slot.device.as_str(),
                    bay = self.slot.slot,
                    "monitored device no longer present"
                );
                self.flags.flag_topology_change();
                break;
            };

            match classify((last_read, last_write), (read, written)) {
                Activity::Both => {
                    last_read = read;
                    last_write = written;
                    // a lit LED needs an off edge for the pulse to be visible
                    if lit {
                        if self.set(LedColor::Blue, false).is_err() {
                            break;
                        }
                        thread::sleep(BLINK_DELAY);
                    }
                    if self.set(LedColor::Blue, true).is_err()
                        || self.set(LedColor::Red, false).is_err()
                    {
                        break;
                    }
                    lit = true;
                    thread::sleep(BLINK_DELAY);
                }
                Activity::ReadOnly => {
                    last_read = read;
                    if self.set(LedColor::Blue, true).is_err()
                        || self.set(LedColor::Red, true).is_err()
                    {
                        break;
                    }
                    lit = true;
                    thread::sleep(BLINK_DELAY);
                }
                Activity::WriteOnly => {
                    last_write = written;
                    if self.set(LedColor::Blue, true).is_err()
                        || self.set(LedColor::Red, false).is_err()
                    {
                        break;
                    }
                    lit = true;
                    thread::sleep(BLINK_DELAY);
                }
                Activity::Idle => {
                    thread::sleep(IDLE_DELAY);
                    if lit {
                        if self.set(LedColor::Both, false).is_err() {
                            break;
                        }
                        lit = false;
                    }
                }
            }
        }

        debug!(bay = self.slot.slot, "monitor task stopped");
    }

    /// LED write with failure escalation. A lock timeout has already flagged
    /// shutdown inside the controller; anything else is a hardware fault.
    fn set(&self, color: LedColor, on: bool) -> Result<()> {
        self.leds.set_drive_led(color, on, &self.slot).map_err(|e| {
            if !matches!(e, LedError::LockTimeout) {
                error!(bay = self.slot.slot, error = %e, "LED write failed");
                self.flags.flag_fatal();
            }
            e
        })
    }
}
