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

//! Supervisor loop and shared run flags.
//!
//! The supervisor owns the monitor pool lifecycle: probe the chipset,
//! enumerate the bays, spawn one monitor task per occupied bay, wait for
//! the pool to drain, then decide from the flags whether to rebuild (a
//! disk came or went), exit cleanly (signal), or fail (hardware or query
//! fault). LEDs are forced off between generations and on every exit
//! path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::disks::{build_slots, StatsProvider};
use crate::error::{LedError, Result};
use crate::leds::{LedColor, LedController, LedState};
use crate::monitor::DriveMonitor;
use crate::variant::BoardVariant;

/// How long a monitor task gets to notice the stop flag before its thread
/// is abandoned. Tasks sleep at most [`crate::monitor::IDLE_DELAY`] between
/// flag checks, so this is generous.
pub const JOIN_WAIT: Duration = Duration::from_secs(2);

const JOIN_POLL: Duration = Duration::from_millis(25);

/// Shared run-state flags. `stop_pool` drains the current monitor
/// generation; the other three tell the supervisor why it drained. The
/// generation stamp keeps a detached task from ever rejoining a rebuilt
/// pool: clearing `stop_pool` for the next generation must not revive a
/// thread the supervisor already gave up on.
#[derive(Debug, Default)]
pub struct RunFlags {
    stop_pool: AtomicBool,
    topology: AtomicBool,
    terminate: AtomicBool,
    fatal: AtomicBool,
    generation: AtomicU64,
}

impl RunFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current monitor generation should wind down.
    pub fn stop_requested(&self) -> bool {
        self.stop_pool.load(Ordering::SeqCst)
    }

    /// Stamp of the pool generation being built or drained. Each monitor
    /// task captures this at construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stop condition for a task stamped with `generation`: the pool is
    /// draining, or the task's generation is no longer the current one.
    pub fn stop_requested_for(&self, generation: u64) -> bool {
        self.stop_pool.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
    }

    pub fn topology_changed(&self) -> bool {
        self.topology.load(Ordering::SeqCst)
    }

    pub fn terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub fn fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Ask the whole process to stop. Signal handlers and the LED lock
    /// watchdog come through here; async-signal-safe.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.stop_pool.store(true, Ordering::SeqCst);
    }

    /// A disk appeared or disappeared: drain the pool and rebuild.
    pub fn flag_topology_change(&self) {
        self.topology.store(true, Ordering::SeqCst);
        self.stop_pool.store(true, Ordering::SeqCst);
    }

    /// Unrecoverable hardware or query fault: drain and exit non-zero.
    pub fn flag_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
        self.terminate.store(true, Ordering::SeqCst);
        self.stop_pool.store(true, Ordering::SeqCst);
    }

    /// Advance the generation stamp and reset the per-generation flags
    /// before (re)building the pool. `terminate` and `fatal` are sticky;
    /// the stamp bump keeps any task from the previous generation stopped.
    fn begin_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_pool.store(false, Ordering::SeqCst);
        self.topology.store(false, Ordering::SeqCst);
    }
}

pub struct Supervisor {
    leds: Arc<LedController>,
    stats: Arc<Mutex<dyn StatsProvider>>,
    flags: Arc<RunFlags>,
    variant: BoardVariant,
    brightness: u8,
}

impl Supervisor {
    pub fn new(
        leds: Arc<LedController>,
        stats: Arc<Mutex<dyn StatsProvider>>,
        flags: Arc<RunFlags>,
        config: &Config,
    ) -> Self {
        Supervisor {
            leds,
            stats,
            flags,
            variant: config.variant,
            brightness: config.brightness,
        }
    }

    /// Run monitor generations until a signal or a fatal fault. Every
    /// initialization step repeats on rebuild, so a hot-swapped disk gets
    /// the full probe-claim-enumerate treatment.
    pub fn run(&self) -> Result<()> {
        loop {
            self.flags.begin_generation();

            self.leds.initialize(self.variant)?;
            self.leds.set_brightness(self.brightness)?;

            let snapshot = self.stats.lock().rescan()?;
            let slots = build_slots(&snapshot, self.variant.layout())?;

            // the health indicator belongs to us now; start from dark
            self.leds.set_chassis_led(LedColor::Both, LedState::Off)?;

            let mut handles = Vec::with_capacity(slots.len());
            for slot in slots {
                let bay = slot.slot;
                let monitor = DriveMonitor::new(
                    slot,
                    Arc::clone(&self.stats),
                    Arc::clone(&self.leds),
                    Arc::clone(&self.flags),
                );
                handles.push((bay, monitor.spawn()?));
            }
            info!("monitoring {} occupied bays", handles.len());

            for (bay, handle) in handles {
                self.reap(bay, handle);
            }
            self.leds.force_all_off();

            if self.flags.fatal() {
                return Err(LedError::device_query(
                    "a monitor task reported an unrecoverable failure",
                ));
            }
            if self.flags.terminating() {
                info!("shutdown requested; exiting supervisor loop");
                return Ok(());
            }
            if self.flags.topology_changed() {
                info!("device topology changed; reinitializing");
                continue;
            }
            // no flag should be able to get us here
            warn!("monitor pool drained without a flag; reinitializing");
        }
    }

    /// Wait for one monitor thread. Blocks indefinitely while the pool is
    /// healthy; once a stop is requested the wait is bounded and a wedged
    /// thread is abandoned rather than hanging shutdown.
    fn reap(&self, bay: usize, handle: JoinHandle<()>) {
        let mut deadline: Option<Instant> = None;
        loop {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(bay, "monitor task panicked");
                }
                return;
            }
            if self.flags.stop_requested() {
                let d = *deadline.get_or_insert_with(|| Instant::now() + JOIN_WAIT);
                if Instant::now() >= d {
                    warn!(bay, "monitor task unresponsive after {:?}; detaching", JOIN_WAIT);
                    return;
                }
            }
            thread::sleep(JOIN_POLL);
        }
    }
}
