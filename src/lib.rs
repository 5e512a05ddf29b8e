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

//! Drive-bay LED control for HP MediaSmart EX48x/EX49x class home servers
//! (and the Acer Altos / Lenovo H340/H341 boards sharing the chassis
//! design). Maps disk activity read from sysfs onto the bay LEDs through
//! raw port I/O against the southbridge GPIO bank and the SCH5127
//! super-I/O controller.

pub mod chipset;
pub mod config;
pub mod disks;
pub mod error;
pub mod leds;
pub mod monitor;
pub mod portio;
pub mod supervisor;
pub mod variant;

#[cfg(test)]
pub mod test_utils;
