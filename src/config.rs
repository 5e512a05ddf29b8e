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

//! Daemon configuration.
//!
//! A single optional JSON file selects the board variant and LED
//! brightness. A missing file means defaults; a malformed file is an
//! error, not a silent fallback.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedError, Result};
use crate::variant::BoardVariant;

pub const CONFIG_PATH: &str = "/etc/bayled/config.json";

const DEFAULT_BRIGHTNESS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Board variant to probe for.
    pub variant: BoardVariant,
    /// LED brightness 0..=9, programmed at each (re)initialization.
    pub brightness: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            variant: BoardVariant::default(),
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| LedError::config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| LedError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.brightness > 9 {
            return Err(LedError::config(format!(
                "brightness {} out of range 0..=9",
                self.brightness
            )));
        }
        Ok(())
    }
}
