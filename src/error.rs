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

//! Unified error handling for bayled.
//!
//! One error type covers the whole daemon. Variants follow the failure
//! taxonomy of the hardware: chipset detection mismatches are reported back
//! to the caller (the board may simply not be one of ours), while port access
//! failures and device-query failures are unrecoverable.

use std::io;

/// Result type alias using LedError
pub type Result<T> = std::result::Result<T, LedError>;

#[derive(thiserror::Error, Debug)]
pub enum LedError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ============================================================================
    // Chipset detection (non-fatal to the probe caller)
    // ============================================================================
    #[error("chipset mismatch: expected {expected:#010x}, read {found:#010x}")]
    ChipsetMismatch { expected: u32, found: u32 },

    #[error("unexpected GPIO base register pattern {raw:#010x} (reserved bits set)")]
    GpioBasePattern { raw: u32 },

    // ============================================================================
    // Hardware access (fatal)
    // ============================================================================
    #[error("port I/O failed at {port:#06x}: {source}")]
    PortAccess { port: u16, source: io::Error },

    #[error("raw port access unavailable ({path}): {source}")]
    PortGrant { path: String, source: io::Error },

    #[error("device statistics query failed: {0}")]
    DeviceQuery(String),

    // ============================================================================
    // Topology (fatal: the 4-bay hardware model is violated)
    // ============================================================================
    #[error("device {device} (bus path {path_id}, target {target_id}) matches no known bay")]
    UnknownTopology {
        device: String,
        path_id: u32,
        target_id: u32,
    },

    #[error("no monitored devices found")]
    NoDevices,

    // ============================================================================
    // Concurrency (degraded-fatal: shutdown is flagged before this is returned)
    // ============================================================================
    #[error("timed out acquiring the LED register lock")]
    LockTimeout,

    // ============================================================================
    // Configuration
    // ============================================================================
    #[error("configuration error: {0}")]
    Config(String),
}

impl LedError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a device-query error from a string
    pub fn device_query(msg: impl Into<String>) -> Self {
        Self::DeviceQuery(msg.into())
    }

    /// Whether this error is a detection signal rather than a hard failure.
    /// A mismatched chipset means the board is not one of ours; the caller
    /// decides whether that blocks startup.
    pub fn is_detection_mismatch(&self) -> bool {
        matches!(
            self,
            Self::ChipsetMismatch { .. } | Self::GpioBasePattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_mismatch_classification() {
        let e = LedError::ChipsetMismatch {
            expected: 0x2916_8086,
            found: 0xFFFF_FFFF,
        };
        assert!(e.is_detection_mismatch());

        let e = LedError::GpioBasePattern { raw: 0x8000_0000 };
        assert!(e.is_detection_mismatch());

        let e = LedError::NoDevices;
        assert!(!e.is_detection_mismatch());
    }

    #[test]
    fn test_display_formats_hex() {
        let e = LedError::ChipsetMismatch {
            expected: 0x2916_8086,
            found: 0x27B8_8086,
        };
        let msg = e.to_string();
        assert!(msg.contains("0x29168086"));
        assert!(msg.contains("0x27b88086"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let e: LedError = io_err.into();
        assert!(matches!(e, LedError::Io(_)));
    }
}
