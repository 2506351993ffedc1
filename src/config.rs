//! Camera configuration.
//!
//! Loaded from (in order of precedence):
//! 1. Environment variables prefixed with `RAWCAM_`
//! 2. A TOML file
//!
//! Every field has a default, so an empty file or no file at all is valid.
//!
//! ```text
//! device_index = 0
//! completion_buffer_ms = 2000
//! bulb_settle_ms = 500
//! log_level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};
use crate::exposure::Timing;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_TIMING_MS: u64 = 60_000;

/// Runtime settings for a [`crate::Camera`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Index of the enumerated device to open.
    pub device_index: u32,
    /// Extra wait after a timed exposure before checking for the image.
    pub completion_buffer_ms: u64,
    /// Wait between bulb-stop and the completion check.
    pub bulb_settle_ms: u64,
    /// Default log filter used by the binary.
    pub log_level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            completion_buffer_ms: 2_000,
            bulb_settle_ms: 500,
            log_level: "info".to_owned(),
        }
    }
}

impl CameraConfig {
    /// Load from `path`, then apply `RAWCAM_` environment overrides.
    ///
    /// A missing file is treated as empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("RAWCAM_")),
        )
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|err| CameraError::Config(Box::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CameraError::InvalidConfig(format!(
                "invalid log_level '{}', expected one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if self.completion_buffer_ms > MAX_TIMING_MS {
            return Err(CameraError::InvalidConfig(format!(
                "completion_buffer_ms {} exceeds {MAX_TIMING_MS}",
                self.completion_buffer_ms
            )));
        }
        if self.bulb_settle_ms == 0 || self.bulb_settle_ms > MAX_TIMING_MS {
            return Err(CameraError::InvalidConfig(format!(
                "bulb_settle_ms must be within 1..={MAX_TIMING_MS}, got {}",
                self.bulb_settle_ms
            )));
        }
        Ok(())
    }

    /// Timing constants for the exposure state machine.
    pub const fn timing(&self) -> Timing {
        Timing {
            completion_buffer: Duration::from_millis(self.completion_buffer_ms),
            bulb_settle: Duration::from_millis(self.bulb_settle_ms),
        }
    }
}
