//! Engine Configuration
//!
//! Host-supplied options fixed for the lifetime of an engine instance.
//! Serializable with `serde`, with JSON helpers for loading from files or
//! command-line tooling.

use serde::{Deserialize, Serialize};

use crate::family::{Family, FamilyConfig};
use crate::{FmError, Result};

/// Number of bytes describing one OPLL instrument
pub const OPLL_INSTRUMENT_BYTES: usize = 8;

/// Number of preset instruments an OPLL table holds (instruments 1-15)
pub const OPLL_PRESETS: usize = 15;

/// How long the busy flag stays set after a register write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyTiming {
    /// Never report busy
    None,
    /// Busy for the given number of output samples
    Samples(u32),
}

impl BusyTiming {
    /// Default busy duration for a family
    pub fn default_for(family: Family) -> Self {
        let config = family.config();
        if config.status.busy == 0 {
            BusyTiming::None
        } else {
            BusyTiming::Samples(1)
        }
    }
}

/// Timer reload behaviour on expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// Reload the period and keep counting
    #[default]
    Repeat,
    /// Stop after the first expiry until reloaded by a write
    OneShot,
}

/// Options for constructing an [`Engine`](crate::engine::Engine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chip family
    pub family: Family,
    /// Prescale override (must be one the family supports)
    #[serde(default)]
    pub prescale: Option<u32>,
    /// Busy flag duration; defaults per family when absent
    #[serde(default)]
    pub busy: Option<BusyTiming>,
    /// Timer reload behaviour
    #[serde(default)]
    pub timer_mode: TimerMode,
    /// OPLL preset instruments 1-15, 8 bytes each
    #[serde(default)]
    pub instruments: Option<Vec<[u8; OPLL_INSTRUMENT_BYTES]>>,
}

impl EngineConfig {
    /// Default configuration for a family
    pub fn new(family: Family) -> Self {
        EngineConfig {
            family,
            prescale: None,
            busy: None,
            timer_mode: TimerMode::Repeat,
            instruments: None,
        }
    }

    /// Set a prescale override
    pub fn with_prescale(mut self, prescale: u32) -> Self {
        self.prescale = Some(prescale);
        self
    }

    /// Set the busy timing
    pub fn with_busy(mut self, busy: BusyTiming) -> Self {
        self.busy = Some(busy);
        self
    }

    /// Set the timer reload mode
    pub fn with_timer_mode(mut self, mode: TimerMode) -> Self {
        self.timer_mode = mode;
        self
    }

    /// Supply the OPLL preset instrument table
    pub fn with_instruments(mut self, instruments: Vec<[u8; OPLL_INSTRUMENT_BYTES]>) -> Self {
        self.instruments = Some(instruments);
        self
    }

    /// Family constants for this configuration
    pub fn family_config(&self) -> FamilyConfig {
        self.family.config()
    }

    /// Effective prescale after applying the override
    pub fn effective_prescale(&self) -> u32 {
        self.prescale.unwrap_or_else(|| self.family_config().default_prescale)
    }

    /// Effective busy timing after applying the family default
    pub fn effective_busy(&self) -> BusyTiming {
        self.busy.unwrap_or_else(|| BusyTiming::default_for(self.family))
    }

    /// Check the configuration against the family constants
    pub fn validate(&self) -> Result<()> {
        let config = self.family_config();
        config.validate()?;

        let prescale = self.effective_prescale();
        if !config.prescale_options.contains(&prescale) {
            return Err(FmError::Config(format!(
                "{}: prescale {} not supported (expected one of {:?})",
                config.name, prescale, config.prescale_options
            )));
        }

        if let Some(instruments) = &self.instruments {
            if self.family != Family::Opll {
                return Err(FmError::Config(format!(
                    "{}: instrument tables only apply to YM2413",
                    config.name
                )));
            }
            if instruments.len() != OPLL_PRESETS {
                return Err(FmError::Config(format!(
                    "instrument table needs {} entries, got {}",
                    OPLL_PRESETS,
                    instruments.len()
                )));
            }
        }
        Ok(())
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| FmError::Config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FmError::Config(format!("failed to serialize engine config: {}", e)))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Family::Opn2)
    }
}
