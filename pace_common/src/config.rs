//! TOML run-configuration loader with validation.
//!
//! One file carries the explore and fast parameter sets plus the
//! radius→speed-limit table used when the velocity profile is generated.
//! Everything is validated up front; the pipeline never re-checks.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SUCTION_LIMIT_VOLTAGE;
use crate::state::RunMode;
use crate::types::PidGain;

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),
    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Parameter validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Run Parameters ─────────────────────────────────────────────────

/// Complete parameter set for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Explore or fast.
    pub mode: RunMode,
    /// Ticks between log-record emissions.
    pub log_interval_ms: u32,
    /// Explore-mode speed cap / fast-mode starting speed [m/s].
    pub limit_velocity: f32,
    /// Acceleration [m/s²], positive.
    pub acceleration: f32,
    /// Deceleration [m/s²], positive magnitude (applied negated).
    pub deceleration: f32,
    /// Linear velocity PID gains.
    pub linear_pid: PidGain,
    /// Angular velocity PID gains.
    pub angular_pid: PidGain,
    /// Line error → angular velocity PID gains.
    pub line_pid: PidGain,
    /// Braking distance after the goal marker [m].
    pub stop_distance: f32,
    /// Downforce fan target voltage [V]; 0 disables the fan.
    pub suction_voltage: f32,
}

impl RunParameters {
    /// Validate bounds. `name` labels the offending table in errors.
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.log_interval_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "{name}: log_interval_ms must be >= 1"
            )));
        }
        if self.limit_velocity <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{name}: limit_velocity must be positive"
            )));
        }
        if self.acceleration <= 0.0 || self.deceleration <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{name}: acceleration and deceleration must be positive"
            )));
        }
        if self.stop_distance <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{name}: stop_distance must be positive"
            )));
        }
        if self.suction_voltage < 0.0 || self.suction_voltage > SUCTION_LIMIT_VOLTAGE {
            return Err(ConfigError::Validation(format!(
                "{name}: suction_voltage outside [0, {SUCTION_LIMIT_VOLTAGE}]"
            )));
        }
        Ok(())
    }
}

// ─── Radius / Speed Limit Table ─────────────────────────────────────

/// One entry of the piecewise radius→speed cap table.
///
/// During profile synthesis the first entry whose `min_radius` is at least
/// the local radius supplies the cap; the last entry is the fallback for
/// straights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusSpeedLimit {
    /// Curve radius below which this cap applies [m].
    pub min_radius: f32,
    /// Speed cap for the bracket [m/s].
    pub max_velocity: f32,
}

// ─── Firmware Config ────────────────────────────────────────────────

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Exploration-lap parameters.
    pub explore: RunParameters,
    /// Fast-lap parameters.
    pub fast: RunParameters,
    /// Radius→speed caps, ordered by ascending `min_radius`.
    pub limits: Vec<RadiusSpeedLimit>,
    /// Velocity-table left shift (segments of look-ahead).
    #[serde(default)]
    pub look_ahead: u32,
}

impl FirmwareConfig {
    /// Load and validate from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Run every validation rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.explore.validate("explore")?;
        self.fast.validate("fast")?;
        if self.explore.mode != RunMode::Explore {
            return Err(ConfigError::Validation(
                "explore table must declare mode = \"explore\"".into(),
            ));
        }
        if self.fast.mode != RunMode::Fast {
            return Err(ConfigError::Validation(
                "fast table must declare mode = \"fast\"".into(),
            ));
        }
        if self.limits.is_empty() {
            return Err(ConfigError::Validation("limits table is empty".into()));
        }
        let mut prev_radius = 0.0f32;
        for (i, limit) in self.limits.iter().enumerate() {
            if limit.min_radius <= prev_radius {
                return Err(ConfigError::Validation(format!(
                    "limits[{i}]: min_radius must increase strictly"
                )));
            }
            if limit.max_velocity <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "limits[{i}]: max_velocity must be positive"
                )));
            }
            prev_radius = limit.min_radius;
        }
        Ok(())
    }
}

impl Default for FirmwareConfig {
    /// Field-tested defaults; a config file overrides them wholesale.
    fn default() -> Self {
        Self {
            explore: RunParameters {
                mode: RunMode::Explore,
                log_interval_ms: 10,
                limit_velocity: 1.0,
                acceleration: 1.0,
                deceleration: 1.0,
                linear_pid: PidGain::new(5.0, 0.01, 0.0),
                angular_pid: PidGain::new(0.3, 0.05, 0.0),
                line_pid: PidGain::new(26.0, 0.0, 0.02),
                stop_distance: 0.1,
                suction_voltage: 1.0,
            },
            fast: RunParameters {
                mode: RunMode::Fast,
                log_interval_ms: 10,
                limit_velocity: 2.0,
                acceleration: 8.0,
                deceleration: 10.0,
                linear_pid: PidGain::new(5.0, 0.01, 0.0),
                angular_pid: PidGain::new(0.3, 0.05, 0.0),
                line_pid: PidGain::new(26.0, 0.0, 0.02),
                stop_distance: 0.3,
                suction_voltage: 3.0,
            },
            limits: vec![
                RadiusSpeedLimit { min_radius: 0.2, max_velocity: 1.0 },
                RadiusSpeedLimit { min_radius: 0.5, max_velocity: 1.5 },
                RadiusSpeedLimit { min_radius: 1.0, max_velocity: 2.0 },
                RadiusSpeedLimit { min_radius: 5.0, max_velocity: 3.0 },
            ],
            look_ahead: 0,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        FirmwareConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = FirmwareConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back = FirmwareConfig::from_toml(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn zero_acceleration_rejected() {
        let mut config = FirmwareConfig::default();
        config.fast.acceleration = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unordered_limits_rejected() {
        let mut config = FirmwareConfig::default();
        config.limits[1].min_radius = 0.1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_limits_rejected() {
        let mut config = FirmwareConfig::default();
        config.limits.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn fan_voltage_over_limit_rejected() {
        let mut config = FirmwareConfig::default();
        config.explore.suction_voltage = 5.0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn mode_mismatch_rejected() {
        let mut config = FirmwareConfig::default();
        config.explore.mode = RunMode::Fast;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
