//! Engine configuration
//!
//! Athlete thresholds and every tunable of the scoring and load model. All
//! sections deserialize from JSON with per-field defaults, so a config file
//! only needs to name the values it overrides.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Athlete threshold values used to derive intensity factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Functional threshold power for cycling (watts)
    pub cycling_ftp_watts: f64,
    /// Running threshold pace (seconds per km)
    pub running_threshold_pace_sec_per_km: f64,
    /// Swim threshold pace (seconds per 100 m)
    pub swim_threshold_pace_sec_per_100m: f64,
    /// Lactate threshold heart rate (bpm)
    pub threshold_heart_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cycling_ftp_watts: 300.0,
            running_threshold_pace_sec_per_km: 256.0,
            swim_threshold_pace_sec_per_100m: 100.0,
            threshold_heart_rate: 165.0,
        }
    }
}

/// Stress points per hour for the duration-only tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationRates {
    pub running: f64,
    pub cycling: f64,
    pub swimming: f64,
    /// Gym and strength sessions (generic and fitness-equipment sports)
    pub gym: f64,
    pub other: f64,
}

impl Default for DurationRates {
    fn default() -> Self {
        Self {
            running: 80.0,
            cycling: 60.0,
            swimming: 70.0,
            gym: 25.0,
            other: 50.0,
        }
    }
}

/// Stress score formula parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Upper clamp applied to every tier's result
    pub max_score: f64,
    pub running_if_exponent: f64,
    /// Cubic by default; some variants of the model use 2
    pub swim_if_exponent: f64,
    pub heart_rate_exponent: f64,
    /// Below this distance a run falls through to the heart-rate tier
    pub min_running_distance_m: f64,
    pub min_swim_distance_m: f64,
    pub duration_rates: DurationRates,
    /// Use the score stored by the recording device when present
    pub prefer_device_score: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            max_score: 500.0,
            running_if_exponent: 2.0,
            swim_if_exponent: 3.0,
            heart_rate_exponent: 2.0,
            min_running_distance_m: 100.0,
            min_swim_distance_m: 25.0,
            duration_rates: DurationRates::default(),
            prefer_device_score: false,
        }
    }
}

/// Balance thresholds separating the form classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormThresholds {
    /// Balance strictly above this is Fresh
    pub fresh_above: f64,
    /// Balance strictly below this is Fatigued
    pub fatigued_below: f64,
}

impl Default for FormThresholds {
    fn default() -> Self {
        Self {
            fresh_above: 10.0,
            fatigued_below: -10.0,
        }
    }
}

/// Load series parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Time constant of the chronic (fitness) curve, in days
    pub chronic_days: f64,
    /// Time constant of the acute (fatigue) curve, in days
    pub acute_days: f64,
    /// Look-back for the ramp rate, in days
    pub ramp_window_days: usize,
    /// Trailing days of the series included in exports
    pub history_window_days: usize,
    /// Trailing days of per-day stress totals included in exports
    pub daily_stress_window_days: usize,
    /// Newest activities listed in exports
    pub activity_window: usize,
    pub form: FormThresholds,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chronic_days: 42.0,
            acute_days: 7.0,
            ramp_window_days: 7,
            history_window_days: 90,
            daily_stress_window_days: 42,
            activity_window: 100,
            form: FormThresholds::default(),
        }
    }
}

/// Decoder behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Check the trailing file CRC after the record section
    pub verify_crc: bool,
    /// Read headers with bit 7 set as compressed-timestamp data records.
    /// When off, every header is framed by its definition bit and low nibble.
    pub compressed_timestamps: bool,
}

/// Complete engine configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub stress: StressConfig,
    pub load: LoadConfig,
    pub decoder: DecoderOptions,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    /// Reject values the model cannot run with
    pub fn validate(&self) -> Result<(), ComputeError> {
        let positive = [
            ("thresholds.cycling_ftp_watts", self.thresholds.cycling_ftp_watts),
            (
                "thresholds.running_threshold_pace_sec_per_km",
                self.thresholds.running_threshold_pace_sec_per_km,
            ),
            (
                "thresholds.swim_threshold_pace_sec_per_100m",
                self.thresholds.swim_threshold_pace_sec_per_100m,
            ),
            ("thresholds.threshold_heart_rate", self.thresholds.threshold_heart_rate),
            ("stress.max_score", self.stress.max_score),
            ("load.chronic_days", self.load.chronic_days),
            ("load.acute_days", self.load.acute_days),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ComputeError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        let stress = &self.stress;
        let rates = &stress.duration_rates;
        let non_negative = [
            ("stress.running_if_exponent", stress.running_if_exponent),
            ("stress.swim_if_exponent", stress.swim_if_exponent),
            ("stress.heart_rate_exponent", stress.heart_rate_exponent),
            ("stress.min_running_distance_m", stress.min_running_distance_m),
            ("stress.min_swim_distance_m", stress.min_swim_distance_m),
            ("stress.duration_rates.running", rates.running),
            ("stress.duration_rates.cycling", rates.cycling),
            ("stress.duration_rates.swimming", rates.swimming),
            ("stress.duration_rates.gym", rates.gym),
            ("stress.duration_rates.other", rates.other),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ComputeError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.load.ramp_window_days == 0 {
            return Err(ComputeError::InvalidConfig(
                "load.ramp_window_days must be at least 1".to_string(),
            ));
        }
        if self.load.form.fatigued_below > self.load.form.fresh_above {
            return Err(ComputeError::InvalidConfig(
                "load.form.fatigued_below must not exceed load.form.fresh_above".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "thresholds": { "cycling_ftp_watts": 250 }, "stress": { "swim_if_exponent": 2 } }"#,
        )
        .unwrap();

        assert_eq!(config.thresholds.cycling_ftp_watts, 250.0);
        assert_eq!(config.thresholds.threshold_heart_rate, 165.0);
        assert_eq!(config.stress.swim_if_exponent, 2.0);
        assert_eq!(config.stress.max_score, 500.0);
        assert_eq!(config.load, LoadConfig::default());
    }

    #[test]
    fn test_round_trip() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_zero_ftp() {
        let err = EngineConfig::from_json(r#"{ "thresholds": { "cycling_ftp_watts": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(msg) if msg.contains("cycling_ftp_watts")));
    }

    #[test]
    fn test_rejects_negative_duration_rate() {
        let err = EngineConfig::from_json(
            r#"{ "stress": { "duration_rates": { "gym": -25 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(msg) if msg.contains("duration_rates.gym")));
    }

    #[test]
    fn test_rejects_non_finite_exponent() {
        let mut config = EngineConfig::default();
        config.stress.swim_if_exponent = f64::NAN;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(msg) if msg.contains("swim_if_exponent")));

        config.stress.swim_if_exponent = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_form_thresholds() {
        let err = EngineConfig::from_json(
            r#"{ "load": { "form": { "fresh_above": -5, "fatigued_below": 5 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
    }
}
