//! Stress score calculation
//!
//! Scores one activity with the first applicable formula of a sport-dependent
//! cascade: power, running pace, swim pace, heart rate, then duration alone.
//! Every tier clamps its result to `StressConfig::max_score`, and the cascade
//! never fails: an activity with no signals at all still gets a duration-based
//! score, which is zero for a zero-length activity.

use crate::config::{EngineConfig, StressConfig, Thresholds};
use crate::types::{ActivitySummary, Sport, StressScoreKind, StressScoreResult};
use tracing::trace;

/// Stress score calculator for one athlete's thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct StressScoreCalculator {
    thresholds: Thresholds,
    config: StressConfig,
}

impl StressScoreCalculator {
    pub fn new(thresholds: Thresholds, config: StressConfig) -> Self {
        Self { thresholds, config }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.thresholds, config.stress)
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Score an activity
    pub fn score(&self, summary: &ActivitySummary) -> StressScoreResult {
        let (raw, kind, intensity_factor) = self.device_reported(summary)
            .or_else(|| self.power_based(summary))
            .or_else(|| self.running_pace_based(summary))
            .or_else(|| self.swim_pace_based(summary))
            .or_else(|| self.heart_rate_based(summary))
            .unwrap_or_else(|| self.duration_based(summary));

        let score = self.clamp(raw);
        trace!(kind = ?kind, raw, score, "stress score computed");

        StressScoreResult {
            score,
            kind,
            intensity_factor,
        }
    }

    fn clamp(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, self.config.max_score)
        }
    }

    fn device_reported(&self, s: &ActivitySummary) -> Option<Tier> {
        if !self.config.prefer_device_score {
            return None;
        }
        s.device_stress_score
            .filter(|score| *score > 0.0)
            .map(|score| (score, StressScoreKind::DeviceReported, None))
    }

    fn power_based(&self, s: &ActivitySummary) -> Option<Tier> {
        let ftp = self.thresholds.cycling_ftp_watts;
        if s.sport != Sport::Cycling || ftp <= 0.0 {
            return None;
        }
        let power = s.normalized_power.or(s.avg_power).filter(|p| *p > 0.0)?;

        let intensity = power / ftp;
        let score = s.duration_seconds * power * intensity / (ftp * 3600.0) * 100.0;
        Some((score, StressScoreKind::PowerBased, Some(intensity)))
    }

    fn running_pace_based(&self, s: &ActivitySummary) -> Option<Tier> {
        if s.sport != Sport::Running || s.distance_meters < self.config.min_running_distance_m {
            return None;
        }
        s.avg_speed_mps()?;

        let pace_sec_per_km = s.duration_seconds / (s.distance_meters / 1000.0);
        let intensity = self.thresholds.running_threshold_pace_sec_per_km / pace_sec_per_km;
        let score = s.hours() * intensity.powf(self.config.running_if_exponent) * 100.0;
        Some((score, StressScoreKind::RunningPaceBased, Some(intensity)))
    }

    fn swim_pace_based(&self, s: &ActivitySummary) -> Option<Tier> {
        if s.sport != Sport::Swimming || s.distance_meters < self.config.min_swim_distance_m {
            return None;
        }
        s.avg_speed_mps()?;

        let pace_sec_per_100m = s.duration_seconds / (s.distance_meters / 100.0);
        let intensity = self.thresholds.swim_threshold_pace_sec_per_100m / pace_sec_per_100m;
        let score = intensity.powf(self.config.swim_if_exponent) * s.hours() * 100.0;
        Some((score, StressScoreKind::SwimPaceBased, Some(intensity)))
    }

    fn heart_rate_based(&self, s: &ActivitySummary) -> Option<Tier> {
        let threshold = self.thresholds.threshold_heart_rate;
        if threshold <= 0.0 {
            return None;
        }
        let hr = s.avg_heart_rate.filter(|hr| *hr > 0.0)?;

        let ratio = hr / threshold;
        let score = s.hours() * ratio.powf(self.config.heart_rate_exponent) * 100.0;
        Some((score, StressScoreKind::HeartRateBased, Some(ratio)))
    }

    fn duration_based(&self, s: &ActivitySummary) -> Tier {
        let rates = &self.config.duration_rates;
        let per_hour = match s.sport {
            Sport::Running => rates.running,
            Sport::Cycling => rates.cycling,
            Sport::Swimming => rates.swimming,
            _ if s.sport.is_gym() => rates.gym,
            _ => rates.other,
        };
        (s.hours() * per_hour, StressScoreKind::DurationBased, None)
    }
}

/// Raw score, formula, and intensity factor of one cascade tier
type Tier = (f64, StressScoreKind, Option<f64>);
