//! Activity summary extraction
//!
//! Folds the decoded message stream of one file into an [`ActivitySummary`]:
//! - Session messages supply the directly reported aggregates
//! - Record messages feed heart-rate, power, and cadence accumulators
//! - Missing aggregates are backfilled from the accumulators at the end
//! - Normalized power comes from a sliding 30-sample window when there are
//!   enough samples, otherwise from the session

use crate::config::DecoderOptions;
use crate::decoder::{DecodedMessage, StreamDecoder};
use crate::error::Rejection;
use crate::types::{ActivitySummary, Sport};
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

/// Global message id of the per-session summary
pub const SESSION_MESSAGE: u16 = 18;

/// Global message id of the per-sample record
pub const RECORD_MESSAGE: u16 = 20;

/// Seconds between the Unix epoch and 1989-12-31T00:00:00Z
pub const FIT_EPOCH_OFFSET: i64 = 631_065_600;

/// Rolling window (samples) for normalized power
pub const NORMALIZED_POWER_WINDOW: usize = 30;

mod session {
    pub const START_TIME: u8 = 2;
    pub const SPORT: u8 = 5;
    pub const TOTAL_ELAPSED_TIME: u8 = 7;
    pub const TOTAL_DISTANCE: u8 = 9;
    pub const TOTAL_CALORIES: u8 = 11;
    pub const AVG_HEART_RATE: u8 = 16;
    pub const MAX_HEART_RATE: u8 = 17;
    pub const AVG_CADENCE: u8 = 18;
    pub const AVG_POWER: u8 = 20;
    pub const MAX_POWER: u8 = 21;
    pub const TOTAL_ASCENT: u8 = 22;
    pub const NORMALIZED_POWER: u8 = 34;
    pub const TRAINING_STRESS_SCORE: u8 = 35;
    pub const TIMESTAMP: u8 = 253;
}

mod record {
    pub const HEART_RATE: u8 = 3;
    pub const CADENCE: u8 = 4;
    pub const POWER: u8 = 7;
}

/// Incremental summary builder for one activity file.
///
/// Push every decoded message in stream order, then call [`finish`].
///
/// [`finish`]: ActivitySummaryExtractor::finish
#[derive(Debug, Default)]
pub struct ActivitySummaryExtractor {
    summary: ActivitySummary,
    heart_rates: Vec<f64>,
    powers: Vec<f64>,
    cadences: Vec<f64>,
    sessions: usize,
}

impl ActivitySummaryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: &DecodedMessage) {
        match message.global_message_id {
            SESSION_MESSAGE => self.apply_session(message),
            RECORD_MESSAGE => self.apply_record(message),
            _ => {}
        }
    }

    fn apply_session(&mut self, m: &DecodedMessage) {
        self.sessions += 1;
        let s = &mut self.summary;

        if let Some(ts) = m
            .value(session::START_TIME)
            .or_else(|| m.value(session::TIMESTAMP))
        {
            s.start_time = fit_timestamp(ts);
        }
        if let Some(code) = m.value(session::SPORT) {
            s.sport = u8::try_from(code).map_or(Sport::Unknown, Sport::from_code);
        }
        if let Some(ms) = m.value(session::TOTAL_ELAPSED_TIME) {
            s.duration_seconds = f64::from(ms) / 1000.0;
        }
        if let Some(cm) = m.value(session::TOTAL_DISTANCE) {
            s.distance_meters = f64::from(cm) / 100.0;
        }
        if let Some(kcal) = m.value(session::TOTAL_CALORIES) {
            s.calories = Some(f64::from(kcal));
        }
        if let Some(ascent) = m.value(session::TOTAL_ASCENT) {
            s.elevation_gain_m = Some(f64::from(ascent));
        }

        // Zero means the sensor was absent, not a real reading
        let reading = |field| m.value(field).filter(|v| *v > 0).map(f64::from);
        s.avg_heart_rate = reading(session::AVG_HEART_RATE).or(s.avg_heart_rate);
        s.max_heart_rate = reading(session::MAX_HEART_RATE).or(s.max_heart_rate);
        s.avg_cadence = reading(session::AVG_CADENCE).or(s.avg_cadence);
        s.avg_power = reading(session::AVG_POWER).or(s.avg_power);
        s.max_power = reading(session::MAX_POWER).or(s.max_power);
        s.normalized_power = reading(session::NORMALIZED_POWER).or(s.normalized_power);
        s.device_stress_score = reading(session::TRAINING_STRESS_SCORE)
            .map(|v| v / 10.0)
            .or(s.device_stress_score);
    }

    fn apply_record(&mut self, m: &DecodedMessage) {
        let reading = |field| m.value(field).filter(|v| *v > 0).map(f64::from);
        if let Some(hr) = reading(record::HEART_RATE) {
            self.heart_rates.push(hr);
        }
        if let Some(power) = reading(record::POWER) {
            self.powers.push(power);
        }
        if let Some(cadence) = reading(record::CADENCE) {
            self.cadences.push(cadence);
        }
    }

    /// Finalize the summary, backfilling aggregates the session did not report.
    pub fn finish(self) -> Result<ActivitySummary, Rejection> {
        let mut s = self.summary;

        s.avg_heart_rate = s.avg_heart_rate.or_else(|| mean(&self.heart_rates));
        s.max_heart_rate = s.max_heart_rate.or_else(|| max(&self.heart_rates));
        s.avg_power = s.avg_power.or_else(|| mean(&self.powers));
        s.max_power = s.max_power.or_else(|| max(&self.powers));
        s.avg_cadence = s.avg_cadence.or_else(|| mean(&self.cadences));
        s.normalized_power =
            normalized_power(&self.powers, NORMALIZED_POWER_WINDOW).or(s.normalized_power);

        debug!(
            sessions = self.sessions,
            heart_rate_samples = self.heart_rates.len(),
            power_samples = self.powers.len(),
            sport = s.sport.as_str(),
            "activity summary extracted"
        );

        if s.start_time.is_none() {
            return Err(Rejection::MissingStartTime);
        }
        Ok(s)
    }
}

/// Decode one file and extract its summary.
///
/// Decoding is strictly sequential; the first malformed record rejects the
/// whole file.
pub fn extract_summary(bytes: &[u8], options: DecoderOptions) -> Result<ActivitySummary, Rejection> {
    let mut extractor = ActivitySummaryExtractor::new();
    for message in StreamDecoder::with_options(bytes, options) {
        extractor.push(&message?);
    }
    extractor.finish()
}

/// Convert a file-epoch timestamp to UTC
pub fn fit_timestamp(seconds: u32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(FIT_EPOCH_OFFSET + i64::from(seconds), 0)
        .single()
}

/// 4th root of the mean 4th power of the trailing `window`-sample rolling mean.
///
/// Needs more than `window` samples. The window sum slides one sample at a
/// time instead of being recomputed.
pub fn normalized_power(samples: &[f64], window: usize) -> Option<f64> {
    if window == 0 || samples.len() <= window {
        return None;
    }

    let w = window as f64;
    let mut window_sum: f64 = samples[..window].iter().sum();
    let mut fourth_power_sum = (window_sum / w).powi(4);
    let mut windows = 1usize;

    for (entering, leaving) in samples[window..].iter().zip(samples) {
        window_sum += entering - leaving;
        fourth_power_sum += (window_sum / w).powi(4);
        windows += 1;
    }

    Some((fourth_power_sum / windows as f64).sqrt().sqrt())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}
