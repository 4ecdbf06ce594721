//! Export encoding
//!
//! Encodes scored activities and the load series into the versioned
//! [`ExportDocument`] consumed by presentation layers. External consumers
//! persist and diff this document, so every absent aggregate is written as an
//! explicit `null` and activities are ordered newest first.

use crate::config::LoadConfig;
use crate::error::ComputeError;
use crate::load::{trailing_daily_stress, trailing_stress};
use crate::types::{
    ActivityRecord, ActivitySummary, ExportDocument, ExportProducer, FileFailure, LoadSeries,
    PerformanceSnapshot, ScoredActivity, StressScoreResult,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current export schema version
pub const EXPORT_SCHEMA_VERSION: &str = "trainload.export.v1";

/// Days summed into the performance snapshot's weekly stress
const WEEK_DAYS: usize = 7;

/// Encoder for producing export documents
pub struct ExportEncoder {
    instance_id: String,
}

impl Default for ExportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Encode activities, failures, and the load series into an export
    pub fn encode(
        &self,
        activities: &[ScoredActivity],
        failures: &[FileFailure],
        series: &LoadSeries,
        load: &LoadConfig,
    ) -> Result<ExportDocument, ComputeError> {
        let mut records = activities
            .iter()
            .map(activity_record)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));
        let activity_count = records.len();
        records.truncate(load.activity_window);

        let latest = series.latest();
        let performance = PerformanceSnapshot {
            date: latest.map(|p| p.date),
            chronic_load: latest.map_or(0.0, |p| p.chronic_load),
            acute_load: latest.map_or(0.0, |p| p.acute_load),
            balance: latest.map_or(0.0, |p| p.balance),
            form: series.form,
            ramp_rate: series.ramp_rate,
            weekly_stress: trailing_stress(series, WEEK_DAYS),
        };

        Ok(ExportDocument {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            producer: ExportProducer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            generated_at_utc: Utc::now(),
            activity_count,
            activities: records,
            failures: failures.to_vec(),
            performance,
            history: series.trailing(load.history_window_days).to_vec(),
            daily_stress: trailing_daily_stress(series, load.daily_stress_window_days),
        })
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        activities: &[ScoredActivity],
        failures: &[FileFailure],
        series: &LoadSeries,
        load: &LoadConfig,
    ) -> Result<String, ComputeError> {
        let document = self.encode(activities, failures, series, load)?;
        serde_json::to_string_pretty(&document).map_err(ComputeError::JsonError)
    }
}

/// Parse a previously written export, rejecting unknown schema versions
pub fn parse_export(json: &str) -> Result<ExportDocument, ComputeError> {
    let document: ExportDocument = serde_json::from_str(json)?;
    if document.schema_version != EXPORT_SCHEMA_VERSION {
        return Err(ComputeError::EncodingError(format!(
            "unsupported export schema version: {}",
            document.schema_version
        )));
    }
    Ok(document)
}

/// Flatten a scored activity into its export row
pub fn activity_record(activity: &ScoredActivity) -> Result<ActivityRecord, ComputeError> {
    let s = &activity.summary;
    let start_time = s.start_time.ok_or_else(|| {
        ComputeError::EncodingError(format!("activity {} has no start time", activity.id))
    })?;

    Ok(ActivityRecord {
        id: activity.id.clone(),
        sport: s.sport,
        start_time,
        duration_seconds: s.duration_seconds,
        distance_meters: s.distance_meters,
        avg_heart_rate: s.avg_heart_rate,
        max_heart_rate: s.max_heart_rate,
        avg_power: s.avg_power,
        max_power: s.max_power,
        normalized_power: s.normalized_power,
        avg_cadence: s.avg_cadence,
        calories: s.calories,
        elevation_gain_m: s.elevation_gain_m,
        device_stress_score: s.device_stress_score,
        stress_score: activity.stress.score,
        stress_kind: activity.stress.kind,
        stress_label: activity.stress.kind.label().to_string(),
        intensity_factor: activity.stress.intensity_factor,
    })
}

impl From<ActivityRecord> for ScoredActivity {
    fn from(record: ActivityRecord) -> Self {
        ScoredActivity {
            id: record.id,
            summary: ActivitySummary {
                sport: record.sport,
                start_time: Some(record.start_time),
                duration_seconds: record.duration_seconds,
                distance_meters: record.distance_meters,
                avg_heart_rate: record.avg_heart_rate,
                max_heart_rate: record.max_heart_rate,
                avg_power: record.avg_power,
                max_power: record.max_power,
                normalized_power: record.normalized_power,
                avg_cadence: record.avg_cadence,
                calories: record.calories,
                elevation_gain_m: record.elevation_gain_m,
                device_stress_score: record.device_stress_score,
            },
            stress: StressScoreResult {
                score: record.stress_score,
                kind: record.stress_kind,
                intensity_factor: record.intensity_factor,
            },
        }
    }
}
