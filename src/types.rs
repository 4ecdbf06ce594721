//! Core types for the trainload pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: activity summaries, stress scores, daily totals, the load series,
//! and the export document handed to presentation layers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sport tag derived from the session's sport code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Generic,
    Running,
    Cycling,
    Swimming,
    FitnessEquipment,
    Unknown,
}

impl Sport {
    /// Map a session sport code to its tag
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Sport::Generic,
            1 | 18 => Sport::Running,
            2 | 17 => Sport::Cycling,
            5 | 11 => Sport::Swimming,
            10 => Sport::FitnessEquipment,
            _ => Sport::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Generic => "generic",
            Sport::Running => "running",
            Sport::Cycling => "cycling",
            Sport::Swimming => "swimming",
            Sport::FitnessEquipment => "fitness_equipment",
            Sport::Unknown => "unknown",
        }
    }

    /// Gym-type sessions carry less load per hour than cardio
    pub fn is_gym(&self) -> bool {
        matches!(self, Sport::Generic | Sport::FitnessEquipment)
    }
}

impl Default for Sport {
    fn default() -> Self {
        Sport::Unknown
    }
}

/// Normalized summary of one activity file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitySummary {
    pub sport: Sport,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub distance_meters: f64,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub avg_power: Option<f64>,
    pub max_power: Option<f64>,
    pub normalized_power: Option<f64>,
    pub avg_cadence: Option<f64>,
    pub calories: Option<f64>,
    /// Total ascent (meters)
    pub elevation_gain_m: Option<f64>,
    /// Stress score stored by the recording device, if any
    pub device_stress_score: Option<f64>,
}

impl ActivitySummary {
    pub fn hours(&self) -> f64 {
        self.duration_seconds / 3600.0
    }

    /// Average speed in m/s, when both duration and distance are positive
    pub fn avg_speed_mps(&self) -> Option<f64> {
        if self.duration_seconds > 0.0 && self.distance_meters > 0.0 {
            Some(self.distance_meters / self.duration_seconds)
        } else {
            None
        }
    }

    /// Calendar day (UTC) the activity started on
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_time.map(|t| t.date_naive())
    }
}

/// Which formula produced a stress score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressScoreKind {
    PowerBased,
    RunningPaceBased,
    SwimPaceBased,
    HeartRateBased,
    DurationBased,
    DeviceReported,
}

impl StressScoreKind {
    /// Conventional short label shown next to a score
    pub fn label(&self) -> &'static str {
        match self {
            StressScoreKind::PowerBased => "TSS",
            StressScoreKind::RunningPaceBased => "rTSS",
            StressScoreKind::SwimPaceBased => "sTSS",
            StressScoreKind::HeartRateBased => "hrTSS",
            StressScoreKind::DurationBased => "estTSS",
            StressScoreKind::DeviceReported => "TSS",
        }
    }
}

/// Stress score for one activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressScoreResult {
    pub score: f64,
    pub kind: StressScoreKind,
    pub intensity_factor: Option<f64>,
}

/// An activity together with its stress score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredActivity {
    pub id: String,
    pub summary: ActivitySummary,
    pub stress: StressScoreResult,
}

/// Total stress for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyLoadPoint {
    pub date: NaiveDate,
    pub total_stress_score: f64,
}

/// One day of the load model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSeriesPoint {
    pub date: NaiveDate,
    /// Stress applied on this day (zero for rest days)
    pub stress_score: f64,
    /// Long-window average (fitness)
    pub chronic_load: f64,
    /// Short-window average (fatigue)
    pub acute_load: f64,
    /// chronic_load - acute_load (form)
    pub balance: f64,
}

/// Readiness classification from the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormStatus {
    Fresh,
    Optimal,
    Fatigued,
}

impl FormStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Fresh => "Fresh",
            FormStatus::Optimal => "Optimal",
            FormStatus::Fatigued => "Fatigued",
        }
    }
}

/// Complete output of the load model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSeries {
    /// One point per day from the first activity day to the end day
    pub points: Vec<LoadSeriesPoint>,
    /// Change in chronic load over the ramp window
    pub ramp_rate: f64,
    /// Form of the latest point
    pub form: Option<FormStatus>,
}

impl LoadSeries {
    pub fn latest(&self) -> Option<&LoadSeriesPoint> {
        self.points.last()
    }

    /// The last `days` points (fewer if the series is shorter)
    pub fn trailing(&self, days: usize) -> &[LoadSeriesPoint] {
        let start = self.points.len().saturating_sub(days);
        &self.points[start..]
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// Export document (stable output contract)

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// One activity row in the export; absent aggregates serialize as `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub sport: Sport,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub distance_meters: f64,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub avg_power: Option<f64>,
    pub max_power: Option<f64>,
    pub normalized_power: Option<f64>,
    pub avg_cadence: Option<f64>,
    pub calories: Option<f64>,
    pub elevation_gain_m: Option<f64>,
    pub device_stress_score: Option<f64>,
    pub stress_score: f64,
    pub stress_kind: StressScoreKind,
    pub stress_label: String,
    pub intensity_factor: Option<f64>,
}

/// A file that produced no activity, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Current state of the load model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub date: Option<NaiveDate>,
    pub chronic_load: f64,
    pub acute_load: f64,
    pub balance: f64,
    pub form: Option<FormStatus>,
    pub ramp_rate: f64,
    /// Total stress over the last seven days, today included
    pub weekly_stress: f64,
}

/// Versioned export consumed by presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub schema_version: String,
    pub producer: ExportProducer,
    pub generated_at_utc: DateTime<Utc>,
    /// Every activity the export was built from, listed or not
    pub activity_count: usize,
    /// Newest first, at most `LoadConfig::activity_window` entries
    pub activities: Vec<ActivityRecord>,
    pub failures: Vec<FileFailure>,
    pub performance: PerformanceSnapshot,
    pub history: Vec<LoadSeriesPoint>,
    pub daily_stress: BTreeMap<NaiveDate, f64>,
}
