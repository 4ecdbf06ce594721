//! Pipeline orchestration
//!
//! This module provides the public API for trainload. It orchestrates the full
//! pipeline from raw activity-file bytes to the export document:
//! decode → summarize → score → daily totals → load series → export.

use crate::archive::activity_bytes;
use crate::batch::{decode_batch, BatchInput};
use crate::config::EngineConfig;
use crate::encoder::{parse_export, ExportEncoder};
use crate::error::{ComputeError, Rejection};
use crate::extractor::extract_summary;
use crate::load::{daily_totals, LoadSeriesTracker};
use crate::stress::StressScoreCalculator;
use crate::types::{
    ActivitySummary, ExportDocument, FileFailure, LoadSeries, ScoredActivity, StressScoreResult,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Decode one activity file, or a zip archive holding one, into its summary.
///
/// # Example
/// ```ignore
/// let bytes = std::fs::read("morning_ride.fit")?;
/// let summary = decode_activity(&bytes, &EngineConfig::default())?;
/// ```
pub fn decode_activity(bytes: &[u8], config: &EngineConfig) -> Result<ActivitySummary, Rejection> {
    extract_summary(&activity_bytes(bytes)?, config.decoder)
}

/// Score one activity against the configured thresholds.
pub fn score_activity(summary: &ActivitySummary, config: &EngineConfig) -> StressScoreResult {
    StressScoreCalculator::from_config(config).score(summary)
}

/// Build the load series from scored activities, ending at `today` or the
/// last activity day, whichever is later.
pub fn build_load_series(
    activities: &[ScoredActivity],
    today: NaiveDate,
    config: &EngineConfig,
) -> LoadSeries {
    LoadSeriesTracker::new(config.load).build(&daily_totals(activities), today)
}

/// Result of processing a batch of files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub activities: Vec<ScoredActivity>,
    pub failures: Vec<FileFailure>,
    pub series: LoadSeries,
}

/// Decode, score, and fold a batch of files into a load series.
///
/// Files decode in parallel; a failing file is reported in
/// [`BatchOutcome::failures`] and excluded from the series.
pub fn process_batch(inputs: &[BatchInput], today: NaiveDate, config: &EngineConfig) -> BatchOutcome {
    let report = decode_batch(inputs, config.decoder);
    let calculator = StressScoreCalculator::from_config(config);

    let activities: Vec<ScoredActivity> = report
        .decoded
        .into_iter()
        .map(|file| ScoredActivity {
            stress: calculator.score(&file.summary),
            id: file.id,
            summary: file.summary,
        })
        .collect();
    let series = build_load_series(&activities, today, config);

    BatchOutcome {
        activities,
        failures: report.failures,
        series,
    }
}

/// Counts from one incremental import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub added: usize,
    /// Inputs whose id was already known
    pub skipped: usize,
    pub failed: usize,
}

/// Stateful processor for incremental imports.
///
/// Keeps every scored activity by id so that re-importing a directory only
/// decodes new files, and can resume from a previously written export.
pub struct TrainingLoadProcessor {
    config: EngineConfig,
    calculator: StressScoreCalculator,
    tracker: LoadSeriesTracker,
    encoder: ExportEncoder,
    activities: BTreeMap<String, ScoredActivity>,
    failures: Vec<FileFailure>,
    today: Option<NaiveDate>,
}

impl Default for TrainingLoadProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingLoadProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            calculator: StressScoreCalculator::from_config(&config),
            tracker: LoadSeriesTracker::new(config.load),
            encoder: ExportEncoder::new(),
            activities: BTreeMap::new(),
            failures: Vec::new(),
            today: None,
        }
    }

    /// Pin the series end day instead of using the current UTC date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    pub fn activities(&self) -> impl Iterator<Item = &ScoredActivity> {
        self.activities.values()
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    /// Decode and score new files, skipping ids that are already known.
    pub fn add_files(&mut self, inputs: &[BatchInput]) -> ImportStats {
        let mut seen = HashSet::new();
        let (fresh, known): (Vec<&BatchInput>, Vec<&BatchInput>) = inputs
            .iter()
            .partition(|input| !self.contains(&input.id) && seen.insert(input.id.as_str()));
        for input in &known {
            debug!(file = input.id.as_str(), "already imported, skipping");
        }

        let fresh: Vec<BatchInput> = fresh.into_iter().cloned().collect();
        let report = decode_batch(&fresh, self.config.decoder);

        let stats = ImportStats {
            added: report.decoded.len(),
            skipped: known.len(),
            failed: report.failures.len(),
        };
        for file in report.decoded {
            self.insert(file.id, file.summary);
        }
        for failure in report.failures {
            self.record_failure(failure);
        }

        info!(
            added = stats.added,
            skipped = stats.skipped,
            failed = stats.failed,
            total = self.activities.len(),
            "import finished"
        );
        stats
    }

    /// Score and add an already summarized activity, replacing any with the same id.
    pub fn add_summary(
        &mut self,
        id: impl Into<String>,
        summary: ActivitySummary,
    ) -> Result<StressScoreResult, ComputeError> {
        if summary.start_time.is_none() {
            return Err(Rejection::MissingStartTime.into());
        }
        Ok(self.insert(id.into(), summary))
    }

    /// Load activities from a previous export, keeping their stored scores.
    ///
    /// Only the activities listed in the export are restored; raise
    /// `load.activity_window` to carry a longer history between runs.
    ///
    /// Returns the number of activities that were not already known.
    pub fn load_export(&mut self, json: &str) -> Result<usize, ComputeError> {
        let document = parse_export(json)?;
        let mut loaded = 0;
        for record in document.activities {
            if self.activities.contains_key(&record.id) {
                continue;
            }
            let activity = ScoredActivity::from(record);
            self.activities.insert(activity.id.clone(), activity);
            loaded += 1;
        }
        info!(loaded, "previous export loaded");
        Ok(loaded)
    }

    /// Recompute every stored score with the current thresholds
    pub fn rescore_all(&mut self) {
        for activity in self.activities.values_mut() {
            activity.stress = self.calculator.score(&activity.summary);
        }
    }

    /// The load series over everything imported so far
    pub fn series(&self) -> LoadSeries {
        let activities: Vec<ScoredActivity> = self.activities.values().cloned().collect();
        self.tracker.build(&daily_totals(&activities), self.today())
    }

    pub fn export(&self) -> Result<ExportDocument, ComputeError> {
        let activities: Vec<ScoredActivity> = self.activities.values().cloned().collect();
        let series = self.tracker.build(&daily_totals(&activities), self.today());
        self.encoder
            .encode(&activities, &self.failures, &series, &self.config.load)
    }

    pub fn export_json(&self) -> Result<String, ComputeError> {
        let activities: Vec<ScoredActivity> = self.activities.values().cloned().collect();
        let series = self.tracker.build(&daily_totals(&activities), self.today());
        self.encoder
            .encode_to_json(&activities, &self.failures, &series, &self.config.load)
    }

    fn insert(&mut self, id: String, summary: ActivitySummary) -> StressScoreResult {
        let stress = self.calculator.score(&summary);
        self.failures.retain(|f| f.id != id);
        self.activities.insert(
            id.clone(),
            ScoredActivity {
                id,
                summary,
                stress,
            },
        );
        stress
    }

    fn record_failure(&mut self, failure: FileFailure) {
        self.failures.retain(|f| f.id != failure.id);
        self.failures.push(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixture::{activity_file, ActivitySpec};
    use crate::types::{FormStatus, Sport, StressScoreKind};
    use pretty_assertions::assert_eq;

    const DAY: u32 = 86_400;
    const JAN_15: u32 = 1_705_312_800;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 21).unwrap()
    }

    fn ride(day_offset: u32, avg_power: u16) -> Vec<u8> {
        activity_file(&ActivitySpec {
            start_unix: Some(JAN_15 + day_offset * DAY),
            avg_power,
            ..ActivitySpec::default()
        })
    }

    fn run(day_offset: u32) -> Vec<u8> {
        // 10 km in 50 min
        activity_file(&ActivitySpec {
            sport: 1,
            start_unix: Some(JAN_15 + day_offset * DAY),
            elapsed_ms: 3_000_000,
            distance_cm: 1_000_000,
            ..ActivitySpec::default()
        })
    }

    #[test]
    fn test_decode_and_score_activity() {
        let config = EngineConfig::default();
        let summary = decode_activity(&ride(0, 300), &config).unwrap();
        let result = score_activity(&summary, &config);

        assert_eq!(result.kind, StressScoreKind::PowerBased);
        assert_eq!(result.intensity_factor, Some(1.0));
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_process_batch() {
        let inputs = vec![
            BatchInput::new("ride", ride(0, 300)),
            BatchInput::new("broken", vec![0u8; 4]),
            BatchInput::new("run", run(3)),
        ];
        let outcome = process_batch(&inputs, today(), &EngineConfig::default());

        assert_eq!(outcome.activities.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "broken");
        assert_eq!(outcome.failures[0].code, "truncated_record");

        // Jan 15 through Jan 21 inclusive
        assert_eq!(outcome.series.points.len(), 7);
        assert_eq!(outcome.series.points[0].stress_score, 100.0);
        assert_eq!(outcome.activities[1].summary.sport, Sport::Running);
        assert_eq!(outcome.activities[1].stress.kind, StressScoreKind::RunningPaceBased);
    }

    #[test]
    fn test_incremental_import_skips_known_ids() {
        let mut processor = TrainingLoadProcessor::new().with_today(today());

        let first = processor.add_files(&[
            BatchInput::new("a.fit", ride(0, 300)),
            BatchInput::new("b.fit", ride(1, 240)),
        ]);
        assert_eq!(first, ImportStats { added: 2, skipped: 0, failed: 0 });

        let second = processor.add_files(&[
            BatchInput::new("a.fit", ride(0, 300)),
            BatchInput::new("c.fit", run(2)),
            BatchInput::new("c.fit", run(2)),
        ]);
        assert_eq!(second, ImportStats { added: 1, skipped: 2, failed: 0 });
        assert_eq!(processor.activity_count(), 3);
    }

    #[test]
    fn test_failure_cleared_by_later_success() {
        let mut processor = TrainingLoadProcessor::new().with_today(today());
        let mut corrupt = ride(0, 300);
        corrupt[9] = 0;

        processor.add_files(&[BatchInput::new("a.fit", corrupt)]);
        assert_eq!(processor.failures().len(), 1);

        processor.add_files(&[BatchInput::new("a.fit", ride(0, 300))]);
        assert!(processor.failures().is_empty());
        assert!(processor.contains("a.fit"));
    }

    #[test]
    fn test_add_summary_requires_start_time() {
        let mut processor = TrainingLoadProcessor::new();
        let err = processor
            .add_summary("manual", ActivitySummary::default())
            .unwrap_err();
        assert!(matches!(err, ComputeError::Rejected(Rejection::MissingStartTime)));
    }

    #[test]
    fn test_resume_from_export() {
        let mut processor = TrainingLoadProcessor::new().with_today(today());
        processor.add_files(&[BatchInput::new("a.fit", ride(0, 300))]);
        let json = processor.export_json().unwrap();

        let mut resumed = TrainingLoadProcessor::new().with_today(today());
        assert_eq!(resumed.load_export(&json).unwrap(), 1);
        let stats = resumed.add_files(&[
            BatchInput::new("a.fit", ride(0, 300)),
            BatchInput::new("b.fit", ride(2, 300)),
        ]);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.added, 1);

        let series = resumed.series();
        assert_eq!(series.points.len(), 7);
        assert_eq!(series.points[0].stress_score, 100.0);
        assert_eq!(series.points[2].stress_score, 100.0);
    }

    #[test]
    fn test_rescore_with_new_thresholds() {
        let mut processor = TrainingLoadProcessor::new().with_today(today());
        processor.add_files(&[BatchInput::new("a.fit", ride(0, 300))]);
        let json = processor.export_json().unwrap();

        let mut config = EngineConfig::default();
        config.thresholds.cycling_ftp_watts = 150.0;
        let mut lower_ftp = TrainingLoadProcessor::with_config(config).with_today(today());
        lower_ftp.load_export(&json).unwrap();
        assert_eq!(lower_ftp.activities().next().unwrap().stress.score, 100.0);

        lower_ftp.rescore_all();
        assert_eq!(lower_ftp.activities().next().unwrap().stress.score, 400.0);
    }

    #[test]
    fn test_export_performance() {
        let mut processor = TrainingLoadProcessor::new().with_today(today());
        processor.add_files(&[BatchInput::new("a.fit", ride(6, 300))]);

        let doc = processor.export().unwrap();
        assert_eq!(doc.activity_count, 1);
        assert_eq!(doc.history.len(), 1);
        assert_eq!(doc.performance.weekly_stress, 100.0);
        // A single hard day: acute load jumps well above chronic
        assert_eq!(doc.performance.form, Some(FormStatus::Fatigued));
    }
}
