//! Training load series
//!
//! Folds per-day stress totals into the chronic (fitness) and acute (fatigue)
//! exponentially weighted curves, their balance (form), and the ramp rate.
//!
//! The series is contiguous: one point for every calendar day from the first
//! input day through the end day, with rest days entering the recurrence as a
//! zero score.

use crate::config::LoadConfig;
use crate::types::{DailyLoadPoint, FormStatus, LoadSeries, LoadSeriesPoint, ScoredActivity};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Builds the load series from daily stress totals
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSeriesTracker {
    config: LoadConfig,
}

impl LoadSeriesTracker {
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Build the series over `[first input day, max(today, last input day)]`.
    ///
    /// Input may be unsorted and may repeat a day; repeated days are summed.
    /// Empty input yields an empty series.
    pub fn build(&self, daily: &[DailyLoadPoint], today: NaiveDate) -> LoadSeries {
        let totals = sum_by_day(daily.iter().map(|p| (p.date, p.total_stress_score)));
        let (first, last) = match (totals.keys().next(), totals.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return LoadSeries::default(),
        };
        let end = today.max(last);

        let mut chronic = 0.0;
        let mut acute = 0.0;
        let points: Vec<LoadSeriesPoint> = first
            .iter_days()
            .take_while(|day| *day <= end)
            .map(|date| {
                let stress_score = totals.get(&date).copied().unwrap_or(0.0);
                chronic += (stress_score - chronic) / self.config.chronic_days;
                acute += (stress_score - acute) / self.config.acute_days;
                LoadSeriesPoint {
                    date,
                    stress_score,
                    chronic_load: chronic,
                    acute_load: acute,
                    balance: chronic - acute,
                }
            })
            .collect();

        let ramp_rate = self.ramp_rate(&points);
        let form = points.last().map(|p| self.classify(p.balance));

        debug!(
            days = points.len(),
            active_days = totals.len(),
            ramp_rate,
            "load series built"
        );

        LoadSeries {
            points,
            ramp_rate,
            form,
        }
    }

    /// Chronic load change over the ramp window, or over the whole series
    /// when it is not longer than the window.
    pub fn ramp_rate(&self, points: &[LoadSeriesPoint]) -> f64 {
        let Some(latest) = points.last() else {
            return 0.0;
        };
        let window = self.config.ramp_window_days;
        let baseline = if points.len() > window {
            &points[points.len() - 1 - window]
        } else {
            &points[0]
        };
        latest.chronic_load - baseline.chronic_load
    }

    /// Classify a balance value
    pub fn classify(&self, balance: f64) -> FormStatus {
        let form = &self.config.form;
        if balance > form.fresh_above {
            FormStatus::Fresh
        } else if balance < form.fatigued_below {
            FormStatus::Fatigued
        } else {
            FormStatus::Optimal
        }
    }
}

/// Group scored activities by UTC start day, summing their scores.
///
/// Activities without a start time are skipped.
pub fn daily_totals(activities: &[ScoredActivity]) -> Vec<DailyLoadPoint> {
    let totals = sum_by_day(activities.iter().filter_map(|a| {
        a.summary
            .start_date()
            .map(|date| (date, a.stress.score))
    }));
    totals
        .into_iter()
        .map(|(date, total_stress_score)| DailyLoadPoint {
            date,
            total_stress_score,
        })
        .collect()
}

/// Total stress over the trailing `days` days of the series
pub fn trailing_stress(series: &LoadSeries, days: usize) -> f64 {
    series.trailing(days).iter().map(|p| p.stress_score).sum()
}

/// Per-day stress totals for the trailing `days` days of the series
pub fn trailing_daily_stress(series: &LoadSeries, days: usize) -> BTreeMap<NaiveDate, f64> {
    series
        .trailing(days)
        .iter()
        .map(|p| (p.date, p.stress_score))
        .collect()
}

fn sum_by_day(entries: impl Iterator<Item = (NaiveDate, f64)>) -> BTreeMap<NaiveDate, f64> {
    let mut totals = BTreeMap::new();
    for (date, score) in entries {
        *totals.entry(date).or_insert(0.0) += score;
    }
    totals
}
