//! How long entities took to reach a threshold after launch, e.g. $100M TVL within the first year,
//! and how that changed by launch year.

use std::{collections::BTreeMap, io};

use chrono::{Datelike, NaiveDate};
use console::Term;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    growth_report::{format_usd, print_heading},
    records::SeriesSet,
    time_frames::GrowthWindow,
    time_series::first_crossing,
};

pub const DEFAULT_THRESHOLD: f64 = 100_000_000.0;
pub const DEFAULT_WITHIN: GrowthWindow = GrowthWindow(365);

pub const STATUS_CROSSED: &str = "crossed";
pub const STATUS_NOT_CROSSED: &str = "not_crossed";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MilestoneRow {
    pub entity: String,
    pub launch_date: Option<NaiveDate>,
    pub launch_year: Option<i32>,
    pub crossed_date: Option<NaiveDate>,
    pub days_to_cross: Option<i64>,
    pub peak_in_window: Option<f64>,
    pub latest_value: Option<f64>,
    pub status: &'static str,
}

impl MilestoneRow {
    pub fn crossed(&self) -> bool {
        self.status == STATUS_CROSSED
    }
}

pub fn milestone_rows(
    series_set: &SeriesSet,
    threshold: f64,
    within: GrowthWindow,
) -> Vec<MilestoneRow> {
    series_set
        .iter()
        .map(|(entity, series)| match first_crossing(series, threshold, within) {
            Ok(milestone) => {
                debug!(
                    %entity,
                    launch = %milestone.launch,
                    days_to_cross = ?milestone.days_to_cross,
                    "computed milestone"
                );
                MilestoneRow {
                    entity: entity.to_string(),
                    launch_date: Some(milestone.launch),
                    launch_year: Some(milestone.launch.year()),
                    crossed_date: milestone.crossed,
                    days_to_cross: milestone.days_to_cross,
                    peak_in_window: Some(milestone.peak_in_window),
                    latest_value: milestone.latest.value,
                    status: if milestone.crossed.is_some() {
                        STATUS_CROSSED
                    } else {
                        STATUS_NOT_CROSSED
                    },
                }
            }
            Err(err) => {
                warn!(%entity, %err, "skipping milestone");
                MilestoneRow {
                    entity: entity.to_string(),
                    launch_date: None,
                    launch_year: None,
                    crossed_date: None,
                    days_to_cross: None,
                    peak_in_window: None,
                    latest_value: None,
                    status: err.reason_code(),
                }
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct YearSummary {
    pub launch_year: i32,
    pub count: usize,
    pub avg_days: f64,
    pub median_days: f64,
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn median(sorted: &[i64]) -> f64 {
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) as f64 / 2.0
    } else {
        sorted[middle] as f64
    }
}

/// Count, mean and median days to the milestone, per launch year, for entities that made it.
pub fn yearly_summary(rows: &[MilestoneRow]) -> Vec<YearSummary> {
    let mut days_by_year: BTreeMap<i32, Vec<i64>> = BTreeMap::new();
    for row in rows {
        if let (Some(launch_year), Some(days_to_cross)) = (row.launch_year, row.days_to_cross) {
            days_by_year.entry(launch_year).or_default().push(days_to_cross);
        }
    }

    days_by_year
        .into_iter()
        .map(|(launch_year, mut days)| {
            days.sort_unstable();
            let sum: i64 = days.iter().sum();
            YearSummary {
                launch_year,
                count: days.len(),
                avg_days: round_to_tenth(sum as f64 / days.len() as f64),
                median_days: round_to_tenth(median(&days)),
            }
        })
        .collect()
}

/// Entities that crossed, quickest first.
pub fn fastest(rows: &[MilestoneRow], limit: usize) -> Vec<&MilestoneRow> {
    let mut crossed: Vec<&MilestoneRow> = rows.iter().filter(|row| row.crossed()).collect();
    crossed.sort_by_key(|row| (row.days_to_cross, row.entity.clone()));
    crossed.truncate(limit);
    crossed
}

pub fn print_launch_report(
    term: &Term,
    heading: &str,
    rows: &[MilestoneRow],
    summary: &[YearSummary],
) -> io::Result<()> {
    print_heading(term, heading)?;

    if summary.is_empty() {
        return term.write_line("no entity reached the threshold");
    }

    term.write_line(&format!(
        "{:<12} {:>8} {:>12} {:>12}",
        "Launch year", "Count", "Avg days", "Median days"
    ))?;
    for year in summary {
        term.write_line(&format!(
            "{:<12} {:>8} {:>12.1} {:>12.1}",
            year.launch_year, year.count, year.avg_days, year.median_days
        ))?;
    }

    term.write_line("")?;
    term.write_line("Fastest:")?;
    for row in fastest(rows, 10) {
        term.write_line(&format!(
            "{:<24} | {} | {:>4} days | Max 1st window: {}",
            row.entity,
            row.launch_year.map(|year| year.to_string()).unwrap_or_default(),
            row.days_to_cross.unwrap_or_default(),
            format_usd(row.peak_in_window.unwrap_or_default())
        ))?;
    }

    Ok(())
}
