//! Windowed growth of every entity in a [`SeriesSet`], one row per entity and window. Entities
//! that can't be measured still get a row, with the reason in `status`.

use std::io;

use chrono::NaiveDate;
use console::{style, Term};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    records::SeriesSet,
    time_frames::GrowthWindow,
    time_series::{
        rolling_mean_series, windowed_growth, windowed_growth_within, EntityKey, GrowthResult,
        PercentageDelta, Series, SeriesError,
    },
};

pub const STATUS_OK: &str = "ok";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GrowthRow {
    pub entity: EntityKey,
    pub window_days: u32,
    pub as_of: NaiveDate,
    pub reference_date: Option<NaiveDate>,
    pub comparison_date: Option<NaiveDate>,
    pub value_at_reference: Option<f64>,
    pub value_at_comparison: Option<f64>,
    pub absolute_delta: Option<f64>,
    pub percentage_delta: Option<f64>,
    pub status: &'static str,
}

impl GrowthRow {
    fn skipped(
        entity: EntityKey,
        as_of: NaiveDate,
        window: GrowthWindow,
        status: &'static str,
    ) -> Self {
        Self {
            entity,
            window_days: window.days(),
            as_of,
            reference_date: None,
            comparison_date: None,
            value_at_reference: None,
            value_at_comparison: None,
            absolute_delta: None,
            percentage_delta: None,
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn percentage(&self) -> PercentageDelta {
        match (self.percentage_delta, self.value_at_comparison) {
            (Some(fraction), _) => PercentageDelta::Defined(fraction),
            (None, comparison) => PercentageDelta::from_values(self.value_at_reference, comparison),
        }
    }
}

impl From<GrowthResult> for GrowthRow {
    fn from(growth: GrowthResult) -> Self {
        let status = match growth.percentage_delta {
            PercentageDelta::Defined(_) => STATUS_OK,
            PercentageDelta::Undefined(reason) => reason.reason_code(),
        };

        Self {
            entity: growth.entity,
            window_days: growth.window.days(),
            as_of: growth.as_of,
            reference_date: Some(growth.reference_date),
            comparison_date: Some(growth.comparison_date),
            value_at_reference: growth.value_at_reference,
            value_at_comparison: growth.value_at_comparison,
            absolute_delta: growth.absolute_delta,
            percentage_delta: growth.percentage_delta.fraction(),
            status,
        }
    }
}

/// How growth is measured for every entity of a report.
#[derive(Clone, Debug, PartialEq)]
pub struct GrowthOptions {
    pub as_of: NaiveDate,
    pub windows: Vec<GrowthWindow>,
    /// Bounds nearest-date matching, unbounded when absent.
    pub max_distance_days: Option<u32>,
}

/// The most recent date of any series in the set.
pub fn latest_date(series_set: &SeriesSet) -> Option<NaiveDate> {
    series_set
        .values()
        .filter_map(|series| series.points().last())
        .map(|point| point.date)
        .max()
}

pub fn measure_growth(
    series: &Series,
    options: &GrowthOptions,
    window: GrowthWindow,
) -> Result<GrowthResult, SeriesError> {
    match options.max_distance_days {
        Some(max_distance_days) => {
            windowed_growth_within(series, options.as_of, window, max_distance_days)
        }
        None => windowed_growth(series, options.as_of, window),
    }
}

/// Growth of one series over one window, a skipped row when it can't be measured.
pub fn growth_row(series: &Series, options: &GrowthOptions, window: GrowthWindow) -> GrowthRow {
    match measure_growth(series, options, window) {
        Ok(growth) => growth.into(),
        Err(err) => {
            let entity = series.entity();
            warn!(%entity, %window, %err, "skipping growth");
            GrowthRow::skipped(entity.clone(), options.as_of, window, err.reason_code())
        }
    }
}

pub fn growth_rows(series_set: &SeriesSet, options: &GrowthOptions) -> Vec<GrowthRow> {
    let mut rows = Vec::with_capacity(series_set.len() * options.windows.len());

    for series in series_set.values() {
        for window in &options.windows {
            rows.push(growth_row(series, options, *window));
        }
    }

    debug!(
        entities = series_set.len(),
        rows = rows.len(),
        "computed growth rows"
    );

    rows
}

/// Replaces every series by its trailing rolling mean.
pub fn smooth(series_set: &SeriesSet, window: GrowthWindow) -> SeriesSet {
    series_set
        .iter()
        .map(|(entity, series)| (entity.clone(), rolling_mean_series(series, window)))
        .collect()
}

/// Rows of one window, largest absolute growth first, rows without a delta last.
pub fn top_rows(rows: &[GrowthRow], window: GrowthWindow, limit: usize) -> Vec<&GrowthRow> {
    let mut window_rows: Vec<&GrowthRow> = rows
        .iter()
        .filter(|row| row.window_days == window.days())
        .collect();
    window_rows.sort_by(|a, b| match (a.absolute_delta, b.absolute_delta) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    window_rows.truncate(limit);
    window_rows
}

fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

pub fn write_growth_csv<W: io::Write>(
    writer: W,
    entity_columns: &[String],
    rows: &[GrowthRow],
) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = entity_columns.iter().map(String::as_str).collect();
    header.extend([
        "window_days",
        "as_of",
        "reference_date",
        "comparison_date",
        "value_at_reference",
        "value_at_comparison",
        "absolute_delta",
        "percentage_delta",
        "status",
    ]);
    csv_writer.write_record(&header)?;

    for row in rows {
        let mut record: Vec<String> = row.entity.parts().to_vec();
        record.extend([
            row.window_days.to_string(),
            row.as_of.to_string(),
            format_optional(row.reference_date),
            format_optional(row.comparison_date),
            format_optional(row.value_at_reference),
            format_optional(row.value_at_comparison),
            format_optional(row.absolute_delta),
            format_optional(row.percentage_delta),
            row.status.to_string(),
        ]);
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_growth_json<W: io::Write>(writer: W, rows: &[GrowthRow]) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, rows)
}

/// Thousands separated, no decimals, e.g. `$1,234,567`.
pub fn format_usd(value: f64) -> String {
    let rounded = value.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index != 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if value < 0.0 && rounded != 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn format_optional_usd(value: Option<f64>) -> String {
    value.map(format_usd).unwrap_or_else(|| String::from("N/A"))
}

pub fn print_heading(term: &Term, heading: &str) -> io::Result<()> {
    term.write_line("")?;
    term.write_line(&style(heading).bold().to_string())?;
    term.write_line(&"=".repeat(heading.len().max(40)))
}

pub fn print_growth_table(term: &Term, heading: &str, rows: &[&GrowthRow]) -> io::Result<()> {
    print_heading(term, heading)?;
    term.write_line(&format!(
        "{:<32} {:>18} {:>18} {:>10}",
        "Entity", "Current", "Change", "Change %"
    ))?;
    term.write_line(&"-".repeat(81))?;

    for row in rows {
        let change = row.percentage();
        let change = match change {
            PercentageDelta::Defined(fraction) if fraction >= 0.0 => {
                style(change.to_string()).green().to_string()
            }
            PercentageDelta::Defined(_) => style(change.to_string()).red().to_string(),
            PercentageDelta::Undefined(_) => change.to_string(),
        };
        term.write_line(&format!(
            "{:<32} {:>18} {:>18} {:>10}",
            row.entity.to_string(),
            format_optional_usd(row.value_at_reference),
            format_optional_usd(row.absolute_delta),
            change
        ))?;
    }

    Ok(())
}
