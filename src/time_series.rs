//! # Time series
//! Daily observations of one metric (TVL, circulating supply) for one entity, and the pure lookups
//! every analysis is built on: nearest-date matching, launch detection, windowed growth and
//! rolling averages. Nothing in here does I/O, series are built once and never mutated.

mod aggregate;

use std::{collections::BTreeMap, fmt::Display};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::time_frames::GrowthWindow;

pub use aggregate::{
    first_appearance, first_crossing, latest, nearest, nearest_within, peak_between,
    rolling_average, rolling_mean_series, windowed_growth, windowed_growth_within, Milestone,
};

/// Identifies what a series measures, e.g. `["Ethereum"]` or `["Base", "USDC"]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityKey(pub Vec<String>);

impl EntityKey {
    pub fn single(part: impl Into<String>) -> Self {
        EntityKey(vec![part.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        EntityKey(vec![first.into(), second.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for EntityKey {
    fn from(part: &str) -> Self {
        EntityKey::single(part)
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl TimePoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self {
            date,
            value: Some(value),
        }
    }
}

/// At most one point per day, sorted oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    entity: EntityKey,
    points: Vec<TimePoint>,
}

impl Series {
    pub fn empty(entity: EntityKey) -> Self {
        Self {
            entity,
            points: Vec::new(),
        }
    }

    /// Observations may come in any order. Observations sharing a day are summed, a day is only
    /// null when every observation on it is.
    pub fn from_observations<I>(entity: EntityKey, observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut by_date: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();

        for (date, value) in observations {
            let value = value.filter(|value| !value.is_nan());
            let day_value = by_date.entry(date).or_insert(None);
            *day_value = match (*day_value, value) {
                (Some(sum), Some(value)) => Some(sum + value),
                (None, value) => value,
                (sum, None) => sum,
            };
        }

        let points = by_date
            .into_iter()
            .map(|(date, value)| TimePoint { date, value })
            .collect();

        Self { entity, points }
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The value recorded on exactly this date, if any.
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |point| point.date)
            .ok()
            .and_then(|index| self.points[index].value)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("series has no points")]
    EmptySeries,
    #[error("series never exceeds zero")]
    NoActivity,
    #[error("no values between {from} and {to}")]
    InsufficientData { from: NaiveDate, to: NaiveDate },
    #[error("closest point to {target} is {nearest}, more than {max_distance_days} days away")]
    OutOfRange {
        target: NaiveDate,
        nearest: NaiveDate,
        max_distance_days: u32,
    },
}

impl SeriesError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SeriesError::EmptySeries => "empty_series",
            SeriesError::NoActivity => "no_activity",
            SeriesError::InsufficientData { .. } => "insufficient_data",
            SeriesError::OutOfRange { .. } => "out_of_range",
        }
    }
}

/// Why a growth percentage could not be computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedGrowth {
    ZeroBaseline,
    NegativeBaseline,
    MissingBaseline,
    MissingReference,
}

impl UndefinedGrowth {
    pub fn reason_code(&self) -> &'static str {
        match self {
            UndefinedGrowth::ZeroBaseline => "zero_baseline",
            UndefinedGrowth::NegativeBaseline => "negative_baseline",
            UndefinedGrowth::MissingBaseline => "missing_baseline",
            UndefinedGrowth::MissingReference => "missing_reference",
        }
    }
}

/// Relative change as a fraction, 1.0 meaning +100%.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PercentageDelta {
    Defined(f64),
    Undefined(UndefinedGrowth),
}

impl PercentageDelta {
    pub fn from_values(reference: Option<f64>, comparison: Option<f64>) -> Self {
        match (reference, comparison) {
            (_, None) => PercentageDelta::Undefined(UndefinedGrowth::MissingBaseline),
            (_, Some(comparison)) if comparison == 0.0 => {
                PercentageDelta::Undefined(UndefinedGrowth::ZeroBaseline)
            }
            (_, Some(comparison)) if comparison < 0.0 => {
                PercentageDelta::Undefined(UndefinedGrowth::NegativeBaseline)
            }
            (None, Some(_)) => PercentageDelta::Undefined(UndefinedGrowth::MissingReference),
            (Some(reference), Some(comparison)) => {
                PercentageDelta::Defined((reference - comparison) / comparison)
            }
        }
    }

    pub fn fraction(&self) -> Option<f64> {
        match self {
            PercentageDelta::Defined(fraction) => Some(*fraction),
            PercentageDelta::Undefined(_) => None,
        }
    }

    pub fn undefined_reason(&self) -> Option<UndefinedGrowth> {
        match self {
            PercentageDelta::Defined(_) => None,
            PercentageDelta::Undefined(reason) => Some(*reason),
        }
    }
}

/// Console formatting, `12.34%` or `N/A`. Files get the plain fraction instead.
impl Display for PercentageDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PercentageDelta::Defined(fraction) => write!(f, "{:.2}%", fraction * 100.0),
            PercentageDelta::Undefined(_) => write!(f, "N/A"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrowthResult {
    pub entity: EntityKey,
    pub as_of: NaiveDate,
    pub window: GrowthWindow,
    pub reference_date: NaiveDate,
    pub comparison_date: NaiveDate,
    pub value_at_reference: Option<f64>,
    pub value_at_comparison: Option<f64>,
    pub absolute_delta: Option<f64>,
    pub percentage_delta: PercentageDelta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse::<NaiveDate>().unwrap()
    }

    #[test]
    fn sums_same_day_observations_test() {
        let series = Series::from_observations(
            EntityKey::single("Base"),
            vec![
                (date("2025-01-02"), Some(5.0)),
                (date("2025-01-01"), Some(1.0)),
                (date("2025-01-02"), Some(2.5)),
            ],
        );

        assert_eq!(
            series.points(),
            &[
                TimePoint::new(date("2025-01-01"), 1.0),
                TimePoint::new(date("2025-01-02"), 7.5),
            ]
        );
    }

    #[test]
    fn null_only_when_every_observation_is_null_test() {
        let series = Series::from_observations(
            EntityKey::single("Base"),
            vec![
                (date("2025-01-01"), None),
                (date("2025-01-01"), Some(3.0)),
                (date("2025-01-02"), None),
                (date("2025-01-02"), Some(f64::NAN)),
            ],
        );

        assert_eq!(series.value_on(date("2025-01-01")), Some(3.0));
        assert_eq!(series.points()[1].value, None);
    }

    #[test]
    fn value_on_missing_day_test() {
        let series = Series::from_observations(
            EntityKey::single("Base"),
            vec![(date("2025-01-01"), Some(1.0))],
        );
        assert_eq!(series.value_on(date("2025-01-05")), None);
    }

    #[test]
    fn percentage_from_values_test() {
        assert_eq!(
            PercentageDelta::from_values(Some(150.0), Some(100.0)),
            PercentageDelta::Defined(0.5)
        );
        assert_eq!(
            PercentageDelta::from_values(Some(150.0), Some(0.0)),
            PercentageDelta::Undefined(UndefinedGrowth::ZeroBaseline)
        );
        assert_eq!(
            PercentageDelta::from_values(Some(150.0), Some(-1.0)),
            PercentageDelta::Undefined(UndefinedGrowth::NegativeBaseline)
        );
        assert_eq!(
            PercentageDelta::from_values(Some(150.0), None),
            PercentageDelta::Undefined(UndefinedGrowth::MissingBaseline)
        );
        assert_eq!(
            PercentageDelta::from_values(None, Some(100.0)),
            PercentageDelta::Undefined(UndefinedGrowth::MissingReference)
        );
    }

    #[test]
    fn percentage_display_test() {
        assert_eq!(PercentageDelta::Defined(0.1234).to_string(), "12.34%");
        assert_eq!(
            PercentageDelta::Undefined(UndefinedGrowth::ZeroBaseline).to_string(),
            "N/A"
        );
    }

    #[test]
    fn entity_key_display_test() {
        assert_eq!(EntityKey::pair("Base", "USDC").to_string(), "Base / USDC");
    }
}
