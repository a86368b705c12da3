use chrono::{Days, NaiveDate};

use crate::time_frames::GrowthWindow;

use super::{GrowthResult, PercentageDelta, Series, SeriesError, TimePoint};

fn days_apart(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Windows reaching past the calendar clamp to its first day, which still resolves to the first
/// point of a series.
fn window_start(as_of: NaiveDate, window: GrowthWindow) -> NaiveDate {
    as_of
        .checked_sub_days(Days::from(window))
        .unwrap_or(NaiveDate::MIN)
}

fn window_end(from: NaiveDate, window: GrowthWindow) -> NaiveDate {
    from.checked_add_days(Days::from(window))
        .unwrap_or(NaiveDate::MAX)
}

/// Points with a date in `[from, to]`.
fn points_between(series: &Series, from: NaiveDate, to: NaiveDate) -> &[TimePoint] {
    let points = series.points();
    let start = points.partition_point(|point| point.date < from);
    let end = points.partition_point(|point| point.date <= to);
    if start >= end {
        &[]
    } else {
        &points[start..end]
    }
}

/// The point closest to `target`. Targets outside the series resolve to the nearest end.
pub fn nearest(series: &Series, target: NaiveDate) -> Result<TimePoint, SeriesError> {
    let points = series.points();

    // Index of the first point on or after the target.
    let after_index = points.partition_point(|point| point.date < target);
    let before = after_index.checked_sub(1).map(|index| points[index]);
    let after = points.get(after_index).copied();

    match (before, after) {
        (None, None) => Err(SeriesError::EmptySeries),
        (Some(before), None) => Ok(before),
        (None, Some(after)) => Ok(after),
        (Some(before), Some(after)) => {
            // A point before and after the target at the exact same distance keeps the older one.
            if days_apart(after.date, target) < days_apart(target, before.date) {
                Ok(after)
            } else {
                Ok(before)
            }
        }
    }
}

/// Like [`nearest`], but refuses to stand in a point further than `max_distance_days` away for
/// the target.
pub fn nearest_within(
    series: &Series,
    target: NaiveDate,
    max_distance_days: u32,
) -> Result<TimePoint, SeriesError> {
    let closest = nearest(series, target)?;

    if days_apart(closest.date, target) > i64::from(max_distance_days) {
        Err(SeriesError::OutOfRange {
            target,
            nearest: closest.date,
            max_distance_days,
        })
    } else {
        Ok(closest)
    }
}

/// Launch date, the first day the series holds a value above zero.
pub fn first_appearance(series: &Series) -> Result<NaiveDate, SeriesError> {
    if series.is_empty() {
        return Err(SeriesError::EmptySeries);
    }

    series
        .points()
        .iter()
        .find(|point| point.value.is_some_and(|value| value > 0.0))
        .map(|point| point.date)
        .ok_or(SeriesError::NoActivity)
}

fn growth_from_points(
    series: &Series,
    as_of: NaiveDate,
    window: GrowthWindow,
    reference: TimePoint,
    comparison: TimePoint,
) -> GrowthResult {
    let absolute_delta = reference
        .value
        .zip(comparison.value)
        .map(|(reference, comparison)| reference - comparison);

    GrowthResult {
        entity: series.entity().clone(),
        as_of,
        window,
        reference_date: reference.date,
        comparison_date: comparison.date,
        value_at_reference: reference.value,
        value_at_comparison: comparison.value,
        absolute_delta,
        percentage_delta: PercentageDelta::from_values(reference.value, comparison.value),
    }
}

/// Growth between the point nearest `as_of` and the point nearest `as_of - window`. When the
/// window reaches back before the series starts the comparison is the first point, making this a
/// since-inception figure.
pub fn windowed_growth(
    series: &Series,
    as_of: NaiveDate,
    window: GrowthWindow,
) -> Result<GrowthResult, SeriesError> {
    let reference = nearest(series, as_of)?;
    let comparison = nearest(series, window_start(as_of, window))?;
    Ok(growth_from_points(
        series, as_of, window, reference, comparison,
    ))
}

pub fn windowed_growth_within(
    series: &Series,
    as_of: NaiveDate,
    window: GrowthWindow,
    max_distance_days: u32,
) -> Result<GrowthResult, SeriesError> {
    let reference = nearest_within(series, as_of, max_distance_days)?;
    let comparison = nearest_within(series, window_start(as_of, window), max_distance_days)?;
    Ok(growth_from_points(
        series, as_of, window, reference, comparison,
    ))
}

/// Mean of the values in `[as_of - window, as_of]`. Missing days are left out, not imputed.
pub fn rolling_average(
    series: &Series,
    as_of: NaiveDate,
    window: GrowthWindow,
) -> Result<f64, SeriesError> {
    if series.is_empty() {
        return Err(SeriesError::EmptySeries);
    }

    let from = window_start(as_of, window);
    let (sum, count) = points_between(series, from, as_of)
        .iter()
        .filter_map(|point| point.value)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        Err(SeriesError::InsufficientData { from, to: as_of })
    } else {
        Ok(sum / count as f64)
    }
}

/// A series holding the trailing [`rolling_average`] on every date of the input.
pub fn rolling_mean_series(series: &Series, window: GrowthWindow) -> Series {
    let observations = series.points().iter().map(|point| {
        let average = rolling_average(series, point.date, window).ok();
        (point.date, average)
    });

    Series::from_observations(series.entity().clone(), observations)
}

pub fn latest(series: &Series) -> Result<TimePoint, SeriesError> {
    series
        .points()
        .last()
        .copied()
        .ok_or(SeriesError::EmptySeries)
}

/// Highest value within `[from, to]`, the earliest one on ties.
pub fn peak_between(
    series: &Series,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<TimePoint, SeriesError> {
    if series.is_empty() {
        return Err(SeriesError::EmptySeries);
    }

    points_between(series, from, to)
        .iter()
        .filter(|point| point.value.is_some())
        .fold(None, |peak: Option<&TimePoint>, point| match peak {
            Some(peak) if peak.value >= point.value => Some(peak),
            _ => Some(point),
        })
        .copied()
        .ok_or(SeriesError::InsufficientData { from, to })
}

/// When, if at all, an entity first reached `threshold` within `within` days of its launch.
#[derive(Clone, Debug, PartialEq)]
pub struct Milestone {
    pub launch: NaiveDate,
    pub crossed: Option<NaiveDate>,
    pub days_to_cross: Option<i64>,
    pub peak_in_window: f64,
    pub latest: TimePoint,
}

pub fn first_crossing(
    series: &Series,
    threshold: f64,
    within: GrowthWindow,
) -> Result<Milestone, SeriesError> {
    let launch = first_appearance(series)?;
    let window_end = window_end(launch, within);
    let in_window = points_between(series, launch, window_end);

    let crossed = in_window
        .iter()
        .find(|point| point.value.is_some_and(|value| value >= threshold))
        .map(|point| point.date);

    // The launch point is positive, the peak always exists.
    let peak_in_window = peak_between(series, launch, window_end)?
        .value
        .unwrap_or_default();

    Ok(Milestone {
        launch,
        crossed,
        days_to_cross: crossed.map(|crossed| (crossed - launch).num_days()),
        peak_in_window,
        latest: latest(series)?,
    })
}
