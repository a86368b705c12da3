use chrono::NaiveDate;
use defi_metrics::{
    growth_report::{growth_rows, write_growth_csv, GrowthOptions, STATUS_OK},
    launches::{milestone_rows, DEFAULT_THRESHOLD},
    records::SeriesSet,
    time_frames::{parse_window_list, GrowthWindow},
    time_series::{
        first_appearance, nearest, rolling_average, windowed_growth, windowed_growth_within,
        EntityKey, PercentageDelta, Series, SeriesError, UndefinedGrowth,
    },
};

fn date(s: &str) -> NaiveDate {
    s.parse::<NaiveDate>().unwrap()
}

fn series(points: &[(&str, f64)]) -> Series {
    Series::from_observations(
        EntityKey::single("Chain"),
        points.iter().map(|(day, value)| (date(day), Some(*value))),
    )
}

#[test]
fn nearest_is_never_beaten_by_another_point() {
    let series = series(&[
        ("2025-01-01", 1.0),
        ("2025-01-04", 2.0),
        ("2025-01-05", 3.0),
        ("2025-01-11", 4.0),
        ("2025-01-20", 5.0),
    ]);

    let mut target = date("2025-01-01");
    while target <= date("2025-01-20") {
        let found = nearest(&series, target).unwrap();
        let distance = (found.date - target).num_days().abs();

        assert!(series.points().contains(&found));
        for point in series.points() {
            let other = (point.date - target).num_days().abs();
            assert!(other >= distance);
            if other == distance && point.date != found.date {
                assert!(found.date < point.date, "ties go to the earlier point");
            }
        }

        target = target.succ_opt().unwrap();
    }
}

#[test]
fn first_appearance_skips_leading_zeros() {
    let series = series(&[("2025-01-01", 0.0), ("2025-01-02", 0.0), ("2025-01-03", 10.0)]);
    assert_eq!(first_appearance(&series), Ok(date("2025-01-03")));
}

#[test]
fn empty_and_inactive_series_fail_differently() {
    let empty = Series::empty(EntityKey::single("Empty"));
    assert_eq!(nearest(&empty, date("2025-01-01")), Err(SeriesError::EmptySeries));
    assert_eq!(first_appearance(&empty), Err(SeriesError::EmptySeries));

    let zeros = series(&[("2025-01-01", 0.0), ("2025-01-02", 0.0)]);
    assert_eq!(first_appearance(&zeros), Err(SeriesError::NoActivity));
}

#[test]
fn zero_day_window_is_zero_growth() {
    let series = series(&[("2025-01-01", 10.0), ("2025-01-02", 20.0)]);
    let growth = windowed_growth(&series, date("2025-01-02"), GrowthWindow(0)).unwrap();

    assert_eq!(growth.absolute_delta, Some(0.0));
    assert_eq!(growth.percentage_delta, PercentageDelta::Defined(0.0));
}

#[test]
fn zero_baseline_is_undefined_growth() {
    let series = series(&[("2025-01-01", 0.0), ("2025-01-31", 20.0)]);
    let growth = windowed_growth(&series, date("2025-01-31"), GrowthWindow(30)).unwrap();

    assert_eq!(growth.absolute_delta, Some(20.0));
    assert_eq!(
        growth.percentage_delta,
        PercentageDelta::Undefined(UndefinedGrowth::ZeroBaseline)
    );
    assert_eq!(growth.percentage_delta.to_string(), "N/A");
}

#[test]
fn thirty_day_growth_against_nearest_point() {
    let series = series(&[("2025-01-01", 100.0), ("2025-01-15", 150.0), ("2025-02-01", 200.0)]);
    let growth = windowed_growth(&series, date("2025-02-01"), GrowthWindow(30)).unwrap();

    assert_eq!(growth.comparison_date, date("2025-01-01"));
    assert_eq!(growth.absolute_delta, Some(100.0));
    assert_eq!(growth.percentage_delta, PercentageDelta::Defined(1.0));
}

#[test]
fn single_point_growth_is_since_inception() {
    let series = series(&[("2025-03-01", 50.0)]);
    assert_eq!(first_appearance(&series), Ok(date("2025-03-01")));

    let growth = windowed_growth(&series, date("2025-03-01"), GrowthWindow(90)).unwrap();
    assert_eq!(growth.comparison_date, date("2025-03-01"));
    assert_eq!(growth.absolute_delta, Some(0.0));
    assert_eq!(growth.percentage_delta, PercentageDelta::Defined(0.0));

    // With a distance limit the missing baseline is reported instead.
    assert!(matches!(
        windowed_growth_within(&series, date("2025-03-01"), GrowthWindow(90), 7),
        Err(SeriesError::OutOfRange { .. })
    ));
}

#[test]
fn rolling_average_of_one_point_is_that_point() {
    let series = series(&[("2025-01-01", 1.0), ("2025-02-10", 0.1 + 0.2)]);
    assert_eq!(
        rolling_average(&series, date("2025-02-12"), GrowthWindow(7)),
        Ok(0.1 + 0.2)
    );
}

#[test]
fn growth_report_is_repeatable() {
    let mut series_set = SeriesSet::new();
    for (name, points) in [
        ("Base", vec![("2025-01-01", 100.0), ("2025-02-01", 150.0)]),
        ("Idle", vec![("2025-01-01", 0.0), ("2025-02-01", 0.0)]),
    ] {
        let entity = EntityKey::single(name);
        let series = Series::from_observations(
            entity.clone(),
            points.into_iter().map(|(day, value)| (date(day), Some(value))),
        );
        series_set.insert(entity, series);
    }
    series_set.insert(
        EntityKey::single("Gone"),
        Series::empty(EntityKey::single("Gone")),
    );

    let options = GrowthOptions {
        as_of: date("2025-02-01"),
        windows: GrowthWindow::standard(),
        max_distance_days: None,
    };
    let render = || {
        let mut buffer = Vec::new();
        write_growth_csv(&mut buffer, &[String::from("chain")], &growth_rows(&series_set, &options))
            .unwrap();
        buffer
    };

    let first = render();
    assert_eq!(first, render());

    let csv = String::from_utf8(first).unwrap();
    assert!(csv.contains("Gone"));
    assert!(csv.contains("empty_series"));
}

fn single_point_set() -> SeriesSet {
    let entity = EntityKey::single("Chain");
    let mut series_set = SeriesSet::new();
    series_set.insert(entity, series(&[("2025-03-01", 150e6)]));
    series_set
}

#[test]
fn huge_windows_do_not_abort_growth_batch() {
    let options = GrowthOptions {
        as_of: date("2025-03-01"),
        windows: parse_window_list("7,200000000").unwrap(),
        max_distance_days: None,
    };

    let rows = growth_rows(&single_point_set(), &options);

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.status == STATUS_OK));
    assert_eq!(rows[1].absolute_delta, Some(0.0));
}

#[test]
fn huge_milestone_window_does_not_abort_batch() {
    let within: GrowthWindow = "200000000".parse().unwrap();
    let rows = milestone_rows(&single_point_set(), DEFAULT_THRESHOLD, within);

    assert_eq!(rows.len(), 1);
    assert!(rows[0].crossed());
    assert_eq!(rows[0].days_to_cross, Some(0));
}
