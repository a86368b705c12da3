//! Flat `(entity, date, value)` records, the only shape the aggregator is fed with, and the CSV
//! files they are cached in between runs.

use std::{collections::BTreeMap, io, path::Path};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::time_series::{EntityKey, Series};

/// Every entity of one metric, iterated in key order so output is stable between runs.
pub type SeriesSet = BTreeMap<EntityKey, Series>;

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub entity: EntityKey,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("column {0} not found in header")]
    MissingColumn(String),
    #[error("row {row}: invalid date {value}")]
    InvalidDate { row: usize, value: String },
    #[error("row {row}: invalid value {value}")]
    InvalidValue { row: usize, value: String },
}

/// Describes which columns of a CSV file hold the record fields.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordColumns {
    pub date: String,
    pub entity: Vec<String>,
    pub value: String,
}

impl RecordColumns {
    pub fn new(date: &str, entity: &[&str], value: &str) -> Self {
        Self {
            date: date.to_string(),
            entity: entity.iter().map(|column| column.to_string()).collect(),
            value: value.to_string(),
        }
    }
}

/// Accepts plain dates as well as the timestamps pandas and the APIs write, time of day is
/// dropped.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    s.parse::<NaiveDate>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|date_time| date_time.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|date_time| date_time.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|date_time| date_time.naive_utc().date())
        })
}

/// The UTC calendar date of a unix timestamp in seconds.
pub fn date_from_unix(timestamp: i64) -> Option<NaiveDate> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|date_time| date_time.date_naive())
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, RecordsError> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| RecordsError::MissingColumn(column.to_string()))
}

pub fn read_records<R: io::Read>(
    reader: R,
    columns: &RecordColumns,
) -> Result<Vec<Record>, RecordsError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let date_index = column_index(&headers, &columns.date)?;
    let value_index = column_index(&headers, &columns.value)?;
    let entity_indices = columns
        .entity
        .iter()
        .map(|column| column_index(&headers, column))
        .collect::<Result<Vec<usize>, RecordsError>>()?;

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        // Header is line 1.
        let line = index + 2;

        let raw_date = row.get(date_index).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| RecordsError::InvalidDate {
            row: line,
            value: raw_date.to_string(),
        })?;

        let raw_value = row.get(value_index).unwrap_or_default().trim();
        let value = if raw_value.is_empty() || raw_value.eq_ignore_ascii_case("nan") {
            None
        } else {
            let value =
                raw_value
                    .parse::<f64>()
                    .map_err(|_| RecordsError::InvalidValue {
                        row: line,
                        value: raw_value.to_string(),
                    })?;
            Some(value)
        };

        let entity = EntityKey(
            entity_indices
                .iter()
                .map(|index| row.get(*index).unwrap_or_default().to_string())
                .collect(),
        );

        records.push(Record {
            entity,
            date,
            value,
        });
    }

    Ok(records)
}

pub fn read_records_file(
    path: impl AsRef<Path>,
    columns: &RecordColumns,
) -> Result<Vec<Record>, RecordsError> {
    let file = std::fs::File::open(path)?;
    read_records(file, columns)
}

pub fn write_records<W: io::Write>(
    writer: W,
    columns: &RecordColumns,
    records: &[Record],
) -> Result<(), RecordsError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![columns.date.as_str()];
    header.extend(columns.entity.iter().map(String::as_str));
    header.push(columns.value.as_str());
    csv_writer.write_record(&header)?;

    for record in records {
        let mut row = vec![record.date.to_string()];
        row.extend(record.entity.parts().iter().cloned());
        row.push(record.value.map(|value| value.to_string()).unwrap_or_default());
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_records_file(
    path: impl AsRef<Path>,
    columns: &RecordColumns,
    records: &[Record],
) -> Result<(), RecordsError> {
    let file = std::fs::File::create(path)?;
    write_records(file, columns, records)
}

/// Writes any serde row type, header taken from the field names.
pub fn write_csv<W: io::Write, T: Serialize>(writer: W, rows: &[T]) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file<T: Serialize>(
    path: impl AsRef<Path>,
    rows: &[T],
) -> Result<(), RecordsError> {
    let file = std::fs::File::create(path)?;
    write_csv(file, rows)?;
    Ok(())
}

pub fn series_set(records: impl IntoIterator<Item = Record>) -> SeriesSet {
    let mut observations: BTreeMap<EntityKey, Vec<(NaiveDate, Option<f64>)>> = BTreeMap::new();
    for record in records {
        observations
            .entry(record.entity)
            .or_default()
            .push((record.date, record.value));
    }

    observations
        .into_iter()
        .map(|(entity, observations)| {
            let series = Series::from_observations(entity.clone(), observations);
            (entity, series)
        })
        .collect()
}
