//! Daily TVL of individual protocols and of the categories DeFiLlama files them under.

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
};

use chrono::NaiveDate;
use console::{style, Term};
use serde::Serialize;
use tracing::debug;

use crate::{
    defi_llama::{liquidity_observations, LiquidityAtDate, ProtocolSummary},
    growth_report::{format_usd, print_heading},
    records::SeriesSet,
    time_series::{EntityKey, PercentageDelta, Series},
};

/// Top protocols by TVL to fetch history for.
pub const DEFAULT_PROTOCOL_LIMIT: usize = 250;
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolTvlRecord {
    pub date: NaiveDate,
    pub protocol_name: String,
    pub protocol_slug: String,
    pub category: String,
    pub tvl: f64,
}

/// The `limit` largest protocols by current TVL. Protocols without a TVL count as zero.
pub fn top_protocols(protocols: &[ProtocolSummary], limit: usize) -> Vec<&ProtocolSummary> {
    let mut top: Vec<&ProtocolSummary> = protocols.iter().collect();
    top.sort_by(|a, b| {
        b.tvl
            .unwrap_or_default()
            .total_cmp(&a.tvl.unwrap_or_default())
    });
    top.truncate(limit);
    top
}

/// One record per day on or after `since`.
pub fn protocol_tvl_records(
    summary: &ProtocolSummary,
    tvl_history: &[LiquidityAtDate],
    since: NaiveDate,
) -> Vec<ProtocolTvlRecord> {
    let category = summary
        .category
        .clone()
        .unwrap_or_else(|| UNCATEGORIZED.to_string());

    liquidity_observations(tvl_history)
        .filter(|(date, _)| *date >= since)
        .map(|(date, tvl)| ProtocolTvlRecord {
            date,
            protocol_name: summary.name.clone(),
            protocol_slug: summary.slug.clone(),
            category: category.clone(),
            tvl: tvl.unwrap_or_default(),
        })
        .collect()
}

/// TVL of every category, summed over its protocols per day.
pub fn category_series_set(records: &[ProtocolTvlRecord]) -> SeriesSet {
    let mut observations: BTreeMap<&str, Vec<(NaiveDate, Option<f64>)>> = BTreeMap::new();
    for record in records {
        observations
            .entry(record.category.as_str())
            .or_default()
            .push((record.date, Some(record.tvl)));
    }

    observations
        .into_iter()
        .map(|(category, observations)| {
            let entity = EntityKey::single(category);
            let series = Series::from_observations(entity.clone(), observations);
            (entity, series)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryTvlRecord {
    pub date: NaiveDate,
    pub category: String,
    pub tvl: f64,
}

/// Sorted by date, then category.
pub fn category_tvl_records(category_set: &SeriesSet) -> Vec<CategoryTvlRecord> {
    let mut records: Vec<CategoryTvlRecord> = category_set
        .values()
        .flat_map(|series| {
            let category = series.entity().to_string();
            series.points().iter().filter_map(move |point| {
                point.value.map(|tvl| CategoryTvlRecord {
                    date: point.date,
                    category: category.clone(),
                    tvl,
                })
            })
        })
        .collect();

    records.sort_by(|a, b| (a.date, &a.category).cmp(&(b.date, &b.category)));
    records
}

/// Change of a category's TVL between the first and the last day of the history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryGrowth {
    pub category: String,
    pub num_protocols: usize,
    pub tvl_start: f64,
    pub tvl_end: f64,
    pub growth_absolute: f64,
    pub growth_percentage: Option<f64>,
}

impl CategoryGrowth {
    /// Absent at the start, present at the end.
    pub fn is_new(&self) -> bool {
        self.tvl_start == 0.0 && self.tvl_end > 0.0
    }

    pub fn percentage(&self) -> PercentageDelta {
        PercentageDelta::from_values(Some(self.tvl_end), Some(self.tvl_start))
    }
}

/// Growth of every category with TVL on the last day of the history, largest absolute growth
/// first. A category without TVL on the first day starts at zero.
pub fn category_growth(records: &[ProtocolTvlRecord]) -> Vec<CategoryGrowth> {
    let (Some(first), Some(last)) = (
        records.iter().map(|record| record.date).min(),
        records.iter().map(|record| record.date).max(),
    ) else {
        return Vec::new();
    };

    let mut protocols_on_last: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in records.iter().filter(|record| record.date == last) {
        protocols_on_last
            .entry(record.category.as_str())
            .or_default()
            .insert(record.protocol_slug.as_str());
    }

    let category_set = category_series_set(records);
    let mut rows: Vec<CategoryGrowth> = category_set
        .values()
        .filter_map(|series| {
            let tvl_end = series.value_on(last)?;
            let tvl_start = series.value_on(first).unwrap_or(0.0);
            let category = series.entity().to_string();
            let growth = CategoryGrowth {
                num_protocols: protocols_on_last
                    .get(category.as_str())
                    .map_or(0, BTreeSet::len),
                category,
                tvl_start,
                tvl_end,
                growth_absolute: tvl_end - tvl_start,
                growth_percentage: None,
            };
            Some(CategoryGrowth {
                growth_percentage: growth.percentage().fraction(),
                ..growth
            })
        })
        .collect();

    debug!(%first, %last, categories = rows.len(), "measured category growth");

    rows.sort_by(|a, b| b.growth_absolute.total_cmp(&a.growth_absolute));
    rows
}

pub fn print_category_growth(
    term: &Term,
    heading: &str,
    rows: &[CategoryGrowth],
) -> io::Result<()> {
    print_heading(term, heading)?;
    term.write_line(&format!(
        "{:<28} {:>10} {:>18} {:>18} {:>10}",
        "Category", "Protocols", "Start", "End", "Change %"
    ))?;

    for row in rows {
        let change = match row.percentage() {
            _ if row.is_new() => style(String::from("NEW")).cyan().to_string(),
            PercentageDelta::Defined(fraction) if fraction >= 0.0 => {
                style(row.percentage().to_string()).green().to_string()
            }
            PercentageDelta::Defined(_) => style(row.percentage().to_string()).red().to_string(),
            PercentageDelta::Undefined(_) => row.percentage().to_string(),
        };
        term.write_line(&format!(
            "{:<28} {:>10} {:>18} {:>18} {:>10}",
            row.category,
            row.num_protocols,
            format_usd(row.tvl_start),
            format_usd(row.tvl_end),
            change
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse::<NaiveDate>().unwrap()
    }

    fn summary(slug: &str, category: Option<&str>, tvl: Option<f64>) -> ProtocolSummary {
        ProtocolSummary {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            category: category.map(str::to_string),
            tvl,
            ..ProtocolSummary::default()
        }
    }

    fn record(day: &str, slug: &str, category: &str, tvl: f64) -> ProtocolTvlRecord {
        ProtocolTvlRecord {
            date: date(day),
            protocol_name: slug.to_uppercase(),
            protocol_slug: slug.to_string(),
            category: category.to_string(),
            tvl,
        }
    }

    #[test]
    fn top_protocols_test() {
        let protocols = vec![
            summary("small", Some("Dexs"), Some(1.0)),
            summary("none", Some("Dexs"), None),
            summary("large", Some("Lending"), Some(100.0)),
        ];

        let slugs: Vec<&str> = top_protocols(&protocols, 2)
            .iter()
            .map(|protocol| protocol.slug.as_str())
            .collect();
        assert_eq!(slugs, vec!["large", "small"]);
    }

    #[test]
    fn protocol_tvl_records_since_test() {
        let history = vec![
            LiquidityAtDate {
                date: 1735689600,
                total_liquidity_usd: 10.0,
            },
            LiquidityAtDate {
                date: 1735776000,
                total_liquidity_usd: 12.0,
            },
        ];

        let records =
            protocol_tvl_records(&summary("aave", None, None), &history, date("2025-01-02"));

        assert_eq!(records, vec![record("2025-01-02", "aave", UNCATEGORIZED, 12.0)]);
    }

    #[test]
    fn category_tvl_records_test() {
        let records = vec![
            record("2025-01-01", "aave", "Lending", 10.0),
            record("2025-01-01", "morpho", "Lending", 5.0),
            record("2025-01-01", "uniswap", "Dexs", 7.0),
            record("2025-01-02", "aave", "Lending", 11.0),
        ];

        let category_records = category_tvl_records(&category_series_set(&records));
        let summary: Vec<(NaiveDate, &str, f64)> = category_records
            .iter()
            .map(|row| (row.date, row.category.as_str(), row.tvl))
            .collect();
        assert_eq!(
            summary,
            vec![
                (date("2025-01-01"), "Dexs", 7.0),
                (date("2025-01-01"), "Lending", 15.0),
                (date("2025-01-02"), "Lending", 11.0),
            ]
        );
    }

    #[test]
    fn category_growth_test() {
        let records = vec![
            record("2025-01-01", "aave", "Lending", 10.0),
            record("2025-01-01", "uniswap", "Dexs", 7.0),
            record("2025-01-31", "aave", "Lending", 15.0),
            record("2025-01-31", "morpho", "Lending", 5.0),
            record("2025-01-31", "ethena", "Basis Trading", 30.0),
        ];

        let rows = category_growth(&records);

        // Dexs have no TVL on the last day.
        let categories: Vec<&str> = rows.iter().map(|row| row.category.as_str()).collect();
        assert_eq!(categories, vec!["Basis Trading", "Lending"]);

        assert!(rows[0].is_new());
        assert_eq!(rows[0].growth_percentage, None);
        assert_eq!(rows[1].num_protocols, 2);
        assert_eq!(rows[1].growth_absolute, 10.0);
        assert_eq!(rows[1].growth_percentage, Some(1.0));

        assert!(category_growth(&[]).is_empty());
    }
}
