//! How lending took off on chains that launched recently: chain TVL next to the TVL of the lending
//! protocols on it, day by day over the first months after launch.

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
};

use chrono::{Days, NaiveDate};
use console::Term;
use serde::Serialize;
use tracing::debug;

use crate::{
    defi_llama::{liquidity_observations, Protocol, ProtocolSummary},
    growth_report::{format_usd, print_heading},
    lending::is_chain_key,
    records::SeriesSet,
    time_frames::GrowthWindow,
    time_series::{first_appearance, latest, EntityKey, Series},
};

/// Which chains count as new and how long after launch they are followed.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChainOptions {
    /// Defaults to the latest date of any chain's TVL.
    pub as_of: Option<NaiveDate>,
    /// Chains whose TVL first appeared at most this long before `as_of`.
    pub lookback: GrowthWindow,
    /// Days after launch to follow each chain for.
    pub tracked: GrowthWindow,
    /// The chains with the most TVL today, at most this many.
    pub max_chains: usize,
}

impl Default for NewChainOptions {
    fn default() -> Self {
        Self {
            as_of: None,
            lookback: GrowthWindow(730),
            tracked: GrowthWindow(180),
            max_chains: 20,
        }
    }
}

/// Chains at least one of the given protocols holds TVL on.
pub fn lending_chain_names(protocols: &[ProtocolSummary]) -> BTreeSet<String> {
    protocols
        .iter()
        .flat_map(|protocol| protocol.chain_tvls.keys())
        .filter(|key| is_chain_key(key))
        .cloned()
        .collect()
}

pub fn lending_protocols_on_chain<'a>(
    protocols: &'a [ProtocolSummary],
    chain: &str,
) -> Vec<&'a ProtocolSummary> {
    protocols
        .iter()
        .filter(|protocol| protocol.chain_tvls.contains_key(chain))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewChain {
    pub chain: String,
    pub launch: NaiveDate,
    pub current_tvl: f64,
}

/// Chains that launched within `lookback` of `as_of`, the `limit` largest by current TVL.
pub fn recent_launches(
    chain_tvl: &SeriesSet,
    as_of: NaiveDate,
    lookback: GrowthWindow,
    limit: usize,
) -> Vec<NewChain> {
    let cutoff = as_of
        .checked_sub_days(Days::from(lookback))
        .unwrap_or(NaiveDate::MIN);

    let mut chains: Vec<NewChain> = chain_tvl
        .values()
        .filter_map(|series| {
            let launch = first_appearance(series).ok()?;
            if launch < cutoff || launch > as_of {
                return None;
            }
            Some(NewChain {
                chain: series.entity().to_string(),
                launch,
                current_tvl: latest(series).ok()?.value.unwrap_or_default(),
            })
        })
        .collect();

    chains.sort_by(|a, b| b.current_tvl.total_cmp(&a.current_tvl));
    chains.truncate(limit);
    chains
}

/// Summed TVL of the given protocols on one chain.
pub fn chain_lending_series<'a>(
    chain: &str,
    protocols: impl IntoIterator<Item = &'a Protocol>,
) -> Series {
    let observations: Vec<(NaiveDate, Option<f64>)> = protocols
        .into_iter()
        .filter_map(|protocol| protocol.chain_tvls.get(chain))
        .flat_map(|chain_tvl| liquidity_observations(&chain_tvl.tvl))
        .collect();

    Series::from_observations(EntityKey::single(chain), observations)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingGrowthRow {
    pub chain: String,
    pub launch_date: NaiveDate,
    pub date: NaiveDate,
    pub days_since_launch: i64,
    pub total_chain_tvl: f64,
    pub lending_tvl: f64,
    /// Lending over chain TVL, absent when the chain has no TVL.
    pub lending_share: Option<f64>,
    pub num_lending_protocols: usize,
}

/// One row per day of chain TVL from `launch` through `tracked` days later, or `as_of` if that
/// comes first. Days without lending TVL count as zero.
pub fn lending_growth_rows(
    chain_tvl: &Series,
    lending: &Series,
    launch: NaiveDate,
    as_of: NaiveDate,
    tracked: GrowthWindow,
    num_lending_protocols: usize,
) -> Vec<LendingGrowthRow> {
    let end = launch
        .checked_add_days(Days::from(tracked))
        .unwrap_or(NaiveDate::MAX)
        .min(as_of);
    let chain = chain_tvl.entity().to_string();

    chain_tvl
        .points()
        .iter()
        .filter(|point| point.date >= launch && point.date <= end)
        .filter_map(|point| {
            let total_chain_tvl = point.value?;
            let lending_tvl = lending.value_on(point.date).unwrap_or(0.0);
            Some(LendingGrowthRow {
                chain: chain.clone(),
                launch_date: launch,
                date: point.date,
                days_since_launch: (point.date - launch).num_days(),
                total_chain_tvl,
                lending_tvl,
                lending_share: (total_chain_tvl > 0.0).then(|| lending_tvl / total_chain_tvl),
                num_lending_protocols,
            })
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingGrowthSummary {
    pub chain: String,
    pub launch_date: NaiveDate,
    pub days_tracked: i64,
    pub num_lending_protocols: usize,
    pub lending_tvl_day_0: f64,
    pub lending_tvl_day_30: f64,
    pub lending_tvl_day_60: f64,
    pub lending_tvl_day_90: f64,
    /// On the last tracked day.
    pub lending_tvl_final: f64,
    pub peak_lending_tvl: f64,
    pub peak_lending_day: i64,
    pub final_lending_share: Option<f64>,
}

/// Lending TVL on the last row at most `day` days after launch, zero before the first row.
fn lending_tvl_by_day(rows: &[&LendingGrowthRow], day: i64) -> f64 {
    rows.iter()
        .rev()
        .find(|row| row.days_since_launch <= day)
        .map_or(0.0, |row| row.lending_tvl)
}

/// One summary per chain, highest lending peak first. Expects the rows of a chain sorted by day.
pub fn lending_growth_summaries(rows: &[LendingGrowthRow]) -> Vec<LendingGrowthSummary> {
    let mut chains: BTreeMap<&str, Vec<&LendingGrowthRow>> = BTreeMap::new();
    for row in rows {
        chains.entry(row.chain.as_str()).or_default().push(row);
    }

    let mut summaries: Vec<LendingGrowthSummary> = chains
        .into_values()
        .filter_map(|chain_rows| {
            let first = chain_rows.first()?;
            let last = chain_rows.last()?;
            let peak = chain_rows.iter().copied().fold(*first, |peak, row| {
                if row.lending_tvl > peak.lending_tvl {
                    row
                } else {
                    peak
                }
            });

            Some(LendingGrowthSummary {
                chain: first.chain.clone(),
                launch_date: first.launch_date,
                days_tracked: last.days_since_launch,
                num_lending_protocols: first.num_lending_protocols,
                lending_tvl_day_0: chain_rows
                    .iter()
                    .find(|row| row.days_since_launch == 0)
                    .map_or(0.0, |row| row.lending_tvl),
                lending_tvl_day_30: lending_tvl_by_day(&chain_rows, 30),
                lending_tvl_day_60: lending_tvl_by_day(&chain_rows, 60),
                lending_tvl_day_90: lending_tvl_by_day(&chain_rows, 90),
                lending_tvl_final: last.lending_tvl,
                peak_lending_tvl: peak.lending_tvl,
                peak_lending_day: peak.days_since_launch,
                final_lending_share: last.lending_share,
            })
        })
        .collect();

    debug!(chains = summaries.len(), "summarized lending growth");

    summaries.sort_by(|a, b| b.peak_lending_tvl.total_cmp(&a.peak_lending_tvl));
    summaries
}

pub fn print_lending_growth(term: &Term, summaries: &[LendingGrowthSummary]) -> io::Result<()> {
    print_heading(term, "Lending TVL after chain launch")?;
    term.write_line(&format!(
        "{:<20} {:<10} {:>16} {:>16} {:>16} {:>16} {:>9}",
        "Chain", "Launch", "Peak", "Day 30", "Day 90", "Final", "Share"
    ))?;

    for summary in summaries.iter().take(10) {
        term.write_line(&format!(
            "{:<20} {:<10} {:>16} {:>16} {:>16} {:>16} {:>9}",
            summary.chain,
            summary.launch_date,
            format_usd(summary.peak_lending_tvl),
            format_usd(summary.lending_tvl_day_30),
            format_usd(summary.lending_tvl_day_90),
            format_usd(summary.lending_tvl_final),
            summary
                .final_lending_share
                .map(|share| format!("{:.2}%", share * 100.0))
                .unwrap_or_else(|| String::from("N/A")),
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::defi_llama::{LiquidityAtDate, ProtocolChainTvl};

    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse::<NaiveDate>().unwrap()
    }

    fn series(entity: &str, points: &[(&str, f64)]) -> Series {
        Series::from_observations(
            EntityKey::single(entity),
            points.iter().map(|(day, value)| (date(day), Some(*value))),
        )
    }

    fn summary(slug: &str, chains: &[&str]) -> ProtocolSummary {
        ProtocolSummary {
            slug: slug.to_string(),
            name: slug.to_string(),
            chain_tvls: chains.iter().map(|chain| (chain.to_string(), 1.0)).collect(),
            ..ProtocolSummary::default()
        }
    }

    fn unix(day: &str) -> i64 {
        date(day).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()
    }

    fn protocol(chain: &str, points: &[(&str, f64)]) -> Protocol {
        Protocol {
            name: String::from("lender"),
            category: None,
            tvl: Vec::new(),
            chain_tvls: BTreeMap::from([(
                chain.to_string(),
                ProtocolChainTvl {
                    tvl: points
                        .iter()
                        .map(|(day, tvl)| LiquidityAtDate {
                            date: unix(day),
                            total_liquidity_usd: *tvl,
                        })
                        .collect(),
                },
            )]),
        }
    }

    #[test]
    fn lending_chain_names_test() {
        let protocols = vec![
            summary("aave", &["Base", "Base-borrowed", "borrowed", "Plasma"]),
            summary("morpho", &["Base", "Katana"]),
        ];

        let names: Vec<String> = lending_chain_names(&protocols).into_iter().collect();
        assert_eq!(names, vec!["Base", "Katana", "Plasma"]);

        let on_base = lending_protocols_on_chain(&protocols, "Base");
        assert_eq!(on_base.len(), 2);
        assert_eq!(lending_protocols_on_chain(&protocols, "Katana")[0].slug, "morpho");
    }

    #[test]
    fn recent_launches_test() {
        let mut chain_tvl = SeriesSet::new();
        for series in [
            series("Old", &[("2020-01-01", 5.0), ("2025-06-01", 500.0)]),
            series("Small", &[("2025-01-01", 0.0), ("2025-02-01", 1.0), ("2025-06-01", 10.0)]),
            series("Large", &[("2025-03-01", 50.0), ("2025-06-01", 100.0)]),
            series("Idle", &[("2025-03-01", 0.0)]),
        ] {
            chain_tvl.insert(series.entity().clone(), series);
        }

        let launches = recent_launches(&chain_tvl, date("2025-06-01"), GrowthWindow(730), 20);
        let summary: Vec<(&str, NaiveDate, f64)> = launches
            .iter()
            .map(|launch| (launch.chain.as_str(), launch.launch, launch.current_tvl))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Large", date("2025-03-01"), 100.0),
                ("Small", date("2025-02-01"), 10.0),
            ]
        );

        assert_eq!(
            recent_launches(&chain_tvl, date("2025-06-01"), GrowthWindow(730), 1).len(),
            1
        );
        assert_eq!(
            recent_launches(&chain_tvl, date("2025-06-01"), GrowthWindow(u32::MAX), 20).len(),
            3
        );
    }

    #[test]
    fn chain_lending_series_sums_protocols_test() {
        let protocols = vec![
            protocol("Plasma", &[("2025-09-25", 10.0), ("2025-09-26", 20.0)]),
            protocol("Plasma", &[("2025-09-26", 5.0)]),
            protocol("Base", &[("2025-09-26", 1000.0)]),
        ];

        let lending = chain_lending_series("Plasma", &protocols);
        assert_eq!(lending.value_on(date("2025-09-25")), Some(10.0));
        assert_eq!(lending.value_on(date("2025-09-26")), Some(25.0));
    }

    #[test]
    fn lending_growth_rows_test() {
        let chain_tvl = series(
            "Plasma",
            &[
                ("2025-09-25", 100.0),
                ("2025-09-26", 0.0),
                ("2025-10-25", 400.0),
                ("2025-12-01", 800.0),
            ],
        );
        let lending = series("Plasma", &[("2025-09-25", 10.0), ("2025-10-25", 200.0)]);

        let rows = lending_growth_rows(
            &chain_tvl,
            &lending,
            date("2025-09-25"),
            date("2025-11-30"),
            GrowthWindow(180),
            3,
        );

        let summary: Vec<(i64, f64, Option<f64>)> = rows
            .iter()
            .map(|row| (row.days_since_launch, row.lending_tvl, row.lending_share))
            .collect();
        assert_eq!(
            summary,
            vec![(0, 10.0, Some(0.1)), (1, 0.0, None), (30, 200.0, Some(0.5))]
        );
        assert_eq!(rows[0].num_lending_protocols, 3);

        // Days past the tracked window are left out.
        let rows = lending_growth_rows(
            &chain_tvl,
            &lending,
            date("2025-09-25"),
            date("2025-12-01"),
            GrowthWindow(7),
            3,
        );
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn lending_growth_summaries_test() {
        let row = |chain: &str, days: i64, lending_tvl: f64| LendingGrowthRow {
            chain: chain.to_string(),
            launch_date: date("2025-01-01"),
            date: date("2025-01-01") + chrono::Duration::days(days),
            days_since_launch: days,
            total_chain_tvl: 1000.0,
            lending_tvl,
            lending_share: Some(lending_tvl / 1000.0),
            num_lending_protocols: 2,
        };
        let rows = vec![
            row("Slow", 5, 10.0),
            row("Slow", 100, 20.0),
            row("Fast", 0, 50.0),
            row("Fast", 25, 300.0),
            row("Fast", 31, 300.0),
            row("Fast", 120, 250.0),
        ];

        let summaries = lending_growth_summaries(&rows);

        assert_eq!(summaries[0].chain, "Fast");
        assert_eq!(summaries[0].lending_tvl_day_0, 50.0);
        assert_eq!(summaries[0].lending_tvl_day_30, 300.0);
        assert_eq!(summaries[0].peak_lending_tvl, 300.0);
        assert_eq!(summaries[0].peak_lending_day, 25);
        assert_eq!(summaries[0].lending_tvl_final, 250.0);
        assert_eq!(summaries[0].days_tracked, 120);
        assert_eq!(summaries[0].final_lending_share, Some(0.25));

        assert_eq!(summaries[1].chain, "Slow");
        assert_eq!(summaries[1].lending_tvl_day_0, 0.0);
        assert_eq!(summaries[1].lending_tvl_day_30, 10.0);
        assert_eq!(summaries[1].lending_tvl_day_90, 10.0);
    }
}
