//! Stablecoin circulation per chain: total and USDC growth, USDC share, dominant coin and when each
//! coin first showed up on each chain.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::Path,
};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::{
    classify::PegStandard,
    growth_report::{growth_row, GrowthOptions, GrowthRow},
    records::{parse_date, RecordsError, SeriesSet},
    time_frames::GrowthWindow,
    time_series::{first_appearance, nearest, nearest_within, EntityKey, Series, SeriesError},
};

pub const USDC: &str = "USDC";
pub const USDT: &str = "USDT";

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date {s}")))
}

/// Circulating amount of one stablecoin on one chain on one day.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StablecoinRecord {
    pub stablecoin_id: String,
    pub stablecoin_name: String,
    pub stablecoin_symbol: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    pub chain: String,
    pub circulating: f64,
    #[serde(default, rename = "native_bridged_standard")]
    pub standard: Option<String>,
}

pub fn read_stablecoin_records<R: io::Read>(
    reader: R,
) -> Result<Vec<StablecoinRecord>, RecordsError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let records = csv_reader
        .deserialize()
        .collect::<Result<Vec<StablecoinRecord>, csv::Error>>()?;
    Ok(records)
}

pub fn read_stablecoin_records_file(
    path: impl AsRef<Path>,
) -> Result<Vec<StablecoinRecord>, RecordsError> {
    let file = std::fs::File::open(path)?;
    read_stablecoin_records(file)
}

pub fn write_stablecoin_records<W: io::Write>(
    writer: W,
    records: &[StablecoinRecord],
) -> Result<(), RecordsError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_stablecoin_records_file(
    path: impl AsRef<Path>,
    records: &[StablecoinRecord],
) -> Result<(), RecordsError> {
    let file = std::fs::File::create(path)?;
    write_stablecoin_records(file, records)
}

fn summed_series<'a, K>(
    records: impl Iterator<Item = &'a StablecoinRecord>,
    key: K,
) -> SeriesSet
where
    K: Fn(&StablecoinRecord) -> EntityKey,
{
    let mut observations: BTreeMap<EntityKey, Vec<(NaiveDate, Option<f64>)>> = BTreeMap::new();
    for record in records {
        observations
            .entry(key(record))
            .or_default()
            .push((record.date, Some(record.circulating)));
    }

    observations
        .into_iter()
        .map(|(entity, observations)| {
            let series = Series::from_observations(entity.clone(), observations);
            (entity, series)
        })
        .collect()
}

/// All stablecoins summed per chain.
pub fn chain_totals(records: &[StablecoinRecord]) -> SeriesSet {
    summed_series(records.iter(), |record| EntityKey::single(record.chain.as_str()))
}

/// One stablecoin symbol summed per chain, across every id carrying that symbol.
pub fn symbol_totals(records: &[StablecoinRecord], symbol: &str) -> SeriesSet {
    summed_series(
        records
            .iter()
            .filter(|record| record.stablecoin_symbol == symbol),
        |record| EntityKey::single(record.chain.as_str()),
    )
}

/// Keyed by chain and symbol.
pub fn chain_symbol_series(records: &[StablecoinRecord]) -> SeriesSet {
    summed_series(records.iter(), |record| {
        EntityKey::pair(record.chain.as_str(), record.stablecoin_symbol.as_str())
    })
}

/// The peg standard of every chain and symbol that has records.
pub fn peg_standards(records: &[StablecoinRecord]) -> HashMap<(String, String), PegStandard> {
    let mut standards: HashMap<(String, String), Vec<&str>> = HashMap::new();
    for record in records {
        let entry = standards
            .entry((record.chain.clone(), record.stablecoin_symbol.clone()))
            .or_default();
        if let Some(standard) = record.standard.as_deref() {
            entry.push(standard);
        }
    }

    standards
        .into_iter()
        .map(|(key, standards)| (key, PegStandard::resolve(standards)))
        .collect()
}

pub fn latest_record_date(records: &[StablecoinRecord]) -> Option<NaiveDate> {
    records.iter().map(|record| record.date).max()
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindowGrowth {
    pub window: GrowthWindow,
    pub total: GrowthRow,
    /// Absent for chains without USDC.
    pub usdc: Option<GrowthRow>,
    /// Percentage points as a fraction, share at the reference date minus share at the comparison
    /// date.
    pub usdc_share_change: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainStablecoinGrowth {
    pub chain: String,
    pub launch_date: Option<NaiveDate>,
    pub reference_date: Option<NaiveDate>,
    pub dominant_stablecoin: Option<String>,
    pub usdc_standard: Option<PegStandard>,
    pub usdt_standard: PegStandard,
    pub total_current: Option<f64>,
    pub usdc_current: Option<f64>,
    pub usdc_share: Option<f64>,
    pub windows: Vec<WindowGrowth>,
}

impl ChainStablecoinGrowth {
    fn first_window_delta(&self) -> Option<f64> {
        self.windows
            .first()
            .and_then(|window_growth| window_growth.total.absolute_delta)
    }
}

/// Everything the chain report looks at, grouped once.
pub struct StablecoinData {
    chain_totals: SeriesSet,
    usdc_totals: SeriesSet,
    chain_symbols: SeriesSet,
    standards: HashMap<(String, String), PegStandard>,
}

impl StablecoinData {
    pub fn new(records: &[StablecoinRecord]) -> Self {
        Self {
            chain_totals: chain_totals(records),
            usdc_totals: symbol_totals(records, USDC),
            chain_symbols: chain_symbol_series(records),
            standards: peg_standards(records),
        }
    }

    pub fn chain_totals(&self) -> &SeriesSet {
        &self.chain_totals
    }

    fn standard(&self, chain: &str, symbol: &str) -> Option<PegStandard> {
        self.standards
            .get(&(chain.to_string(), symbol.to_string()))
            .copied()
    }

    fn lookup(
        &self,
        series: &Series,
        target: NaiveDate,
        max_distance_days: Option<u32>,
    ) -> Result<NaiveDate, SeriesError> {
        match max_distance_days {
            Some(max_distance_days) => nearest_within(series, target, max_distance_days),
            None => nearest(series, target),
        }
        .map(|point| point.date)
    }

    /// Symbols of a chain with their amount on the given day.
    fn symbols_on<'a>(
        &'a self,
        chain: &'a str,
        date: NaiveDate,
    ) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.chain_symbols
            .iter()
            .filter(move |(entity, _)| entity.parts().first().map(String::as_str) == Some(chain))
            .filter_map(move |(entity, series)| {
                let symbol = entity.parts().get(1)?;
                Some((symbol.as_str(), series.value_on(date)?))
            })
    }

    /// The coin with the most circulating on the given day, the first in symbol order on ties.
    pub fn dominant_stablecoin(&self, chain: &str, date: NaiveDate) -> Option<String> {
        self.symbols_on(chain, date)
            .fold(None, |dominant: Option<(&str, f64)>, (symbol, amount)| {
                match dominant {
                    Some((_, dominant_amount)) if dominant_amount >= amount => dominant,
                    _ => Some((symbol, amount)),
                }
            })
            .map(|(symbol, _)| symbol.to_string())
    }

    /// USDC over all stablecoins of a chain on one day. Absent without any stablecoins, or when
    /// the USDC history of the chain has a gap on that day. Zero before USDC first shows up.
    pub fn usdc_share(&self, chain: &str, date: NaiveDate) -> Option<f64> {
        let entity = EntityKey::single(chain);
        let total = self.chain_totals.get(&entity)?.value_on(date)?;
        if total <= 0.0 {
            return None;
        }
        let usdc = match self.usdc_totals.get(&entity) {
            None => 0.0,
            Some(series) => match series.value_on(date) {
                Some(usdc) => usdc,
                None if series.points().first().is_some_and(|first| first.date < date) => {
                    return None
                }
                None => 0.0,
            },
        };
        Some(usdc / total)
    }

    fn chain_growth(&self, total: &Series, options: &GrowthOptions) -> ChainStablecoinGrowth {
        let chain = total
            .entity()
            .parts()
            .first()
            .cloned()
            .unwrap_or_default();
        let usdc = self.usdc_totals.get(total.entity());

        let launch_date = first_appearance(total)
            .map_err(|err| debug!(chain, %err, "no stablecoin launch"))
            .ok();

        let reference_date = self
            .lookup(total, options.as_of, options.max_distance_days)
            .map_err(|err| warn!(chain, %err, "no stablecoin total near as-of date"))
            .ok();

        let windows = options
            .windows
            .iter()
            .map(|window| {
                let total_row = growth_row(total, options, *window);
                let usdc_share_change = match (total_row.reference_date, total_row.comparison_date)
                {
                    (Some(reference_date), Some(comparison_date)) => self
                        .usdc_share(&chain, reference_date)
                        .zip(self.usdc_share(&chain, comparison_date))
                        .map(|(now, then)| now - then),
                    _ => None,
                };
                WindowGrowth {
                    window: *window,
                    total: total_row,
                    usdc: usdc.map(|usdc| growth_row(usdc, options, *window)),
                    usdc_share_change,
                }
            })
            .collect();

        ChainStablecoinGrowth {
            launch_date,
            reference_date,
            dominant_stablecoin: reference_date
                .and_then(|date| self.dominant_stablecoin(&chain, date)),
            usdc_standard: usdc
                .map(|_| self.standard(&chain, USDC).unwrap_or(PegStandard::Bridged)),
            usdt_standard: self.standard(&chain, USDT).unwrap_or(PegStandard::Bridged),
            total_current: reference_date.and_then(|date| total.value_on(date)),
            usdc_current: reference_date
                .and_then(|date| usdc.and_then(|usdc| usdc.value_on(date))),
            usdc_share: reference_date.and_then(|date| self.usdc_share(&chain, date)),
            chain,
            windows,
        }
    }

    /// One row per chain, largest absolute total growth over the first window first.
    pub fn chain_growth_report(&self, options: &GrowthOptions) -> Vec<ChainStablecoinGrowth> {
        let mut report: Vec<ChainStablecoinGrowth> = self
            .chain_totals
            .values()
            .map(|total| self.chain_growth(total, options))
            .collect();

        report.sort_by(|a, b| match (a.first_window_delta(), b.first_window_delta()) {
            (Some(a), Some(b)) => b.total_cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        report
    }

    /// First appearance of every coin on every chain with its current share of the chain,
    /// most recent launch first.
    pub fn coin_launches(&self, options: &GrowthOptions) -> Vec<CoinLaunch> {
        let mut launches = Vec::new();

        for (entity, series) in &self.chain_symbols {
            let (chain, symbol) = match entity.parts() {
                [chain, symbol] => (chain.as_str(), symbol.as_str()),
                _ => continue,
            };

            let launch_date = match first_appearance(series) {
                Ok(launch_date) => launch_date,
                Err(err) => {
                    debug!(%entity, %err, "skipping coin without launch");
                    continue;
                }
            };

            let reference_date = self
                .chain_totals
                .get(&EntityKey::single(chain))
                .and_then(|total| {
                    self.lookup(total, options.as_of, options.max_distance_days)
                        .ok()
                });
            let current_circulating =
                reference_date.map(|date| series.value_on(date).unwrap_or_default());
            let chain_total = reference_date.and_then(|date| {
                self.chain_totals
                    .get(&EntityKey::single(chain))
                    .and_then(|total| total.value_on(date))
            });
            let market_share = match (current_circulating, chain_total) {
                (Some(current), _) if current <= 0.0 => Some(0.0),
                (Some(current), Some(chain_total)) if chain_total > 0.0 => {
                    Some(current / chain_total)
                }
                _ => None,
            };

            launches.push(CoinLaunch {
                chain: chain.to_string(),
                stablecoin_symbol: symbol.to_string(),
                launch_date,
                current_circulating,
                market_share,
                standard: self.standard(chain, symbol).unwrap_or(PegStandard::Bridged),
            });
        }

        launches.sort_by(|a, b| {
            b.launch_date
                .cmp(&a.launch_date)
                .then_with(|| a.chain.cmp(&b.chain))
                .then_with(|| a.stablecoin_symbol.cmp(&b.stablecoin_symbol))
        });

        launches
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoinLaunch {
    pub chain: String,
    pub stablecoin_symbol: String,
    pub launch_date: NaiveDate,
    pub current_circulating: Option<f64>,
    pub market_share: Option<f64>,
    #[serde(serialize_with = "serialize_standard")]
    pub standard: PegStandard,
}

fn serialize_standard<S: serde::Serializer>(
    standard: &PegStandard,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(standard.as_str())
}

fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

pub fn write_chain_growth_csv<W: io::Write>(
    writer: W,
    windows: &[GrowthWindow],
    report: &[ChainStablecoinGrowth],
) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = [
        "chain",
        "launch_date",
        "reference_date",
        "dominant_stablecoin",
        "usdc_standard",
        "usdt_standard",
        "total_current",
        "usdc_current",
        "usdc_share",
    ]
    .iter()
    .map(|column| column.to_string())
    .collect();
    for window in windows {
        let days = window.days();
        header.extend([
            format!("total_growth_{days}d"),
            format!("total_pct_change_{days}d"),
            format!("usdc_growth_{days}d"),
            format!("usdc_pct_change_{days}d"),
            format!("usdc_share_change_{days}d"),
            format!("status_{days}d"),
        ]);
    }
    csv_writer.write_record(&header)?;

    for row in report {
        let mut record = vec![
            row.chain.clone(),
            format_optional(row.launch_date),
            format_optional(row.reference_date),
            row.dominant_stablecoin.clone().unwrap_or_default(),
            format_optional(row.usdc_standard.map(|standard| standard.as_str())),
            row.usdt_standard.as_str().to_string(),
            format_optional(row.total_current),
            format_optional(row.usdc_current),
            format_optional(row.usdc_share),
        ];
        for window_growth in &row.windows {
            record.extend([
                format_optional(window_growth.total.absolute_delta),
                format_optional(window_growth.total.percentage_delta),
                format_optional(
                    window_growth
                        .usdc
                        .as_ref()
                        .and_then(|usdc| usdc.absolute_delta),
                ),
                format_optional(
                    window_growth
                        .usdc
                        .as_ref()
                        .and_then(|usdc| usdc.percentage_delta),
                ),
                format_optional(window_growth.usdc_share_change),
                window_growth.total.status.to_string(),
            ]);
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::time_series::PercentageDelta;

    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse::<NaiveDate>().unwrap()
    }

    fn record(day: &str, chain: &str, symbol: &str, circulating: f64) -> StablecoinRecord {
        StablecoinRecord {
            stablecoin_id: symbol.to_lowercase(),
            stablecoin_name: symbol.to_string(),
            stablecoin_symbol: symbol.to_string(),
            date: date(day),
            chain: chain.to_string(),
            circulating,
            standard: None,
        }
    }

    fn records() -> Vec<StablecoinRecord> {
        vec![
            record("2025-01-01", "Base", USDC, 100.0),
            record("2025-01-01", "Base", USDT, 100.0),
            record("2025-01-31", "Base", USDC, 300.0),
            record("2025-01-31", "Base", USDT, 100.0),
            record("2025-01-20", "Plume", USDT, 0.0),
            record("2025-01-25", "Plume", USDT, 50.0),
            record("2025-01-31", "Plume", USDT, 80.0),
        ]
    }

    fn options() -> GrowthOptions {
        GrowthOptions {
            as_of: date("2025-01-31"),
            windows: vec![GrowthWindow(30)],
            max_distance_days: None,
        }
    }

    #[test]
    fn read_stablecoin_records_test() {
        let csv = "\
stablecoin_id,stablecoin_name,stablecoin_symbol,date,chain,circulating
1,Tether,USDT,2025-01-01 00:00:00,Ethereum,100.5
2,USD Coin,USDC,2025-01-02,Base,0
";
        let records = read_stablecoin_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, date("2025-01-01"));
        assert_eq!(records[0].standard, None);
        assert_eq!(records[1].stablecoin_symbol, "USDC");
    }

    #[test]
    fn write_then_read_stablecoin_records_test() {
        let mut with_standard = record("2025-01-01", "Base", USDC, 1.5);
        with_standard.standard = Some(String::from("native"));
        let records = vec![with_standard, record("2025-01-02", "Base", USDT, 2.0)];

        let mut buffer = Vec::new();
        write_stablecoin_records(&mut buffer, &records).unwrap();

        let csv = String::from_utf8(buffer.clone()).unwrap();
        assert!(csv.starts_with(
            "stablecoin_id,stablecoin_name,stablecoin_symbol,date,chain,circulating,native_bridged_standard\n"
        ));
        assert_eq!(read_stablecoin_records(buffer.as_slice()).unwrap(), records);
    }

    #[test]
    fn peg_standards_test() {
        let mut records = records();
        records[0].standard = Some(String::from("Bridged"));
        records[2].standard = Some(String::from("native"));

        let standards = peg_standards(&records);
        assert_eq!(
            standards[&(String::from("Base"), String::from(USDC))],
            PegStandard::Native
        );
        assert_eq!(
            standards[&(String::from("Base"), String::from(USDT))],
            PegStandard::Bridged
        );
    }

    #[test]
    fn chain_growth_report_test() {
        let data = StablecoinData::new(&records());
        let report = data.chain_growth_report(&options());

        assert_eq!(report.len(), 2);

        let base = &report[0];
        assert_eq!(base.chain, "Base");
        assert_eq!(base.launch_date, Some(date("2025-01-01")));
        assert_eq!(base.dominant_stablecoin, Some(String::from(USDC)));
        assert_eq!(base.total_current, Some(400.0));
        assert_eq!(base.usdc_current, Some(300.0));
        assert_eq!(base.usdc_share, Some(0.75));
        assert_eq!(base.usdc_standard, Some(PegStandard::Bridged));

        let window = &base.windows[0];
        assert_eq!(window.total.absolute_delta, Some(200.0));
        assert_eq!(window.total.percentage(), PercentageDelta::Defined(1.0));
        let usdc = window.usdc.as_ref().unwrap();
        assert_eq!(usdc.absolute_delta, Some(200.0));
        assert_eq!(usdc.percentage_delta, Some(2.0));
        assert_eq!(window.usdc_share_change, Some(0.25));

        // Launched within the window, the comparison falls back to its first day.
        let plume = &report[1];
        assert_eq!(plume.launch_date, Some(date("2025-01-25")));
        assert_eq!(plume.usdc_standard, None);
        assert_eq!(plume.usdc_share, Some(0.0));
        assert_eq!(plume.windows[0].usdc, None);
        assert_eq!(plume.windows[0].total.status, "zero_baseline");
    }

    #[test]
    fn usdc_share_gap_test() {
        let records = vec![
            record("2025-01-01", "Base", USDT, 100.0),
            record("2025-01-10", "Base", USDC, 100.0),
            record("2025-01-10", "Base", USDT, 100.0),
            record("2025-01-20", "Base", USDT, 100.0),
            record("2025-01-31", "Base", USDC, 300.0),
            record("2025-01-31", "Base", USDT, 100.0),
        ];
        let data = StablecoinData::new(&records);

        // Before USDC launched on the chain.
        assert_eq!(data.usdc_share("Base", date("2025-01-01")), Some(0.0));
        assert_eq!(data.usdc_share("Base", date("2025-01-10")), Some(0.5));
        // Missing from the USDC history, not a drop to zero.
        assert_eq!(data.usdc_share("Base", date("2025-01-20")), None);

        let options = GrowthOptions {
            as_of: date("2025-01-31"),
            windows: vec![GrowthWindow(11)],
            max_distance_days: None,
        };
        let report = data.chain_growth_report(&options);
        assert_eq!(report[0].windows[0].total.comparison_date, Some(date("2025-01-20")));
        assert_eq!(report[0].windows[0].usdc_share_change, None);
    }

    #[test]
    fn coin_launches_test() {
        let data = StablecoinData::new(&records());
        let launches = data.coin_launches(&options());

        let summary: Vec<(&str, &str, NaiveDate, Option<f64>, Option<f64>)> = launches
            .iter()
            .map(|launch| {
                (
                    launch.chain.as_str(),
                    launch.stablecoin_symbol.as_str(),
                    launch.launch_date,
                    launch.current_circulating,
                    launch.market_share,
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("Plume", USDT, date("2025-01-25"), Some(80.0), Some(1.0)),
                ("Base", USDC, date("2025-01-01"), Some(300.0), Some(0.75)),
                ("Base", USDT, date("2025-01-01"), Some(100.0), Some(0.25)),
            ]
        );
    }

    #[test]
    fn write_chain_growth_csv_test() {
        let data = StablecoinData::new(&records());
        let report = data.chain_growth_report(&options());

        let mut buffer = Vec::new();
        write_chain_growth_csv(&mut buffer, &options().windows, &report).unwrap();

        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "chain,launch_date,reference_date,dominant_stablecoin,usdc_standard,usdt_standard,total_current,usdc_current,usdc_share,total_growth_30d,total_pct_change_30d,usdc_growth_30d,usdc_pct_change_30d,usdc_share_change_30d,status_30d"
        );
        assert_eq!(
            lines[1],
            "Base,2025-01-01,2025-01-31,USDC,Bridged,Bridged,400,300,0.75,200,1,200,2,0.25,ok"
        );
    }
}
