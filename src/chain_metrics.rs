//! How a chain's DeFi TVL compares to its token's market cap and to the stablecoins issued on it.

use std::{collections::BTreeMap, io};

use console::Term;
use serde::Serialize;

use crate::{
    defi_llama::Chain,
    growth_report::{format_optional_usd, print_heading},
    stablecoins::{latest_record_date, StablecoinRecord},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainMetrics {
    pub chain: String,
    pub defi_tvl: f64,
    pub token_symbol: Option<String>,
    pub gecko_id: Option<String>,
    pub token_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub stablecoin_mcap: f64,
    pub stablecoin_to_tvl_ratio: Option<f64>,
    pub market_cap_to_tvl_ratio: Option<f64>,
}

/// `value / tvl`, absent when the chain has no TVL.
fn tvl_ratio(value: f64, tvl: f64) -> Option<f64> {
    (tvl > 0.0).then(|| value / tvl)
}

/// Prices and market caps are keyed by CoinGecko id, stablecoin totals by chain name.
pub fn chain_metrics(
    chain: &Chain,
    prices: &BTreeMap<String, f64>,
    market_caps: &BTreeMap<String, f64>,
    stablecoin_mcaps: &BTreeMap<String, f64>,
) -> ChainMetrics {
    let gecko_id = chain.gecko_id.clone().filter(|gecko_id| !gecko_id.is_empty());
    let token_price = gecko_id.as_ref().and_then(|id| prices.get(id).copied());
    let market_cap = gecko_id.as_ref().and_then(|id| market_caps.get(id).copied());
    let stablecoin_mcap = stablecoin_mcaps.get(&chain.name).copied().unwrap_or(0.0);

    ChainMetrics {
        chain: chain.name.clone(),
        defi_tvl: chain.tvl,
        token_symbol: chain.token_symbol.clone(),
        gecko_id,
        token_price,
        market_cap,
        stablecoin_mcap,
        stablecoin_to_tvl_ratio: tvl_ratio(stablecoin_mcap, chain.tvl),
        market_cap_to_tvl_ratio: market_cap.and_then(|market_cap| tvl_ratio(market_cap, chain.tvl)),
    }
}

/// Circulating stablecoins per chain on the latest date of the records. Chains without records on
/// that date are absent.
pub fn stablecoin_mcaps(records: &[StablecoinRecord]) -> BTreeMap<String, f64> {
    let mut mcaps = BTreeMap::new();
    let Some(latest) = latest_record_date(records) else {
        return mcaps;
    };

    for record in records.iter().filter(|record| record.date == latest) {
        *mcaps.entry(record.chain.clone()).or_insert(0.0) += record.circulating;
    }

    mcaps
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio
        .map(|ratio| format!("{ratio:.2}x"))
        .unwrap_or_else(|| String::from("N/A"))
}

pub fn print_chain_metrics(term: &Term, metrics: &[ChainMetrics]) -> io::Result<()> {
    print_heading(term, "Chain metrics")?;
    term.write_line(&format!(
        "{:<20} {:>18} {:>18} {:>18} {:>10} {:>10}",
        "Chain", "DeFi TVL", "Market cap", "Stablecoins", "Stable/TVL", "Mcap/TVL"
    ))?;

    for row in metrics {
        term.write_line(&format!(
            "{:<20} {:>18} {:>18} {:>18} {:>10} {:>10}",
            row.chain,
            format_optional_usd(Some(row.defi_tvl)),
            format_optional_usd(row.market_cap),
            format_optional_usd(Some(row.stablecoin_mcap)),
            format_ratio(row.stablecoin_to_tvl_ratio),
            format_ratio(row.market_cap_to_tvl_ratio),
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse::<NaiveDate>().unwrap()
    }

    fn chain(name: &str, tvl: f64, gecko_id: Option<&str>) -> Chain {
        Chain {
            name: name.to_string(),
            tvl,
            token_symbol: None,
            gecko_id: gecko_id.map(str::to_string),
        }
    }

    fn record(chain: &str, date: NaiveDate, circulating: f64) -> StablecoinRecord {
        StablecoinRecord {
            stablecoin_id: String::from("2"),
            stablecoin_name: String::from("USD Coin"),
            stablecoin_symbol: String::from("USDC"),
            date,
            chain: chain.to_string(),
            circulating,
            standard: None,
        }
    }

    #[test]
    fn stablecoin_mcaps_on_latest_date_test() {
        let records = vec![
            record("Base", date("2025-01-01"), 100.0),
            record("Base", date("2025-01-02"), 40.0),
            record("Base", date("2025-01-02"), 60.0),
            record("Plume", date("2025-01-01"), 5.0),
        ];

        let mcaps = stablecoin_mcaps(&records);
        assert_eq!(mcaps.get("Base"), Some(&100.0));
        assert_eq!(mcaps.get("Plume"), None);
        assert!(stablecoin_mcaps(&[]).is_empty());
    }

    #[test]
    fn chain_metrics_test() {
        let prices = BTreeMap::from([(String::from("ethereum"), 3000.0)]);
        let market_caps = BTreeMap::from([(String::from("ethereum"), 360e9)]);
        let stablecoins = BTreeMap::from([(String::from("Ethereum"), 120e9)]);

        let ethereum = chain_metrics(
            &chain("Ethereum", 60e9, Some("ethereum")),
            &prices,
            &market_caps,
            &stablecoins,
        );
        assert_eq!(ethereum.token_price, Some(3000.0));
        assert_eq!(ethereum.stablecoin_to_tvl_ratio, Some(2.0));
        assert_eq!(ethereum.market_cap_to_tvl_ratio, Some(6.0));

        let unlisted = chain_metrics(
            &chain("Empty", 0.0, Some("")),
            &prices,
            &market_caps,
            &stablecoins,
        );
        assert_eq!(unlisted.gecko_id, None);
        assert_eq!(unlisted.token_price, None);
        assert_eq!(unlisted.stablecoin_mcap, 0.0);
        assert_eq!(unlisted.stablecoin_to_tvl_ratio, None);
        assert_eq!(unlisted.market_cap_to_tvl_ratio, None);
    }
}
