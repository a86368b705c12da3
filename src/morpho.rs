//! Morpho Blue markets from the Morpho GraphQL API, and how much of an asset's TVL sits in them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    env::ENV_CONFIG,
    fetch::{decode_json, FetchError, HttpFetch},
};

pub const PLUME_CHAIN_ID: u64 = 98866;

const LLTV_SCALE: f64 = 1e18;

const MARKETS_QUERY: &str = r#"
query GetMarkets($chainId: Int!) {
  markets(where: { chainId_in: [$chainId] }, first: 1000) {
    items {
      uniqueKey
      lltv
      loanAsset { symbol }
      collateralAsset { symbol }
      state {
        supplyAssetsUsd
        borrowAssetsUsd
        collateralAssetsUsd
        liquidityAssetsUsd
        supplyApy
        borrowApy
        utilization
      }
    }
  }
}
"#;

/// Big integers come back as strings, everything else as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(number) => Some(*number),
            NumberOrString::String(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Asset {
    symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketState {
    supply_assets_usd: Option<f64>,
    borrow_assets_usd: Option<f64>,
    collateral_assets_usd: Option<f64>,
    liquidity_assets_usd: Option<f64>,
    supply_apy: Option<f64>,
    borrow_apy: Option<f64>,
    utilization: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Market {
    unique_key: String,
    lltv: Option<NumberOrString>,
    loan_asset: Option<Asset>,
    collateral_asset: Option<Asset>,
    state: Option<MarketState>,
}

#[derive(Debug, Deserialize)]
struct MarketItems {
    items: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct MarketsData {
    markets: MarketItems,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    data: Option<MarketsData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarketRecord {
    pub market_id: String,
    pub pair: String,
    pub collateral_asset: String,
    pub loan_asset: String,
    /// Fraction, e.g. 0.86.
    pub lltv: f64,
    pub supply_usd: f64,
    pub borrow_usd: f64,
    pub collateral_usd: f64,
    pub liquidity_usd: f64,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub utilization: f64,
}

fn pair_symbol(symbol: &str) -> &str {
    if symbol.is_empty() {
        "Unknown"
    } else {
        symbol
    }
}

impl From<Market> for MarketRecord {
    fn from(market: Market) -> Self {
        let symbol =
            |asset: Option<Asset>| asset.and_then(|asset| asset.symbol).unwrap_or_default();
        let collateral_asset = symbol(market.collateral_asset);
        let loan_asset = symbol(market.loan_asset);
        let state = market.state.unwrap_or_default();

        let pair = format!(
            "{}/{}",
            pair_symbol(&collateral_asset),
            pair_symbol(&loan_asset)
        );

        Self {
            market_id: market.unique_key,
            pair,
            collateral_asset,
            loan_asset,
            lltv: market
                .lltv
                .and_then(|lltv| lltv.as_f64())
                .map(|lltv| lltv / LLTV_SCALE)
                .unwrap_or_default(),
            supply_usd: state.supply_assets_usd.unwrap_or_default(),
            borrow_usd: state.borrow_assets_usd.unwrap_or_default(),
            collateral_usd: state.collateral_assets_usd.unwrap_or_default(),
            liquidity_usd: state.liquidity_assets_usd.unwrap_or_default(),
            supply_apy: state.supply_apy.unwrap_or_default(),
            borrow_apy: state.borrow_apy.unwrap_or_default(),
            utilization: state.utilization.unwrap_or_default(),
        }
    }
}

pub struct MorphoApi<F> {
    fetcher: F,
    url: String,
}

impl<F: HttpFetch + Sync> MorphoApi<F> {
    pub fn new(fetcher: F) -> Self {
        Self::new_with_url(fetcher, &ENV_CONFIG.morpho_api_url)
    }

    pub fn new_with_url(fetcher: F, url: &str) -> Self {
        Self {
            fetcher,
            url: url.to_string(),
        }
    }

    /// Markets on the given chain, largest supply first.
    pub async fn get_markets(&self, chain_id: u64) -> Result<Vec<MarketRecord>, FetchError> {
        info!(chain_id, "fetching morpho markets");

        let body = json!({
            "query": MARKETS_QUERY,
            "variables": { "chainId": chain_id },
        });
        let bytes = self.fetcher.post_json(&self.url, &body).await?;
        let response = decode_json::<MarketsResponse>(&self.url, &bytes)?;

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            let messages = errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::Api {
                url: self.url.clone(),
                messages,
            });
        }

        let mut markets: Vec<MarketRecord> = response
            .data
            .map(|data| data.markets.items)
            .unwrap_or_default()
            .into_iter()
            .map(MarketRecord::from)
            .collect();
        markets.sort_by(|a, b| b.supply_usd.total_cmp(&a.supply_usd));

        debug!(chain_id, markets = markets.len(), "fetched morpho markets");

        Ok(markets)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarketTotals {
    pub market_count: usize,
    pub supply_usd: f64,
    pub borrow_usd: f64,
    pub collateral_usd: f64,
    /// Borrowed over supplied, absent without any supply.
    pub utilization: Option<f64>,
}

pub fn market_totals(markets: &[MarketRecord]) -> MarketTotals {
    let supply_usd: f64 = markets.iter().map(|market| market.supply_usd).sum();
    let borrow_usd: f64 = markets.iter().map(|market| market.borrow_usd).sum();
    MarketTotals {
        market_count: markets.len(),
        supply_usd,
        borrow_usd,
        collateral_usd: markets.iter().map(|market| market.collateral_usd).sum(),
        utilization: (supply_usd > 0.0).then(|| borrow_usd / supply_usd),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarketShare {
    pub asset: String,
    pub total_tvl: f64,
    pub morpho_supply_usd: f64,
    pub market_count: usize,
    /// Fraction of the total TVL supplied on Morpho, absent when the total isn't positive.
    pub share: Option<f64>,
}

/// Candidate collateral symbols for an asset, the last one present in the markets is used.
fn symbol_variants(asset: &str) -> Vec<String> {
    vec![
        asset.to_string(),
        asset.strip_prefix('n').unwrap_or(asset).to_string(),
        asset.to_uppercase(),
    ]
}

pub fn market_shares(markets: &[MarketRecord], total_tvls: &[(String, f64)]) -> Vec<MarketShare> {
    let mut supply_by_collateral: HashMap<&str, (f64, usize)> = HashMap::new();
    for market in markets {
        let entry = supply_by_collateral
            .entry(market.collateral_asset.as_str())
            .or_default();
        entry.0 += market.supply_usd;
        entry.1 += 1;
    }

    total_tvls
        .iter()
        .map(|(asset, total_tvl)| {
            let (morpho_supply_usd, market_count) = symbol_variants(asset)
                .iter()
                .filter_map(|symbol| supply_by_collateral.get(symbol.as_str()))
                .last()
                .copied()
                .unwrap_or_default();

            MarketShare {
                asset: asset.clone(),
                total_tvl: *total_tvl,
                morpho_supply_usd,
                market_count,
                share: (*total_tvl > 0.0).then(|| morpho_supply_usd / total_tvl),
            }
        })
        .collect()
}

/// Parses `SYMBOL=TVL` pairs, e.g. `nALPHA=15000000`.
pub fn parse_total_tvl(s: &str) -> Result<(String, f64), String> {
    let (asset, tvl) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=TVL, got {s}"))?;
    let tvl = tvl
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid tvl in {s}"))?;
    Ok((asset.trim().to_string(), tvl))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::fetch::MockHttpFetch;

    use super::*;

    fn market(collateral_asset: &str, supply_usd: f64) -> MarketRecord {
        MarketRecord {
            market_id: format!("0x{collateral_asset}"),
            pair: format!("{collateral_asset}/USDC"),
            collateral_asset: collateral_asset.to_string(),
            loan_asset: String::from("USDC"),
            lltv: 0.86,
            supply_usd,
            borrow_usd: supply_usd / 2.0,
            collateral_usd: 0.0,
            liquidity_usd: 0.0,
            supply_apy: 0.0,
            borrow_apy: 0.0,
            utilization: 0.5,
        }
    }

    #[tokio::test]
    async fn get_markets_test() {
        let mut fetcher = MockHttpFetch::new();
        fetcher
            .expect_post_json()
            .withf(|url, body| {
                url == "http://morpho/graphql" && body["variables"]["chainId"] == 98866
            })
            .returning(|_, _| {
                Ok(Bytes::from(
                    json!({
                        "data": { "markets": { "items": [{
                            "uniqueKey": "0xsmall",
                            "lltv": "860000000000000000",
                            "loanAsset": { "symbol": "pUSD" },
                            "collateralAsset": { "symbol": "nALPHA" },
                            "state": {
                                "supplyAssetsUsd": 10.0,
                                "borrowAssetsUsd": 5.0,
                                "utilization": 0.5
                            }
                        }, {
                            "uniqueKey": "0xidle",
                            "lltv": 0,
                            "loanAsset": { "symbol": "pUSD" },
                            "collateralAsset": null,
                            "state": null
                        }, {
                            "uniqueKey": "0xlarge",
                            "lltv": "915000000000000000",
                            "loanAsset": { "symbol": "pUSD" },
                            "collateralAsset": { "symbol": "nBASIS" },
                            "state": { "supplyAssetsUsd": 100.0 }
                        }] } }
                    })
                    .to_string(),
                ))
            });

        let morpho = MorphoApi::new_with_url(fetcher, "http://morpho/graphql");
        let markets = morpho.get_markets(PLUME_CHAIN_ID).await.unwrap();

        let ids: Vec<&str> = markets.iter().map(|market| market.market_id.as_str()).collect();
        assert_eq!(ids, vec!["0xlarge", "0xsmall", "0xidle"]);
        assert!((markets[1].lltv - 0.86).abs() < 1e-12);
        assert_eq!(markets[1].pair, "nALPHA/pUSD");
        assert_eq!(markets[2].pair, "Unknown/pUSD");
        assert_eq!(markets[2].supply_usd, 0.0);
    }

    #[tokio::test]
    async fn graphql_errors_test() {
        let mut fetcher = MockHttpFetch::new();
        fetcher.expect_post_json().returning(|_, _| {
            Ok(Bytes::from(
                json!({ "errors": [{ "message": "unknown chain" }, { "message": "try again" }] })
                    .to_string(),
            ))
        });

        let morpho = MorphoApi::new_with_url(fetcher, "http://morpho/graphql");
        let result = morpho.get_markets(1).await;

        assert!(matches!(
            result,
            Err(FetchError::Api { messages, .. }) if messages == "unknown chain; try again"
        ));
    }

    #[test]
    fn market_share_symbol_variants_test() {
        let markets = vec![
            market("nALPHA", 1_000_000.0),
            market("nALPHA", 500_000.0),
            market("BASIS", 720_000.0),
            market("NTBILL", 190_000.0),
        ];
        let total_tvls = vec![
            (String::from("nALPHA"), 15_000_000.0),
            (String::from("nBASIS"), 7_200_000.0),
            (String::from("nTBILL"), 1_900_000.0),
            (String::from("nINSTO"), 0.0),
        ];

        let shares = market_shares(&markets, &total_tvls);

        assert_eq!(shares[0].morpho_supply_usd, 1_500_000.0);
        assert_eq!(shares[0].market_count, 2);
        assert_eq!(shares[0].share, Some(0.1));
        // Matched without the n prefix.
        assert_eq!(shares[1].morpho_supply_usd, 720_000.0);
        // Matched upper-cased.
        assert_eq!(shares[2].morpho_supply_usd, 190_000.0);
        assert_eq!(shares[3].share, None);
    }

    #[test]
    fn market_totals_test() {
        let totals = market_totals(&[market("A", 100.0), market("B", 300.0)]);
        assert_eq!(totals.market_count, 2);
        assert_eq!(totals.supply_usd, 400.0);
        assert_eq!(totals.utilization, Some(0.5));
        assert_eq!(market_totals(&[]).utilization, None);
    }

    #[test]
    fn parse_total_tvl_test() {
        assert_eq!(
            parse_total_tvl("nALPHA=15000000"),
            Ok((String::from("nALPHA"), 15_000_000.0))
        );
        assert!(parse_total_tvl("nALPHA").is_err());
        assert!(parse_total_tvl("nALPHA=lots").is_err());
    }
}
