//! DeFiLlama REST endpoints: chains, chain TVL history, protocols, stablecoins, yield pools and
//! coin prices. Responses are turned into flat records here, nothing downstream sees their JSON
//! shape.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use format_url::FormatUrl;
use pit_wall::Progress;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use serde_json::json;

use crate::{
    chain_metrics::{chain_metrics, ChainMetrics},
    env::ENV_CONFIG,
    fetch::{decode_json, fetch_json, FetchError, HttpFetch},
    growth_report::latest_date,
    lending::LENDING_CATEGORY,
    lending_growth::{
        chain_lending_series, lending_chain_names, lending_growth_rows, lending_protocols_on_chain,
        recent_launches, LendingGrowthRow, NewChainOptions,
    },
    protocols::{protocol_tvl_records, ProtocolTvlRecord},
    records::{date_from_unix, Record, SeriesSet},
    stablecoins::StablecoinRecord,
    time_series::{EntityKey, Series},
};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub name: String,
    #[serde(default)]
    pub tvl: f64,
    pub token_symbol: Option<String>,
    #[serde(rename = "gecko_id")]
    pub gecko_id: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct TvlAtDate {
    pub date: i64,
    pub tvl: f64,
}

/// An entry of the protocol list. `chain_tvls` holds the current TVL per chain, next to keys such
/// as `Ethereum-borrowed` or `staking` that aren't chains.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    #[serde(default)]
    pub slug: String,
    pub name: String,
    pub category: Option<String>,
    pub chain: Option<String>,
    pub tvl: Option<f64>,
    #[serde(default)]
    pub chain_tvls: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct LiquidityAtDate {
    pub date: i64,
    #[serde(rename = "totalLiquidityUSD", default)]
    pub total_liquidity_usd: f64,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ProtocolChainTvl {
    /// sorted oldest first
    #[serde(default)]
    pub tvl: Vec<LiquidityAtDate>,
}

/// Detail of a single protocol, its total TVL history and the history on each chain.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub name: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tvl: Vec<LiquidityAtDate>,
    #[serde(default)]
    pub chain_tvls: BTreeMap<String, ProtocolChainTvl>,
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct PeggedAsset {
    pub id: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PeggedAssets {
    pegged_assets: Vec<PeggedAsset>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct PeggedAmounts {
    #[serde(rename = "peggedUSD")]
    pub pegged_usd: Option<f64>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct CirculatingAtDate {
    pub date: i64,
    #[serde(default)]
    pub circulating: PeggedAmounts,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ChainBalance {
    /// sorted oldest first
    pub tokens: Vec<CirculatingAtDate>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stablecoin {
    pub name: String,
    pub symbol: String,
    pub chain_balances: BTreeMap<String, ChainBalance>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YieldPool {
    pub chain: String,
    pub project: String,
    pub symbol: String,
    #[serde(default)]
    pub tvl_usd: f64,
    #[serde(default)]
    pub underlying_tokens: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct YieldPools {
    data: Vec<YieldPool>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct CoinPrice {
    price: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct CoinPrices {
    coins: BTreeMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct CoinMarketCap {
    mcap: Option<f64>,
}

/// Ids at most per request to the coins API.
const COINS_PER_REQUEST: usize = 50;

fn coingecko_key(gecko_id: &str) -> String {
    format!("coingecko:{gecko_id}")
}

pub struct DefiLlama<F> {
    fetcher: F,
    api_url: String,
    coins_url: String,
    stablecoins_url: String,
    yields_url: String,
}

impl<F: HttpFetch + Sync> DefiLlama<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            api_url: ENV_CONFIG.defi_llama_api_url.clone(),
            coins_url: ENV_CONFIG.coins_api_url.clone(),
            stablecoins_url: ENV_CONFIG.stablecoins_api_url.clone(),
            yields_url: ENV_CONFIG.yields_api_url.clone(),
        }
    }

    /// Serves all four APIs from one base url, used to point at a local server.
    pub fn new_with_url(fetcher: F, url: &str) -> Self {
        Self {
            fetcher,
            api_url: url.to_string(),
            coins_url: url.to_string(),
            stablecoins_url: url.to_string(),
            yields_url: url.to_string(),
        }
    }

    /// All chains, highest TVL first.
    pub async fn get_chains(&self) -> Result<Vec<Chain>, FetchError> {
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/v2/chains")
            .format_url();
        let mut chains = fetch_json::<Vec<Chain>, F>(&self.fetcher, &url).await?;
        chains.sort_by(|a, b| b.tvl.total_cmp(&a.tvl));
        Ok(chains)
    }

    pub async fn get_historical_chain_tvl(
        &self,
        chain: &str,
    ) -> Result<Vec<TvlAtDate>, FetchError> {
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/v2/historicalChainTvl/:chain")
            .with_substitutes(vec![("chain", chain)])
            .format_url();
        fetch_json(&self.fetcher, &url).await
    }

    pub async fn get_protocols(&self) -> Result<Vec<ProtocolSummary>, FetchError> {
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/protocols")
            .format_url();
        fetch_json(&self.fetcher, &url).await
    }

    pub async fn get_protocol(&self, slug: &str) -> Result<Protocol, FetchError> {
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/protocol/:slug")
            .with_substitutes(vec![("slug", slug)])
            .format_url();
        fetch_json(&self.fetcher, &url).await
    }

    pub async fn get_stablecoins(&self) -> Result<Vec<PeggedAsset>, FetchError> {
        let url = FormatUrl::new(&self.stablecoins_url)
            .with_path_template("/stablecoins")
            .with_query_params(vec![("includePrices", "true")])
            .format_url();
        fetch_json::<PeggedAssets, F>(&self.fetcher, &url)
            .await
            .map(|body| body.pegged_assets)
    }

    pub async fn get_stablecoin(&self, id: &str) -> Result<Stablecoin, FetchError> {
        let url = FormatUrl::new(&self.stablecoins_url)
            .with_path_template("/stablecoin/:id")
            .with_substitutes(vec![("id", id)])
            .format_url();
        fetch_json(&self.fetcher, &url).await
    }

    pub async fn get_yield_pools(&self) -> Result<Vec<YieldPool>, FetchError> {
        let url = FormatUrl::new(&self.yields_url)
            .with_path_template("/pools")
            .format_url();
        fetch_json::<YieldPools, F>(&self.fetcher, &url)
            .await
            .map(|body| body.data)
    }

    /// Current USD price per CoinGecko id. Ids the API doesn't know are left out.
    pub async fn get_current_prices(
        &self,
        gecko_ids: &[String],
    ) -> Result<BTreeMap<String, f64>, FetchError> {
        let mut prices = BTreeMap::new();

        for chunk in gecko_ids.chunks(COINS_PER_REQUEST) {
            let coins = chunk
                .iter()
                .map(|gecko_id| coingecko_key(gecko_id))
                .collect::<Vec<_>>()
                .join(",");
            // Substitutes get percent-encoded, the coins API wants the `:` and `,` as they are.
            let path = format!("/prices/current/{coins}");
            let url = FormatUrl::new(&self.coins_url)
                .with_path_template(&path)
                .format_url();
            let body = fetch_json::<CoinPrices, F>(&self.fetcher, &url).await?;

            for gecko_id in chunk {
                if let Some(coin) = body.coins.get(&coingecko_key(gecko_id)) {
                    prices.insert(gecko_id.clone(), coin.price);
                }
            }
        }

        Ok(prices)
    }

    /// Current market cap per CoinGecko id. Ids without one are left out.
    pub async fn get_market_caps(
        &self,
        gecko_ids: &[String],
    ) -> Result<BTreeMap<String, f64>, FetchError> {
        let url = FormatUrl::new(&self.coins_url)
            .with_path_template("/mcaps")
            .format_url();
        let mut market_caps = BTreeMap::new();

        for chunk in gecko_ids.chunks(COINS_PER_REQUEST) {
            let coins: Vec<String> = chunk.iter().map(|gecko_id| coingecko_key(gecko_id)).collect();
            let body = self
                .fetcher
                .post_json(&url, &json!({ "coins": coins }))
                .await?;
            let caps = decode_json::<BTreeMap<String, CoinMarketCap>>(&url, &body)?;

            for gecko_id in chunk {
                if let Some(mcap) = caps.get(&coingecko_key(gecko_id)).and_then(|cap| cap.mcap) {
                    market_caps.insert(gecko_id.clone(), mcap);
                }
            }
        }

        Ok(market_caps)
    }

    /// Slugs of every protocol DeFiLlama files under the given category, e.g. `Lending`.
    pub async fn get_protocol_slugs_in_category(
        &self,
        category: &str,
    ) -> Result<Vec<String>, FetchError> {
        let protocols = self.get_protocols().await?;
        Ok(protocols
            .into_iter()
            .filter(|protocol| protocol.category.as_deref() == Some(category))
            .map(|protocol| protocol.slug)
            .collect())
    }

    /// TVL history of every chain. A chain whose history can't be fetched ends up with an empty
    /// series, the rest of the batch continues.
    pub async fn get_chain_tvl_series(&self, chains: &[String]) -> SeriesSet {
        info!("{} chains to fetch tvl history for", chains.len());

        let mut progress = Progress::new("fetch chain tvl", chains.len() as u64);
        let mut series_set = SeriesSet::new();

        for chain in chains {
            let entity = EntityKey::single(chain.as_str());
            let series = match self.get_historical_chain_tvl(chain).await {
                Ok(tvl_history) => {
                    Series::from_observations(entity.clone(), tvl_observations(&tvl_history))
                }
                Err(err) => {
                    warn!(chain, %err, "failed to fetch tvl history, skipping chain");
                    Series::empty(entity.clone())
                }
            };
            series_set.insert(entity, series);

            progress.inc_work_done();
            if progress.work_done != 0 && progress.work_done % 10 == 0 {
                debug!("{}", progress.get_progress_string());
            }
        }

        series_set
    }

    /// Chain distribution of each of the given stablecoins. Failing ids are skipped.
    pub async fn get_stablecoin_records(&self, ids: &[String]) -> Vec<StablecoinRecord> {
        let mut progress = Progress::new("fetch stablecoins", ids.len() as u64);
        let mut records = Vec::new();

        for id in ids {
            match self.get_stablecoin(id).await {
                Ok(stablecoin) => {
                    let mut stablecoin_records = stablecoin_records(id, &stablecoin);
                    debug!(
                        id,
                        symbol = stablecoin.symbol,
                        records = stablecoin_records.len(),
                        "fetched stablecoin"
                    );
                    records.append(&mut stablecoin_records);
                }
                Err(err) => {
                    warn!(id, %err, "failed to fetch stablecoin, skipping");
                }
            }

            progress.inc_work_done();
            if progress.work_done != 0 && progress.work_done % 10 == 0 {
                debug!("{}", progress.get_progress_string());
            }
        }

        records.sort_by(|a, b| {
            (a.date, &a.stablecoin_id, &a.chain).cmp(&(b.date, &b.stablecoin_id, &b.chain))
        });

        records
    }

    /// Daily TVL of each protocol since the given date. Protocols without a slug or whose history
    /// can't be fetched are skipped.
    pub async fn get_protocol_tvl_records(
        &self,
        protocols: &[&ProtocolSummary],
        since: NaiveDate,
    ) -> Vec<ProtocolTvlRecord> {
        let mut progress = Progress::new("fetch protocol tvl", protocols.len() as u64);
        let mut records = Vec::new();
        let mut failed = 0;

        for summary in protocols {
            if summary.slug.is_empty() {
                warn!(protocol = summary.name, "protocol has no slug, skipping");
                failed += 1;
            } else {
                match self.get_protocol(&summary.slug).await {
                    Ok(protocol) => {
                        let mut protocol_records =
                            protocol_tvl_records(summary, &protocol.tvl, since);
                        debug!(
                            slug = summary.slug,
                            records = protocol_records.len(),
                            "fetched protocol tvl"
                        );
                        records.append(&mut protocol_records);
                    }
                    Err(err) => {
                        warn!(slug = summary.slug, %err, "failed to fetch protocol, skipping");
                        failed += 1;
                    }
                }
            }

            progress.inc_work_done();
            if progress.work_done != 0 && progress.work_done % 50 == 0 {
                info!(failed, records = records.len(), "{}", progress.get_progress_string());
            }
        }

        info!(
            protocols = protocols.len(),
            failed,
            records = records.len(),
            "fetched protocol tvl history"
        );

        records.sort_by(|a, b| {
            (a.date, &a.category, &a.protocol_name).cmp(&(b.date, &b.category, &b.protocol_name))
        });

        records
    }

    /// Protocol details by slug. Failing slugs are left out.
    pub async fn get_protocol_details(&self, slugs: &BTreeSet<&str>) -> BTreeMap<String, Protocol> {
        let mut progress = Progress::new("fetch protocols", slugs.len() as u64);
        let mut protocols = BTreeMap::new();

        for slug in slugs {
            match self.get_protocol(slug).await {
                Ok(protocol) => {
                    protocols.insert(slug.to_string(), protocol);
                }
                Err(err) => {
                    warn!(slug, %err, "failed to fetch protocol, skipping");
                }
            }

            progress.inc_work_done();
            if progress.work_done != 0 && progress.work_done % 10 == 0 {
                debug!("{}", progress.get_progress_string());
            }
        }

        protocols
    }

    /// Daily chain and lending TVL over the first days of chains that launched recently and host
    /// lending protocols.
    pub async fn get_new_chains_lending_growth(
        &self,
        options: &NewChainOptions,
    ) -> Result<Vec<LendingGrowthRow>, FetchError> {
        let lending_protocols: Vec<ProtocolSummary> = self
            .get_protocols()
            .await?
            .into_iter()
            .filter(|protocol| protocol.category.as_deref() == Some(LENDING_CATEGORY))
            .collect();
        let chain_names: Vec<String> = lending_chain_names(&lending_protocols)
            .into_iter()
            .collect();
        info!(
            protocols = lending_protocols.len(),
            chains = chain_names.len(),
            "chains with lending protocols"
        );

        let chain_tvl = self.get_chain_tvl_series(&chain_names).await;
        let as_of = options
            .as_of
            .or_else(|| latest_date(&chain_tvl))
            .unwrap_or(NaiveDate::MIN);
        let new_chains = recent_launches(&chain_tvl, as_of, options.lookback, options.max_chains);
        info!(chains = new_chains.len(), %as_of, "recently launched chains");

        let slugs: BTreeSet<&str> = new_chains
            .iter()
            .flat_map(|new_chain| lending_protocols_on_chain(&lending_protocols, &new_chain.chain))
            .map(|protocol| protocol.slug.as_str())
            .filter(|slug| !slug.is_empty())
            .collect();
        let details = self.get_protocol_details(&slugs).await;

        let mut rows = Vec::new();
        for new_chain in &new_chains {
            let on_chain = lending_protocols_on_chain(&lending_protocols, &new_chain.chain);
            let protocols = on_chain
                .iter()
                .filter_map(|protocol| details.get(&protocol.slug));
            let lending = chain_lending_series(&new_chain.chain, protocols);
            let entity = EntityKey::single(new_chain.chain.as_str());
            let Some(total) = chain_tvl.get(&entity) else {
                continue;
            };

            let mut chain_rows = lending_growth_rows(
                total,
                &lending,
                new_chain.launch,
                as_of,
                options.tracked,
                on_chain.len(),
            );
            debug!(
                chain = new_chain.chain,
                protocols = on_chain.len(),
                rows = chain_rows.len(),
                "measured lending growth"
            );
            rows.append(&mut chain_rows);
        }

        rows.sort_by(|a, b| {
            (&a.chain, a.days_since_launch).cmp(&(&b.chain, b.days_since_launch))
        });

        Ok(rows)
    }

    /// Token price, market cap and stablecoin ratios of the largest chains. Price and market cap
    /// lookups that fail leave those columns empty.
    pub async fn get_chain_metrics(
        &self,
        limit: usize,
        stablecoin_mcaps: &BTreeMap<String, f64>,
    ) -> Result<Vec<ChainMetrics>, FetchError> {
        let mut chains = self.get_chains().await?;
        chains.truncate(limit);

        let gecko_ids: Vec<String> = chains
            .iter()
            .filter_map(|chain| chain.gecko_id.clone())
            .filter(|gecko_id| !gecko_id.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let prices = self.get_current_prices(&gecko_ids).await.unwrap_or_else(|err| {
            warn!(%err, "failed to fetch token prices");
            BTreeMap::new()
        });
        let market_caps = self.get_market_caps(&gecko_ids).await.unwrap_or_else(|err| {
            warn!(%err, "failed to fetch market caps");
            BTreeMap::new()
        });

        Ok(chains
            .iter()
            .map(|chain| chain_metrics(chain, &prices, &market_caps, stablecoin_mcaps))
            .collect())
    }
}

pub fn liquidity_observations(
    tvl_history: &[LiquidityAtDate],
) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
    tvl_history.iter().filter_map(|liquidity_at_date| {
        date_from_unix(liquidity_at_date.date)
            .map(|date| (date, Some(liquidity_at_date.total_liquidity_usd)))
    })
}

pub fn tvl_observations(
    tvl_history: &[TvlAtDate],
) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
    tvl_history.iter().filter_map(|tvl_at_date| {
        date_from_unix(tvl_at_date.date).map(|date| (date, Some(tvl_at_date.tvl)))
    })
}

pub fn chain_tvl_records(series_set: &SeriesSet) -> Vec<Record> {
    series_set
        .values()
        .flat_map(|series| {
            series.points().iter().map(|point| Record {
                entity: series.entity().clone(),
                date: point.date,
                value: point.value,
            })
        })
        .collect()
}

/// One record per chain per day. Days without a `peggedUSD` amount count as zero.
pub fn stablecoin_records(id: &str, stablecoin: &Stablecoin) -> Vec<StablecoinRecord> {
    stablecoin
        .chain_balances
        .iter()
        .flat_map(|(chain, chain_balance)| {
            chain_balance.tokens.iter().filter_map(move |circulating_at_date| {
                let date = date_from_unix(circulating_at_date.date)?;
                Some(StablecoinRecord {
                    stablecoin_id: id.to_string(),
                    stablecoin_name: stablecoin.name.clone(),
                    stablecoin_symbol: stablecoin.symbol.clone(),
                    date,
                    chain: chain.clone(),
                    circulating: circulating_at_date
                        .circulating
                        .pegged_usd
                        .unwrap_or_default(),
                    standard: None,
                })
            })
        })
        .collect()
}
