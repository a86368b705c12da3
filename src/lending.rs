//! What is supplied to lending protocols on EVM chains, by asset and asset type, where liquid
//! (re)staking tokens are held, and how much lending protocols hold and lend out on each chain.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::{
    classify::{asset_type_rules, classify, is_evm_chain, lst_lrt_issuer},
    defi_llama::{ProtocolSummary, YieldPool},
};

pub const LENDING_CATEGORY: &str = "Lending";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingAsset {
    pub chain: String,
    pub symbol: String,
    pub asset_type: &'static str,
    pub total_tvl_usd: f64,
    pub num_protocols: usize,
    pub protocols: String,
}

#[derive(Default)]
struct PoolGroup<'a> {
    total_tvl_usd: f64,
    num_pools: usize,
    projects: BTreeSet<&'a str>,
}

impl<'a> PoolGroup<'a> {
    fn add(&mut self, pool: &'a YieldPool) {
        self.total_tvl_usd += pool.tvl_usd;
        self.num_pools += 1;
        self.projects.insert(pool.project.as_str());
    }

    fn projects(&self) -> String {
        self.projects.iter().copied().collect::<Vec<_>>().join(", ")
    }
}

fn by_tvl_desc(a: f64, b: f64) -> std::cmp::Ordering {
    b.total_cmp(&a)
}

/// Pools of lending protocols on EVM chains, summed per chain and symbol. Sorted by chain, then
/// largest first.
pub fn lending_assets(
    pools: &[YieldPool],
    lending_protocols: &HashSet<String>,
) -> Vec<LendingAsset> {
    let rules = asset_type_rules();

    let mut groups: BTreeMap<(&str, &str), PoolGroup> = BTreeMap::new();
    for pool in pools
        .iter()
        .filter(|pool| lending_protocols.contains(&pool.project) && is_evm_chain(&pool.chain))
    {
        groups
            .entry((pool.chain.as_str(), pool.symbol.as_str()))
            .or_default()
            .add(pool);
    }

    debug!(
        pools = pools.len(),
        assets = groups.len(),
        "grouped lending pools on evm chains"
    );

    let mut assets: Vec<LendingAsset> = groups
        .into_iter()
        .map(|((chain, symbol), group)| LendingAsset {
            chain: chain.to_string(),
            symbol: symbol.to_string(),
            asset_type: classify(symbol, &rules),
            total_tvl_usd: group.total_tvl_usd,
            num_protocols: group.projects.len(),
            protocols: group.projects(),
        })
        .collect();

    assets.sort_by(|a, b| {
        a.chain
            .cmp(&b.chain)
            .then_with(|| by_tvl_desc(a.total_tvl_usd, b.total_tvl_usd))
    });

    assets
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainLendingSummary {
    pub chain: String,
    pub total_tvl: f64,
    pub num_unique_assets: usize,
    pub total_protocol_count: usize,
}

/// Largest chain first.
pub fn chain_summary(assets: &[LendingAsset]) -> Vec<ChainLendingSummary> {
    let mut chains: BTreeMap<&str, ChainLendingSummary> = BTreeMap::new();
    for asset in assets {
        let summary = chains
            .entry(asset.chain.as_str())
            .or_insert_with(|| ChainLendingSummary {
                chain: asset.chain.clone(),
                total_tvl: 0.0,
                num_unique_assets: 0,
                total_protocol_count: 0,
            });
        summary.total_tvl += asset.total_tvl_usd;
        summary.num_unique_assets += 1;
        summary.total_protocol_count += asset.num_protocols;
    }

    let mut summaries: Vec<ChainLendingSummary> = chains.into_values().collect();
    summaries.sort_by(|a, b| by_tvl_desc(a.total_tvl, b.total_tvl));
    summaries
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssetTypeByChain {
    pub chain: String,
    pub asset_type: &'static str,
    pub total_tvl: f64,
    pub num_assets: usize,
}

/// Sorted by chain, then largest asset type first.
pub fn asset_type_by_chain(assets: &[LendingAsset]) -> Vec<AssetTypeByChain> {
    let mut groups: BTreeMap<(&str, &'static str), AssetTypeByChain> = BTreeMap::new();
    for asset in assets {
        let group = groups
            .entry((asset.chain.as_str(), asset.asset_type))
            .or_insert_with(|| AssetTypeByChain {
                chain: asset.chain.clone(),
                asset_type: asset.asset_type,
                total_tvl: 0.0,
                num_assets: 0,
            });
        group.total_tvl += asset.total_tvl_usd;
        group.num_assets += 1;
    }

    let mut rows: Vec<AssetTypeByChain> = groups.into_values().collect();
    rows.sort_by(|a, b| {
        a.chain
            .cmp(&b.chain)
            .then_with(|| by_tvl_desc(a.total_tvl, b.total_tvl))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssetTypeSummary {
    pub asset_type: &'static str,
    pub total_tvl: f64,
    pub num_unique_assets: usize,
    pub num_chains: usize,
}

/// Every asset type across all chains, largest first.
pub fn asset_type_summary(assets: &[LendingAsset]) -> Vec<AssetTypeSummary> {
    let mut groups: BTreeMap<&'static str, (f64, BTreeSet<&str>, BTreeSet<&str>)> =
        BTreeMap::new();
    for asset in assets {
        let (total_tvl, symbols, chains) = groups.entry(asset.asset_type).or_default();
        *total_tvl += asset.total_tvl_usd;
        symbols.insert(asset.symbol.as_str());
        chains.insert(asset.chain.as_str());
    }

    let mut rows: Vec<AssetTypeSummary> = groups
        .into_iter()
        .map(|(asset_type, (total_tvl, symbols, chains))| AssetTypeSummary {
            asset_type,
            total_tvl,
            num_unique_assets: symbols.len(),
            num_chains: chains.len(),
        })
        .collect();
    rows.sort_by(|a, b| by_tvl_desc(a.total_tvl, b.total_tvl));
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LstLrtHolding {
    pub symbol: String,
    pub protocol: &'static str,
    pub chain: String,
    pub total_tvl_usd: f64,
    pub num_pools: usize,
    pub num_projects: usize,
    pub projects: String,
}

/// Pools of tracked liquid (re)staking tokens, summed per token and chain. The symbol keeps the
/// casing of the first pool seen for the token. Sorted by symbol, then largest first.
pub fn lst_lrt_holdings(pools: &[YieldPool]) -> Vec<LstLrtHolding> {
    let mut display_symbols: BTreeMap<String, &str> = BTreeMap::new();
    let mut groups: BTreeMap<(String, &str), PoolGroup> = BTreeMap::new();

    for pool in pools {
        let upper_symbol = pool.symbol.trim().to_uppercase();
        if lst_lrt_issuer(&upper_symbol).is_none() {
            continue;
        }
        display_symbols
            .entry(upper_symbol.clone())
            .or_insert(pool.symbol.as_str());
        groups
            .entry((upper_symbol, pool.chain.as_str()))
            .or_default()
            .add(pool);
    }

    let mut holdings: Vec<LstLrtHolding> = groups
        .into_iter()
        .map(|((upper_symbol, chain), group)| LstLrtHolding {
            symbol: display_symbols
                .get(&upper_symbol)
                .map(|symbol| symbol.to_string())
                .unwrap_or_else(|| upper_symbol.clone()),
            protocol: lst_lrt_issuer(&upper_symbol).unwrap_or("Unknown"),
            chain: chain.to_string(),
            total_tvl_usd: group.total_tvl_usd,
            num_pools: group.num_pools,
            num_projects: group.projects.len(),
            projects: group.projects(),
        })
        .collect();

    holdings.sort_by(|a, b| {
        a.symbol
            .cmp(&b.symbol)
            .then_with(|| by_tvl_desc(a.total_tvl_usd, b.total_tvl_usd))
    });

    holdings
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LstLrtChainSummary {
    pub chain: String,
    pub total_tvl: f64,
    pub num_tokens: usize,
    pub total_pools: usize,
}

pub fn lst_lrt_chain_summary(holdings: &[LstLrtHolding]) -> Vec<LstLrtChainSummary> {
    let mut chains: BTreeMap<&str, (f64, BTreeSet<&str>, usize)> = BTreeMap::new();
    for holding in holdings {
        let (total_tvl, tokens, total_pools) = chains.entry(holding.chain.as_str()).or_default();
        *total_tvl += holding.total_tvl_usd;
        tokens.insert(holding.symbol.as_str());
        *total_pools += holding.num_pools;
    }

    let mut rows: Vec<LstLrtChainSummary> = chains
        .into_iter()
        .map(|(chain, (total_tvl, tokens, total_pools))| LstLrtChainSummary {
            chain: chain.to_string(),
            total_tvl,
            num_tokens: tokens.len(),
            total_pools,
        })
        .collect();
    rows.sort_by(|a, b| by_tvl_desc(a.total_tvl, b.total_tvl));
    rows
}

/// Keys of a protocol's `chainTvls` that sum over chains.
const AGGREGATE_KEYS: [&str; 5] = ["tvl", "staking", "pool2", "borrowed", "treasury"];
/// Suffixes of per-chain keys that aren't deposits.
const NON_DEPOSIT_SUFFIXES: [&str; 5] = ["staking", "pool2", "treasury", "offers", "vesting"];
const BORROWED_SUFFIX: &str = "-borrowed";

#[derive(Debug, PartialEq, Eq)]
pub enum ChainTvlKey {
    Supplied(String),
    Borrowed(String),
    Other,
}

/// Reads a `chainTvls` key: `Base` is what is supplied on Base, `Base-borrowed` (any casing) what
/// is borrowed there.
pub fn parse_chain_tvl_key(key: &str) -> ChainTvlKey {
    if AGGREGATE_KEYS.contains(&key) {
        return ChainTvlKey::Other;
    }

    let lower = key.to_ascii_lowercase();
    if let Some(index) = lower.find(BORROWED_SUFFIX) {
        let chain = format!("{}{}", &key[..index], &key[index + BORROWED_SUFFIX.len()..]);
        return ChainTvlKey::Borrowed(chain);
    }

    if key.contains('-') && NON_DEPOSIT_SUFFIXES.iter().any(|suffix| lower.contains(suffix)) {
        return ChainTvlKey::Other;
    }

    ChainTvlKey::Supplied(key.to_string())
}

/// A plain chain name, no aggregate or suffixed key.
pub fn is_chain_key(key: &str) -> bool {
    !key.contains('-') && !AGGREGATE_KEYS.contains(&key)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingChainTvlRecord {
    pub protocol: String,
    pub protocol_slug: String,
    pub chain: String,
    pub tvl: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingBorrowedRecord {
    pub protocol: String,
    pub protocol_slug: String,
    pub chain: String,
    pub borrowed: f64,
}

/// What each lending protocol holds and lends out per chain, only positive amounts. A protocol
/// without per-chain TVLs counts its total on its single chain. Sorted by chain, then largest
/// first.
pub fn lending_chain_records(
    protocols: &[ProtocolSummary],
) -> (Vec<LendingChainTvlRecord>, Vec<LendingBorrowedRecord>) {
    let mut supplied = Vec::new();
    let mut borrowed = Vec::new();

    for protocol in protocols
        .iter()
        .filter(|protocol| protocol.category.as_deref() == Some(LENDING_CATEGORY))
    {
        if protocol.chain_tvls.is_empty() {
            match (protocol.chain.as_deref(), protocol.tvl) {
                (Some(chain), Some(tvl)) if chain != "Multi-Chain" => {
                    supplied.push(LendingChainTvlRecord {
                        protocol: protocol.name.clone(),
                        protocol_slug: protocol.slug.clone(),
                        chain: chain.to_string(),
                        tvl,
                    });
                }
                _ => debug!(protocol = protocol.name, "no chain tvls, skipping"),
            }
            continue;
        }

        for (key, value) in &protocol.chain_tvls {
            if *value <= 0.0 {
                continue;
            }
            match parse_chain_tvl_key(key) {
                ChainTvlKey::Supplied(chain) => supplied.push(LendingChainTvlRecord {
                    protocol: protocol.name.clone(),
                    protocol_slug: protocol.slug.clone(),
                    chain,
                    tvl: *value,
                }),
                ChainTvlKey::Borrowed(chain) => borrowed.push(LendingBorrowedRecord {
                    protocol: protocol.name.clone(),
                    protocol_slug: protocol.slug.clone(),
                    chain,
                    borrowed: *value,
                }),
                ChainTvlKey::Other => (),
            }
        }
    }

    supplied.sort_by(|a, b| a.chain.cmp(&b.chain).then_with(|| by_tvl_desc(a.tvl, b.tvl)));
    borrowed.sort_by(|a, b| {
        a.chain
            .cmp(&b.chain)
            .then_with(|| by_tvl_desc(a.borrowed, b.borrowed))
    });

    (supplied, borrowed)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LendingChainTvl {
    pub chain: String,
    pub total_lending_tvl: f64,
    pub num_lending_protocols: usize,
    pub total_borrowed: f64,
    pub num_protocols_with_borrowed: usize,
    /// Borrowed over supplied, absent without supply.
    pub utilization: Option<f64>,
}

/// Lending TVL and borrows per chain, largest TVL first. Borrows on chains without supplied TVL
/// are left out.
pub fn lending_tvl_by_chain(
    supplied: &[LendingChainTvlRecord],
    borrowed: &[LendingBorrowedRecord],
) -> Vec<LendingChainTvl> {
    let mut chains: BTreeMap<&str, LendingChainTvl> = BTreeMap::new();
    for record in supplied {
        let chain = chains
            .entry(record.chain.as_str())
            .or_insert_with(|| LendingChainTvl {
                chain: record.chain.clone(),
                total_lending_tvl: 0.0,
                num_lending_protocols: 0,
                total_borrowed: 0.0,
                num_protocols_with_borrowed: 0,
                utilization: None,
            });
        chain.total_lending_tvl += record.tvl;
        chain.num_lending_protocols += 1;
    }

    for record in borrowed {
        if let Some(chain) = chains.get_mut(record.chain.as_str()) {
            chain.total_borrowed += record.borrowed;
            chain.num_protocols_with_borrowed += 1;
        }
    }

    let mut rows: Vec<LendingChainTvl> = chains
        .into_values()
        .map(|chain| LendingChainTvl {
            utilization: (chain.total_lending_tvl > 0.0)
                .then(|| chain.total_borrowed / chain.total_lending_tvl),
            ..chain
        })
        .collect();
    rows.sort_by(|a, b| by_tvl_desc(a.total_lending_tvl, b.total_lending_tvl));
    rows
}
