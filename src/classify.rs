//! Static, order-sensitive classification of tokens and chains. A name is matched upper-cased
//! against each rule in turn, the first matching rule decides the category.

use std::collections::HashMap;

use lazy_static::lazy_static;

#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
    /// Exact membership in a list of upper-cased names.
    OneOf(Vec<&'static str>),
    /// Any of the needles occurs in the name.
    Contains(Vec<&'static str>),
    /// The needle occurs in the name, and the name is not one of the exceptions.
    ContainsExcept {
        needle: &'static str,
        except: Vec<&'static str>,
    },
}

impl Matcher {
    fn matches(&self, upper_name: &str) -> bool {
        match self {
            Matcher::OneOf(names) => names.iter().any(|name| *name == upper_name),
            Matcher::Contains(needles) => needles.iter().any(|needle| upper_name.contains(needle)),
            Matcher::ContainsExcept { needle, except } => {
                upper_name.contains(needle) && !except.iter().any(|name| *name == upper_name)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub category: &'static str,
    pub matcher: Matcher,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    fallback: &'static str,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>, fallback: &'static str) -> Self {
        Self { rules, fallback }
    }

    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<&'static str> = Vec::new();
        for category in self
            .rules
            .iter()
            .map(|rule| rule.category)
            .chain(std::iter::once(self.fallback))
        {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        categories
    }
}

pub fn classify(name: &str, rule_table: &RuleTable) -> &'static str {
    let upper_name = name.trim().to_uppercase();
    rule_table
        .rules
        .iter()
        .find(|rule| rule.matcher.matches(&upper_name))
        .map(|rule| rule.category)
        .unwrap_or(rule_table.fallback)
}

const BTC_TOKENS: &[&str] = &[
    "WBTC",
    "CBBTC",
    "BTCB",
    "LBTC",
    "BTC.B",
    "TBTC",
    "SOLVBTC",
    "VBGTWBTC",
    "XSOLVBTC",
    "EBTC",
    "FBTC",
    "ENZOBTC",
    "UBTC",
    "STBTC",
    "M-BTC",
    "HYPERCBBTCD",
    "GTWBTCC",
    "MHYPERBTC",
    "NWBTC",
    "YBTC.B",
    "BTC",
    "CDCBTC",
    "FIABTC",
    "MWCBBTC",
    "SMCBBTC",
    "HGBTC",
];

const ETH_LSTS: &[&str] = &[
    "WEETH",
    "WSTETH",
    "STETH",
    "RSETH",
    "RETH",
    "TETH",
    "EZETH",
    "OSETH",
    "WRSETH",
    "ETH+",
    "WSTETH-ETH-25X",
    "WEETHS",
    "WSUPEROETHB",
    "CBETH",
    "SFRXETH",
    "FRXETH",
    "EETH",
    "PUFETH",
    "AGETH",
    "SAVETH",
    "OETH",
    "SVETH",
    "ETHX",
    "METH",
    "DETH",
    "BSDETH",
    "CSETH",
    "HGETH",
    "YNETHX",
    "GTMSETHC",
    "STEAKETH",
    "AVGWETHCORE",
    "NWETH",
    "AWETH",
    "MHYETH",
    "HYPERETHD",
    "MHYPERETH",
    "YOETH",
    "GTMSUSDC",
    "FLRETH",
    "STHETH",
];

pub const OTHER_ASSETS: &str = "Other Assets";

/// Buckets for assets supplied to lending markets.
pub fn asset_type_rules() -> RuleTable {
    RuleTable::new(
        vec![
            Rule {
                category: "BTC Tokens",
                matcher: Matcher::OneOf(BTC_TOKENS.to_vec()),
            },
            Rule {
                category: "ETH LSTs",
                matcher: Matcher::OneOf(ETH_LSTS.to_vec()),
            },
            Rule {
                category: "ETH",
                matcher: Matcher::ContainsExcept {
                    needle: "ETH",
                    except: vec!["BETH", "SETH"],
                },
            },
            Rule {
                category: "Stablecoins",
                matcher: Matcher::Contains(vec!["USD", "EUR", "DAI"]),
            },
        ],
        OTHER_ASSETS,
    )
}

/// How a stablecoin exists on a chain. Ordered by precedence, the highest wins when a chain holds
/// several deployments of one symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PegStandard {
    Bridged,
    Native,
    Usdt0,
}

impl PegStandard {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "USDT0" => PegStandard::Usdt0,
            "native" => PegStandard::Native,
            _ => PegStandard::Bridged,
        }
    }

    /// Anything unknown, or nothing at all, counts as bridged.
    pub fn resolve<'a, I>(standards: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        standards
            .into_iter()
            .map(PegStandard::parse)
            .max()
            .unwrap_or(PegStandard::Bridged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PegStandard::Bridged => "Bridged",
            PegStandard::Native => "native",
            PegStandard::Usdt0 => "USDT0",
        }
    }
}

const EVM_CHAINS: &[&str] = &[
    "Ethereum",
    "Arbitrum",
    "Optimism",
    "Polygon",
    "Base",
    "Avalanche",
    "BSC",
    "Fantom",
    "Gnosis",
    "Celo",
    "Moonbeam",
    "Moonriver",
    "Cronos",
    "Kava",
    "Aurora",
    "Harmony",
    "Metis",
    "Boba",
    "Linea",
    "Scroll",
    "zkSync Era",
    "Polygon zkEVM",
    "Mantle",
    "Manta",
    "Blast",
    "Mode",
    "OP Mainnet",
    "Arbitrum Nova",
    "Rootstock",
    "Kroma",
    "Taiko",
    "Fraxtal",
    "Sei",
    "Worldchain",
    "Sonic",
    "Ink",
    "Unichain",
    "Berachain",
    "X Layer",
    "Zircuit",
    "zkLink Nova",
    "BOB",
    "Corn",
    "Lisk",
    "World Chain",
    "Monad",
    "opBNB",
    "Gravity",
    "Plume Mainnet",
    "Flare",
    "Conflux",
    "Plasma",
];

pub fn is_evm_chain(chain: &str) -> bool {
    EVM_CHAINS.iter().any(|evm_chain| *evm_chain == chain)
}

lazy_static! {
    /// Liquid (re)staking tokens tracked across chains, by the protocol issuing them.
    pub static ref LST_LRT_ISSUERS: HashMap<&'static str, &'static str> = HashMap::from([
        ("WEETH", "Ether.fi"),
        ("WSTETH", "Lido"),
        ("RSETH", "KelpDAO"),
        ("EZETH", "Renzo"),
        ("WRSETH", "KelpDAO"),
        ("CBETH", "Coinbase"),
        ("WSUPEROETHB", "Superform"),
        ("RETH", "Rocket Pool"),
        ("GTMSETHC", "Gravita"),
        ("DETH", "DineroDAO"),
        ("FLRETH", "Flare"),
        ("STEAKETH", "Steakhouse"),
        ("YOETH", "Yearn"),
        ("METH", "Mantle"),
        ("CSETH", "Coinshift"),
        ("BSDETH", "Based"),
        ("NWETH", "Nimbora"),
        ("TETH", "Tangible"),
    ]);
}

pub fn lst_lrt_issuer(symbol: &str) -> Option<&'static str> {
    LST_LRT_ISSUERS
        .get(symbol.trim().to_uppercase().as_str())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_asset_types_test() {
        let rules = asset_type_rules();
        assert_eq!(classify("wbtc", &rules), "BTC Tokens");
        assert_eq!(classify("wstETH", &rules), "ETH LSTs");
        assert_eq!(classify("WETH", &rules), "ETH");
        assert_eq!(classify("USDC", &rules), "Stablecoins");
        assert_eq!(classify("EURC", &rules), "Stablecoins");
        assert_eq!(classify("ARB", &rules), OTHER_ASSETS);
    }

    #[test]
    fn classify_first_match_wins_test() {
        // Listed as an LST although it also contains USD.
        let rules = asset_type_rules();
        assert_eq!(classify("GTMSUSDC", &rules), "ETH LSTs");
        // Contains ETH, but is an LST first.
        assert_eq!(classify("RETH", &rules), "ETH LSTs");
    }

    #[test]
    fn classify_exceptions_fall_through_test() {
        let rules = asset_type_rules();
        assert_eq!(classify("SETH", &rules), OTHER_ASSETS);
        assert_eq!(classify("BETH", &rules), OTHER_ASSETS);
    }

    #[test]
    fn categories_in_rule_order_test() {
        assert_eq!(
            asset_type_rules().categories(),
            vec!["BTC Tokens", "ETH LSTs", "ETH", "Stablecoins", OTHER_ASSETS]
        );
    }

    #[test]
    fn resolve_peg_standard_test() {
        assert_eq!(
            PegStandard::resolve(vec!["Bridged", "USDT0", "native"]),
            PegStandard::Usdt0
        );
        assert_eq!(
            PegStandard::resolve(vec!["Bridged", "native"]),
            PegStandard::Native
        );
        assert_eq!(PegStandard::resolve(vec!["bridged"]), PegStandard::Bridged);
        assert_eq!(PegStandard::resolve(Vec::new()), PegStandard::Bridged);
    }

    #[test]
    fn evm_chain_test() {
        assert!(is_evm_chain("Base"));
        assert!(!is_evm_chain("Solana"));
    }

    #[test]
    fn lst_lrt_issuer_test() {
        assert_eq!(lst_lrt_issuer("weETH"), Some("Ether.fi"));
        assert_eq!(lst_lrt_issuer("USDC"), None);
    }
}
