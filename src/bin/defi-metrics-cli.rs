use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    path::PathBuf,
};

use anyhow::Context;
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use console::Term;
use tracing::{info, warn};

use defi_metrics::{
    chain_metrics::{print_chain_metrics, stablecoin_mcaps},
    defi_llama::{chain_tvl_records, PeggedAsset},
    growth_report::{
        format_optional_usd, growth_rows, latest_date, print_growth_table, print_heading, smooth,
        top_rows, write_growth_csv, write_growth_json, GrowthOptions, OutputFormat,
    },
    launches::{milestone_rows, print_launch_report, yearly_summary, DEFAULT_THRESHOLD},
    lending::{
        asset_type_by_chain, asset_type_summary, chain_summary, lending_assets,
        lending_chain_records, lending_tvl_by_chain, lst_lrt_chain_summary, lst_lrt_holdings,
        LENDING_CATEGORY,
    },
    lending_growth::{lending_growth_summaries, print_lending_growth, NewChainOptions},
    log,
    morpho::{market_shares, market_totals, parse_total_tvl, PLUME_CHAIN_ID},
    protocols::{
        category_growth, category_series_set, category_tvl_records, print_category_growth,
        top_protocols, DEFAULT_PROTOCOL_LIMIT,
    },
    records::{
        read_records_file, series_set, write_csv_file, write_records_file, RecordColumns, SeriesSet,
    },
    stablecoins::{
        latest_record_date, read_stablecoin_records_file, write_chain_growth_csv,
        write_stablecoin_records_file, StablecoinData, USDC,
    },
    time_frames::{windows_or_standard, GrowthWindow},
    DefiLlama, MorphoApi, ReqwestFetch,
};

const STABLECOIN_RECORDS: &str = "all_stablecoins_chain_distribution.csv";

fn default_stablecoin_ids() -> Vec<String> {
    (1..=15).map(|id| id.to_string()).collect()
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the chain distribution of stablecoins over time to CSV.
    ImportStablecoins {
        /// Stablecoin ids to fetch, e.g. 1,2,3.
        #[arg(long, value_delimiter = ',', default_values_t = default_stablecoin_ids())]
        ids: Vec<String>,
        /// Fetch every stablecoin DeFiLlama lists instead of the given ids.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value = STABLECOIN_RECORDS)]
        output: PathBuf,
        /// Also write the list of stablecoins.
        #[arg(long)]
        list_output: Option<PathBuf>,
    },
    /// Fetch the TVL history of chains to a records CSV (date, chain, tvl).
    ImportChainTvl {
        /// Chains to fetch, all chains when empty.
        #[arg(long, value_delimiter = ',')]
        chains: Vec<String>,
        /// Only the given number of largest chains.
        #[arg(long)]
        top: Option<usize>,
        #[arg(long, default_value = "chain_tvl.csv")]
        output: PathBuf,
    },
    /// Windowed growth of every entity in a records CSV.
    Growth {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "date")]
        date_column: String,
        /// Columns that together identify an entity, e.g. chain,stablecoin_symbol.
        #[arg(long, value_delimiter = ',', default_value = "chain")]
        entity_columns: Vec<String>,
        #[arg(long, default_value = "tvl")]
        value_column: String,
        /// Growth windows in days, e.g. 7,30,90. Defaults to 7,30,90,180.
        #[arg(long)]
        windows: Option<String>,
        /// Defaults to the latest date in the input.
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Give up on an entity when no observation is this close to a date looked up.
        #[arg(long)]
        max_distance_days: Option<u32>,
        /// Smooth every series with a trailing mean over this many days first.
        #[arg(long)]
        rolling_days: Option<u32>,
        #[arg(long, default_value = "growth.csv")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Rows of the first window to print.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Stablecoin growth, USDC share and coin launches per chain.
    Stablecoins {
        #[arg(long, default_value = STABLECOIN_RECORDS)]
        input: PathBuf,
        /// Growth windows in days. Defaults to 7,30,90,180.
        #[arg(long)]
        windows: Option<String>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        max_distance_days: Option<u32>,
        #[arg(long, default_value = "chain_stablecoin_growth.csv")]
        growth_output: PathBuf,
        #[arg(long, default_value = "stablecoin_launch_analysis.csv")]
        launches_output: PathBuf,
    },
    /// Days until chains first reached a threshold after launch.
    Launches {
        /// Records CSV of chain TVL, fetched from DeFiLlama when absent.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Use the stablecoin totals of each chain instead of TVL.
        #[arg(long)]
        stablecoins: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
        #[arg(long, default_value = "365")]
        within_days: GrowthWindow,
        #[arg(long, default_value = "chains_reached_threshold.csv")]
        output: PathBuf,
        #[arg(long, default_value = "threshold_yearly_summary.csv")]
        summary_output: PathBuf,
    },
    /// Assets supplied to lending protocols on EVM chains, and LST/LRT holdings.
    LendingAssets {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Morpho markets of a chain and their share of given asset TVLs.
    MorphoMarkets {
        #[arg(long, default_value_t = PLUME_CHAIN_ID)]
        chain_id: u64,
        /// Total TVL of an asset, e.g. nALPHA=15000000. Repeatable.
        #[arg(long = "total-tvl", value_parser = parse_total_tvl)]
        total_tvls: Vec<(String, f64)>,
        #[arg(long, default_value = "morpho_markets.csv")]
        output: PathBuf,
        #[arg(long, default_value = "morpho_market_share.csv")]
        share_output: PathBuf,
    },
    /// Daily TVL of the largest protocols and of their categories.
    ProtocolTvl {
        /// Number of largest protocols by current TVL.
        #[arg(long, default_value_t = DEFAULT_PROTOCOL_LIMIT)]
        top: usize,
        /// Days of history to keep.
        #[arg(long, default_value = "365")]
        days: GrowthWindow,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Current lending TVL, borrows and utilization per chain.
    LendingTvlByChain {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Lending TVL over the first days of recently launched chains.
    NewChainsLending {
        /// Chains launched at most this many days ago.
        #[arg(long, default_value = "730")]
        lookback_days: GrowthWindow,
        /// Days after launch to follow each chain.
        #[arg(long, default_value = "180")]
        tracked_days: GrowthWindow,
        /// Only this many chains with the most TVL today.
        #[arg(long, default_value_t = 20)]
        max_chains: usize,
        /// Defaults to the latest date of any chain's TVL.
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Token market cap and stablecoins of the largest chains relative to their TVL.
    ChainMetrics {
        #[arg(long, default_value_t = 100)]
        top: usize,
        /// Stablecoin records to take each chain's stablecoin total from.
        #[arg(long, default_value = STABLECOIN_RECORDS)]
        stablecoins: PathBuf,
        #[arg(long, default_value = "comprehensive_chain_metrics.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    log::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ImportStablecoins {
            ids,
            all,
            output,
            list_output,
        } => import_stablecoins(ids, all, output, list_output).await?,
        Commands::ImportChainTvl {
            chains,
            top,
            output,
        } => import_chain_tvl(chains, top, output).await?,
        Commands::Growth {
            input,
            date_column,
            entity_columns,
            value_column,
            windows,
            as_of,
            max_distance_days,
            rolling_days,
            output,
            format,
            top,
        } => {
            let entity_columns: Vec<&str> = entity_columns.iter().map(String::as_str).collect();
            let columns = RecordColumns::new(&date_column, &entity_columns, &value_column);
            let windows = windows_or_standard(windows.as_deref())?;
            growth(GrowthArgs {
                input,
                columns,
                windows,
                as_of,
                max_distance_days,
                rolling_days,
                output,
                format,
                top,
            })?
        }
        Commands::Stablecoins {
            input,
            windows,
            as_of,
            max_distance_days,
            growth_output,
            launches_output,
        } => stablecoins(
            input,
            windows_or_standard(windows.as_deref())?,
            as_of,
            max_distance_days,
            growth_output,
            launches_output,
        )?,
        Commands::Launches {
            input,
            stablecoins,
            threshold,
            within_days,
            output,
            summary_output,
        } => {
            launches(
                input,
                stablecoins,
                threshold,
                within_days,
                output,
                summary_output,
            )
            .await?
        }
        Commands::LendingAssets { output_dir } => lending(output_dir).await?,
        Commands::MorphoMarkets {
            chain_id,
            total_tvls,
            output,
            share_output,
        } => morpho_markets(chain_id, total_tvls, output, share_output).await?,
        Commands::ProtocolTvl {
            top,
            days,
            output_dir,
        } => protocol_tvl(top, days, output_dir).await?,
        Commands::LendingTvlByChain { output_dir } => lending_tvl(output_dir).await?,
        Commands::NewChainsLending {
            lookback_days,
            tracked_days,
            max_chains,
            as_of,
            output_dir,
        } => {
            let options = NewChainOptions {
                as_of,
                lookback: lookback_days,
                tracked: tracked_days,
                max_chains,
            };
            new_chains_lending(options, output_dir).await?
        }
        Commands::ChainMetrics {
            top,
            stablecoins,
            output,
        } => chain_metrics(top, stablecoins, output).await?,
    }

    Ok(())
}

async fn import_stablecoins(
    ids: Vec<String>,
    all: bool,
    output: PathBuf,
    list_output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let ids = if all || list_output.is_some() {
        let stablecoins: Vec<PeggedAsset> = defi_llama.get_stablecoins().await?;
        info!("{} stablecoins listed", stablecoins.len());
        if let Some(list_output) = &list_output {
            write_csv_file(list_output, &stablecoins)?;
            info!(path = %list_output.display(), "wrote stablecoin list");
        }
        if all {
            stablecoins.into_iter().map(|stablecoin| stablecoin.id).collect()
        } else {
            ids
        }
    } else {
        ids
    };

    let records = defi_llama.get_stablecoin_records(&ids).await;
    write_stablecoin_records_file(&output, &records)?;
    info!(path = %output.display(), records = records.len(), "wrote stablecoin records");

    Ok(())
}

async fn chain_tvl_series(chains: Vec<String>, top: Option<usize>) -> anyhow::Result<SeriesSet> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let mut chains = if chains.is_empty() {
        defi_llama
            .get_chains()
            .await?
            .into_iter()
            .map(|chain| chain.name)
            .collect()
    } else {
        chains
    };
    if let Some(top) = top {
        chains.truncate(top);
    }

    Ok(defi_llama.get_chain_tvl_series(&chains).await)
}

fn chain_tvl_columns() -> RecordColumns {
    RecordColumns::new("date", &["chain"], "tvl")
}

async fn import_chain_tvl(
    chains: Vec<String>,
    top: Option<usize>,
    output: PathBuf,
) -> anyhow::Result<()> {
    let series_set = chain_tvl_series(chains, top).await?;
    let records = chain_tvl_records(&series_set);
    write_records_file(&output, &chain_tvl_columns(), &records)?;
    info!(path = %output.display(), records = records.len(), "wrote chain tvl records");
    Ok(())
}

struct GrowthArgs {
    input: PathBuf,
    columns: RecordColumns,
    windows: Vec<GrowthWindow>,
    as_of: Option<NaiveDate>,
    max_distance_days: Option<u32>,
    rolling_days: Option<u32>,
    output: PathBuf,
    format: OutputFormat,
    top: usize,
}

fn growth(args: GrowthArgs) -> anyhow::Result<()> {
    let records = read_records_file(&args.input, &args.columns)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(records = records.len(), "read records");

    let mut series_set = series_set(records);
    if let Some(rolling_days) = args.rolling_days {
        series_set = smooth(&series_set, GrowthWindow(rolling_days));
    }

    let as_of = match args.as_of.or_else(|| latest_date(&series_set)) {
        Some(as_of) => as_of,
        None => anyhow::bail!("no observations in {}", args.input.display()),
    };
    let options = GrowthOptions {
        as_of,
        windows: args.windows,
        max_distance_days: args.max_distance_days,
    };

    let rows = growth_rows(&series_set, &options);
    let file = File::create(&args.output)?;
    match args.format {
        OutputFormat::Csv => write_growth_csv(file, &args.columns.entity, &rows)?,
        OutputFormat::Json => write_growth_json(file, &rows)?,
    }
    info!(path = %args.output.display(), rows = rows.len(), "wrote growth");

    let term = Term::stdout();
    for window in &options.windows {
        let heading = format!("Largest growth over {} days to {}", window.days(), as_of);
        print_growth_table(&term, &heading, &top_rows(&rows, *window, args.top))?;
    }

    Ok(())
}

fn stablecoins(
    input: PathBuf,
    windows: Vec<GrowthWindow>,
    as_of: Option<NaiveDate>,
    max_distance_days: Option<u32>,
    growth_output: PathBuf,
    launches_output: PathBuf,
) -> anyhow::Result<()> {
    let records = read_stablecoin_records_file(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let as_of = match as_of.or_else(|| latest_record_date(&records)) {
        Some(as_of) => as_of,
        None => anyhow::bail!("no stablecoin records in {}", input.display()),
    };
    info!(records = records.len(), %as_of, "analyzing stablecoins");

    let data = StablecoinData::new(&records);
    let options = GrowthOptions {
        as_of,
        windows,
        max_distance_days,
    };

    let report = data.chain_growth_report(&options);
    write_chain_growth_csv(File::create(&growth_output)?, &options.windows, &report)?;
    info!(path = %growth_output.display(), chains = report.len(), "wrote chain stablecoin growth");

    let launches = data.coin_launches(&options);
    write_csv_file(&launches_output, &launches)?;
    info!(path = %launches_output.display(), launches = launches.len(), "wrote coin launches");

    let term = Term::stdout();
    if let Some(window) = options.windows.first() {
        print_heading(
            &term,
            &format!("Stablecoin growth over {} days to {}", window.days(), as_of),
        )?;
        term.write_line(&format!(
            "{:<24} {:>10} {:>18} {:>18} {:>10} {:>10} {:>10}",
            "Chain", "Dominant", "Total", "Change", "Change %", USDC, "USDC %"
        ))?;
        for row in report.iter().take(20) {
            let window_growth = &row.windows[0];
            let usdc_change = window_growth
                .usdc
                .as_ref()
                .map(|usdc| usdc.percentage().to_string())
                .unwrap_or_else(|| String::from("N/A"));
            term.write_line(&format!(
                "{:<24} {:>10} {:>18} {:>18} {:>10} {:>10} {:>10}",
                row.chain,
                row.dominant_stablecoin.as_deref().unwrap_or("N/A"),
                format_optional_usd(row.total_current),
                format_optional_usd(window_growth.total.absolute_delta),
                window_growth.total.percentage().to_string(),
                usdc_change,
                row.usdc_share
                    .map(|share| format!("{:.2}%", share * 100.0))
                    .unwrap_or_else(|| String::from("N/A")),
            ))?;
        }
    }

    print_heading(&term, "Latest stablecoin launches")?;
    for launch in launches.iter().take(20) {
        term.write_line(&format!(
            "{} {:<24} {:<12} {:>18} {:>8}",
            launch.launch_date,
            launch.chain,
            launch.stablecoin_symbol,
            format_optional_usd(launch.current_circulating),
            launch.standard.as_str(),
        ))?;
    }

    Ok(())
}

async fn launches(
    input: Option<PathBuf>,
    stablecoins: Option<PathBuf>,
    threshold: f64,
    within: GrowthWindow,
    output: PathBuf,
    summary_output: PathBuf,
) -> anyhow::Result<()> {
    let (series_set, metric) = match (stablecoins, input) {
        (Some(stablecoins), _) => {
            let records = read_stablecoin_records_file(&stablecoins)
                .with_context(|| format!("reading {}", stablecoins.display()))?;
            (StablecoinData::new(&records).chain_totals().clone(), "stablecoins")
        }
        (None, Some(input)) => {
            let records = read_records_file(&input, &chain_tvl_columns())
                .with_context(|| format!("reading {}", input.display()))?;
            (series_set(records), "TVL")
        }
        (None, None) => (chain_tvl_series(Vec::new(), None).await?, "TVL"),
    };

    let rows = milestone_rows(&series_set, threshold, within);
    let crossed: Vec<_> = rows.iter().filter(|row| row.crossed()).cloned().collect();
    if crossed.is_empty() {
        warn!(threshold, "no entity reached the threshold");
    }
    write_csv_file(&output, &crossed)?;

    let summary = yearly_summary(&rows);
    write_csv_file(&summary_output, &summary)?;
    info!(
        path = %output.display(),
        crossed = crossed.len(),
        entities = rows.len(),
        "wrote milestones"
    );

    let heading = format!(
        "{} reaching {} within {} days of launch",
        metric,
        format_optional_usd(Some(threshold)),
        within.days()
    );
    print_launch_report(&Term::stdout(), &heading, &rows, &summary)?;

    Ok(())
}

async fn lending(output_dir: PathBuf) -> anyhow::Result<()> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let lending_protocols: HashSet<String> = defi_llama
        .get_protocol_slugs_in_category(LENDING_CATEGORY)
        .await?
        .into_iter()
        .collect();
    info!("{} lending protocols", lending_protocols.len());

    let pools = defi_llama.get_yield_pools().await?;
    info!("{} yield pools", pools.len());

    let assets = lending_assets(&pools, &lending_protocols);
    let chains = chain_summary(&assets);
    let types = asset_type_summary(&assets);
    let holdings = lst_lrt_holdings(&pools);
    let lst_lrt_chains = lst_lrt_chain_summary(&holdings);

    write_csv_file(output_dir.join("lending_assets_by_chain_detailed.csv"), &assets)?;
    write_csv_file(output_dir.join("lending_assets_by_chain_summary.csv"), &chains)?;
    write_csv_file(output_dir.join("lending_assets_by_type_summary.csv"), &types)?;
    write_csv_file(
        output_dir.join("lending_assets_by_type_and_chain.csv"),
        &asset_type_by_chain(&assets),
    )?;
    write_csv_file(output_dir.join("lst_lrt_tvl_by_chain_detailed.csv"), &holdings)?;
    write_csv_file(output_dir.join("lst_lrt_tvl_by_chain_summary.csv"), &lst_lrt_chains)?;
    info!(path = %output_dir.display(), "wrote lending composition");

    let term = Term::stdout();
    print_heading(&term, "Lending TVL by chain (EVM only)")?;
    for chain in chains.iter().take(20) {
        term.write_line(&format!(
            "{:<20} {:>20} {:>10} {:>10}",
            chain.chain,
            format_optional_usd(Some(chain.total_tvl)),
            chain.num_unique_assets,
            chain.total_protocol_count
        ))?;
    }

    print_heading(&term, "Asset types")?;
    for asset_type in &types {
        term.write_line(&format!(
            "{:<20} {:>20} {:>10} {:>10}",
            asset_type.asset_type,
            format_optional_usd(Some(asset_type.total_tvl)),
            asset_type.num_unique_assets,
            asset_type.num_chains
        ))?;
    }

    print_heading(&term, "LST/LRT by chain")?;
    for chain in lst_lrt_chains.iter().take(20) {
        term.write_line(&format!(
            "{:<20} {:>20} {:>10}",
            chain.chain,
            format_optional_usd(Some(chain.total_tvl)),
            chain.num_tokens
        ))?;
    }

    Ok(())
}

async fn morpho_markets(
    chain_id: u64,
    total_tvls: Vec<(String, f64)>,
    output: PathBuf,
    share_output: PathBuf,
) -> anyhow::Result<()> {
    let morpho = MorphoApi::new(ReqwestFetch::new_from_env());
    let markets = morpho.get_markets(chain_id).await?;

    if markets.is_empty() {
        warn!(chain_id, "no morpho markets found");
        return Ok(());
    }

    write_csv_file(&output, &markets)?;
    info!(path = %output.display(), markets = markets.len(), "wrote morpho markets");

    let term = Term::stdout();
    let totals = market_totals(&markets);
    print_heading(&term, &format!("Morpho markets on chain {chain_id}"))?;
    term.write_line(&format!("Markets: {}", totals.market_count))?;
    term.write_line(&format!("Supplied: {}", format_optional_usd(Some(totals.supply_usd))))?;
    term.write_line(&format!("Borrowed: {}", format_optional_usd(Some(totals.borrow_usd))))?;
    term.write_line(&format!(
        "Collateral: {}",
        format_optional_usd(Some(totals.collateral_usd))
    ))?;
    term.write_line(&format!(
        "Utilization: {}",
        totals
            .utilization
            .map(|utilization| format!("{:.2}%", utilization * 100.0))
            .unwrap_or_else(|| String::from("N/A"))
    ))?;

    term.write_line("")?;
    for market in &markets {
        term.write_line(&format!(
            "{:<25} {:>18} {:>18} {:>8.2}% LLTV {:>6.2}%",
            market.pair,
            format_optional_usd(Some(market.supply_usd)),
            format_optional_usd(Some(market.borrow_usd)),
            market.utilization * 100.0,
            market.lltv * 100.0
        ))?;
    }

    if !total_tvls.is_empty() {
        let shares = market_shares(&markets, &total_tvls);
        write_csv_file(&share_output, &shares)?;
        info!(path = %share_output.display(), "wrote morpho market share");

        print_heading(&term, "Share of asset TVL supplied on Morpho")?;
        for share in &shares {
            term.write_line(&format!(
                "{:<15} {:>15} {:>18} {:>6} {:>10}",
                share.asset,
                format_optional_usd(Some(share.total_tvl)),
                format_optional_usd(Some(share.morpho_supply_usd)),
                share.market_count,
                share
                    .share
                    .map(|share| format!("{:.2}%", share * 100.0))
                    .unwrap_or_else(|| String::from("N/A"))
            ))?;
        }
    }

    Ok(())
}

async fn protocol_tvl(top: usize, days: GrowthWindow, output_dir: PathBuf) -> anyhow::Result<()> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let protocols = defi_llama.get_protocols().await?;
    let top_protocols = top_protocols(&protocols, top);
    let today = Utc::now().date_naive();
    let since = today.checked_sub_days(Days::from(days)).unwrap_or(NaiveDate::MIN);
    info!(protocols = top_protocols.len(), %since, "fetching protocol tvl history");

    let records = defi_llama.get_protocol_tvl_records(&top_protocols, since).await;
    if records.is_empty() {
        warn!("no protocol tvl history fetched");
        return Ok(());
    }

    let categories = category_tvl_records(&category_series_set(&records));
    let growth = category_growth(&records);

    write_csv_file(output_dir.join("protocol_tvl_history.csv"), &records)?;
    write_csv_file(output_dir.join("category_tvl_history.csv"), &categories)?;
    write_csv_file(output_dir.join("category_growth_summary.csv"), &growth)?;
    info!(
        path = %output_dir.display(),
        records = records.len(),
        categories = growth.len(),
        "wrote protocol tvl history"
    );

    let heading = format!("Category TVL growth over {} days", days.days());
    print_category_growth(&Term::stdout(), &heading, &growth)?;

    Ok(())
}

async fn lending_tvl(output_dir: PathBuf) -> anyhow::Result<()> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let protocols = defi_llama.get_protocols().await?;
    let (supplied, borrowed) = lending_chain_records(&protocols);
    let chains = lending_tvl_by_chain(&supplied, &borrowed);
    info!(chains = chains.len(), "lending tvl by chain");

    write_csv_file(output_dir.join("lending_tvl_by_chain.csv"), &chains)?;
    write_csv_file(output_dir.join("lending_tvl_by_chain_detailed.csv"), &supplied)?;
    write_csv_file(output_dir.join("lending_borrowed_by_chain_detailed.csv"), &borrowed)?;
    info!(path = %output_dir.display(), "wrote lending tvl by chain");

    let term = Term::stdout();
    let total_tvl: f64 = chains.iter().map(|chain| chain.total_lending_tvl).sum();
    let total_borrowed: f64 = chains.iter().map(|chain| chain.total_borrowed).sum();
    print_heading(&term, "Lending TVL by chain")?;
    term.write_line(&format!(
        "Total: {} supplied, {} borrowed",
        format_optional_usd(Some(total_tvl)),
        format_optional_usd(Some(total_borrowed))
    ))?;
    for chain in chains.iter().take(20) {
        term.write_line(&format!(
            "{:<20} {:>20} {:>6} {:>20} {:>10}",
            chain.chain,
            format_optional_usd(Some(chain.total_lending_tvl)),
            chain.num_lending_protocols,
            format_optional_usd(Some(chain.total_borrowed)),
            chain
                .utilization
                .map(|utilization| format!("{:.2}%", utilization * 100.0))
                .unwrap_or_else(|| String::from("N/A"))
        ))?;
    }

    Ok(())
}

async fn new_chains_lending(options: NewChainOptions, output_dir: PathBuf) -> anyhow::Result<()> {
    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());

    let rows = defi_llama.get_new_chains_lending_growth(&options).await?;
    if rows.is_empty() {
        warn!("no recently launched chains with lending protocols");
        return Ok(());
    }

    let summaries = lending_growth_summaries(&rows);
    let tracked = options.tracked.days();
    write_csv_file(
        output_dir.join(format!("new_chains_lending_growth_{tracked}days.csv")),
        &rows,
    )?;
    write_csv_file(output_dir.join("new_chains_lending_growth_summary.csv"), &summaries)?;
    info!(
        path = %output_dir.display(),
        rows = rows.len(),
        chains = summaries.len(),
        "wrote new chains lending growth"
    );

    print_lending_growth(&Term::stdout(), &summaries)?;

    Ok(())
}

async fn chain_metrics(top: usize, stablecoins: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let stablecoin_mcaps = match read_stablecoin_records_file(&stablecoins) {
        Ok(records) => stablecoin_mcaps(&records),
        Err(err) => {
            warn!(path = %stablecoins.display(), %err, "no stablecoin records, totals are zero");
            BTreeMap::new()
        }
    };

    let defi_llama = DefiLlama::new(ReqwestFetch::new_from_env());
    let metrics = defi_llama.get_chain_metrics(top, &stablecoin_mcaps).await?;

    write_csv_file(&output, &metrics)?;
    info!(path = %output.display(), chains = metrics.len(), "wrote chain metrics");

    print_chain_metrics(&Term::stdout(), &metrics)?;

    Ok(())
}
