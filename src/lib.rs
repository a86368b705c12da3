pub mod chain_metrics;
pub mod classify;
pub mod defi_llama;
pub mod env;
pub mod fetch;
pub mod growth_report;
pub mod launches;
pub mod lending;
pub mod lending_growth;
pub mod log;
pub mod morpho;
pub mod protocols;
pub mod records;
pub mod stablecoins;
pub mod time_frames;
pub mod time_series;

pub use defi_llama::DefiLlama;
pub use fetch::{FetchError, HttpFetch, ReqwestFetch};
pub use morpho::MorphoApi;
