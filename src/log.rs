use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::env::ENV_CONFIG;

/// Falls back to `info` for this crate when RUST_LOG is unset.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("defi_metrics=info,defi_metrics_cli=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let builder = if ENV_CONFIG.log_perf {
        builder.with_span_events(FmtSpan::CLOSE)
    } else {
        builder
    };

    if ENV_CONFIG.log_json {
        builder.json().init();
    } else {
        builder.init();
    };
}
