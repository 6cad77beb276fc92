use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (POLTR_LOG_JSON=1), human-readable otherwise.
    let json_logs = std::env::var("POLTR_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("poltr_appview=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = poltr_appview::config::Config::parse();
    tracing::info!(listen_addr = %config.listen_addr, "starting poltr-appview");
    poltr_appview::run(config).await
}
