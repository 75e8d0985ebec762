use clap::Parser;
use questboard_server::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "questboard_server=info,questboard_engine=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();
    let addr = config.addr()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        seed = %config.seed_file.display(),
        "questboard server listening on http://{addr}"
    );
    questboard_server::serve(addr, config.into_state()).await
}
