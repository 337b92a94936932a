// src/main.rs

use anyhow::Result;
use castmate_config::{ConfigLoader, ConfigValidator};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use castmate::{CastmateApp, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    info!("Starting Castmate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);
    ConfigValidator::validate(&config)?;

    let app = CastmateApp::new(config).await?;
    app.run().await?;

    info!("Castmate shut down successfully");
    Ok(())
}

fn init_logging(debug: bool) -> Result<()> {
    let default_filter = if debug {
        "castmate=debug,info"
    } else {
        "castmate=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
