//! txlog HTTP server binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use txlog::TxLog;
use txlog::server::{CliArgs, TxLogServer, TxLogServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let txlog_config = args.to_txlog_config();
    let server_config = TxLogServerConfig::from(&args);

    tracing::info!("Opening txlog with config: {:?}", txlog_config);

    let log = TxLog::open(txlog_config).await?;

    let server = TxLogServer::new(Arc::new(log), server_config);
    server.run().await?;
    Ok(())
}
