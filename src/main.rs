use clap::Parser;
use subbatch::cli::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli.init_tracing();

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    match subbatch::run(&config).await {
        Ok(summary) => info!(
            "Done: {} records, {} written, {} skipped",
            summary.records, summary.published, summary.skipped
        ),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
