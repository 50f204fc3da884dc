#[macro_use]
extern crate log;

mod cli;
mod cluster;
mod committed_offsets;
mod constants;
mod consumer_group_metrics;
mod http;
mod internals;
mod kafka_types;
mod logging;
mod metrics;
mod name_filter;
mod offset_table;
mod scrape;
mod topic_metrics;

#[cfg(test)]
mod testing;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use cluster::RdKafkaClusterClient;
use committed_offsets::AlternateLagSource;
use scrape::ScrapeCoordinator;

#[tokio::main]
async fn main() {
    let cli = parse_cli_and_init_logging();

    let shutdown_token = build_shutdown_token();

    // Init Prometheus Registry of the internal metrics
    let metrics = Arc::new(metrics::init());

    let client_config = cli.build_client_config();
    let client = match RdKafkaClusterClient::new(client_config.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Kafka client: {e}");
            process::exit(exit_code::SERVICE_UNAVAILABLE);
        },
    };

    // Optional lag source, fed by consuming `__consumer_offsets`
    let (alternate_lag_source, co_join) = if cli.use_alternate_lag {
        let (co_reg, co_join) = committed_offsets::init(client_config, shutdown_token.clone(), metrics.clone());
        (Some(Arc::new(co_reg) as Arc<dyn AlternateLagSource>), Some(co_join))
    } else {
        (None, None)
    };

    let coordinator =
        Arc::new(ScrapeCoordinator::new(client, cli.build_scrape_config(), alternate_lag_source, metrics.clone()));

    // Serve until shutdown
    if let Err(e) = http::init(
        cli.listen_on(),
        coordinator,
        cli.labels.clone(),
        cli.scrape_timeout,
        shutdown_token.clone(),
        metrics,
    )
    .await
    {
        error!("HTTP service failed: {e}");
        shutdown_token.cancel();
        process::exit(exit_code::IO_ERROR);
    }

    if let Some(join) = co_join {
        if let Err(e) = join.await {
            error!("Failed to join consumer of committed offsets: {e}");
        }
    }

    info!("Shutdown complete");
}

fn parse_cli_and_init_logging() -> Cli {
    // Parse command line input and initialize logging
    let cli = Cli::parse();
    logging::init(cli.verbosity_level());

    trace!("Created:\n{:#?}", cli);

    cli
}

fn build_shutdown_token() -> CancellationToken {
    let shutdown_token = CancellationToken::new();

    // Setup shutdown signal handler:
    // when it's time to shutdown, cancels the token shared by all the tasks.
    //
    // NOTE: This handler will be listening on its own dedicated thread.
    let handler_token = shutdown_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_token.cancel();
    }) {
        error!("Failed to register signal handler: {e}");
    }

    shutdown_token
}
