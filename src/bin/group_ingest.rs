use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use group_ingest::bus::{InMemoryBroker, TopicClient};
use group_ingest::config::Options;
use group_ingest::consumer::{subscribe, GroupIngestHandler, LoggingFaultHandler};
use group_ingest::producer::TopicEventService;
use group_ingest::store::InMemoryRecordStore;
use group_ingest::telemetry;
use group_ingest::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::from_env().context("failed to load configuration")?;
    telemetry::init_tracing(&options.logging)?;

    let environment = options.host_environment();
    info!(%environment, topic = %options.app_settings.dependencies.topic, "Starting group ingest");

    let broker = Arc::new(InMemoryBroker::with_limits(
        options.lock_duration(),
        options.consumer.max_delivery_count,
    ));
    let store = InMemoryRecordStore::open(&options.app_settings.connection_strings.database)
        .context("failed to open record store")?;

    // Producer and consumer hold separate clients so shutting down the pump
    // does not close the producer's connection.
    let producer_client = Arc::new(TopicClient::new(options.topic_settings(), broker.clone()));
    let consumer_client = Arc::new(TopicClient::new(options.topic_settings(), broker));

    let subscription = subscribe(
        consumer_client,
        Arc::new(GroupIngestHandler::new(store)),
        Arc::new(LoggingFaultHandler),
        options.consumer_options(),
    );

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        Arc::new(TopicEventService::new(producer_client.clone())),
        options.http.spa_root.clone(),
        environment,
    );
    let server_shutdown = shutdown.clone();
    let bind_address = options.http.bind_address.clone();
    let mut server = tokio::spawn(async move {
        web::serve(state, &bind_address, async move {
            server_shutdown.cancelled().await
        })
        .await
    });

    let mut server_done = false;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
        result = &mut server => {
            server_done = true;
            log_server_exit(result);
        }
    }
    shutdown.cancel();

    let stats = subscription.shutdown().await;
    info!(?stats, "Consumer drained");

    if !server_done {
        log_server_exit(server.await);
    }

    producer_client
        .close()
        .await
        .context("failed to close producer client")?;
    info!("Group ingest stopped");
    Ok(())
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("HTTP host stopped"),
        Ok(Err(e)) => error!(error = %e, "HTTP host failed"),
        Err(e) => error!(error = %e, "HTTP host task failed"),
    }
}
