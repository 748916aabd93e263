use std::sync::Arc;

use clap::Parser;
use observation_memory_mcp::{
    build_dispatcher,
    cache::{spawn_prune_task, CacheEntry, QueryCache},
    config::{CliArgs, Config, TransportMode},
    logging,
    store::InMemoryObservationStore,
    transport::{serve_stdio, SocketTransport},
    AppState,
};
use serde_json::Value;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::load(CliArgs::parse())?;

    let cache = Arc::new(
        QueryCache::new(config.cache_max_entries, config.cache_ttl).with_eviction_callback(
            Box::new(|key: &str, entry: &CacheEntry<Value>| {
                debug!(key, hits = entry.hit_count, "cache entry removed");
            }),
        ),
    );
    let pruner = spawn_prune_task(Arc::clone(&cache), config.cache_ttl);
    let state = AppState::new(Arc::new(InMemoryObservationStore::new()), Arc::clone(&cache));
    let dispatcher = build_dispatcher(state);

    info!(
        transport = ?config.transport,
        cache_max_entries = config.cache_max_entries,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "server starting"
    );

    let outcome = match config.transport {
        TransportMode::Stdio => serve_stdio(dispatcher).await,
        TransportMode::Socket => {
            let transport = SocketTransport::bind(config.bind_socket()?).await?;
            let server = transport.start(dispatcher);
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, shutting down");
            server.shutdown().await
        }
    };

    pruner.abort();
    cache.clear();
    info!("server stopped");
    outcome?;
    Ok(())
}
