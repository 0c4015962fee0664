//! Counter example binary
//!
//! Demonstrates the Composable Resource architecture with a simple counter.

use composable_resource_core::args;
use composable_resource_core::persistence::{KeyValueStore, MemoryBackend};
use composable_resource_runtime::metrics::install_prometheus_recorder;
use counter::persistent_counter;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,composable_resource_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = install_prometheus_recorder()?;

    println!("=== Counter Example: Composable Resource Architecture ===\n");

    let store = Arc::new(KeyValueStore::new(MemoryBackend::new()));
    let counter = persistent_counter(Arc::clone(&store)).await?;

    // Every state change is printed, starting with the current one
    let _states = counter.subscribe(|state| println!("  state: {state:?}"));
    let _lock = counter.lock_subscribe(|locked| println!("  locked: {locked}"));

    println!("\n>>> add(5)");
    counter.dispatch("add", args![5]).await?;

    println!("\n>>> add(-2)");
    counter.dispatch("add", args![-2]).await?;

    println!("\n>>> save() twice at once");
    let (first, second) = tokio::join!(
        counter.dispatch("save", args![]),
        counter.dispatch("save", args![]),
    );
    println!("  first:  {:?}", first.map(|_| "saved"));
    println!("  second: {:?}", second.map(|_| "saved").map_err(|e| e.to_string()));

    println!("\n>>> reset()");
    counter.dispatch("reset", args![]).await?;

    println!(
        "\nStored value: {}",
        store
            .backend()
            .peek(counter::STORAGE_KEY)
            .unwrap_or_default()
    );

    println!("\n=== Metrics ===\n{}", metrics.render());

    println!("Key concepts demonstrated:");
    println!("  • Resource: state stream plus named actions");
    println!("  • Epic: sync, async and lock-flagged handlers");
    println!("  • Reducer: merge policy folding each result into state");
    println!("  • Lock: concurrent save rejected, never queued");
    println!("  • Persistence: every state written before it is published");
    Ok(())
}
