// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use blobtree::command;
use blobtree::{BTree, StoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blobtree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment variables
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: base_path={}, cache_pages={}",
        config.base_path.display(),
        config.cache_pages
    );

    if let Some(parent) = config.base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!("Failed to create data directory: {e}");
            std::process::exit(1);
        }
    }

    let mut tree = match BTree::open_with_config(&config) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    // Input or output failures end the session; the store is still closed.
    if let Err(e) = command::serve(&mut tree, stdin.lock(), &mut stdout) {
        tracing::error!("Session ended: {e}");
    }

    if let Err(e) = tree.close() {
        tracing::error!("Failed to close store: {e}");
        std::process::exit(1);
    }
    tracing::info!("Store closed");
}
