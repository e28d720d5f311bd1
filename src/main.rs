use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use shell_cache::cache::classify::Classifier;
use shell_cache::cache::dispatch::Dispatcher;
use shell_cache::cache::lifecycle::Lifecycle;
use shell_cache::config::{Cli, Config};
use shell_cache::fetch::{Fetch, HttpFetcher};
use shell_cache::server::gateway::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "shell_cache=debug,tower_http=debug"
    } else {
        "shell_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("shell-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(generation) = cli.generation {
        config.cache.generation = generation;
    }
    let config = Arc::new(config);

    info!(
        origin = %config.origin.base_url,
        generation = %config.cache.generation,
        cache_root = %config.cache.root.display(),
        shell_assets = config.shell.assets.len(),
        "Configuration loaded"
    );

    // Wire the fetch boundary and the cache controller.
    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpFetcher::new(Duration::from_secs(config.origin.request_timeout_secs))?);

    let lifecycle = Arc::new(Lifecycle::new(
        config.cache.root.clone(),
        config.origin.base_url.clone(),
        fetcher.clone(),
    ));

    // Install the configured generation (skipped when a populated store
    // already exists from a previous run), then activate it. A failed
    // install never degrades a previously installed shell: we log, keep
    // serving pass-through, and leave retry to a later /cache/install.
    let generation = config.cache.generation.clone();
    if lifecycle.is_installed_on_disk(&generation).await {
        info!(generation = %generation, "Generation already installed, activating");
        lifecycle.activate(&generation).await?;
    } else {
        match lifecycle.install(&generation, &config.shell.assets).await {
            Ok(()) => lifecycle.activate(&generation).await?,
            Err(e) => {
                warn!(generation = %generation, error = %e, "Startup install failed, serving pass-through");
            }
        }
    }

    let classifier = Classifier::from_config(&config.routes);
    let dispatcher = Dispatcher::new(classifier, lifecycle.clone(), fetcher);

    // Build application state.
    let state = Arc::new(AppState {
        dispatcher,
        lifecycle,
        config: config.clone(),
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen;
    info!(addr = listen_addr, "Starting gateway");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
