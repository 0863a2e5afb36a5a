use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mvirt_cache::rest::{AppState, create_router};
use mvirt_cache::{
    Agent, AgentScheduler, AgentScope, CacheAuditLogger, CacheStore, CachingAgent, CachingConfig,
    DefaultNamer, FixtureCloud, Keys, MemoryStore, OnDemandDispatcher, SqliteStore,
};
use mvirt_cache::resource::{LoadBalancer, SecurityGroup, ServerGroup};

#[derive(Parser)]
#[command(name = "mvirt-cache")]
#[command(about = "mvirt cache - keeps a relationship-structured cache of cloud resources fresh")]
struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "[::]:8090")]
    listen: String,

    /// SQLite database file
    #[arg(short, long, default_value = "/var/lib/mvirt/cache.db")]
    database: PathBuf,

    /// Keep the cache in memory instead of SQLite
    #[arg(long)]
    dev: bool,

    /// JSON inventory served as the cloud API
    #[arg(short, long)]
    inventory: PathBuf,

    /// Account and region to cache (format: account:region, can be repeated)
    #[arg(long = "scope", required = true)]
    scopes: Vec<AgentScope>,

    /// Seconds between full scans
    #[arg(long, default_value_t = 60)]
    scan_interval: u64,

    /// Seconds an on-demand result is kept waiting for a scan
    #[arg(long, default_value_t = 600)]
    on_demand_ttl: u64,

    /// Seconds records contributed by non-owning agents live (0 = until evicted)
    #[arg(long, default_value_t = 3600)]
    informative_ttl: u64,

    /// Cache key prefix
    #[arg(long, default_value = "mvirt")]
    provider: String,
}

fn caching_agents(
    scope: &AgentScope,
    config: &Arc<CachingConfig>,
    keys: &Keys,
    cloud: &Arc<FixtureCloud>,
    store: &Arc<dyn CacheStore>,
    audit: &Arc<CacheAuditLogger>,
) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(CachingAgent::<ServerGroup>::new(
            scope.clone(),
            config.clone(),
            keys.clone(),
            cloud.clone(),
            store.clone(),
            audit.clone(),
        )) as Arc<dyn Agent>,
        Arc::new(CachingAgent::<LoadBalancer>::new(
            scope.clone(),
            config.clone(),
            keys.clone(),
            cloud.clone(),
            store.clone(),
            audit.clone(),
        )) as Arc<dyn Agent>,
        Arc::new(CachingAgent::<SecurityGroup>::new(
            scope.clone(),
            config.clone(),
            keys.clone(),
            cloud.clone(),
            store.clone(),
            audit.clone(),
        )) as Arc<dyn Agent>,
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mvirt_cache=info,tower_http=warn")),
        )
        .init();

    let args = Args::parse();

    info!(
        "Starting mvirt-cache - REST: {}, scopes: {}, scan interval: {}s",
        args.listen,
        args.scopes.len(),
        args.scan_interval
    );

    let (shutdown_tx, _) = watch::channel(false);

    // Store
    let store: Arc<dyn CacheStore> = if args.dev {
        info!("Using in-memory cache store");
        let store = Arc::new(MemoryStore::new());
        let purged = store.clone();
        spawn_purge(args.scan_interval, shutdown_tx.subscribe(), move || {
            let store = purged.clone();
            async move { Ok(store.purge_expired().await) }
        });
        store as Arc<dyn CacheStore>
    } else {
        if let Some(parent) = args.database.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = Arc::new(
            SqliteStore::new(&args.database)
                .await
                .context("Failed to open cache database")?,
        );
        info!("Cache database: {}", args.database.display());
        let purged = store.clone();
        spawn_purge(args.scan_interval, shutdown_tx.subscribe(), move || {
            let store = purged.clone();
            async move { store.purge_expired().await.map_err(anyhow::Error::from) }
        });
        store as Arc<dyn CacheStore>
    };

    let cloud = Arc::new(
        FixtureCloud::from_file(&args.inventory)
            .await
            .context("Failed to load inventory")?,
    );

    let config = Arc::new(CachingConfig {
        provider: args.provider.clone(),
        on_demand_ttl: Duration::from_secs(args.on_demand_ttl),
        informative_ttl: (args.informative_ttl > 0)
            .then(|| Duration::from_secs(args.informative_ttl)),
    });
    let keys = Keys::new(config.provider.clone(), Arc::new(DefaultNamer));
    let audit = Arc::new(CacheAuditLogger::new("cache"));

    let agents: Vec<Arc<dyn Agent>> = args
        .scopes
        .iter()
        .flat_map(|scope| caching_agents(scope, &config, &keys, &cloud, &store, &audit))
        .collect();

    let mut scheduler = AgentScheduler::new(Duration::from_secs(args.scan_interval));
    for agent in &agents {
        scheduler.spawn(agent.clone());
    }
    info!("Started {} caching agents", scheduler.len());

    let app_state = Arc::new(AppState {
        store: store.clone(),
        dispatcher: Arc::new(OnDemandDispatcher::new(agents)),
    });
    let router = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("REST API listening on {}", args.listen);

    let mut shutdown_rx = shutdown_tx.subscribe();
    let rest_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await
    });

    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);
    match rest_handle.await {
        Ok(Err(e)) => warn!("REST server error: {}", e),
        Err(e) => warn!("REST server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    scheduler.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Periodically drops expired records so the store does not grow unbounded.
fn spawn_purge<F, Fut>(interval_secs: u64, mut shutdown_rx: watch::Receiver<bool>, purge: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<u64>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => match purge().await {
                    Ok(0) => {}
                    Ok(n) => info!("Purged {} expired records", n),
                    Err(e) => warn!("Failed to purge expired records: {}", e),
                },
                _ = shutdown_rx.changed() => break,
            }
        }
    });
}
