use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use geodns_api::ApiServer;
use geodns_auth::{AuthResolver, AuthServer, ZoneCatalog};
use geodns_core::config::{Config, LoggingConfig};
use geodns_core::db::{RecordStore, RedbStore};
use geodns_geo::{GeoIpLookup, GeoResolver, MaxMindGeoIp};

#[derive(Parser)]
#[command(name = "geodns", about = "Authoritative, geo-aware DNS server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "/etc/geodns/geodns.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    init_logging(&config.logging);

    let store: Arc<dyn RecordStore> = Arc::new(RedbStore::open(&config.database.path)?);
    info!(path = %config.database.path.display(), "database opened");

    let catalog = ZoneCatalog::new(store.clone());
    let zone_names = catalog.zone_names();
    info!(zones = zone_names.len(), "zones loaded");

    let geoip: Option<Arc<dyn GeoIpLookup>> = match &config.geoip.db_path {
        Some(path) => {
            let reader = MaxMindGeoIp::open(path)?;
            info!(path = %path.display(), "geoip database opened");
            Some(Arc::new(reader))
        }
        None => {
            warn!("no geoip database configured; LOC_RES records will SERVFAIL");
            None
        }
    };
    let geo = geoip.map(|g| Arc::new(GeoResolver::new(store.clone(), Some(g))));

    let resolver = Arc::new(AuthResolver::new(store.clone(), geo, config.dns.soa.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let dns_addr: SocketAddr = config.dns.listen.parse()?;
    let dns_server = AuthServer::bind(dns_addr, resolver.clone()).await?;
    let rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = dns_server.run(rx).await {
            error!("auth DNS server error: {e}");
        }
    }));

    if config.api.enabled {
        let api_addr: SocketAddr = config.api.listen.parse()?;
        let api = ApiServer::new(api_addr, store.clone(), config.api.api_key.clone());
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api.run(rx).await {
                error!("admin API error: {e}");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping services...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }

    info!("geodns stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
