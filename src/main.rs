use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Result;
use log::info;

use cur_rates::http::{self, AppState, IngestAuth};
use cur_rates::{
    Config, HttpFeedSource, IngestionCoordinator, LatestRatesView, MemoryRateStore,
    PgRateStore, RateStore, SchemaRegistry, SeriesView, StorageConfig,
};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!("Starting currency rates service on {}", config.listen_addr);
    info!("Feed: {} (timeout {:?})", config.feed_url, config.feed_timeout);
    info!("Ingest gate: {:?}", config.ingest_gate);

    let store = open_store(&config.storage).await?;
    store.ensure_table().await?;

    let registry = SchemaRegistry::new(store.clone());
    let known = registry.columns().await?;
    info!("{} currency columns in catalog", known.len());

    let feed = HttpFeedSource::new(&config.feed_url, config.feed_timeout)?;
    let state = web::Data::new(AppState {
        latest: LatestRatesView::new(store.clone()),
        series: SeriesView::new(store.clone(), registry.clone()),
        ingest: IngestionCoordinator::new(
            store.clone(),
            registry,
            Arc::new(feed),
            config.ingest_gate,
        ),
        auth: IngestAuth::new(config.auth_header.clone(), &config.auth_token),
    });

    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(http::configure)
    })
    .bind(config.listen_addr.as_str())?
    .run()
    .await;

    info!("Server stopped, closing storage");
    store.close().await;
    served?;

    Ok(())
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn RateStore>> {
    let store: Arc<dyn RateStore> = match storage {
        StorageConfig::Postgres {
            url,
            table,
            max_connections,
            timeout,
        } => {
            info!("Storage: postgres table {table}");
            Arc::new(PgRateStore::connect(url, table, *max_connections, *timeout).await?)
        }
        StorageConfig::Memory => {
            info!("Storage: in-memory (data is lost on restart)");
            Arc::new(MemoryRateStore::new())
        }
    };

    Ok(store)
}
