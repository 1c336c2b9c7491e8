use std::{fs::read_to_string, sync::Arc};

use tracing::{info, warn};

use crate::{
    catalog::{Catalog, Strictness},
    config::Config,
    csv,
    session::{MemoryRecordStore, RecordStore, RedisRecordStore},
};

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let catalog = Arc::new(load_catalog(&config.inventory_path));

        let records: Arc<dyn RecordStore> = match &config.redis_url {
            Some(url) => {
                info!("Using Redis record store");
                Arc::new(
                    RedisRecordStore::connect(url)
                        .await
                        .expect("Redis misconfigured!"),
                )
            }
            None => {
                info!("REDIS_URL not set, using in-memory record store");
                Arc::new(MemoryRecordStore::new())
            }
        };

        Arc::new(Self {
            config,
            catalog,
            records,
        })
    }

    /// Assemble a state by hand, for router tests.
    pub fn with_parts(config: Config, catalog: Catalog, records: Arc<dyn RecordStore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            catalog: Arc::new(catalog),
            records,
        })
    }
}

fn load_catalog(path: &str) -> Catalog {
    match read_to_string(path) {
        Ok(text) => {
            let rows = csv::parse_rows(&text);
            let catalog = Catalog::load(&rows, Strictness::Permissive)
                .unwrap_or_default();
            info!(
                collections = catalog.collections().len(),
                "Loaded inventory from {path}"
            );
            catalog
        }
        Err(e) => {
            warn!("Failed to read inventory file {path}: {e}, starting empty");
            Catalog::default()
        }
    }
}
