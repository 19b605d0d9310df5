use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    cache::CacheService,
    config::Config,
    database::init_db,
    repository::{ProducerRepository, ProductRepository, SaleModeRepository, UserRepository},
};

pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub cache: CacheService,
    pub users: UserRepository,
    pub producers: ProducerRepository,
    pub products: ProductRepository,
    pub sale_modes: SaleModeRepository,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        Self::from_config(Config::load())
            .await
            .expect("Database misconfigured!")
    }

    /// Builds the state from an explicit config; the integration suite
    /// uses this with `sqlite::memory:` and no Redis.
    pub async fn from_config(config: Config) -> Result<Arc<Self>, sqlx::Error> {
        info!("Initializing state...");

        let db = init_db(&config.database_url).await?;
        let cache = CacheService::new(config.redis_url.as_deref()).await;

        Ok(Arc::new(Self {
            users: UserRepository::new(db.clone()),
            producers: ProducerRepository::new(db.clone()),
            products: ProductRepository::new(db.clone()),
            sale_modes: SaleModeRepository::new(db.clone()),
            config,
            db,
            cache,
        }))
    }
}
