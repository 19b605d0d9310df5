use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use tracing::{info, warn};

/// Cache durations in seconds, per response family.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub producers_list: u64,
    pub producers_nearby: u64,
    pub producer_detail: u64,
    pub categories_list: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// When unset the service runs on the in-process cache backend.
    pub redis_url: Option<String>,
    pub media_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_lifetime_hours: i64,
    pub page_size: i64,
    pub max_upload_bytes: usize,
    pub allowed_image_extensions: Vec<String>,
    pub ttl: CacheTtls,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("MPL_PORT", "8000"),
            database_url: try_load("DATABASE_URL", "sqlite://mpl.db"),
            redis_url: var("REDIS_URL").ok(),
            media_dir: PathBuf::from(try_load::<String>("MEDIA_DIR", "media")),
            jwt_secret: load_secret("JWT_SECRET"),
            jwt_lifetime_hours: try_load("JWT_ACCESS_TOKEN_LIFETIME_HOURS", "1"),
            page_size: try_load("PAGE_SIZE", "20"),
            max_upload_bytes: try_load::<usize>("MAX_UPLOAD_SIZE_MB", "10") * 1024 * 1024,
            allowed_image_extensions: try_load::<String>(
                "ALLOWED_IMAGE_EXTENSIONS",
                "jpg,jpeg,png,webp",
            )
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
            ttl: CacheTtls {
                producers_list: try_load("CACHE_TTL_PRODUCERS_LIST", "300"),
                producers_nearby: try_load("CACHE_TTL_PRODUCERS_NEARBY", "300"),
                producer_detail: try_load("CACHE_TTL_PRODUCER_DETAIL", "600"),
                categories_list: try_load("CACHE_TTL_CATEGORIES_LIST", "3600"),
            },
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| ())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Secrets come from the environment directly or, in container
/// deployments, from a file path in `<NAME>_FILE`.
fn load_secret(name: &str) -> String {
    if let Ok(value) = var(name) {
        return value;
    }

    let file_key = format!("{name}_FILE");
    if let Ok(path) = var(&file_key) {
        return read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|e| {
                warn!("Failed to read {name} from {path}: {e}");
            })
            .expect("Secrets misconfigured!");
    }

    warn!("{name} not set, using an insecure development default");
    "insecure-dev-secret".to_string()
}
