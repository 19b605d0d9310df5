//! SQLite pool setup, first-boot schema and lookup-table seeding.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    seed_product_categories(&pool).await?;

    info!("Database ready");
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT    NOT NULL UNIQUE,
    password_hash TEXT    NOT NULL,
    is_producer   INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS producers (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    name          TEXT    NOT NULL,
    description   TEXT    NOT NULL DEFAULT '',
    category      TEXT    NOT NULL DEFAULT 'autre',
    address       TEXT    NOT NULL,
    latitude      REAL    NOT NULL,
    longitude     REAL    NOT NULL,
    phone         TEXT    NOT NULL DEFAULT '',
    email_contact TEXT    NOT NULL DEFAULT '',
    website       TEXT    NOT NULL DEFAULT '',
    opening_hours TEXT    NOT NULL DEFAULT '',
    created_at    TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_producers_category ON producers(category, created_at);
CREATE INDEX IF NOT EXISTS idx_producers_position ON producers(latitude, longitude);

CREATE TABLE IF NOT EXISTS producer_photos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    producer_id INTEGER NOT NULL REFERENCES producers(id) ON DELETE CASCADE,
    image_file  TEXT    NOT NULL,
    created_at  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_producer_photos ON producer_photos(producer_id, created_at);

CREATE TABLE IF NOT EXISTS sale_modes (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    producer_id        INTEGER NOT NULL REFERENCES producers(id) ON DELETE CASCADE,
    mode_type          TEXT    NOT NULL,
    title              TEXT    NOT NULL,
    instructions       TEXT    NOT NULL DEFAULT '',
    phone_number       TEXT    NOT NULL DEFAULT '',
    website_url        TEXT    NOT NULL DEFAULT '',
    is_24_7            INTEGER NOT NULL DEFAULT 0,
    location_address   TEXT    NOT NULL DEFAULT '',
    location_latitude  REAL,
    location_longitude REAL,
    market_info        TEXT    NOT NULL DEFAULT '',
    position           INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sale_modes_producer ON sale_modes(producer_id, position);

CREATE TABLE IF NOT EXISTS opening_hours (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sale_mode_id INTEGER NOT NULL REFERENCES sale_modes(id) ON DELETE CASCADE,
    day_of_week  INTEGER NOT NULL,
    is_closed    INTEGER NOT NULL DEFAULT 0,
    opening_time TEXT,
    closing_time TEXT,
    UNIQUE (sale_mode_id, day_of_week)
);

CREATE TABLE IF NOT EXISTS product_categories (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT    NOT NULL UNIQUE,
    icon         TEXT    NOT NULL,
    display_name TEXT    NOT NULL,
    position     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS products (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    producer_id              INTEGER NOT NULL REFERENCES producers(id) ON DELETE CASCADE,
    category_id              INTEGER REFERENCES product_categories(id) ON DELETE RESTRICT,
    name                     TEXT    NOT NULL,
    description              TEXT    NOT NULL DEFAULT '',
    availability_type        TEXT    NOT NULL DEFAULT 'all_year',
    availability_start_month INTEGER,
    availability_end_month   INTEGER,
    created_at               TEXT    NOT NULL,
    updated_at               TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_products_producer ON products(producer_id, created_at);
CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id, created_at);

CREATE TABLE IF NOT EXISTS product_photos (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    image_file TEXT    NOT NULL,
    created_at TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_product_photos ON product_photos(product_id, created_at);
"#;

/// Product categories are a fixed lookup table; inserts are keyed on
/// name so reboots never duplicate them.
async fn seed_product_categories(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    const CATEGORIES: &[(&str, &str, &str, i64)] = &[
        ("legumes", "carrot", "Légumes", 1),
        ("fruits", "apple", "Fruits", 2),
        ("cereales", "wheat", "Céréales", 3),
        ("pain", "bread", "Pain", 4),
        ("miel", "honey", "Miel", 5),
        ("viande", "meat", "Viande", 6),
        ("biere", "beer", "Bière", 7),
        ("autre", "package", "Autre", 99),
    ];

    for (name, icon, display_name, position) in CATEGORIES {
        sqlx::query(
            "INSERT INTO product_categories (name, icon, display_name, position)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(icon)
        .bind(display_name)
        .bind(position)
        .execute(pool)
        .await?;
    }
    Ok(())
}
