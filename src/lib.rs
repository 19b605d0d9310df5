//! Backend for Mon Panier Local, a directory connecting local food
//! producers with consumers.
//!
//!
//!
//! # General Infrastructure
//! - Single axum service fronting SQLite and (optionally) Redis
//! - Producers, their products, photos and sale modes are plain CRUD,
//!   owner-scoped through JWT bearer tokens
//! - The nearby search pre-filters candidates with an indexed
//!   bounding box, then ranks the survivors by exact Haversine distance
//! - Uploaded photos are written under `MEDIA_DIR` and served back
//!   from `/media/`
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! Read endpoints (producer list, detail, nearby, categories) are
//! cached with per-family TTLs. Every write to a producer aggregate
//! drops that producer's detail entry and sweeps all list/nearby
//! entries, so readers never see stale data past a write. When Redis
//! is down or not configured the service degrades to an in-process
//! map with the same interface; a cache failure is never a request
//! failure.
//!
//! ## Setup
//! ```sh
//! RUST_LOG=info cargo run
//! ```
//! Defaults bind port 8000 with `sqlite://mpl.db`; see `config.rs` for
//! the full environment surface.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{delete, get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod geo;
pub mod models;
pub mod pagination;
pub mod repository;
pub mod routes;
pub mod state;

use state::AppState;

/// Builds the full router; the integration suite drives this directly.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    // Multipart uploads need headroom past the raw image size.
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes + 64 * 1024);
    let media_dir = state.config.media_dir.clone();

    Router::new()
        .route("/api/auth/register/", post(routes::auth::register))
        .route("/api/auth/login/", post(routes::auth::login))
        .route(
            "/api/auth/me/",
            get(routes::auth::me).patch(routes::auth::update_me),
        )
        .route(
            "/api/auth/change-password/",
            post(routes::auth::change_password),
        )
        .route(
            "/api/auth/delete-account/",
            post(routes::auth::delete_account),
        )
        .route(
            "/api/producers/",
            get(routes::producers::list_producers).post(routes::producers::create_producer),
        )
        .route(
            "/api/producers/nearby/",
            get(routes::producers::nearby_producers),
        )
        .route(
            "/api/producers/{id}/",
            get(routes::producers::get_producer)
                .put(routes::producers::update_producer)
                .patch(routes::producers::update_producer)
                .delete(routes::producers::delete_producer),
        )
        .route(
            "/api/producers/{id}/photos/",
            post(routes::photos::upload_producer_photo),
        )
        .route(
            "/api/producers/{id}/sale-modes/",
            get(routes::sale_modes::list_sale_modes).post(routes::sale_modes::create_sale_mode),
        )
        .route(
            "/api/producers/{id}/products/",
            get(routes::products::list_producer_products).post(routes::products::create_product),
        )
        .route(
            "/api/photos/{id}/",
            delete(routes::photos::delete_producer_photo),
        )
        .route(
            "/api/sale-modes/{id}/",
            get(routes::sale_modes::get_sale_mode)
                .put(routes::sale_modes::update_sale_mode)
                .patch(routes::sale_modes::update_sale_mode)
                .delete(routes::sale_modes::delete_sale_mode),
        )
        .route("/api/products/", get(routes::products::list_products))
        .route(
            "/api/products/{id}/",
            get(routes::products::get_product)
                .put(routes::products::update_product)
                .patch(routes::products::update_product)
                .delete(routes::products::delete_product),
        )
        .route(
            "/api/products/{id}/photos/",
            post(routes::photos::upload_product_photo),
        )
        .route(
            "/api/product-photos/{id}/",
            delete(routes::photos::delete_product_photo),
        )
        .route("/api/categories/", get(routes::products::list_categories))
        .route("/api/health/", get(routes::health::health_check))
        .route("/api/health/ready/", get(routes::health::readiness_check))
        .route("/api/cache/stats/", get(routes::health::cache_stats))
        .route("/api/cache/clear/", post(routes::health::clear_cache))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let router = app(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
