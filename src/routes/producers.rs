//! Producer profile endpoints: the cached list/detail/nearby reads and
//! the owner-scoped writes that invalidate them.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::CurrentUser,
    cache::{self, cache_key, round_coord},
    error::{AppError, AppResult},
    geo,
    models::{
        round_coordinate, PhotoOut, Producer, ProducerBrief, ProducerCreate, ProducerOut,
        ProducerUpdate, SaleModeOut, UserOut,
    },
    pagination::{slice_page, PageParams, Paginated},
    repository::ProducerListFilter,
    routes::{json_body, products::product_outs},
    state::AppState,
};

const DEFAULT_RADIUS_KM: f64 = 50.0;
const MAX_RADIUS_KM: f64 = 1000.0;

#[derive(Debug, Deserialize)]
pub struct ProducerListParams {
    pub category: Option<String>,
    pub categories: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Raw strings so a missing or malformed value becomes a structured
/// 400 instead of a framework rejection.
#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius_km: Option<String>,
    pub categories: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
struct NearbyResponse {
    count: i64,
    page: i64,
    page_size: i64,
    results: Vec<ProducerOut>,
    /// Kilometers, parallel to `results`.
    distances: Vec<f64>,
}

fn split_categories(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

pub async fn list_producers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProducerListParams>,
) -> AppResult<Response> {
    let paging = PageParams {
        page: params.page,
        page_size: params.page_size,
    };
    let (page, page_size) = paging.resolve(state.config.page_size);

    let key = cache_key(
        cache::PRODUCERS_LIST,
        &[
            ("category", params.category.clone().unwrap_or_default()),
            ("categories", params.categories.clone().unwrap_or_default()),
            ("search", params.search.clone().unwrap_or_default()),
            ("ordering", params.ordering.clone().unwrap_or_default()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ],
    );
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(json_body(cached));
    }

    let filter = ProducerListFilter {
        categories: split_categories(params.categories.as_deref()),
        category: params.category.filter(|s| !s.is_empty()),
        search: params.search.filter(|s| !s.trim().is_empty()),
        ordering: params.ordering,
    };
    let (rows, count) = state
        .producers
        .list(&filter, page_size, (page - 1) * page_size)
        .await?;
    let results = hydrate_producers(&state, rows).await?;

    let body = serde_json::to_string(&Paginated::new(count, page, page_size, results))
        .map_err(AppError::internal)?;
    state
        .cache
        .put(&key, &body, state.config.ttl.producers_list)
        .await;
    Ok(json_body(body))
}

pub async fn nearby_producers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyParams>,
) -> AppResult<Response> {
    let (latitude, longitude) = match (&params.latitude, &params.longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(AppError::validation(
                "The latitude and longitude parameters are required.",
            ))
        }
    };
    let lat: f64 = latitude.trim().parse().map_err(|_| {
        AppError::validation("Invalid parameters: latitude and longitude must be numbers.")
    })?;
    let lon: f64 = longitude.trim().parse().map_err(|_| {
        AppError::validation("Invalid parameters: latitude and longitude must be numbers.")
    })?;
    crate::models::validate_coordinates(lat, lon)?;

    let radius: f64 = match &params.radius_km {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::validation("Invalid parameters: radius_km must be a number."))?,
        None => DEFAULT_RADIUS_KM,
    };
    if radius <= 0.0 || radius > MAX_RADIUS_KM {
        return Err(AppError::validation("Radius must be between 0 and 1000 km."));
    }

    let paging = PageParams {
        page: params.page,
        page_size: params.page_size,
    };
    let (page, page_size) = paging.resolve(state.config.page_size);

    // Coordinates are rounded to ~1 km in the key so repeated queries
    // from the same area share an entry.
    let key = cache_key(
        cache::PRODUCERS_NEARBY,
        &[
            ("lat", round_coord(lat).to_string()),
            ("lng", round_coord(lon).to_string()),
            ("radius", radius.to_string()),
            ("categories", params.categories.clone().unwrap_or_default()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ],
    );
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(json_body(cached));
    }

    let categories = split_categories(params.categories.as_deref());
    let bbox = geo::bounding_box(lat, lon, radius);
    let candidates = state.producers.find_in_bbox(&bbox, &categories).await?;
    let matches = geo::within_radius(lat, lon, radius, candidates, |p| (p.latitude, p.longitude));

    // Page cut happens after the distance sort, never before.
    let (count, page_items) = slice_page(matches, page, page_size);
    let (producers, distances): (Vec<Producer>, Vec<f64>) = page_items.into_iter().unzip();
    let results = hydrate_producers(&state, producers).await?;

    let body = serde_json::to_string(&NearbyResponse {
        count,
        page,
        page_size,
        results,
        distances,
    })
    .map_err(AppError::internal)?;
    state
        .cache
        .put(&key, &body, state.config.ttl.producers_nearby)
        .await;
    Ok(json_body(body))
}

pub async fn get_producer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let key = cache_key(cache::PRODUCER_DETAIL, &[("id", id.to_string())]);
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(json_body(cached));
    }

    let producer = state
        .producers
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    let out = hydrate_producers(&state, vec![producer])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Producer"))?;

    let body = serde_json::to_string(&out).map_err(AppError::internal)?;
    state
        .cache
        .put(&key, &body, state.config.ttl.producer_detail)
        .await;
    Ok(json_body(body))
}

pub async fn create_producer(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ProducerCreate>,
) -> AppResult<Response> {
    req.validate()?;

    let latitude = round_coordinate(req.latitude);
    let longitude = round_coordinate(req.longitude);
    // The UNIQUE(user_id) constraint enforces one profile per user;
    // violations surface as the generic 400.
    let producer = state.producers.create(user.id, &req, latitude, longitude).await?;
    info!("Producer profile created: {} by user {}", producer.id, user.id);

    state.cache.invalidate_producers(None).await;

    let out = hydrate_producers(&state, vec![producer])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Producer"))?;
    Ok((StatusCode::CREATED, Json(out)).into_response())
}

pub async fn update_producer(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ProducerUpdate>,
) -> AppResult<Response> {
    let mut producer = state
        .producers
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this producer.".into(),
        ));
    }
    req.validate()?;

    apply_update(&mut producer, req);
    let producer = state.producers.update(&producer).await?;

    state.cache.invalidate_producers(Some(id)).await;
    info!("Producer {id} updated, cache invalidated");

    let out = hydrate_producers(&state, vec![producer])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Producer"))?;
    Ok(Json(out).into_response())
}

pub async fn delete_producer(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let producer = state
        .producers
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to delete this producer.".into(),
        ));
    }

    state.producers.delete(id).await?;
    state.cache.invalidate_producers(Some(id)).await;
    info!("Producer {id} deleted, cache invalidated");

    Ok(StatusCode::NO_CONTENT.into_response())
}

fn apply_update(producer: &mut Producer, req: ProducerUpdate) {
    if let Some(name) = req.name {
        producer.name = name;
    }
    if let Some(description) = req.description {
        producer.description = description;
    }
    if let Some(category) = req.category {
        producer.category = category;
    }
    if let Some(address) = req.address {
        producer.address = address;
    }
    if let Some(latitude) = req.latitude {
        producer.latitude = round_coordinate(latitude);
    }
    if let Some(longitude) = req.longitude {
        producer.longitude = round_coordinate(longitude);
    }
    if let Some(phone) = req.phone {
        producer.phone = phone;
    }
    if let Some(email_contact) = req.email_contact {
        producer.email_contact = email_contact;
    }
    if let Some(website) = req.website {
        producer.website = website;
    }
    if let Some(opening_hours) = req.opening_hours {
        producer.opening_hours = opening_hours;
    }
}

/// Assembles full producer responses in a constant number of queries:
/// owners, photos, products (with their categories and photos) and
/// sale modes (with opening hours) are each fetched in one batch.
pub(crate) async fn hydrate_producers(
    state: &AppState,
    producers: Vec<Producer>,
) -> AppResult<Vec<ProducerOut>> {
    if producers.is_empty() {
        return Ok(Vec::new());
    }

    let producer_ids: Vec<i64> = producers.iter().map(|p| p.id).collect();
    let user_ids: Vec<i64> = producers.iter().map(|p| p.user_id).collect();

    let users: HashMap<i64, UserOut> = state
        .users
        .find_by_ids(&user_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, UserOut::from(u)))
        .collect();

    let mut photos_by_producer: HashMap<i64, Vec<PhotoOut>> = HashMap::new();
    for photo in state.producers.photos_for_producers(&producer_ids).await? {
        photos_by_producer
            .entry(photo.producer_id)
            .or_default()
            .push(PhotoOut::from(photo));
    }

    let briefs: HashMap<i64, ProducerBrief> = producers
        .iter()
        .map(|p| {
            (
                p.id,
                ProducerBrief {
                    id: p.id,
                    name: p.name.clone(),
                    category: p.category,
                },
            )
        })
        .collect();

    let products = state.products.for_producers(&producer_ids).await?;
    let mut products_by_producer: HashMap<i64, Vec<_>> = HashMap::new();
    for out in product_outs(state, products, &briefs).await? {
        products_by_producer
            .entry(out.producer.id)
            .or_default()
            .push(out);
    }

    let modes = state.sale_modes.for_producers(&producer_ids).await?;
    let mode_ids: Vec<i64> = modes.iter().map(|m| m.id).collect();
    let mut hours_by_mode: HashMap<i64, Vec<_>> = HashMap::new();
    for entry in state.sale_modes.hours_for_modes(&mode_ids).await? {
        hours_by_mode
            .entry(entry.sale_mode_id)
            .or_default()
            .push(entry);
    }
    let mut modes_by_producer: HashMap<i64, Vec<SaleModeOut>> = HashMap::new();
    for mode in modes {
        let hours = hours_by_mode.remove(&mode.id).unwrap_or_default();
        modes_by_producer
            .entry(mode.producer_id)
            .or_default()
            .push(SaleModeOut::assemble(mode, hours));
    }

    producers
        .into_iter()
        .map(|producer| {
            let user = users
                .get(&producer.user_id)
                .cloned()
                .ok_or(AppError::NotFound("Producer owner"))?;
            let photos = photos_by_producer.remove(&producer.id).unwrap_or_default();
            Ok(ProducerOut {
                id: producer.id,
                user,
                name: producer.name,
                description: producer.description,
                category: producer.category,
                address: producer.address,
                latitude: producer.latitude,
                longitude: producer.longitude,
                phone: producer.phone,
                email_contact: producer.email_contact,
                website: producer.website,
                opening_hours: producer.opening_hours,
                photo_count: photos.len(),
                photos,
                products: products_by_producer.remove(&producer.id).unwrap_or_default(),
                sale_modes: modes_by_producer.remove(&producer.id).unwrap_or_default(),
                created_at: producer.created_at,
                updated_at: producer.updated_at,
            })
        })
        .collect()
}
