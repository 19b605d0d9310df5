//! Product endpoints and the read-only category lookup.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::CurrentUser,
    cache::{self, cache_key},
    error::{AppError, AppResult},
    models::{
        CategoryOut, PhotoOut, Product, ProducerBrief, ProductCreate, ProductOut, ProductUpdate,
    },
    pagination::{PageParams, Paginated},
    routes::json_body,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub async fn list_categories(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let key = cache_key(cache::CATEGORIES_LIST, &[]);
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(json_body(cached));
    }

    let categories: Vec<CategoryOut> = state
        .products
        .categories()
        .await?
        .into_iter()
        .map(CategoryOut::from)
        .collect();

    let body = serde_json::to_string(&categories).map_err(AppError::internal)?;
    state
        .cache
        .put(&key, &body, state.config.ttl.categories_list)
        .await;
    Ok(json_body(body))
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductListParams>,
) -> AppResult<Response> {
    list_products_inner(&state, None, params).await
}

pub async fn list_producer_products(
    State(state): State<Arc<AppState>>,
    Path(producer_id): Path<i64>,
    Query(params): Query<ProductListParams>,
) -> AppResult<Response> {
    state
        .producers
        .find_by_id(producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    list_products_inner(&state, Some(producer_id), params).await
}

async fn list_products_inner(
    state: &AppState,
    producer_id: Option<i64>,
    params: ProductListParams,
) -> AppResult<Response> {
    let paging = PageParams {
        page: params.page,
        page_size: params.page_size,
    };
    let (page, page_size) = paging.resolve(state.config.page_size);

    let (products, count) = state
        .products
        .list(producer_id, page_size, (page - 1) * page_size)
        .await?;
    let results = hydrate_products(state, products).await?;

    Ok(Json(Paginated::new(count, page, page_size, results)).into_response())
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let product = state
        .products
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let out = hydrate_products(&state, vec![product])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Product"))?;
    Ok(Json(out).into_response())
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(producer_id): Path<i64>,
    Json(req): Json<ProductCreate>,
) -> AppResult<Response> {
    let producer = state
        .producers
        .find_by_id(producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to add products to this producer.".into(),
        ));
    }
    req.validate()?;
    if let Some(category_id) = req.category_id {
        state
            .products
            .find_category(category_id)
            .await?
            .ok_or_else(|| AppError::validation("Unknown product category."))?;
    }

    let product = state.products.create(producer_id, &req).await?;
    info!("Product {} created for producer {}", product.id, producer_id);
    state.cache.invalidate_producers(Some(producer_id)).await;

    let out = hydrate_products(&state, vec![product])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Product"))?;
    Ok((StatusCode::CREATED, Json(out)).into_response())
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<ProductUpdate>,
) -> AppResult<Response> {
    let mut product = state
        .products
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let producer = state
        .producers
        .find_by_id(product.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to modify this product.".into(),
        ));
    }
    req.validate(&product)?;
    if let Some(category_id) = req.category_id {
        state
            .products
            .find_category(category_id)
            .await?
            .ok_or_else(|| AppError::validation("Unknown product category."))?;
    }

    apply_update(&mut product, req);
    let product = state.products.update(&product).await?;
    state
        .cache
        .invalidate_producers(Some(product.producer_id))
        .await;

    let out = hydrate_products(&state, vec![product])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Product"))?;
    Ok(Json(out).into_response())
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let product = state
        .products
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let producer = state
        .producers
        .find_by_id(product.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to delete this product.".into(),
        ));
    }

    state.products.delete(id).await?;
    info!("Product {id} deleted by user {}", user.id);
    state
        .cache
        .invalidate_producers(Some(product.producer_id))
        .await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

fn apply_update(product: &mut Product, req: ProductUpdate) {
    if let Some(name) = req.name {
        product.name = name;
    }
    if let Some(description) = req.description {
        product.description = description;
    }
    if let Some(category_id) = req.category_id {
        product.category_id = Some(category_id);
    }
    if let Some(availability_type) = req.availability_type {
        product.availability_type = availability_type;
    }
    if let Some(start) = req.availability_start_month {
        product.availability_start_month = Some(start);
    }
    if let Some(end) = req.availability_end_month {
        product.availability_end_month = Some(end);
    }
    if product.availability_type == crate::models::Availability::AllYear {
        product.availability_start_month = None;
        product.availability_end_month = None;
    }
}

/// Batch product assembly against a prefetched producer-brief map.
pub(crate) async fn product_outs(
    state: &AppState,
    products: Vec<Product>,
    briefs: &HashMap<i64, ProducerBrief>,
) -> AppResult<Vec<ProductOut>> {
    if products.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<i64> = products.iter().map(|p| p.id).collect();
    let mut photos_by_product: HashMap<i64, Vec<PhotoOut>> = HashMap::new();
    for photo in state.products.photos_for_products(&product_ids).await? {
        photos_by_product
            .entry(photo.product_id)
            .or_default()
            .push(PhotoOut::from(photo));
    }

    let mut category_ids: Vec<i64> = products.iter().filter_map(|p| p.category_id).collect();
    category_ids.sort_unstable();
    category_ids.dedup();
    let categories: HashMap<i64, CategoryOut> = state
        .products
        .categories_by_ids(&category_ids)
        .await?
        .into_iter()
        .map(|c| (c.id, CategoryOut::from(c)))
        .collect();

    products
        .into_iter()
        .map(|product| {
            let producer = briefs
                .get(&product.producer_id)
                .cloned()
                .ok_or(AppError::NotFound("Producer"))?;
            let photos = photos_by_product.remove(&product.id).unwrap_or_default();
            Ok(ProductOut {
                id: product.id,
                producer,
                category: product.category_id.and_then(|id| categories.get(&id).cloned()),
                name: product.name,
                description: product.description,
                availability_type: product.availability_type,
                availability_start_month: product.availability_start_month,
                availability_end_month: product.availability_end_month,
                photo_count: photos.len(),
                photos,
                created_at: product.created_at,
                updated_at: product.updated_at,
            })
        })
        .collect()
}

/// Product assembly when producers have not been fetched yet.
pub(crate) async fn hydrate_products(
    state: &AppState,
    products: Vec<Product>,
) -> AppResult<Vec<ProductOut>> {
    let mut producer_ids: Vec<i64> = products.iter().map(|p| p.producer_id).collect();
    producer_ids.sort_unstable();
    producer_ids.dedup();

    let briefs: HashMap<i64, ProducerBrief> = state
        .producers
        .find_by_ids(&producer_ids)
        .await?
        .into_iter()
        .map(|p| {
            (
                p.id,
                ProducerBrief {
                    id: p.id,
                    name: p.name,
                    category: p.category,
                },
            )
        })
        .collect();

    product_outs(state, products, &briefs).await
}
