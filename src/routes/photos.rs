//! Multipart photo uploads for producers and products. Files land
//! under the media directory with generated names; the database keeps
//! the relative path. Deleting the row removes the file best-effort.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::{AppError, AppResult},
    models::PhotoOut,
    state::AppState,
};

const MAX_PRODUCT_PHOTOS: i64 = 5;

pub async fn upload_producer_photo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(producer_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    let producer = state
        .producers
        .find_by_id(producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to add photos to this producer.".into(),
        ));
    }

    let stored = save_image(&state, "producers", multipart).await?;
    let photo = state.producers.add_photo(producer_id, &stored).await?;
    info!("Photo uploaded for producer {} by user {}", producer_id, user.id);
    state.cache.invalidate_producers(Some(producer_id)).await;

    Ok((StatusCode::CREATED, Json(PhotoOut::from(photo))).into_response())
}

pub async fn delete_producer_photo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let photo = state
        .producers
        .find_photo(id)
        .await?
        .ok_or(AppError::NotFound("Photo"))?;
    let producer = state
        .producers
        .find_by_id(photo.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        warn!(
            "Unauthorized photo deletion attempt: user {} tried to delete photo {}",
            user.id, photo.id
        );
        return Err(AppError::Forbidden(
            "You are not allowed to delete this photo.".into(),
        ));
    }

    state.producers.delete_photo(id).await?;
    remove_stored_file(&state, &photo.image_file).await;
    info!("Photo {} deleted by user {}", photo.id, user.id);
    state.cache.invalidate_producers(Some(producer.id)).await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn upload_product_photo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(product_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    let product = state
        .products
        .find_by_id(product_id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let producer = state
        .producers
        .find_by_id(product.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to add photos to this product.".into(),
        ));
    }
    if state.products.count_photos(product_id).await? >= MAX_PRODUCT_PHOTOS {
        return Err(AppError::validation(
            "The maximum number of photos (5) has been reached for this product.",
        ));
    }

    let stored = save_image(&state, "products", multipart).await?;
    let photo = state.products.add_photo(product_id, &stored).await?;
    info!("Photo uploaded for product {} by user {}", product_id, user.id);
    state.cache.invalidate_producers(Some(producer.id)).await;

    Ok((StatusCode::CREATED, Json(PhotoOut::from(photo))).into_response())
}

pub async fn delete_product_photo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let photo = state
        .products
        .find_photo(id)
        .await?
        .ok_or(AppError::NotFound("Photo"))?;
    let product = state
        .products
        .find_by_id(photo.product_id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let producer = state
        .producers
        .find_by_id(product.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        warn!(
            "Unauthorized photo deletion attempt: user {} tried to delete photo {}",
            user.id, photo.id
        );
        return Err(AppError::Forbidden(
            "You are not allowed to delete this photo.".into(),
        ));
    }

    state.products.delete_photo(id).await?;
    remove_stored_file(&state, &photo.image_file).await;
    state.cache.invalidate_producers(Some(producer.id)).await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Reads the `image_file` part, validates extension and size, writes
/// the bytes under `<media_dir>/<subdir>/` and returns the relative
/// stored path.
async fn save_image(
    state: &AppState,
    subdir: &str,
    mut multipart: Multipart,
) -> AppResult<String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::validation("Malformed multipart payload."))?
    {
        if field.name() != Some("image_file") {
            continue;
        }

        let filename = field
            .file_name()
            .ok_or_else(|| AppError::validation("A file name is required."))?
            .to_string();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if !state.config.allowed_image_extensions.contains(&extension) {
            return Err(AppError::validation(format!(
                "File extension \"{extension}\" is not allowed. Allowed extensions: {}",
                state.config.allowed_image_extensions.join(", ")
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::validation("Malformed multipart payload."))?;
        if bytes.len() > state.config.max_upload_bytes {
            return Err(AppError::validation(format!(
                "File size exceeds maximum allowed size of {:.1} MB",
                state.config.max_upload_bytes as f64 / (1024.0 * 1024.0)
            )));
        }
        if bytes.is_empty() {
            return Err(AppError::validation("Empty image file."));
        }

        let stored = format!("{subdir}/{}.{extension}", Uuid::new_v4());
        let target = state.config.media_dir.join(&stored);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AppError::internal)?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(AppError::internal)?;

        return Ok(stored);
    }

    Err(AppError::validation("An image_file field is required."))
}

async fn remove_stored_file(state: &AppState, stored: &str) {
    let path = state.config.media_dir.join(stored);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Failed to remove {}: {e}", path.display());
    }
}
