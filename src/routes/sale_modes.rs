//! Sale mode endpoints, including their nested opening hours.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::{
    auth::CurrentUser,
    error::{AppError, AppResult},
    models::{round_coordinate, SaleMode, SaleModeCreate, SaleModeOut, SaleModeUpdate},
    state::AppState,
};

pub async fn list_sale_modes(
    State(state): State<Arc<AppState>>,
    Path(producer_id): Path<i64>,
) -> AppResult<Response> {
    state
        .producers
        .find_by_id(producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;

    let modes = state.sale_modes.for_producer(producer_id).await?;
    let mode_ids: Vec<i64> = modes.iter().map(|m| m.id).collect();
    let mut hours = state.sale_modes.hours_for_modes(&mode_ids).await?;

    let out: Vec<SaleModeOut> = modes
        .into_iter()
        .map(|mode| {
            let (for_mode, rest) = std::mem::take(&mut hours)
                .into_iter()
                .partition(|h| h.sale_mode_id == mode.id);
            hours = rest;
            SaleModeOut::assemble(mode, for_mode)
        })
        .collect();

    Ok(Json(out).into_response())
}

pub async fn create_sale_mode(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(producer_id): Path<i64>,
    Json(mut req): Json<SaleModeCreate>,
) -> AppResult<Response> {
    let producer = state
        .producers
        .find_by_id(producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user.id {
        return Err(AppError::Forbidden(
            "You are not allowed to add sale modes to this producer.".into(),
        ));
    }
    req.validate()?;
    req.location_latitude = req.location_latitude.map(round_coordinate);
    req.location_longitude = req.location_longitude.map(round_coordinate);

    let (mode, hours) = state.sale_modes.create(producer_id, &req).await?;
    info!("Sale mode {} created for producer {}", mode.id, producer_id);
    state.cache.invalidate_producers(Some(producer_id)).await;

    Ok((StatusCode::CREATED, Json(SaleModeOut::assemble(mode, hours))).into_response())
}

pub async fn get_sale_mode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let mode = state
        .sale_modes
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Sale mode"))?;
    let hours = state.sale_modes.hours_for_modes(&[mode.id]).await?;
    Ok(Json(SaleModeOut::assemble(mode, hours)).into_response())
}

pub async fn update_sale_mode(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<SaleModeUpdate>,
) -> AppResult<Response> {
    let mut mode = state
        .sale_modes
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Sale mode"))?;
    ensure_owner(&state, &mode, user.id, "You are not allowed to modify this sale mode.").await?;
    req.validate(&mode)?;

    let hours_patch = req.opening_hours.clone();
    apply_update(&mut mode, req);
    let (mode, hours) = state
        .sale_modes
        .update(&mode, hours_patch.as_deref())
        .await?;
    state.cache.invalidate_producers(Some(mode.producer_id)).await;

    Ok(Json(SaleModeOut::assemble(mode, hours)).into_response())
}

pub async fn delete_sale_mode(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let mode = state
        .sale_modes
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Sale mode"))?;
    if let Err(err) =
        ensure_owner(&state, &mode, user.id, "You are not allowed to delete this sale mode.").await
    {
        warn!(
            "Unauthorized sale mode deletion attempt: user {} tried to delete sale mode {}",
            user.id, mode.id
        );
        return Err(err);
    }

    state.sale_modes.delete(id).await?;
    info!("Sale mode {id} deleted by user {}", user.id);
    state.cache.invalidate_producers(Some(mode.producer_id)).await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn ensure_owner(
    state: &AppState,
    mode: &SaleMode,
    user_id: i64,
    message: &str,
) -> AppResult<()> {
    let producer = state
        .producers
        .find_by_id(mode.producer_id)
        .await?
        .ok_or(AppError::NotFound("Producer"))?;
    if producer.user_id != user_id {
        return Err(AppError::Forbidden(message.into()));
    }
    Ok(())
}

fn apply_update(mode: &mut SaleMode, req: SaleModeUpdate) {
    if let Some(mode_type) = req.mode_type {
        mode.mode_type = mode_type;
    }
    if let Some(title) = req.title {
        mode.title = title;
    }
    if let Some(instructions) = req.instructions {
        mode.instructions = instructions;
    }
    if let Some(phone_number) = req.phone_number {
        mode.phone_number = phone_number;
    }
    if let Some(website_url) = req.website_url {
        mode.website_url = website_url;
    }
    if let Some(is_24_7) = req.is_24_7 {
        mode.is_24_7 = is_24_7;
    }
    if let Some(location_address) = req.location_address {
        mode.location_address = location_address;
    }
    if let Some(latitude) = req.location_latitude {
        mode.location_latitude = Some(round_coordinate(latitude));
    }
    if let Some(longitude) = req.location_longitude {
        mode.location_longitude = Some(round_coordinate(longitude));
    }
    if let Some(market_info) = req.market_info {
        mode.market_info = market_info;
    }
    if let Some(position) = req.position {
        mode.position = position;
    }
}
