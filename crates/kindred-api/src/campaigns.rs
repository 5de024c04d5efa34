use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use kindred_core::lifecycle;
use kindred_types::api::{CampaignIn, CampaignQuery, CampaignView};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

fn views(campaigns: Vec<kindred_types::models::Campaign>) -> Vec<CampaignView> {
    campaigns.into_iter().map(CampaignView::from).collect()
}

// -- Admin --

pub async fn create_campaign(
    State(state): State<AppState>,
    Json(input): Json<CampaignIn>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = blocking(move || state.db.transaction(|s| lifecycle::create(s, &input))).await?;
    Ok((StatusCode::CREATED, Json(CampaignView::from(campaign))))
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignQuery>,
) -> Result<Json<Vec<CampaignView>>, ApiError> {
    let filter = query.campaign_state.state();
    let campaigns = blocking(move || state.db.with_store(|s| lifecycle::list(s, filter))).await?;
    Ok(Json(views(campaigns)))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<CampaignView>, ApiError> {
    let campaign = blocking(move || state.db.with_store(|s| lifecycle::get(s, campaign_id))).await?;
    Ok(Json(campaign.into()))
}

pub async fn update_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
    Json(input): Json<CampaignIn>,
) -> Result<Json<CampaignView>, ApiError> {
    let campaign = blocking(move || {
        state
            .db
            .transaction(|s| lifecycle::update(s, campaign_id, &input))
    })
    .await?;
    Ok(Json(campaign.into()))
}

pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    blocking(move || state.db.transaction(|s| lifecycle::delete(s, campaign_id))).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Public --

pub async fn list_published(State(state): State<AppState>) -> Result<Json<Vec<CampaignView>>, ApiError> {
    let campaigns = blocking(move || state.db.with_store(|s| lifecycle::list_published(s))).await?;
    Ok(Json(views(campaigns)))
}

pub async fn get_published(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<CampaignView>, ApiError> {
    let campaign = blocking(move || state.db.with_store(|s| lifecycle::get_published(s, campaign_id))).await?;
    Ok(Json(campaign.into()))
}
