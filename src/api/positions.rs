use crate::api::AppState;
use crate::domain::{EnrichedPosition, ObjectId};
use crate::error::AppError;
use crate::orchestration::ReconcileRequest;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPositionsResponse {
    /// Always `queued`: the pass runs on the driver and may be dropped if
    /// another is in flight, in which case the next refresh covers it.
    pub pass: &'static str,
    pub positions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPositionsResponse {
    pub positions: Vec<EnrichedPositionDto>,
    pub pending_retries: usize,
}

/// Base-unit amounts are rendered as strings so large values survive JSON consumers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPositionDto {
    pub pool_id: String,
    pub position_key: String,
    pub asset: String,
    pub share_count: String,
    pub current_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_source: Option<crate::domain::ValueSource>,
    pub original_value: Option<String>,
    pub interest_earned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_display: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&EnrichedPosition> for EnrichedPositionDto {
    fn from(enriched: &EnrichedPosition) -> Self {
        Self {
            pool_id: enriched.position.pool_id.to_string(),
            position_key: enriched.position.position_key.to_string(),
            asset: enriched.position.asset.to_string(),
            share_count: enriched.position.share_count.to_string(),
            current_value: enriched.current_value.map(|v| v.to_string()),
            value_source: enriched.value_source,
            original_value: enriched.original_value.map(|v| v.to_string()),
            interest_earned: enriched.interest_earned.map(|v| v.to_string()),
            interest_display: enriched.interest_display.clone(),
            state: enriched.reconciliation_state.to_string(),
            last_error: enriched.last_error.clone(),
        }
    }
}

pub async fn put_positions(
    State(state): State<AppState>,
    Json(request): Json<ReconcileRequest>,
) -> Result<(StatusCode, Json<SubmitPositionsResponse>), AppError> {
    let mut seen = HashSet::with_capacity(request.positions.len());
    for position in &request.positions {
        if !seen.insert(&position.position_key) {
            return Err(AppError::BadRequest(format!(
                "Duplicate position key {}",
                position.position_key
            )));
        }
    }

    let pass = "queued";
    let positions = request.positions.len();
    tracing::info!(positions, pass, "Position set submitted");
    state.driver.submit(request);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitPositionsResponse { pass, positions }),
    ))
}

pub async fn get_enriched(
    State(state): State<AppState>,
) -> Result<Json<EnrichedPositionsResponse>, AppError> {
    let snapshot = state.reconciler.snapshot();
    let pending_retries = state.reconciler.pending_retries().await;

    Ok(Json(EnrichedPositionsResponse {
        positions: snapshot.values().map(EnrichedPositionDto::from).collect(),
        pending_retries,
    }))
}

pub async fn get_enriched_position(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EnrichedPositionDto>, AppError> {
    let key = ObjectId::parse(&key)?;
    let snapshot = state.reconciler.snapshot();
    snapshot
        .get(&key)
        .map(|enriched| Json(EnrichedPositionDto::from(enriched)))
        .ok_or_else(|| AppError::NotFound(format!("position {}", key.short())))
}
