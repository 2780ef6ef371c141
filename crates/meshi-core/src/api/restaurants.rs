use axum::Json;
use bytes::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;

use super::ApiState;
use crate::domain::area::{validate_middle_area_code, validate_restaurant_id};
use crate::domain::errors::{DbError, ValidationError};
use crate::domain::restaurant::{RestaurantDetail, SearchHit};
use crate::geo::{BoundingBox, LatLng};
use crate::repo::restaurants as repo;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request body is missing")]
    MissingBody,

    #[error("request body is not valid: {0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("path id `{path}` does not match body id `{body}`")]
    IdMismatch { path: String, body: String },

    #[error("restaurant `{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    #[serde(default)]
    pub middle_area_code: Option<String>,
}

impl SearchRequest {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            lat_min: self.lat_min,
            lat_max: self.lat_max,
            lng_min: self.lng_min,
            lng_max: self.lng_max,
        }
        .normalized()
    }

    /// lat と lng が両方あるときだけ基準点になる
    pub fn reference(&self) -> Option<LatLng> {
        Some(LatLng::new(self.lat?, self.lng?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailRequest {
    pub id: String,
}

fn parse<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MissingBody);
    }
    Ok(serde_json::from_slice(body)?)
}

pub(super) async fn search(State(state): State<ApiState>, body: Bytes) -> Response {
    match run_search(&state, &body).await {
        Ok(hits) => Json(hits).into_response(),
        Err(e) => state.fail("restaurants.search", e).await,
    }
}

async fn run_search(state: &ApiState, body: &Bytes) -> Result<Vec<SearchHit>, ApiError> {
    let request: SearchRequest = parse(body)?;
    if let Some(code) = &request.middle_area_code {
        validate_middle_area_code(code)?;
    }
    let hits = repo::search(
        state.db.as_ref(),
        request.bbox(),
        request.reference(),
        request.middle_area_code.as_deref(),
    )
    .await?;
    tracing::debug!(hits = hits.len(), "search answered");
    Ok(hits)
}

pub(super) async fn detail(State(state): State<ApiState>, Path(id): Path<String>, body: Bytes) -> Response {
    match run_detail(&state, &id, &body).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => state.fail("restaurants.detail", e).await,
    }
}

async fn run_detail(state: &ApiState, path_id: &str, body: &Bytes) -> Result<RestaurantDetail, ApiError> {
    let request: DetailRequest = parse(body)?;
    validate_restaurant_id(&request.id)?;
    if request.id != path_id {
        return Err(ApiError::IdMismatch {
            path: path_id.to_string(),
            body: request.id,
        });
    }
    let found = repo::detail(state.db.as_ref(), &request.id).await?;
    found.ok_or(ApiError::NotFound(request.id))
}
