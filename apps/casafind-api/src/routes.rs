use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casafind_service::{
	IndexOutcome, MatchOutcome, MatchRequest, PopularityReport, ReindexReport, SearchRequest,
	SearchResponse, ServiceError,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/leads/match", post(match_lead))
		.route("/v1/listings/index", post(index_listing))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/recompute_popularity", post(recompute_popularity))
		.route("/v1/admin/reindex", post(reindex))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct IndexRequest {
	listing_id: Uuid,
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;
	Ok(Json(response))
}

async fn match_lead(
	State(state): State<AppState>,
	Json(payload): Json<MatchRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
	let response = state.service.match_lead(payload).await?;
	Ok(Json(response))
}

async fn index_listing(
	State(state): State<AppState>,
	Json(payload): Json<IndexRequest>,
) -> Result<Json<IndexOutcome>, ApiError> {
	let response = state.service.index_listing(payload.listing_id).await?;
	Ok(Json(response))
}

async fn recompute_popularity(
	State(state): State<AppState>,
) -> Result<Json<PopularityReport>, ApiError> {
	let response = state.service.recompute_popularity().await?;
	Ok(Json(response))
}

async fn reindex(State(state): State<AppState>) -> Result<Json<ReindexReport>, ApiError> {
	let response = state.service.reindex_all().await?;
	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::ScopeDenied { .. } => (StatusCode::FORBIDDEN, "scope_denied"),
			ServiceError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
			ServiceError::Storage { .. } | ServiceError::Qdrant { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
		};

		Self { status, error_code: error_code.to_string(), message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
