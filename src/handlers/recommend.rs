use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::recommend::Recommendation;
use crate::state::AppState;

const DEFAULT_TOP_K: usize = 3;

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub user_query: String,
    pub city: Option<String>,
    pub cuisine: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
}

// POST /api/recommendations
pub async fn recommendations(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, AppError> {
    let top_k = payload.top_k.unwrap_or(DEFAULT_TOP_K).max(1);
    let lookup = state.recommender.recommend(
        &payload.user_query,
        payload.city.as_deref(),
        payload.cuisine.as_deref(),
        top_k,
    );

    let recommendations = tokio::time::timeout(state.config.recommender_timeout, lookup)
        .await
        .map_err(|_| anyhow::anyhow!("recommendation service timed out"))??;

    Ok(Json(RecommendResponse { recommendations }))
}
