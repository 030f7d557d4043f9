use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::Intent;
use crate::services::ai::extraction::extract_intent;
use crate::services::conversation::{self, ChatTurn};
use crate::state::AppState;

// POST /api/chat
#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub today: Option<NaiveDate>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatTurn>, AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::Validation("message is required".to_string()));
    }

    let turn = conversation::process_message(
        &state,
        payload.session_id.as_deref(),
        &payload.message,
        payload.today,
    )
    .await?;

    Ok(Json(turn))
}

// POST /api/intent
#[derive(Deserialize)]
pub struct IntentRequest {
    pub user_input: String,
    pub today: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct IntentResponse {
    pub status: &'static str,
    pub intent: Intent,
    pub entities: Map<String, Value>,
}

pub async fn intent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IntentRequest>,
) -> Json<IntentResponse> {
    let today = payload.today.unwrap_or_else(|| Utc::now().date_naive());
    let extraction = extract_intent(
        state.llm.as_ref(),
        &payload.user_input,
        today,
        state.config.extraction_timeout,
    )
    .await;

    let status = extraction.status();
    let extracted = extraction.into_intent();

    let mut entities: Map<String, Value> = extracted
        .entities
        .fields
        .iter()
        .map(|(field, value)| (field.key().to_string(), Value::String(value.clone())))
        .collect();
    entities.insert(
        "features".to_string(),
        Value::from(extracted.entities.features),
    );

    Json(IntentResponse {
        status,
        intent: extracted.intent,
        entities,
    })
}
