use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::StoreError;
use crate::models::{Conversation, DialogueStage, TurnOutcome};
use crate::services::dialogue::{DialogueController, DialoguePolicy};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub reply: String,
    pub stage: DialogueStage,
    pub outcome: TurnOutcome,
}

pub fn dialogue_policy(config: &AppConfig) -> DialoguePolicy {
    DialoguePolicy {
        max_retries: config.max_field_retries,
        extraction_timeout: config.extraction_timeout,
        recommender_timeout: config.recommender_timeout,
        ..DialoguePolicy::default()
    }
}

/// Runs one chat turn for a session, creating the session when it is new or
/// has expired.
///
/// Sessions that reach a terminal stage are removed; the next message under
/// the same id starts over. Once the turn has run, only a failed save of an
/// unfinished session is reported as an error.
pub async fn process_message(
    state: &Arc<AppState>,
    session_id: Option<&str>,
    message: &str,
    today: Option<NaiveDate>,
) -> Result<ChatTurn, StoreError> {
    let session_id = session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ttl = state.config.session_ttl_minutes;

    let existing = {
        let id = session_id.clone();
        state
            .store
            .call("load_conversation", move |conn| {
                Ok(queries::get_conversation(conn, &id)?)
            })
            .await?
    };

    let mut conv = match existing {
        Some(conv) => conv,
        None => {
            tracing::info!(session = %session_id, "starting conversation");
            Conversation::new(
                session_id.clone(),
                today.unwrap_or_else(|| Utc::now().date_naive()),
                ttl,
            )
        }
    };
    if let Some(today) = today {
        conv.reference_date = today;
    }

    let controller = DialogueController::new(
        state.llm.as_ref(),
        &state.bookings,
        state.recommender.as_ref(),
        dialogue_policy(&state.config),
    );
    let turn = controller.handle_turn(conv, message.trim()).await;

    let mut conv = turn.conversation;
    conv.touch(ttl);
    let stage = conv.stage;

    if stage.is_terminal() {
        // The turn's outcome is already committed, so cleanup failures only
        // get logged. A terminal snapshot left behind restarts on the next
        // message and is expired by the sweeper.
        let id = session_id.clone();
        let cleanup = state
            .store
            .call("delete_conversation", move |conn| {
                Ok(queries::delete_conversation(conn, &id)?)
            })
            .await;
        if let Err(e) = cleanup {
            tracing::warn!(session = %session_id, error = %e, "failed to clear finished conversation");
            let fallback = state
                .store
                .call("save_conversation", move |conn| {
                    Ok(queries::save_conversation(conn, &conv)?)
                })
                .await;
            if let Err(e) = fallback {
                tracing::warn!(session = %session_id, error = %e, "failed to mark conversation finished");
            }
        }
    } else {
        state
            .store
            .call("save_conversation", move |conn| {
                Ok(queries::save_conversation(conn, &conv)?)
            })
            .await?;
    }

    Ok(ChatTurn {
        session_id,
        reply: turn.reply.message,
        stage,
        outcome: turn.reply.outcome,
    })
}

/// Drops sessions idle past their expiry.
pub async fn sweep_expired(state: &AppState) -> Result<usize, StoreError> {
    let removed = state
        .store
        .call("expire_conversations", |conn| {
            Ok(queries::expire_old_conversations(conn)?)
        })
        .await?;
    if removed > 0 {
        tracing::info!(removed, "expired idle conversations");
    }
    Ok(removed)
}
