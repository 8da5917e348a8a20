use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::DuelError,
    extractors::{AppJson, ValidatedJson},
    middlewares::auth::JwtClaims,
    models::{
        CreateBotDuelRequest, CreateDuelRequest, Duel, DuelResponse, DuelStatus,
        SubmitAnswerRequest, SubmitAnswerResponse,
    },
    services::{bot_service::BotProfile, duel_service::CreateDuel, AppState},
};

pub(crate) fn error_response(e: DuelError) -> (StatusCode, String) {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::error!("Duel operation failed: {}", e);
    } else {
        tracing::debug!("Duel operation rejected: {}", e);
    }
    (status, e.to_string())
}

/// Participants may see a duel; so may anyone holding the id of an open invite.
pub(crate) fn ensure_can_view(duel: &Duel, player_id: &str) -> Result<(), DuelError> {
    let open_invite = duel.status == DuelStatus::Waiting && duel.player2_id.is_none();
    if duel.is_participant(player_id) || open_invite {
        Ok(())
    } else {
        Err(DuelError::NotParticipant {
            duel_id: duel.id.clone(),
            player_id: player_id.to_string(),
        })
    }
}

/// Exactly `count` questions or a 422; an empty result is left to the engine.
async fn load_questions(
    state: &AppState,
    topic: &str,
    difficulty: Option<&str>,
    count: u32,
) -> Result<Vec<crate::models::Question>, (StatusCode, String)> {
    let requested = count as usize;
    let questions = state
        .questions
        .questions_for(topic, difficulty, requested)
        .await
        .map_err(|e| {
            tracing::error!("Question bank lookup failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Question bank unavailable".to_string(),
            )
        })?;

    if !questions.is_empty() && questions.len() < requested {
        return Err(error_response(DuelError::NotEnoughQuestions {
            topic: topic.to_string(),
            requested,
            available: questions.len(),
        }));
    }
    Ok(questions)
}

pub async fn create_duel(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreateDuelRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Creating duel: player={}, opponent={:?}, topic={}",
        claims.sub,
        req.opponent_id,
        req.topic
    );

    if req.opponent_id.as_deref().is_some_and(BotProfile::is_bot_id) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Bot opponents are created via /api/v1/duels/bot".to_string(),
        ));
    }

    let questions =
        load_questions(&state, &req.topic, req.difficulty.as_deref(), req.question_count).await?;

    let duel = state
        .engine
        .create_duel(CreateDuel {
            player1_id: claims.sub.clone(),
            player2_id: req.opponent_id,
            questions,
            topic: Some(req.topic),
            difficulty: req.difficulty,
        })
        .await
        .map_err(error_response)?;

    state.supervisor.launch(&duel);
    Ok((StatusCode::CREATED, Json(DuelResponse::for_viewer(&duel, &claims.sub))))
}

pub async fn create_bot_duel(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreateBotDuelRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bot = state
        .supervisor
        .bot_for_difficulty(req.difficulty.as_deref())
        .cloned()
        .ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "No bot opponents configured".to_string(),
        ))?;
    tracing::info!(
        "Creating bot duel: player={}, bot={}, topic={}",
        claims.sub,
        bot.id,
        req.topic
    );

    let questions =
        load_questions(&state, &req.topic, req.difficulty.as_deref(), req.question_count).await?;

    let duel = state
        .engine
        .create_duel(CreateDuel {
            player1_id: claims.sub.clone(),
            player2_id: Some(bot.id),
            questions,
            topic: Some(req.topic),
            difficulty: req.difficulty.or(bot.difficulty),
        })
        .await
        .map_err(error_response)?;

    state.supervisor.launch(&duel);
    Ok((StatusCode::CREATED, Json(DuelResponse::for_viewer(&duel, &claims.sub))))
}

pub async fn get_duel(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(duel_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let duel = state
        .engine
        .get_duel(&duel_id)
        .await
        .map_err(error_response)?;
    ensure_can_view(&duel, &claims.sub).map_err(error_response)?;

    Ok((StatusCode::OK, Json(DuelResponse::for_viewer(&duel, &claims.sub))))
}

pub async fn join_duel(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(duel_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Player {} joining duel {}", claims.sub, duel_id);

    let duel = state
        .engine
        .join_duel(&duel_id, &claims.sub)
        .await
        .map_err(error_response)?;

    state.supervisor.launch(&duel);
    Ok((StatusCode::OK, Json(DuelResponse::for_viewer(&duel, &claims.sub))))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(duel_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Submitting answer: duel={}, player={}, answer={:?}",
        duel_id,
        claims.sub,
        req.answer_id
    );

    let duel = state
        .engine
        .submit_answer(&duel_id, &claims.sub, req.answer_id.as_deref())
        .await
        .map_err(error_response)?;

    let correct = duel
        .slot_of(&claims.sub)
        .and_then(|slot| duel.answers(slot).last())
        .map(|record| record.is_correct)
        .unwrap_or(false);

    Ok((
        StatusCode::OK,
        Json(SubmitAnswerResponse {
            correct,
            duel: duel.to_view_for(&claims.sub),
        }),
    ))
}

pub async fn cancel_duel(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(duel_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Player {} cancelling duel {}", claims.sub, duel_id);

    let duel = state
        .engine
        .cancel_duel(&duel_id, &claims.sub)
        .await
        .map_err(error_response)?;

    state.supervisor.stop(&duel_id);
    Ok((StatusCode::OK, Json(DuelResponse::for_viewer(&duel, &claims.sub))))
}
