//! Qualification scoring, sessions and stored results
//!
//! A session collects BANT answers (and optionally a call recording) for
//! one client. Completing it persists the deal, call activity and
//! qualification record, and hands back a booking link for leads that
//! clear the booking threshold.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use qcrm_common::integrations::{booking_url, transcribe_or_empty, Transcript};
use qcrm_common::qualification::{
    score, AnswersInput, Classification, CompletedQualification, QualificationRecord,
    QualificationSession, ScoreResult, ScoringConfig, SessionStart,
};
use qcrm_common::settings::load_scoring_config;
use qcrm_common::{Error, Identity};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

/// Score plus whether it qualifies for a booking link
#[derive(Debug, Serialize)]
pub struct ScorePreview {
    #[serde(flatten)]
    pub result: ScoreResult,
    pub booking_eligible: bool,
}

impl ScorePreview {
    fn new(result: ScoreResult, config: &ScoringConfig) -> Self {
        Self {
            booking_eligible: config.booking_eligible(&result),
            result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: QualificationSession,
    pub preview: ScorePreview,
}

impl SessionView {
    fn new(session: QualificationSession, config: &ScoringConfig) -> Self {
        Self {
            preview: ScorePreview::new(session.preview(config), config),
            session,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    #[serde(flatten)]
    pub completed: CompletedQualification,
    pub booking_url: Option<String>,
}

/// POST /api/qualifications/score
///
/// Stateless scoring of a set of answers with the stored configuration.
pub async fn score_answers(
    State(state): State<AppState>,
    Json(input): Json<AnswersInput>,
) -> ApiResult<Json<ScorePreview>> {
    let answers = input.parse()?;
    let config = load_scoring_config(&state.db).await?;
    Ok(Json(ScorePreview::new(score(&answers, &config), &config)))
}

/// POST /api/qualifications/sessions
pub async fn start_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<SessionStart>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let session = QualificationSession::start(&identity, request)?;
    let config = load_scoring_config(&state.db).await?;
    state.sessions.insert(session.clone()).await;

    info!(session = %session.id, client = %session.client_name, "Qualification session started");
    Ok((StatusCode::CREATED, Json(SessionView::new(session, &config))))
}

/// GET /api/qualifications/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<SessionView>>> {
    let config = load_scoring_config(&state.db).await?;
    let sessions = state.sessions.list(&identity).await;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionView::new(s, &config))
            .collect(),
    ))
}

/// GET /api/qualifications/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = state.sessions.get(&identity, id).await?;
    let config = load_scoring_config(&state.db).await?;
    Ok(Json(SessionView::new(session, &config)))
}

/// PUT /api/qualifications/sessions/:id/answers
///
/// Replaces all four answers; unanswered questions are sent as null.
pub async fn update_answers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<AnswersInput>,
) -> ApiResult<Json<SessionView>> {
    let answers = input.parse()?;
    let session = state
        .sessions
        .update(&identity, id, |session| {
            session.set_answers(answers);
            session.clone()
        })
        .await?;

    let config = load_scoring_config(&state.db).await?;
    Ok(Json(SessionView::new(session, &config)))
}

/// POST /api/qualifications/sessions/:id/transcript
///
/// The request body is the raw recording; its `Content-Type` is passed on
/// to the transcriber. A failed transcription yields an empty transcript.
pub async fn upload_audio(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    audio: Bytes,
) -> ApiResult<Json<Transcript>> {
    // Check ownership before spending time on transcription
    state.sessions.get(&identity, id).await?;

    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio body is empty".to_string()));
    }
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let transcript = transcribe_or_empty(state.transcriber.as_ref(), audio.to_vec(), mime_type).await;
    let attached = transcript.clone();
    state
        .sessions
        .update(&identity, id, move |session| session.attach_transcript(attached))
        .await?;

    Ok(Json(transcript))
}

/// POST /api/qualifications/sessions/:id/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CompletionResponse>)> {
    let config = load_scoring_config(&state.db).await?;

    // Taking the session first means a concurrent complete or discard of
    // the same id sees NotFound instead of persisting it a second time
    let session = state.sessions.remove(&identity, id).await?;
    let completed = match state
        .service
        .complete_qualification(&identity, &session, &config)
        .await
    {
        Ok(completed) => completed,
        Err(e) => {
            warn!(session = %id, "Completion failed, session restored: {}", e);
            state.sessions.insert(session).await;
            return Err(e.into());
        }
    };

    let booking_url = if completed.booking_eligible {
        let record = &completed.record;
        match booking_url(
            &state.booking,
            &record.client_name,
            record.score,
            record.classification,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!("Booking link unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(CompletionResponse {
            completed,
            booking_url,
        }),
    ))
}

/// DELETE /api/qualifications/sessions/:id
pub async fn discard_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.sessions.remove(&identity, id).await?;
    info!(session = %id, "Qualification session discarded");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QualificationQuery {
    pub classification: Option<String>,
}

pub(crate) fn parse_classification(text: Option<&str>) -> ApiResult<Option<Classification>> {
    text.map(|c| {
        c.parse::<Classification>()
            .map_err(|e| ApiError::from(Error::invalid("classification", e)))
    })
    .transpose()
}

/// GET /api/qualifications
pub async fn list_qualifications(
    State(state): State<AppState>,
    Query(query): Query<QualificationQuery>,
) -> ApiResult<Json<Vec<QualificationRecord>>> {
    let classification = parse_classification(query.classification.as_deref())?;
    Ok(Json(state.service.list_qualifications(classification).await?))
}

/// GET /api/qualifications/:id
pub async fn get_qualification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QualificationRecord>> {
    Ok(Json(state.service.get_qualification(id).await?))
}
