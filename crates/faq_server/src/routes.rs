use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use faq_core::{AnswerSource, FaqError, GENERIC_FAILURE_MESSAGE};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    /// `faq` or `generated`.
    pub source: String,
    pub faq_id: Option<String>,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaqList {
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub faq_entries: usize,
    pub embedding_model: String,
    pub threshold: f32,
}

pub struct ApiError(FaqError);

impl From<FaqError> for ApiError {
    fn from(err: FaqError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            FaqError::InvalidQuestion(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            FaqError::FallbackUnavailable(reason) => {
                warn!(%reason, "fallback unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, GENERIC_FAILURE_MESSAGE.to_string())
            }
            other => {
                error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_MESSAGE.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let answer = state.assistant.handle(&req.question).await?;

    let response = match answer.source {
        AnswerSource::Faq { entry_id, score } => AskResponse {
            answer: answer.text,
            source: "faq".to_string(),
            faq_id: Some(entry_id),
            score,
        },
        AnswerSource::Generated { best_score } => AskResponse {
            answer: answer.text,
            source: "generated".to_string(),
            faq_id: None,
            score: best_score,
        },
    };
    Ok(Json(response))
}

/// Quick questions for the chat UI, taken from the same dataset the matcher uses.
pub async fn faqs(State(state): State<AppState>) -> Json<FaqList> {
    let questions = state
        .assistant
        .knowledge_base()
        .featured_questions()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(FaqList { questions })
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let kb = state.assistant.knowledge_base();
    Json(Health {
        status: "ok".to_string(),
        faq_entries: kb.len(),
        embedding_model: kb.model_id().to_string(),
        threshold: state.assistant.config().threshold,
    })
}
