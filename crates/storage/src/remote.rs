use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quiz_core::model::{
    AttemptSubmission, Difficulty, Question, QuestionId, Quiz, QuizId, QuizSummary,
    SubmissionReceipt,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::repository::{QuizRepository, ResultSubmitter, StorageError};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const FALLBACK_MESSAGE: &str = "Something went wrong";

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `QUIZ_API_URL`, `QUIZ_API_TOKEN` and `QUIZ_API_TIMEOUT_SECS`.
    ///
    /// Returns `None` when no base URL is configured or it does not parse.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let raw = env::var("QUIZ_API_URL").ok()?;
        let base_url = match Url::parse(raw.trim()) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(%err, "ignoring invalid QUIZ_API_URL");
                return None;
            }
        };
        let timeout = env::var("QUIZ_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Some(
            Self::new(base_url)
                .with_token(env::var("QUIZ_API_TOKEN").ok())
                .with_timeout(Duration::from_secs(timeout)),
        )
    }
}

//
// ─── CLIENT ────────────────────────────────────────────────────────────────────
//

/// HTTP adapter for the quiz backend.
#[derive(Clone)]
pub struct RemoteApi {
    client: Client,
    config: ApiConfig,
}

impl RemoteApi {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.config.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                StorageError::Connection(format!("base url cannot be a base: {}", self.config.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, StorageError> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::debug!(status = status.as_u16(), %message, "quiz api request failed");

    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound,
        StatusCode::UNAUTHORIZED => StorageError::Unauthorized,
        StatusCode::CONFLICT => StorageError::Conflict,
        other => StorageError::Remote {
            status: other.as_u16(),
            message,
        },
    }
}

/// `message`, then `error`, from a JSON body; the raw text only when the
/// body is not JSON at all.
fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() {
            FALLBACK_MESSAGE.to_owned()
        } else {
            trimmed.to_owned()
        };
    };

    ["message", "error"]
        .iter()
        .filter_map(|key| parsed.get(key).and_then(serde_json::Value::as_str))
        .find(|text| !text.is_empty())
        .map_or_else(|| FALLBACK_MESSAGE.to_owned(), str::to_owned)
}

#[async_trait]
impl QuizRepository for RemoteApi {
    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError> {
        let url = self.endpoint(&["quizzes", id.as_str()])?;
        let response = self.send(self.client.get(url)).await?;
        let dto: QuizDto = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidPayload(e.to_string()))?;
        dto.into_quiz()
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizSummary>, StorageError> {
        let url = self.endpoint(&["quizzes"])?;
        let response = self.send(self.client.get(url)).await?;
        let dtos: Vec<QuizDto> = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidPayload(e.to_string()))?;
        dtos.into_iter()
            .map(|dto| dto.into_quiz().map(|quiz| quiz.summary()))
            .collect()
    }
}

#[async_trait]
impl ResultSubmitter for RemoteApi {
    async fn submit(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionReceipt, StorageError> {
        let url = self.endpoint(&["quizzes", submission.quiz_id.as_str(), "submit"])?;
        let body = SubmitRequest::from_answers(&submission.answers);
        let response = self.send(self.client.post(url).json(&body)).await?;

        let raw = response
            .text()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let reply: SubmitResponse = if raw.trim().is_empty() {
            SubmitResponse::default()
        } else {
            serde_json::from_str(&raw).map_err(|e| StorageError::InvalidPayload(e.to_string()))?
        };

        tracing::info!(
            attempt_id = %submission.attempt_id,
            quiz_id = %submission.quiz_id,
            "submitted attempt to quiz api"
        );
        Ok(SubmissionReceipt {
            remote_score: reply.score,
            message: reply.message,
            ..SubmissionReceipt::accepted(Utc::now())
        })
    }
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct QuizDto {
    #[serde(alias = "_id")]
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    points: u32,
    #[serde(default)]
    questions: Vec<QuestionDto>,
}

#[derive(Debug, Deserialize)]
struct QuestionDto {
    #[serde(alias = "_id")]
    id: String,
    text: String,
    options: Vec<String>,
    answer: usize,
}

impl QuizDto {
    fn into_quiz(self) -> Result<Quiz, StorageError> {
        let invalid = |e: quiz_core::model::QuizError| StorageError::InvalidPayload(e.to_string());
        let questions = self
            .questions
            .into_iter()
            .map(|q| Question::new(QuestionId::new(q.id), q.text, q.options, q.answer))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        Ok(Quiz::new(QuizId::new(self.id), self.title, self.points, questions)
            .map_err(invalid)?
            .with_description(self.description)
            .with_difficulty(self.difficulty.map(Difficulty::from)))
    }
}

/// The backend expects indices as strings on both sides.
#[derive(Debug, Serialize)]
struct SubmitRequest {
    answers: BTreeMap<String, String>,
}

impl SubmitRequest {
    fn from_answers(answers: &BTreeMap<usize, usize>) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(question, option)| (question.to_string(), option.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> RemoteApi {
        RemoteApi::new(ApiConfig::new(Url::parse(base).unwrap())).unwrap()
    }

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let url = api("https://example.com/api/").endpoint(&["quizzes", "q 1"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/quizzes/q%201");

        let url = api("https://example.com/api").endpoint(&["quizzes"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/quizzes");
    }

    #[test]
    fn error_message_prefers_message_then_error_then_text() {
        assert_eq!(error_message(r#"{"message":"nope","error":"x"}"#), "nope");
        assert_eq!(error_message(r#"{"error":"bad token"}"#), "bad token");
        assert_eq!(error_message("plain failure"), "plain failure");
        assert_eq!(error_message("   "), FALLBACK_MESSAGE);
        assert_eq!(error_message("{}"), FALLBACK_MESSAGE);
    }

    #[test]
    fn error_message_ignores_blank_fields_and_non_object_json() {
        assert_eq!(error_message(r#"{"message":"","error":"denied"}"#), "denied");
        assert_eq!(error_message(r#"{"message":""}"#), FALLBACK_MESSAGE);
        assert_eq!(error_message(r#""oops""#), FALLBACK_MESSAGE);
        assert_eq!(error_message("[1,2]"), FALLBACK_MESSAGE);
    }

    #[test]
    fn submit_body_uses_string_indices() {
        let body = SubmitRequest::from_answers(&[(0, 2), (4, 1)].into());
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"answers":{"0":"2","4":"1"}}"#);
    }

    #[test]
    fn dto_validation_rejects_bad_answer_index() {
        let dto: QuizDto = serde_json::from_str(
            r#"{"_id":"q","title":"T","points":10,
                "questions":[{"id":"a","text":"?","options":["x","y"],"answer":5}]}"#,
        )
        .unwrap();
        assert!(matches!(
            dto.into_quiz(),
            Err(StorageError::InvalidPayload(_))
        ));
    }

    #[test]
    fn blank_token_is_dropped() {
        let config = ApiConfig::new(Url::parse("https://example.com").unwrap())
            .with_token(Some("  ".into()));
        assert!(config.token.is_none());
    }
}
