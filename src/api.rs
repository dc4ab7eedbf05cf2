//! HTTP client for the tracker REST API.
//!
//! Dependency-free contract from the store's point of view: fetch-all,
//! create, update, delete for tasks, plus the execution endpoints. Every
//! mutating request carries the session tag in the `X-Session-ID` header so
//! the server can stamp outbound push notifications with the same tag.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::{Execution, ExecutionCreate, Task, TaskCreate, TaskPatch};
use crate::session::SessionTag;

const SESSION_HEADER: &str = "X-Session-ID";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error from a remote call. Surfaced to the store's `error` flag by the
/// action layer; the client itself performs no retry.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{detail}")]
    Status { status: StatusCode, detail: String },
}

impl ApiError {
    /// Build a status error, preferring the backend's `{"detail": ...}`
    /// message over the bare status line.
    fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str().map(String::from)))
            .unwrap_or_else(|| format!("HTTP {status}"));
        ApiError::Status { status, detail }
    }
}

/// Typed client for the tracker backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tag: SessionTag,
}

impl ApiClient {
    /// Build a client against `base_url` (no trailing slash), tagging every
    /// request with `tag`.
    pub fn new(base_url: &str, tag: SessionTag) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tag,
        })
    }

    // ─── Tasks ────────────────────────────────────────────────────────────────

    pub async fn fetch_all(&self) -> Result<Vec<Task>, ApiError> {
        self.get_json("/api/tasks/").await
    }

    pub async fn fetch(&self, id: i64) -> Result<Task, ApiError> {
        self.get_json(&format!("/api/tasks/{id}/")).await
    }

    /// Create a task. The server assigns `id`, `created_at`, `updated_at`.
    pub async fn create(&self, input: &TaskCreate) -> Result<Task, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/tasks/"))
            .header(SESSION_HEADER, self.tag.as_str())
            .json(input)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, ApiError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/tasks/{id}/")))
            .header(SESSION_HEADER, self.tag.as_str())
            .json(patch)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/tasks/{id}/")))
            .header(SESSION_HEADER, self.tag.as_str())
            .send()
            .await?;
        // 204 No Content on success — nothing to decode.
        Self::check(resp).await.map(|_| ())
    }

    // ─── Executions ───────────────────────────────────────────────────────────

    /// Record a fact of what happened against a task.
    pub async fn create_execution(
        &self,
        input: &ExecutionCreate,
    ) -> Result<Execution, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/executions/"))
            .header(SESSION_HEADER, self.tag.as_str())
            .json(input)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn executions_for(&self, task_id: i64) -> Result<Vec<Execution>, ApiError> {
        self.get_json(&format!("/api/executions/task/{task_id}/")).await
    }

    pub async fn executions(&self) -> Result<Vec<Execution>, ApiError> {
        self.get_json("/api/executions/").await
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(self.url(path))
            .header(SESSION_HEADER, self.tag.as_str())
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_backend_detail() {
        let err = ApiError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"detail":"Task not found"}"#,
        );
        assert_eq!(err.to_string(), "Task not found");
    }

    #[test]
    fn status_error_falls_back_to_status_line() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 502 Bad Gateway");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client =
            ApiClient::new("http://127.0.0.1:8000/", SessionTag::generate()).unwrap();
        assert_eq!(client.url("/api/tasks/"), "http://127.0.0.1:8000/api/tasks/");
    }
}
