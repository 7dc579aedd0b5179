//! REST client for the generation-job endpoints.
//!
//! Wraps the progress and cancellation endpoints using [`reqwest`], with
//! bearer credentials from a shared [`Session`] and a single transparent
//! retry after refreshing an expired access token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use schedgen_core::types::JobId;
use serde::Deserialize;

use crate::session::Session;
use crate::transport::{ProgressPayload, ProgressTransport, TransportError};

/// Default path of the token refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";

/// HTTP client for the generation-job API.
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
    refresh_path: String,
}

/// Body of a successful token refresh.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Error body returned by a refused cancellation.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl GenerationApi {
    /// Create a client for the API at `base_url`, e.g. `http://host/api`.
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<Session>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Request)?;
        Ok(Self::with_client(client, base_url, session))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session: Arc<Session>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            session,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
        }
    }

    /// Override the token refresh path.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current progress of a job.
    ///
    /// Sends `GET /progress/{job_id}/`. A 404 means the job record is not
    /// visible yet and maps to [`TransportError::NotFound`].
    pub async fn get_progress(&self, job_id: &JobId) -> Result<ProgressPayload, TransportError> {
        let url = format!("{}/progress/{}/", self.base_url, job_id);
        let response = self.send_authorized(|client| client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(job_id.clone()));
        }

        Self::parse_response(response).await
    }

    /// Ask the server to cancel a job.
    ///
    /// Sends `POST /generation-jobs/{job_id}/cancel/`. A refusal carrying
    /// an `{ "error": ... }` body maps to [`TransportError::Rejected`].
    pub async fn cancel_generation(&self, job_id: &JobId) -> Result<(), TransportError> {
        let url = format!("{}/generation-jobs/{}/cancel/", self.base_url, job_id);
        let response = self.send_authorized(|client| client.post(&url)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Err(TransportError::Rejected(parsed.error)),
            Err(_) => Err(TransportError::Api {
                status: status.as_u16(),
                body,
            }),
        }
    }

    // ---- private helpers ----

    /// Send a request with the session's credentials attached.
    ///
    /// On a 401 the access token is refreshed once and the request
    /// rebuilt and retried. A second 401, or a refused refresh, means the
    /// session is gone.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, TransportError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let response = self
            .authorize(build(&self.client))
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !self.session.can_refresh() {
            return Err(TransportError::Unauthorized);
        }

        tracing::info!("Access token rejected, refreshing session");
        self.refresh_access_token().await?;

        let retried = self
            .authorize(build(&self.client))
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Request still unauthorized after refresh");
            return Err(TransportError::SessionExpired);
        }
        Ok(retried)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Exchange the refresh token for a new access token.
    async fn refresh_access_token(&self) -> Result<(), TransportError> {
        let Some(refresh) = self.session.refresh_token() else {
            return Err(TransportError::SessionExpired);
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, self.refresh_path))
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            tracing::warn!(status = status.as_u16(), "Token refresh refused");
            return Err(TransportError::SessionExpired);
        }

        let refreshed: RefreshResponse = Self::parse_response(response).await?;
        self.session.set_access_token(refreshed.access);
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(TransportError::from_reqwest)
    }
}

#[async_trait]
impl ProgressTransport for GenerationApi {
    async fn fetch_progress(&self, job_id: &JobId) -> Result<ProgressPayload, TransportError> {
        self.get_progress(job_id).await
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<(), TransportError> {
        self.cancel_generation(job_id).await
    }
}
