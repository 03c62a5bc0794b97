//! Typed HTTP client for the covenant monitoring API
//!
//! Holds the session tokens returned by login. A request rejected with
//! `TOKEN_EXPIRED` triggers one refresh through `/api/auth/refresh`
//! followed by one retry of the original request.

use std::time::Duration;

use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::handlers::ai::{
    CovenantAnalysisRequest, ExplanationResponse, ExtractTextRequest, ExtractionResponse,
    LoanAnalysisRequest, SummaryResponse, WhatChangedResponse,
};
use crate::handlers::health::HealthResponse;
use crate::models::{
    ApplyExtractionRequest, AuthTokensResponse, Covenant, CovenantStatusResponse,
    CovenantWithLoan, CreateCovenantRequest, CreateLoanRequest, CreateTimelineEventRequest,
    DashboardStats, ExtractionApplied, Loan, LoanStats, LoanStatus, LoanSummary, LoginRequest,
    RefreshTokenRequest, RegisterRequest, ScoreRecalculation, TimelineEvent,
    UpdateCovenantStatusRequest, UpdateLoanRequest, UploadedDocument, UserResponse,
};
use crate::services::PredictionReport;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Fixed timeout for a single `/health` request
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_EXPIRED_CODE: &str = "TOKEN_EXPIRED";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session expired, log in again")]
    AuthExpired,

    #[error("Not logged in")]
    NoSession,

    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server did not become healthy within {0:?}")]
    Unavailable(Duration),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Decoded non-success response
#[derive(Debug)]
struct Rejection {
    status: StatusCode,
    code: String,
    message: String,
}

impl Rejection {
    async fn read(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Self {
                status,
                code: body.error.code,
                message: body.error.message,
            },
            Err(_) => Self {
                status,
                code: "UNKNOWN".to_string(),
                message: text,
            },
        }
    }

    fn is_token_expired(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED && self.code == TOKEN_EXPIRED_CODE
    }

    fn into_error(self) -> ClientError {
        if self.is_token_expired() {
            return ClientError::AuthExpired;
        }
        if self.status == StatusCode::NOT_FOUND {
            return ClientError::NotFound(self.message);
        }
        ClientError::Api {
            status: self.status.as_u16(),
            code: self.code,
            message: self.message,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    access: String,
    refresh: String,
}

/// Query string for the covenant listing
#[derive(Debug, Serialize)]
struct CovenantFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct LoanFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<LoanStatus>,
}

/// HTTP client for the covenant monitoring backend
pub struct CovenClient {
    client: Client,
    base_url: String,
    health_timeout: Duration,
    session: RwLock<Option<Session>>,
}

impl CovenClient {
    /// Create a client without a session
    pub fn new(endpoint: &str) -> ClientResult<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            health_timeout: HEALTH_CHECK_TIMEOUT,
            session: RwLock::new(None),
        })
    }

    /// Override the per-request `/health` timeout
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resume a session from previously issued tokens
    pub async fn set_tokens(&self, access: impl Into<String>, refresh: impl Into<String>) {
        *self.session.write().await = Some(Session {
            access: access.into(),
            refresh: refresh.into(),
        });
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access.clone())
    }

    pub async fn logout(&self) {
        *self.session.write().await = None;
    }

    // ========== Health ==========

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Poll `/health` every `interval` until the server reports healthy.
    ///
    /// Failed, slow and unhealthy polls are all retried; this only returns
    /// once a poll succeeds. Use [`Self::wait_until_healthy_within`] to
    /// bound the wait.
    pub async fn wait_until_healthy(&self, interval: Duration) -> HealthResponse {
        loop {
            match self.health().await {
                Ok(health) if health.status == "healthy" => return health,
                Ok(health) => {
                    tracing::debug!(status = %health.status, "Server not healthy yet");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Health check failed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// [`Self::wait_until_healthy`] bounded by `max_wait`
    pub async fn wait_until_healthy_within(
        &self,
        max_wait: Duration,
        interval: Duration,
    ) -> ClientResult<HealthResponse> {
        tokio::time::timeout(max_wait, self.wait_until_healthy(interval))
            .await
            .map_err(|_| ClientError::Unavailable(max_wait))
    }

    // ========== Auth ==========

    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<AuthTokensResponse> {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(req)
            .send()
            .await?;
        let tokens: AuthTokensResponse = Self::decode(response).await?;
        self.set_tokens(&tokens.access, &tokens.refresh).await;
        Ok(tokens)
    }

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<AuthTokensResponse> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&req)
            .send()
            .await?;
        let tokens: AuthTokensResponse = Self::decode(response).await?;
        self.set_tokens(&tokens.access, &tokens.refresh).await;
        Ok(tokens)
    }

    /// Exchange the refresh token for a new token pair
    pub async fn refresh(&self) -> ClientResult<()> {
        let refresh = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh.clone())
            .ok_or(ClientError::NoSession)?;

        let response = self
            .client
            .post(self.url("/api/auth/refresh"))
            .json(&RefreshTokenRequest { refresh })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.logout().await;
            return Err(ClientError::AuthExpired);
        }

        let tokens: AuthTokensResponse = Self::decode(response).await?;
        self.set_tokens(tokens.access, tokens.refresh).await;
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    pub async fn profile(&self) -> ClientResult<UserResponse> {
        self.get("/api/user/profile").await
    }

    // ========== Loans ==========

    pub async fn list_loans(&self, status: Option<LoanStatus>) -> ClientResult<Vec<LoanSummary>> {
        let filter = LoanFilter { status };
        let response = self
            .execute(|c| c.get(self.url("/api/loans")).query(&filter))
            .await?;
        Self::decode(response).await
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> ClientResult<Loan> {
        self.get(&format!("/api/loans/{}", loan_id)).await
    }

    pub async fn create_loan(&self, req: &CreateLoanRequest) -> ClientResult<Loan> {
        self.post("/api/loans", req).await
    }

    pub async fn update_loan(&self, loan_id: Uuid, req: &UpdateLoanRequest) -> ClientResult<Loan> {
        self.put(&format!("/api/loans/{}", loan_id), req).await
    }

    pub async fn delete_loan(&self, loan_id: Uuid) -> ClientResult<()> {
        self.delete(&format!("/api/loans/{}", loan_id)).await
    }

    pub async fn loan_stats(&self, loan_id: Uuid) -> ClientResult<LoanStats> {
        self.get(&format!("/api/loans/{}/stats", loan_id)).await
    }

    pub async fn recalculate_score(&self, loan_id: Uuid) -> ClientResult<ScoreRecalculation> {
        self.post(
            &format!("/api/loans/{}/recalculate-score", loan_id),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn apply_extraction(
        &self,
        loan_id: Uuid,
        req: &ApplyExtractionRequest,
    ) -> ClientResult<ExtractionApplied> {
        self.post(&format!("/api/loans/{}/apply-extraction", loan_id), req)
            .await
    }

    pub async fn refresh_predictions(&self, loan_id: Uuid) -> ClientResult<PredictionReport> {
        self.post(
            &format!("/api/loans/{}/predictions/refresh", loan_id),
            &serde_json::json!({}),
        )
        .await
    }

    /// Download the covenant report as CSV text
    pub async fn export_csv(&self, loan_id: Uuid) -> ClientResult<String> {
        let path = format!("/api/loans/{}/export.csv", loan_id);
        let response = self.execute(|c| c.get(self.url(&path))).await?;
        if !response.status().is_success() {
            return Err(Rejection::read(response).await.into_error());
        }
        Ok(response.text().await?)
    }

    // ========== Covenants ==========

    pub async fn add_covenant(
        &self,
        loan_id: Uuid,
        req: &CreateCovenantRequest,
    ) -> ClientResult<Covenant> {
        self.post(&format!("/api/loans/{}/covenants", loan_id), req)
            .await
    }

    pub async fn list_covenants(&self, loan_id: Option<Uuid>) -> ClientResult<Vec<CovenantWithLoan>> {
        let filter = CovenantFilter { loan_id };
        let response = self
            .execute(|c| c.get(self.url("/api/covenants")).query(&filter))
            .await?;
        Self::decode(response).await
    }

    pub async fn update_covenant_status(
        &self,
        covenant_id: Uuid,
        req: &UpdateCovenantStatusRequest,
    ) -> ClientResult<CovenantStatusResponse> {
        self.patch(&format!("/api/covenants/{}/status", covenant_id), req)
            .await
    }

    pub async fn delete_covenant(&self, covenant_id: Uuid) -> ClientResult<()> {
        self.delete(&format!("/api/covenants/{}", covenant_id)).await
    }

    // ========== Timeline and documents ==========

    pub async fn timeline(&self, loan_id: Uuid) -> ClientResult<Vec<TimelineEvent>> {
        self.get(&format!("/api/loans/{}/timeline", loan_id)).await
    }

    pub async fn add_timeline_event(
        &self,
        loan_id: Uuid,
        req: &CreateTimelineEventRequest,
    ) -> ClientResult<TimelineEvent> {
        self.post(&format!("/api/loans/{}/timeline", loan_id), req)
            .await
    }

    pub async fn upload_document(
        &self,
        loan_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ClientResult<UploadedDocument> {
        let path = format!("/api/loans/{}/documents", loan_id);
        let response = self
            .execute(|c| {
                let part = multipart::Part::bytes(bytes.clone()).file_name(filename.to_string());
                c.post(self.url(&path))
                    .multipart(multipart::Form::new().part("file", part))
            })
            .await?;
        Self::decode(response).await
    }

    // ========== Dashboard and AI ==========

    pub async fn dashboard_stats(&self) -> ClientResult<DashboardStats> {
        self.get("/api/dashboard/stats").await
    }

    pub async fn loan_summary(&self, loan_id: Uuid) -> ClientResult<SummaryResponse> {
        self.post("/api/ai/loan-summary", &LoanAnalysisRequest { loan_id })
            .await
    }

    pub async fn explain_covenant(
        &self,
        loan_id: Uuid,
        covenant_id: Uuid,
    ) -> ClientResult<ExplanationResponse> {
        self.post(
            "/api/ai/covenant-explanation",
            &CovenantAnalysisRequest {
                loan_id,
                covenant_id,
            },
        )
        .await
    }

    pub async fn what_changed(&self, loan_id: Uuid) -> ClientResult<WhatChangedResponse> {
        self.post("/api/ai/what-changed", &LoanAnalysisRequest { loan_id })
            .await
    }

    pub async fn extract_loan_dna(
        &self,
        text: &str,
        filename: Option<&str>,
    ) -> ClientResult<ExtractionResponse> {
        let req = ExtractTextRequest {
            text: text.to_string(),
            filename: filename.map(str::to_string),
        };
        self.post("/api/ai/extract-loan-dna", &req).await
    }

    // ========== Internal HTTP helpers ==========

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.read().await.as_ref() {
            Some(session) => request.bearer_auth(&session.access),
            None => request,
        }
    }

    async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Send an authorized request, refreshing and retrying once on an expired token
    async fn execute<F>(&self, build: F) -> ClientResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.authorize(build(&self.client)).await.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let rejection = Rejection::read(response).await;
        if !rejection.is_token_expired() || !self.has_session().await {
            return Err(rejection.into_error());
        }

        self.refresh().await?;
        Ok(self.authorize(build(&self.client)).await.send().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.execute(|c| c.get(self.url(path))).await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        let response = self.execute(|c| c.post(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        let response = self.execute(|c| c.put(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        let response = self.execute(|c| c.patch(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        let response = self.execute(|c| c.delete(self.url(path))).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Rejection::read(response).await.into_error())
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Rejection::read(response).await.into_error())
        }
    }
}
