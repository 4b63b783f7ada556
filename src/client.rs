//! HTTP client for the read-only Loki query API.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::LokiConfig;
use crate::error::{LokiError, Result, TransportError};
use crate::model::{ErrorResponse, LabelsResponse, QueryResponse, SeriesResponse, StatsResponse};
use crate::time::to_unix_nanos;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tenant header, in Loki's documented spelling. The `http` crate stores
/// header names lowercased, so HTTP/1 requests carry `x-scope-orgid` on the
/// wire; Loki matches the name case-insensitively.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

type Params = Vec<(&'static str, String)>;

/// Immutable, cheaply cloneable Loki client. Safe to share across tasks.
#[derive(Clone)]
pub struct LokiClient {
    base_url: String,
    auth: LokiConfig,
    http: HttpClient,
}

impl std::fmt::Debug for LokiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LokiClient")
            .field("base_url", &self.base_url)
            .field("basic_auth", &self.auth.has_basic_auth())
            .field("bearer_token", &self.auth.has_bearer_token())
            .field("org_id", &self.auth.org_id)
            .finish()
    }
}

impl LokiClient {
    /// Builds a client. The base URL must be `http://` or `https://`; a
    /// trailing slash is dropped.
    pub fn new(config: &LokiConfig) -> Result<Self> {
        let url = config.url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(LokiError::Config(format!(
                "Loki URL must start with http:// or https://, got: {url}"
            )));
        }

        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LokiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            auth: config.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Basic auth wins over a bearer token; the tenant header is independent.
    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        let auth = &self.auth;
        let builder = if auth.has_basic_auth() {
            builder.basic_auth(&auth.username, Some(&auth.password))
        } else if auth.has_bearer_token() {
            builder.bearer_auth(&auth.token)
        } else {
            builder
        };

        if auth.org_id.is_empty() {
            builder
        } else {
            builder.header(ORG_ID_HEADER, &auth.org_id)
        }
    }

    async fn get(&self, path: &str, params: &Params) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "loki request");
        let request = self.with_auth(self.http.get(&url)).query(params);
        Ok(request.send().await?)
    }

    /// Full body of a response that must not be an HTTP error.
    async fn read_body(&self, path: &str, response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() >= 400 {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if !err.error.is_empty() {
                    warn!(path, status = status.as_u16(), error_type = %err.error_type, "loki API error");
                    return Err(LokiError::BackendApi {
                        error_type: err.error_type,
                        message: err.error,
                    });
                }
            }
            warn!(path, status = status.as_u16(), "loki API error");
            return Err(LokiError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: Params) -> Result<T> {
        let response = self.get(path, &params).await?;
        let body = self.read_body(path, response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn range_params(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Params> {
        Ok(vec![
            ("start", to_unix_nanos(start)?.to_string()),
            ("end", to_unix_nanos(end)?.to_string()),
        ])
    }

    /// Runs a LogQL range query.
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
        direction: &str,
    ) -> Result<QueryResponse> {
        let mut params = vec![("query", query.to_string())];
        params.extend(Self::range_params(start, end)?);
        params.push(("limit", limit.to_string()));
        params.push(("direction", direction.to_string()));
        self.get_json("/loki/api/v1/query_range", params).await
    }

    /// Lists known label names.
    pub async fn labels(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LabelsResponse> {
        self.get_json("/loki/api/v1/labels", Self::range_params(start, end)?)
            .await
    }

    /// Lists known values of one label. The name is spliced into the path
    /// as given; callers pass an already URL-safe name.
    pub async fn label_values(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LabelsResponse> {
        let path = format!("/loki/api/v1/label/{name}/values");
        self.get_json(&path, Self::range_params(start, end)?).await
    }

    /// Lists series matching any of the selectors.
    pub async fn series(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SeriesResponse> {
        let mut params = Self::range_params(start, end)?;
        params.extend(matchers.iter().map(|m| ("match[]", m.clone())));
        self.get_json("/loki/api/v1/series", params).await
    }

    /// Index statistics for a selector.
    pub async fn stats(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<StatsResponse> {
        let mut params = vec![("query", query.to_string())];
        params.extend(Self::range_params(start, end)?);
        self.get_json("/loki/api/v1/index/stats", params).await
    }

    /// Server configuration as returned by `/config` (YAML text, not parsed).
    pub async fn config(&self) -> Result<String> {
        let response = self.get("/config", &Vec::new()).await?;
        self.read_body("/config", response).await
    }

    /// `Ok(())` on any 2xx from `/ready`.
    pub async fn ready(&self) -> Result<()> {
        let response = self.get("/ready", &Vec::new()).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(LokiError::BackendStatus {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    /// Races `fut` against `cancel`. When `cancel` resolves first the request
    /// is dropped and reported as a cancelled transport.
    pub async fn cancellable<T, F, C>(fut: F, cancel: C) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(LokiError::Transport(TransportError::Cancelled)),
            res = fut => res,
        }
    }
}
