use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use thiserror::Error;
use url::Url;

use crate::model::{SyncManifest, SyncRequest};

pub const SESSION_HEADER: &str = "X-Pack-Sync-Session-ID";
pub const PACK_ID_HEADER: &str = "X-Pack-Sync-Pack-ID";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PackSyncError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api url cannot have path segments: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed sync response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    Transient,
    Permanent,
}

/// Result of the version call. Header values, when present, override the
/// locally configured ones for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub session_id: Option<String>,
    pub pack_id: Option<String>,
}

#[derive(Clone)]
pub struct PackSyncClient {
    http: Client,
    api: Url,
    pack_code: String,
    session_id: Option<String>,
}

impl PackSyncClient {
    /// `token` is sent as a bearer token on every request, including file
    /// downloads made through [`PackSyncClient::http`].
    pub fn new(
        api: &str,
        pack_code: impl Into<String>,
        token: Option<&str>,
    ) -> Result<Self, PackSyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("packsync/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Self::with_http(http, api, pack_code)
    }

    pub fn with_http(
        http: Client,
        api: &str,
        pack_code: impl Into<String>,
    ) -> Result<Self, PackSyncError> {
        let api = Url::parse(api.trim_end_matches('/'))?;
        if api.cannot_be_a_base() {
            return Err(PackSyncError::InvalidBaseUrl(api.to_string()));
        }
        Ok(Self {
            http,
            api,
            pack_code: pack_code.into(),
            session_id: None,
        })
    }

    /// The configured HTTP client, shared with the transfer layer.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn pack_code(&self) -> &str {
        &self.pack_code
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id.filter(|s| !s.is_empty());
    }

    pub async fn fetch_version(&self) -> Result<VersionInfo, PackSyncError> {
        let url = self.endpoint(&["version", self.pack_code.as_str()])?;
        let response = self.with_session(self.http.get(url)).send().await?;
        let response = Self::check_status(response).await?;
        let session_id = header_string(response.headers(), SESSION_HEADER);
        let pack_id = header_string(response.headers(), PACK_ID_HEADER);
        let version = response.text().await?.trim().to_string();
        Ok(VersionInfo {
            version,
            session_id,
            pack_id,
        })
    }

    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncManifest, PackSyncError> {
        let url = self.endpoint(&["sync", self.pack_code.as_str()])?;
        let response = self
            .with_session(self.http.post(url))
            .json(request)
            .send()
            .await?;
        let body = Self::check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Tells the server this session is over. Callers treat failures as
    /// non-fatal.
    pub async fn exit(&self) -> Result<(), PackSyncError> {
        let url = self.endpoint(&["exit"])?;
        let response = self.with_session(self.http.post(url)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PackSyncError> {
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|_| PackSyncError::InvalidBaseUrl(self.api.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_session(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.session_id {
            Some(session_id) => builder.header(SESSION_HEADER, session_id),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PackSyncError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(PackSyncError::Api { status, body })
        }
    }
}

impl PackSyncError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            PackSyncError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// Timeouts, refused connections and non-2xx answers leave the previous
    /// local state authoritative instead of failing the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PackSyncError::Request(err) => err.is_timeout() || err.is_connect(),
            PackSyncError::Api { .. } => true,
            _ => false,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
