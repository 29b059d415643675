//! Transport Module
//!
//! Raw HTTP exchange with the companion API. Redirects are never followed:
//! the session state machine reads the redirect target itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{CompanionError, CompanionResult};

/// The API only answers clients that look like the official mobile app
pub const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 7_1_2 like Mac OS X) AppleWebKit/537.51.2 (KHTML, like Gecko) Mobile/11D257";

pub const ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/user/login";
pub const CONFIRM_PATH: &str = "/user/confirm";
pub const PROFILE_PATH: &str = "/profile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    /// POST with an `application/x-www-form-urlencoded` body
    PostForm(Vec<(String, String)>),
}

/// A request against one API path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: &'static str,
    /// Pre-built `Cookie` header value
    pub cookies: Option<String>,
}

impl ApiRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::Get,
            path,
            cookies: None,
        }
    }

    pub fn post_form(path: &'static str, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            method: Method::PostForm(fields),
            path,
            cookies: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Option<String>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Value of a form field, if this is a form post
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.method {
            Method::PostForm(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            Method::Get => None,
        }
    }
}

/// What the state machine needs from a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl ApiResponse {
    /// A `302 Found` pointing at `path`
    pub fn redirects_to(&self, path: &str) -> bool {
        self.status == StatusCode::FOUND.as_u16() && self.location.as_deref() == Some(path)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Sends requests to the companion API.
///
/// Failing to get any response is a `CompanionError::Contact`; every status
/// code, redirects included, comes back as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> CompanionResult<ApiResponse>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> CompanionResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CompanionError::Contact(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> CompanionResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        debug!("Requesting {}", url);

        let mut builder = match &request.method {
            Method::Get => self.client.get(&url),
            Method::PostForm(fields) => self.client.post(&url).form(fields),
        };
        if let Some(cookies) = &request.cookies {
            builder = builder.header(COOKIE, cookies);
        }

        let response = builder.send().await.map_err(|e| {
            warn!("Failed to obtain response from {}: {}", request.path, e);
            CompanionError::Contact(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let body = response.text().await?;

        debug!(status, location = ?location, bytes = body.len(), "Response from {}", request.path);

        Ok(ApiResponse {
            status,
            location,
            set_cookies,
            body,
        })
    }
}
