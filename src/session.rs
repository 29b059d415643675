//! Session Module
//!
//! Authentication state machine and profile fetching for the companion API.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, Credentials};
use crate::error::{CompanionError, CompanionResult};
use crate::profile::{Diagnostic, DiagnosticKind, Profile, ProfileDecoder};
use crate::synchronizer::ProfileSource;
use crate::transport::{
    ApiRequest, ApiResponse, Transport, CONFIRM_PATH, LOGIN_PATH, PROFILE_PATH, ROOT_PATH,
};

/// Where the session stands with the companion API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    NeedsLogin,
    NeedsConfirmation,
    Ready,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NeedsLogin => write!(f, "needs login"),
            SessionState::NeedsConfirmation => write!(f, "needs confirmation"),
            SessionState::Ready => write!(f, "ready"),
        }
    }
}

/// State a session starts in, given what was stored
pub fn initial_state(credentials: &Credentials, now: DateTime<Utc>) -> SessionState {
    if !credentials.has_login() {
        SessionState::NeedsLogin
    } else if !credentials.machine_cookies_valid_at(now) {
        SessionState::NeedsLogin
    } else {
        SessionState::Ready
    }
}

struct CachedProfile {
    profile: Arc<Profile>,
    expires_at: Instant,
}

/// Client for the companion API.
///
/// Every response is scanned for rotated cookies and the credentials are
/// persisted before the call returns, whatever the outcome.
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    credentials: Mutex<CredentialStore>,
    state: Mutex<SessionState>,
    cache: Mutex<Option<CachedProfile>>,
    decoder: Mutex<ProfileDecoder>,
    /// Held for the duration of a profile fetch, retry included
    fetch_lock: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl SessionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        decoder: ProfileDecoder,
        ttl: Duration,
    ) -> Self {
        let state = initial_state(credentials.credentials(), Utc::now());
        info!("Companion session starting, {}", state);

        Self {
            transport,
            credentials: Mutex::new(credentials),
            state: Mutex::new(state),
            cache: Mutex::new(None),
            decoder: Mutex::new(decoder),
            fetch_lock: tokio::sync::Mutex::new(()),
            ttl,
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Copy of the current credentials
    pub fn credentials(&self) -> Credentials {
        lock(&self.credentials).credentials().clone()
    }

    pub fn has_login(&self) -> bool {
        lock(&self.credentials).credentials().has_login()
    }

    /// Store new login details; the session must log in again to use them
    pub fn set_login(&self, email: &str, password: &str) {
        let mut store = lock(&self.credentials);
        store.set_login(email, password);
        if let Err(e) = store.persist() {
            warn!("Failed to persist credentials: {}", e);
        }
        drop(store);

        self.set_state(SessionState::NeedsLogin);
    }

    /// Log in with the stored email and password
    pub async fn login(&self) -> CompanionResult<()> {
        self.require(SessionState::NeedsLogin, "login")?;

        let (email, password) = {
            let store = lock(&self.credentials);
            let credentials = store.credentials();
            match (&credentials.email, &credentials.password) {
                (Some(email), Some(password)) if credentials.has_login() => {
                    (email.clone(), password.clone())
                }
                _ => {
                    return Err(CompanionError::Authentication(
                        "No email or password configured".to_string(),
                    ))
                }
            }
        };

        info!("Logging in to companion API");
        let request = ApiRequest::post_form(
            LOGIN_PATH,
            &[("email", email.as_str()), ("password", password.as_str())],
        );
        let response = self.exchange(request).await?;

        if response.redirects_to(CONFIRM_PATH) {
            info!("Login accepted, confirmation code required");
            self.set_state(SessionState::NeedsConfirmation);
            Ok(())
        } else if response.redirects_to(ROOT_PATH) {
            info!("Login accepted");
            self.set_state(SessionState::Ready);
            Ok(())
        } else {
            self.set_state(SessionState::NeedsLogin);
            Err(CompanionError::Authentication(format!(
                "Login rejected (status {})",
                response.status
            )))
        }
    }

    /// Submit the confirmation code sent after login
    pub async fn confirm(&self, code: &str) -> CompanionResult<()> {
        self.require(SessionState::NeedsConfirmation, "confirm")?;

        info!("Submitting confirmation code");
        let request = ApiRequest::post_form(CONFIRM_PATH, &[("code", code.trim())]);
        let response = self.exchange(request).await?;

        if response.redirects_to(ROOT_PATH) {
            info!("Confirmation accepted");
            self.set_state(SessionState::Ready);
            Ok(())
        } else if response.redirects_to(LOGIN_PATH) {
            self.set_state(SessionState::NeedsLogin);
            Err(CompanionError::Authentication(
                "Confirmation code rejected".to_string(),
            ))
        } else {
            Err(CompanionError::UnexpectedResponse {
                status: response.status,
                location: response.location,
            })
        }
    }

    /// Fetch the profile, served from cache while fresh.
    ///
    /// A redirect to login triggers one re-login and one retry. `Ok(None)`
    /// means the server had no profile to give yet.
    pub async fn get_profile(&self) -> CompanionResult<Option<Arc<Profile>>> {
        self.require(SessionState::Ready, "get profile")?;

        if let Some(profile) = self.cached() {
            debug!("Serving cached profile");
            return Ok(Some(profile));
        }

        let _flight = self.fetch_lock.lock().await;
        // The fetch we waited on may have lost the session
        self.require(SessionState::Ready, "get profile")?;
        if let Some(profile) = self.cached() {
            return Ok(Some(profile));
        }

        let mut response = self.request_profile().await?;

        if response.redirects_to(LOGIN_PATH) {
            info!("Profile request redirected to login, logging in again");
            self.set_state(SessionState::NeedsLogin);
            self.login().await?;

            if self.state() != SessionState::Ready {
                return Err(CompanionError::Authentication(
                    "Login again requires a confirmation code".to_string(),
                ));
            }

            response = self.request_profile().await?;
            if response.redirects_to(LOGIN_PATH) {
                self.set_state(SessionState::NeedsLogin);
                return Err(CompanionError::IllegalState(
                    "Profile request redirected to login after logging in again".to_string(),
                ));
            }
        }

        if response.is_error() {
            return Err(CompanionError::Contact(format!(
                "Profile request failed with status {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(CompanionError::UnexpectedResponse {
                status: response.status,
                location: response.location,
            });
        }

        if response.body.trim().is_empty() {
            debug!("Profile response was empty");
            return Ok(None);
        }

        let decoded = lock(&self.decoder).decode(&response.body)?;
        report_diagnostics(&decoded.diagnostics);

        let profile = Arc::new(decoded.profile);
        *lock(&self.cache) = Some(CachedProfile {
            profile: profile.clone(),
            expires_at: Instant::now() + self.ttl,
        });

        info!(
            commander = profile.commander.name.as_deref().unwrap_or("unknown"),
            system = profile.current_system.as_deref().unwrap_or("unknown"),
            "Fetched profile"
        );
        Ok(Some(profile))
    }

    async fn request_profile(&self) -> CompanionResult<ApiResponse> {
        self.exchange(ApiRequest::get(PROFILE_PATH)).await
    }

    /// Send a request with the current cookies, then absorb and persist any
    /// cookies the response rotates
    async fn exchange(&self, request: ApiRequest) -> CompanionResult<ApiResponse> {
        let cookies = lock(&self.credentials).credentials().cookie_header(Utc::now());
        let response = self.transport.execute(request.with_cookies(cookies)).await?;

        debug!(
            status = response.status,
            location = response.location.as_deref().unwrap_or(""),
            "Companion API response"
        );

        let mut store = lock(&self.credentials);
        let headers = response.set_cookies.iter().map(String::as_str);
        if store.credentials_mut().absorb_set_cookies(headers) {
            debug!("Companion API rotated cookies");
        }
        if let Err(e) = store.persist() {
            warn!("Failed to persist credentials: {}", e);
        }

        Ok(response)
    }

    fn cached(&self) -> Option<Arc<Profile>> {
        lock(&self.cache)
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.profile.clone())
    }

    fn require(&self, required: SessionState, operation: &str) -> CompanionResult<()> {
        let current = self.state();
        if current == required {
            Ok(())
        } else {
            Err(CompanionError::IllegalState(format!(
                "Cannot {} while session {}",
                operation, current
            )))
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!("Session state {} -> {}", *current, state);
            *current = state;
        }
    }
}

#[async_trait]
impl ProfileSource for SessionClient {
    async fn fetch_profile(&self) -> CompanionResult<Option<Arc<Profile>>> {
        self.get_profile().await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.kind {
            DiagnosticKind::ModifiedModule => {
                info!(target: "diagnostics", kind = ?diagnostic.kind, "{}", diagnostic.detail)
            }
            _ => warn!(target: "diagnostics", kind = ?diagnostic.kind, "{}", diagnostic.detail),
        }
    }
}
