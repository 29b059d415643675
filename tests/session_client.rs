//! Session client behaviour against a scripted companion API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use commander_companion_lib::credentials::{CredentialStore, Credentials};
use commander_companion_lib::definitions::StaticDefinitions;
use commander_companion_lib::error::{CompanionError, CompanionResult};
use commander_companion_lib::profile::ProfileDecoder;
use commander_companion_lib::session::{SessionClient, SessionState};
use commander_companion_lib::storage::SecureStorage;
use commander_companion_lib::transport::{
    ApiRequest, ApiResponse, Transport, CONFIRM_PATH, LOGIN_PATH, PROFILE_PATH, ROOT_PATH,
};

const PROFILE: &str = include_str!("fixtures/profile.json");

/// Answers requests from a script, in order, and records what was sent
struct ScriptedTransport {
    responses: Mutex<VecDeque<CompanionResult<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    fn new(responses: Vec<CompanionResult<ApiResponse>>) -> Arc<Self> {
        Self::with_latency(responses, Duration::ZERO)
    }

    /// Each request takes `latency` before it is answered
    fn with_latency(responses: Vec<CompanionResult<ApiResponse>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            latency,
        })
    }

    fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn paths(&self) -> Vec<&'static str> {
        self.requests().iter().map(|r| r.path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> CompanionResult<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompanionError::Contact("script exhausted".into())))
    }
}

fn redirect(path: &str) -> CompanionResult<ApiResponse> {
    Ok(ApiResponse {
        status: 302,
        location: Some(path.to_string()),
        ..Default::default()
    })
}

fn redirect_with_cookies(path: &str, cookies: &[&str]) -> CompanionResult<ApiResponse> {
    Ok(ApiResponse {
        status: 302,
        location: Some(path.to_string()),
        set_cookies: cookies.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    })
}

fn ok(body: &str) -> CompanionResult<ApiResponse> {
    Ok(ApiResponse {
        status: 200,
        body: body.to_string(),
        ..Default::default()
    })
}

fn login_only() -> Credentials {
    Credentials {
        email: Some("cmdr@example.com".into()),
        password: Some("hunter2".into()),
        ..Default::default()
    }
}

fn ready() -> Credentials {
    Credentials {
        session_token: Some("session".into()),
        machine_id: Some("mid-value".into()),
        machine_token: Some("mtk-value".into()),
        ..login_only()
    }
}

fn client(credentials: Credentials, transport: Arc<ScriptedTransport>) -> SessionClient {
    client_with_store(CredentialStore::in_memory(credentials), transport)
}

fn client_with_store(store: CredentialStore, transport: Arc<ScriptedTransport>) -> SessionClient {
    SessionClient::new(
        transport,
        store,
        ProfileDecoder::new(Arc::new(StaticDefinitions::builtin())),
        Duration::from_secs(30),
    )
}

#[tokio::test]
async fn test_login_and_confirm_reach_ready() {
    let transport = ScriptedTransport::new(vec![
        redirect_with_cookies(CONFIRM_PATH, &["mid=1893456000%7Cmachine; path=/; HttpOnly"]),
        redirect_with_cookies(
            ROOT_PATH,
            &["mtk=1893456000%7Ctoken; path=/", "CompanionApp=fresh-session; path=/"],
        ),
    ]);
    let session = client(login_only(), transport.clone());
    assert_eq!(session.state(), SessionState::NeedsLogin);

    session.login().await.unwrap();
    assert_eq!(session.state(), SessionState::NeedsConfirmation);

    session.confirm(" 123456\n").await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let requests = transport.requests();
    assert_eq!(requests[0].path, LOGIN_PATH);
    assert_eq!(requests[0].form_value("email"), Some("cmdr@example.com"));
    assert_eq!(requests[0].form_value("password"), Some("hunter2"));
    assert_eq!(requests[1].path, CONFIRM_PATH);
    assert_eq!(requests[1].form_value("code"), Some("123456"));
    // Cookies from the login response ride along on the confirm request
    assert_eq!(requests[1].cookies.as_deref(), Some("mid=1893456000%7Cmachine"));

    let credentials = session.credentials();
    assert_eq!(credentials.session_token.as_deref(), Some("fresh-session"));
    assert_eq!(credentials.machine_token.as_deref(), Some("1893456000%7Ctoken"));
}

#[tokio::test]
async fn test_login_straight_to_ready() {
    let transport = ScriptedTransport::new(vec![redirect(ROOT_PATH)]);
    let session = client(login_only(), transport);

    session.login().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_login_rejected() {
    let transport = ScriptedTransport::new(vec![ok("<html>bad password</html>")]);
    let session = client(login_only(), transport);

    let err = session.login().await.unwrap_err();
    assert!(err.is_auth_error());
    assert!(!err.is_retryable());
    assert_eq!(session.state(), SessionState::NeedsLogin);
}

#[tokio::test]
async fn test_login_without_credentials_sends_nothing() {
    let transport = ScriptedTransport::new(vec![]);
    let session = client(Credentials::default(), transport.clone());

    assert!(session.login().await.unwrap_err().is_auth_error());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_operations_in_wrong_state() {
    let transport = ScriptedTransport::new(vec![]);
    let session = client(ready(), transport.clone());
    assert_eq!(session.state(), SessionState::Ready);

    assert!(matches!(session.login().await, Err(CompanionError::IllegalState(_))));
    assert!(matches!(session.confirm("1").await, Err(CompanionError::IllegalState(_))));

    let needs_login = client(login_only(), transport.clone());
    assert!(matches!(needs_login.get_profile().await, Err(CompanionError::IllegalState(_))));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_confirm_redirected_to_login() {
    let transport = ScriptedTransport::new(vec![redirect(CONFIRM_PATH), redirect(LOGIN_PATH)]);
    let session = client(login_only(), transport);

    session.login().await.unwrap();
    let err = session.confirm("000000").await.unwrap_err();
    assert!(err.is_auth_error());
    assert_eq!(session.state(), SessionState::NeedsLogin);
}

#[tokio::test]
async fn test_confirm_unexpected_response_is_transient() {
    let transport = ScriptedTransport::new(vec![redirect(CONFIRM_PATH), ok("")]);
    let session = client(login_only(), transport);

    session.login().await.unwrap();
    let err = session.confirm("123456").await.unwrap_err();
    assert!(matches!(err, CompanionError::UnexpectedResponse { status: 200, .. }));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::NeedsConfirmation);
}

#[tokio::test]
async fn test_profile_decoded() {
    let transport = ScriptedTransport::new(vec![ok(PROFILE)]);
    let session = client(ready(), transport.clone());

    let profile = session.get_profile().await.unwrap().unwrap();
    assert_eq!(transport.requests()[0].path, PROFILE_PATH);
    assert_eq!(
        transport.requests()[0].cookies.as_deref(),
        Some("CompanionApp=session; mid=mid-value; mtk=mtk-value")
    );

    assert_eq!(profile.commander.name.as_deref(), Some("Jameson"));
    assert_eq!(profile.commander.federation_rating.name, "Cadet");
    assert_eq!(profile.current_system.as_deref(), Some("Lave"));

    let ship = profile.ship.as_ref().unwrap();
    assert_eq!(ship.local_id, 7);
    assert_eq!(ship.health, 82.0);
    assert_eq!(ship.value, 57000);
    let slots: Vec<&str> = ship.hardpoints.iter().map(|h| h.slot.as_str()).collect();
    assert_eq!(slots, vec!["SmallHardpoint1", "SmallHardpoint2", "TinyHardpoint1"]);
    assert_eq!(ship.hardpoints[1].module.as_ref().unwrap().health, 4.5);
    assert_eq!(ship.compartments.len(), 3);
    assert!(ship.compartments[2].module.is_none());
    assert!(ship.power_plant.as_ref().unwrap().modified);
    assert_eq!(ship.cargo[0].price, 110);

    let shipyard: Vec<i64> = profile.shipyard.iter().map(|s| s.local_id).collect();
    assert_eq!(shipyard, vec![9]);

    let station = profile.last_station.as_ref().unwrap();
    assert_eq!(station.name, "Lave Station");
    assert_eq!(station.outfitting.len(), 2);
    assert_eq!(station.commodities.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_profile_served_from_cache_within_ttl() {
    let transport = ScriptedTransport::new(vec![ok(PROFILE), ok(PROFILE)]);
    let session = client(ready(), transport.clone());

    let first = session.get_profile().await.unwrap().unwrap();
    tokio::time::advance(Duration::from_secs(29)).await;
    let second = session.get_profile().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.requests().len(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let third = session.get_profile().await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_empty_profile_is_not_cached() {
    let transport = ScriptedTransport::new(vec![ok(""), ok(PROFILE)]);
    let session = client(ready(), transport.clone());

    assert!(session.get_profile().await.unwrap().is_none());
    assert!(session.get_profile().await.unwrap().is_some());
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_profile_login_redirect_retries_once() {
    let transport = ScriptedTransport::new(vec![
        redirect(LOGIN_PATH),
        redirect(ROOT_PATH),
        ok(PROFILE),
    ]);
    let session = client(ready(), transport.clone());

    let profile = session.get_profile().await.unwrap();
    assert!(profile.is_some());
    assert_eq!(transport.paths(), vec![PROFILE_PATH, LOGIN_PATH, PROFILE_PATH]);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_second_login_redirect_is_illegal_state() {
    let transport = ScriptedTransport::new(vec![
        redirect(LOGIN_PATH),
        redirect(ROOT_PATH),
        redirect(LOGIN_PATH),
        ok(PROFILE),
    ]);
    let session = client(ready(), transport.clone());

    let err = session.get_profile().await.unwrap_err();
    assert!(matches!(err, CompanionError::IllegalState(_)));
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(session.state(), SessionState::NeedsLogin);
}

#[tokio::test]
async fn test_relogin_needing_confirmation_stops() {
    let transport = ScriptedTransport::new(vec![redirect(LOGIN_PATH), redirect(CONFIRM_PATH)]);
    let session = client(ready(), transport.clone());

    assert!(session.get_profile().await.unwrap_err().is_auth_error());
    assert_eq!(session.state(), SessionState::NeedsConfirmation);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_cookies_absorbed_from_failed_response() {
    let transport = ScriptedTransport::new(vec![Ok(ApiResponse {
        status: 500,
        set_cookies: vec!["CompanionApp=rotated; path=/".into()],
        ..Default::default()
    })]);
    let session = client(ready(), transport);

    let err = session.get_profile().await.unwrap_err();
    assert!(matches!(err, CompanionError::Contact(_)));
    assert_eq!(session.credentials().session_token.as_deref(), Some("rotated"));
    assert_eq!(session.credentials().machine_id.as_deref(), Some("mid-value"));
}

#[tokio::test]
async fn test_contact_failure_is_retryable() {
    let transport = ScriptedTransport::new(vec![Err(CompanionError::Contact("timed out".into()))]);
    let session = client(ready(), transport);

    assert!(session.get_profile().await.unwrap_err().is_retryable());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_credentials_persisted_after_exchange() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("companion-session-{}", nanos));

    let mut store = CredentialStore::load(SecureStorage::new(&dir));
    store.set_login("cmdr@example.com", "hunter2");

    let transport = ScriptedTransport::new(vec![redirect_with_cookies(
        CONFIRM_PATH,
        &["mid=1893456000%7Cmachine; path=/"],
    )]);
    let session = client_with_store(store, transport);
    session.login().await.unwrap();

    let reloaded = CredentialStore::load(SecureStorage::new(&dir));
    assert_eq!(reloaded.credentials().email.as_deref(), Some("cmdr@example.com"));
    assert_eq!(
        reloaded.credentials().machine_id.as_deref(),
        Some("1893456000%7Cmachine")
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_profile_requests_share_one_fetch() {
    let transport = ScriptedTransport::with_latency(vec![ok(PROFILE)], Duration::from_millis(20));
    let session = client(ready(), transport.clone());

    let (first, second) = tokio::join!(session.get_profile(), session.get_profile());
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.paths(), vec![PROFILE_PATH]);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_profile_request_rechecks_session_state() {
    let transport = ScriptedTransport::with_latency(
        vec![
            redirect(LOGIN_PATH),
            Ok(ApiResponse {
                status: 200,
                ..Default::default()
            }),
        ],
        Duration::from_millis(20),
    );
    let session = client(ready(), transport.clone());

    let (first, second) = tokio::join!(session.get_profile(), session.get_profile());

    assert!(matches!(first, Err(CompanionError::Authentication(_))));
    assert!(matches!(second, Err(CompanionError::IllegalState(_))));
    assert_eq!(session.state(), SessionState::NeedsLogin);
    assert_eq!(transport.paths(), vec![PROFILE_PATH, LOGIN_PATH]);
}
