//! Credentials Module
//!
//! Login details and the cookie tokens the companion API hands out, plus
//! their persistence.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::{SecureStorage, StorageError};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "CompanionApp";
/// Cookie carrying the machine id
pub const MACHINE_ID_COOKIE: &str = "mid";
/// Cookie carrying the machine token
pub const MACHINE_TOKEN_COOKIE: &str = "mtk";

/// Separator between the embedded expiry and the token proper (`|`, URL-encoded)
const EXPIRY_SEPARATOR: &str = "%7C";

const STORAGE_KEY: &str = "credentials";

/// Lifetime assumed for machine cookies without an embedded expiry
pub fn default_cookie_lifetime() -> Duration {
    Duration::days(7)
}

/// Credentials for the companion API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
    pub session_token: Option<String>,
    pub machine_id: Option<String>,
    pub machine_token: Option<String>,
}

impl Credentials {
    pub fn has_login(&self) -> bool {
        is_present(&self.email) && is_present(&self.password)
    }

    pub fn has_machine_cookies(&self) -> bool {
        is_present(&self.machine_id) && is_present(&self.machine_token)
    }

    /// Expiry of the machine id cookie
    pub fn machine_id_expiry(&self) -> Option<DateTime<Utc>> {
        self.machine_id.as_deref().map(cookie_expiry)
    }

    /// Expiry of the machine token cookie
    pub fn machine_token_expiry(&self) -> Option<DateTime<Utc>> {
        self.machine_token.as_deref().map(cookie_expiry)
    }

    /// True when both machine cookies exist and neither has expired at `now`
    pub fn machine_cookies_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (self.machine_id_expiry(), self.machine_token_expiry()) {
            (Some(id), Some(token)) => self.has_machine_cookies() && id > now && token > now,
            _ => false,
        }
    }

    /// Value for the `Cookie` request header, if any cookie is usable at
    /// `now`. Machine cookies past their embedded expiry are left out.
    pub fn cookie_header(&self, now: DateTime<Utc>) -> Option<String> {
        let machine = |value: &Option<String>| {
            value.clone().filter(|v| cookie_expiry(v) > now)
        };
        let pairs: Vec<String> = [
            (SESSION_COOKIE, self.session_token.clone()),
            (MACHINE_ID_COOKIE, machine(&self.machine_id)),
            (MACHINE_TOKEN_COOKIE, machine(&self.machine_token)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{}={}", name, v)))
        .collect();

        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Pick up rotated cookie values from `Set-Cookie` header values.
    ///
    /// Each cookie is matched independently; cookies not mentioned keep their
    /// current value. Returns true if anything changed.
    pub fn absorb_set_cookies<'a, I>(&mut self, headers: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut changed = false;
        for header in headers {
            for (pattern, slot) in [
                (session_pattern(), &mut self.session_token),
                (machine_id_pattern(), &mut self.machine_id),
                (machine_token_pattern(), &mut self.machine_token),
            ] {
                if let Some(found) = pattern.captures(header).and_then(|c| c.get(1)) {
                    let value = found.as_str().to_string();
                    if slot.as_deref() != Some(value.as_str()) {
                        *slot = Some(value);
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// Expiry embedded at the front of a machine cookie value.
///
/// Values look like `1489000000%7Cabcdef`. Anything without a parsable
/// prefix gets the default lifetime from now.
pub fn cookie_expiry(value: &str) -> DateTime<Utc> {
    let fallback = Utc::now() + default_cookie_lifetime();
    let Some((prefix, _)) = value.split_once(EXPIRY_SEPARATOR) else {
        return fallback;
    };

    match prefix.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single()) {
        Some(expiry) => expiry,
        None => {
            warn!("Failed to handle cookie expiry seconds {}", prefix);
            fallback
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

fn session_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CompanionApp=([^;]+)").expect("valid cookie pattern"))
}

fn machine_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bmid=([^;]+)").expect("valid cookie pattern"))
}

fn machine_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bmtk=([^;]+)").expect("valid cookie pattern"))
}

/// Holds the current credentials and writes them through to secure storage
pub struct CredentialStore {
    credentials: Credentials,
    storage: Option<SecureStorage>,
}

impl CredentialStore {
    /// Reload credentials from storage, starting empty if none are stored
    pub fn load(storage: SecureStorage) -> Self {
        let credentials = match storage.load::<Credentials>(STORAGE_KEY) {
            Ok(credentials) => {
                info!(
                    login = credentials.has_login(),
                    machine = credentials.has_machine_cookies(),
                    "Loaded stored credentials"
                );
                credentials
            }
            Err(StorageError::NotFound(_)) => {
                debug!("No stored credentials found");
                Credentials::default()
            }
            Err(e) => {
                warn!("Stored credentials unreadable, starting fresh: {}", e);
                Credentials::default()
            }
        };

        Self {
            credentials,
            storage: Some(storage),
        }
    }

    /// Credentials that are never written anywhere
    pub fn in_memory(credentials: Credentials) -> Self {
        Self {
            credentials,
            storage: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }

    /// Set the login details used by the next login
    pub fn set_login(&mut self, email: impl Into<String>, password: impl Into<String>) {
        self.credentials.email = Some(email.into());
        self.credentials.password = Some(password.into());
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.save(STORAGE_KEY, &self.credentials),
            None => Ok(()),
        }
    }
}
