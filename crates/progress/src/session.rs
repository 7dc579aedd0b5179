//! Session credentials shared by every request the tracker makes.
//!
//! A [`Session`] is created by the caller and handed to the API client
//! explicitly, so tests can run against an anonymous session and several
//! clients can share one refreshed token.

use std::sync::RwLock;

/// Bearer credentials with an optional refresh token.
#[derive(Debug, Default)]
pub struct Session {
    access_token: RwLock<Option<String>>,
    refresh_token: Option<String>,
}

impl Session {
    /// Session that sends no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: RwLock::new(access_token),
            refresh_token,
        }
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Replace the access token after a successful refresh.
    pub fn set_access_token(&self, token: String) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
    }
}
