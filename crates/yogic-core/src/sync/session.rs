//! Signed-in user, shared between the scheduler and the host app.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    /// Bearer token for backend calls
    pub access_token: Option<String>,
    /// Guests can walk but never sync
    pub is_guest: bool,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token,
            is_guest: false,
        }
    }

    pub fn guest() -> Self {
        Self {
            user_id: "guest".to_string(),
            access_token: None,
            is_guest: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<UserSession>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, session: UserSession) {
        info!(
            "Session started for {} (guest: {})",
            session.user_id, session.is_guest
        );
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn sign_out(&self) {
        if self
            .inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            info!("Session ended");
        }
    }

    pub fn current(&self) -> Option<UserSession> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The current session if it belongs to a real (non-guest) user
    pub fn authenticated(&self) -> Option<UserSession> {
        self.current().filter(|s| !s.is_guest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_is_not_authenticated() {
        let handle = SessionHandle::new();
        assert!(handle.authenticated().is_none());

        handle.sign_in(UserSession::guest());
        assert!(handle.current().is_some());
        assert!(handle.authenticated().is_none());

        handle.sign_in(UserSession::new("user-1", Some("token".into())));
        assert_eq!(handle.authenticated().unwrap().user_id, "user-1");

        handle.sign_out();
        assert!(handle.current().is_none());
    }
}
