use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use ts_rs::TS;

#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[ts(export, export_to = "../web/src/bindings/auth.ts")]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Authenticated session as persisted in the state db
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

/// Shared view of the current session. Cloned into every component that
/// needs to authenticate requests or know who the viewer is.
#[derive(Clone, Default)]
pub struct SessionHandle(Arc<RwLock<Option<Session>>>);

impl SessionHandle {
    pub async fn current(&self) -> Option<Session> {
        self.0.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.0.read().await.as_ref().map(|s| s.access_token.clone())
    }

    pub async fn user(&self) -> Option<AuthUser> {
        self.0.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn set(&self, session: Option<Session>) {
        *self.0.write().await = session;
    }
}

#[derive(TS, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[ts(export, export_to = "../web/src/bindings/auth.ts")]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

/// How long a notice stays on screen
pub const NOTICE_DURATION: Duration = Duration::from_millis(3000);
/// Delay between a successful sign-in and the redirect home
pub const SIGN_IN_REDIRECT_DELAY: Duration = Duration::from_millis(2000);

/// Transient notification produced by the auth forms
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../web/src/bindings/auth.ts")]
#[ts(rename_all = "camelCase")]
pub struct AuthNotice {
    pub kind: NoticeKind,
    pub message: String,
    #[ts(type = "number")]
    pub duration_ms: u64,
    #[ts(type = "number | null")]
    pub redirect_after_ms: Option<u64>,
}

impl AuthNotice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
            duration_ms: NOTICE_DURATION.as_millis() as u64,
            redirect_after_ms: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            duration_ms: NOTICE_DURATION.as_millis() as u64,
            redirect_after_ms: None,
        }
    }

    pub fn with_redirect(mut self, after: Duration) -> Self {
        self.redirect_after_ms = Some(after.as_millis() as u64);
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == NoticeKind::Success
    }
}
