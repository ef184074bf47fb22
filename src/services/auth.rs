//! Sign-in, sign-up and the persisted session.
//!
//! Every form action resolves to an [`AuthNotice`]; nothing here returns an
//! error to the caller except storage failures on sign-out/restore.

use std::sync::Arc;

use crate::database::local::{auth as session_store, StateDb};
use crate::models::auth::{AuthNotice, AuthUser, Session, SessionHandle, SIGN_IN_REDIRECT_DELAY};
use crate::store::{AuthBackend, SignUpOutcome};

pub const SIGN_IN_SUCCESS: &str = "Success. Redirecting to home...";
pub const SIGN_UP_SUCCESS: &str = "Sign up successful. Check your email to confirm your account.";

#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn AuthBackend>,
    db: StateDb,
    session: SessionHandle,
}

impl AuthService {
    pub fn new(backend: Arc<dyn AuthBackend>, db: StateDb, session: SessionHandle) -> Self {
        Self {
            backend,
            db,
            session,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.session.user().await
    }

    /// Load the session stored by a previous run, if any
    pub async fn restore_session(&self) -> Result<Option<AuthUser>, String> {
        let session = session_store::load_session(&self.db.0).await?;
        let user = session.as_ref().map(|s| s.user.clone());
        if let Some(user) = &user {
            log::info!("[auth] Restored session for {}", user.id);
        }
        self.session.set(session).await;
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthNotice {
        let email = email.trim();
        if let Err(message) = validate_email(email).and_then(|_| required("Password", password)) {
            return AuthNotice::error(message);
        }

        match self.backend.sign_in_with_password(email, password).await {
            Ok(session) => match self.persist(session).await {
                Ok(()) => AuthNotice::success(SIGN_IN_SUCCESS).with_redirect(SIGN_IN_REDIRECT_DELAY),
                Err(e) => AuthNotice::error(e),
            },
            Err(e) => {
                log::warn!("[auth] Sign in failed: {}", e);
                AuthNotice::error(e)
            }
        }
    }

    pub async fn sign_up(&self, full_name: &str, email: &str, password: &str) -> AuthNotice {
        let email = email.trim();
        let full_name = full_name.trim();
        if let Err(message) = required("Full name", full_name)
            .and_then(|_| validate_email(email))
            .and_then(|_| required("Password", password))
        {
            return AuthNotice::error(message);
        }

        match self.backend.sign_up(email, password, full_name).await {
            Ok(SignUpOutcome::SignedIn(session)) => match self.persist(session).await {
                Ok(()) => AuthNotice::success(SIGN_UP_SUCCESS),
                Err(e) => AuthNotice::error(e),
            },
            Ok(SignUpOutcome::ConfirmationRequired { email }) => {
                log::info!("[auth] Confirmation sent to {}", email);
                AuthNotice::success(SIGN_UP_SUCCESS)
            }
            Err(e) => {
                log::warn!("[auth] Sign up failed: {}", e);
                AuthNotice::error(e)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), String> {
        session_store::clear_session(&self.db.0).await?;
        self.session.set(None).await;
        log::info!("[auth] Signed out");
        Ok(())
    }

    async fn persist(&self, session: Session) -> Result<(), String> {
        session_store::store_session(&self.db.0, &session).await?;
        log::info!("[auth] Signed in as {}", session.user.id);
        self.session.set(Some(session)).await;
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    Ok(())
}

/// The same shape check a browser applies to `type=email` inputs
fn validate_email(email: &str) -> Result<(), String> {
    required("Email", email)?;
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid {
        return Err(format!("Please enter a valid email address: {}", email));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::local::state::init_memory_state_db;
    use crate::database::memory::MemoryBackend;
    use crate::models::auth::{NoticeKind, NOTICE_DURATION};

    async fn service(backend: &MemoryBackend) -> AuthService {
        let db = init_memory_state_db().await.unwrap();
        AuthService::new(Arc::new(backend.clone()), db, SessionHandle::default())
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada@localhost").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("ada").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@").is_err());
        assert!(validate_email("a da@example.com").is_err());
        assert!(validate_email("ada@@example.com").is_err());
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_persists_the_session() {
        let backend = MemoryBackend::new();
        backend.set_require_confirmation(true);
        let auth = service(&backend).await;

        let notice = auth.sign_up("Ada Lovelace", "ada@example.com", "hunter22").await;
        assert!(notice.is_success());
        assert_eq!(notice.message, SIGN_UP_SUCCESS);
        assert!(auth.current_user().await.is_none());

        let notice = auth.sign_in("ada@example.com", "hunter22").await;
        assert!(notice.is_success());
        assert_eq!(notice.duration_ms, NOTICE_DURATION.as_millis() as u64);
        assert_eq!(notice.redirect_after_ms, Some(2000));

        let user = auth.current_user().await.unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Ada Lovelace"));

        // A fresh handle over the same db picks the session back up.
        let restored = AuthService::new(Arc::new(backend), auth.db.clone(), SessionHandle::default());
        assert_eq!(restored.restore_session().await.unwrap().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn failed_sign_in_reports_the_backend_message() {
        let backend = MemoryBackend::new();
        let auth = service(&backend).await;
        let notice = auth.sign_in("nobody@example.com", "nope").await;
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.message, "Invalid login credentials");
        assert!(notice.redirect_after_ms.is_none());
        assert!(auth.current_user().await.is_none());
    }

    #[tokio::test]
    async fn invalid_form_input_never_reaches_the_backend() {
        let backend = MemoryBackend::new();
        let auth = service(&backend).await;

        assert!(!auth.sign_in("not-an-email", "pw").await.is_success());
        assert!(!auth.sign_in("ada@example.com", "").await.is_success());
        assert!(!auth.sign_up("", "ada@example.com", "pw").await.is_success());
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let backend = MemoryBackend::new();
        let auth = service(&backend).await;
        assert!(auth.sign_up("Ada", "ada@example.com", "pw").await.is_success());
        assert!(auth.current_user().await.is_some());

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().await.is_none());
        assert!(auth.restore_session().await.unwrap().is_none());
    }
}
