// Password authentication against Supabase GoTrue

use super::common::{parse_json, send, RemoteError, SupabaseClient};
use crate::models::auth::{AuthUser, Session};
use crate::store::SignUpOutcome;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
}

#[derive(Serialize)]
struct SignUpPayload<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Debug, Deserialize, Default)]
struct UserMetadata {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<UserBody> for AuthUser {
    fn from(u: UserBody) -> Self {
        AuthUser {
            id: u.id,
            email: u.email,
            full_name: u.user_metadata.and_then(|m| m.full_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    user: UserBody,
}

impl From<SessionBody> for Session {
    fn from(s: SessionBody) -> Self {
        Session {
            access_token: s.access_token,
            refresh_token: s.refresh_token,
            token_type: s.token_type,
            expires_in: s.expires_in,
            user: s.user.into(),
        }
    }
}

/// Sign-up answers with a session when email confirmation is disabled and
/// with the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(SessionBody),
    User(UserBody),
}

pub async fn sign_in_with_password(
    client: &SupabaseClient,
    email: &str,
    password: &str,
) -> Result<Session, RemoteError> {
    let url = client.auth_url("token");
    let req = client
        .public_post(&url)
        .query(&[("grant_type", "password")])
        .json(&PasswordGrant { email, password });
    let body: SessionBody = parse_json(send(req).await?).await?;
    Ok(body.into())
}

pub async fn sign_up(
    client: &SupabaseClient,
    email: &str,
    password: &str,
    full_name: &str,
) -> Result<SignUpOutcome, RemoteError> {
    let url = client.auth_url("signup");
    let req = client.public_post(&url).json(&SignUpPayload {
        email,
        password,
        data: SignUpMetadata { full_name },
    });
    let body: SignUpBody = parse_json(send(req).await?).await?;
    Ok(match body {
        SignUpBody::Session(session) => SignUpOutcome::SignedIn(session.into()),
        SignUpBody::User(user) => SignUpOutcome::ConfirmationRequired {
            email: user.email.unwrap_or_else(|| email.to_string()),
        },
    })
}
