//! Identity provider over a GoTrue-compatible REST API.
//!
//! ## Error Mapping
//!
//! | `error_code` / `error` | Message hint | AuthError |
//! |---|---|---|
//! | `invalid_credentials`, `invalid_grant` | | `InvalidCredentials` |
//! | `email_not_confirmed` | "Email not confirmed" | `UnconfirmedEmail` |
//! | `user_already_exists`, `email_exists` | "already registered" | `EmailAlreadyRegistered` |
//! | `weak_password` | | `WeakPassword(msg)` |
//! | anything else, transport failures | | `Unknown(msg)` |
//!
//! The local session lives in an [`IdentityHub`]; every transition is
//! sequenced and fanned out to subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use precinct_auth::{
    AuthError, Credentials, Identity, IdentityEventKind, IdentityHub, IdentityMetadata,
    IdentityProvider, IdentitySnapshot, SignUpAttributes, SignUpOutcome, Subscription,
};
use precinct_core::UserId;

use crate::AppConfig;

#[derive(Debug)]
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
    hub: IdentityHub,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: IdentityMetadata,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: IdentityMetadata,
    /// Present on sign-up responses; empty when the email is already taken
    /// and the server hides that fact.
    #[serde(default)]
    identities: Option<Vec<serde_json::Value>>,
}

impl UserBody {
    fn into_identity(self) -> Identity {
        Identity {
            id: UserId::from_uuid(self.id),
            email: self.email.unwrap_or_default(),
            confirmed: self.email_confirmed_at.is_some() || self.confirmed_at.is_some(),
            metadata: self.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserBody,
}

impl SessionBody {
    fn split(self, now: DateTime<Utc>) -> (Identity, Credentials) {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        let credentials = Credentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        };
        (self.user.into_identity(), credentials)
    }
}

/// Sign-up answers with a session when no confirmation is required, and with
/// the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(SessionBody),
    User(UserBody),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Map an error response to an [`AuthError`].
pub fn classify_error(status: u16, body: &str) -> AuthError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .filter(|m| !m.trim().is_empty());
    let code = parsed.error_code.or(parsed.error).unwrap_or_default();
    let hint = message.as_deref().unwrap_or_default().to_lowercase();

    match code.as_str() {
        "email_not_confirmed" => AuthError::UnconfirmedEmail,
        _ if hint.contains("email not confirmed") => AuthError::UnconfirmedEmail,
        "invalid_credentials" | "invalid_grant" => AuthError::InvalidCredentials,
        "user_already_exists" | "email_exists" => AuthError::EmailAlreadyRegistered,
        _ if hint.contains("already registered") => AuthError::EmailAlreadyRegistered,
        "weak_password" => {
            AuthError::WeakPassword(message.unwrap_or_else(|| "password rejected".to_string()))
        }
        _ => AuthError::Unknown(
            message.unwrap_or_else(|| format!("Request failed with status {status}")),
        ),
    }
}

fn transport(err: reqwest::Error) -> AuthError {
    AuthError::Unknown(format!("network error: {err}"))
}

impl HttpIdentityProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            hub: IdentityHub::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.auth_url, &config.auth_api_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/auth/v1/{}", self.base_url, path))
            .header("apikey", &self.api_key)
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, AuthError> {
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| AuthError::Unknown(format!("unexpected response from identity service: {e}")))
    }

    /// Exchange the refresh token for new credentials.
    #[instrument(skip(self), err)]
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        let snapshot = self.hub.snapshot();
        let Some(refresh_token) = snapshot.credentials.and_then(|c| c.refresh_token) else {
            return Err(AuthError::Unknown("no session to refresh".to_string()));
        };

        let response = self
            .post("token?grant_type=refresh_token")
            .json(&RefreshGrant { refresh_token: &refresh_token })
            .send()
            .await
            .map_err(transport)?;
        let session: SessionBody = Self::read(response).await?;
        let (identity, credentials) = session.split(Utc::now());
        self.hub.publish(
            IdentityEventKind::TokenRefreshed,
            Some(identity),
            Some(credentials),
        );
        debug!("session refreshed");
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self, password), err)]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let response = self
            .post("token?grant_type=password")
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(transport)?;
        let session: SessionBody = Self::read(response).await?;
        let (identity, credentials) = session.split(Utc::now());

        self.hub.publish(
            IdentityEventKind::SignedIn,
            Some(identity.clone()),
            Some(credentials),
        );
        info!(user_id = %identity.id, "signed in");
        Ok(identity)
    }

    #[instrument(skip(self, password, attributes), fields(role = %attributes.role), err)]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .post("signup")
            .json(&SignUpBody {
                email,
                password,
                data: attributes.to_metadata(),
            })
            .send()
            .await
            .map_err(transport)?;

        match Self::read::<SignUpResponse>(response).await? {
            SignUpResponse::Session(session) => {
                let (identity, credentials) = session.split(Utc::now());
                self.hub.publish(
                    IdentityEventKind::SignedIn,
                    Some(identity.clone()),
                    Some(credentials),
                );
                Ok(SignUpOutcome {
                    identity,
                    confirmed: true,
                })
            }
            SignUpResponse::User(user) => {
                if user.identities.as_ref().is_some_and(Vec::is_empty) {
                    return Err(AuthError::EmailAlreadyRegistered);
                }
                let identity = user.into_identity();
                let confirmed = identity.confirmed;
                Ok(SignUpOutcome { identity, confirmed })
            }
        }
    }

    /// The local session is dropped even when the server call fails.
    #[instrument(skip(self))]
    async fn sign_out(&self) {
        let token = self.hub.snapshot().credentials.map(|c| c.access_token);
        if let Some(token) = token {
            let result = self.post("logout").bearer_auth(token).send().await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(status = %response.status(), "server sign-out rejected"),
                Err(err) => warn!(error = %err, "server sign-out failed"),
            }
        }
        self.hub.publish(IdentityEventKind::SignedOut, None, None);
    }

    fn current_session(&self) -> IdentitySnapshot {
        self.hub.snapshot()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_codes() {
        assert_eq!(
            classify_error(400, r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            classify_error(400, r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#),
            AuthError::UnconfirmedEmail
        );
        assert_eq!(
            classify_error(422, r#"{"error_code":"user_already_exists","msg":"User already registered"}"#),
            AuthError::EmailAlreadyRegistered
        );
        assert_eq!(
            classify_error(422, r#"{"error_code":"weak_password","msg":"Password should be at least 6 characters."}"#),
            AuthError::WeakPassword("Password should be at least 6 characters.".to_string())
        );
    }

    #[test]
    fn unknown_errors_keep_the_message() {
        assert_eq!(
            classify_error(429, r#"{"error_code":"over_request_rate_limit","msg":"Too many requests"}"#),
            AuthError::Unknown("Too many requests".to_string())
        );
        assert_eq!(
            classify_error(502, "<html>bad gateway</html>"),
            AuthError::Unknown("Request failed with status 502".to_string())
        );
    }

    #[test]
    fn session_response_becomes_identity_and_credentials() {
        let body = r#"{
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": {
                "id": "0190f5c2-8a4e-7c3b-9d1e-2f3a4b5c6d7e",
                "email": "civilian@example.com",
                "email_confirmed_at": "2024-01-01T00:00:00Z",
                "user_metadata": {"role": "civilian", "display_name": "Jane", "extra": 1}
            }
        }"#;
        let now = Utc::now();
        let session: SessionBody = serde_json::from_str(body).expect("session");
        let (identity, credentials) = session.split(now);

        assert_eq!(identity.email, "civilian@example.com");
        assert!(identity.confirmed);
        assert_eq!(identity.metadata.display_name.as_deref(), Some("Jane"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("rt"));
        assert_eq!(credentials.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn unconfirmed_sign_up_is_a_bare_user() {
        let body = r#"{
            "id": "0190f5c2-8a4e-7c3b-9d1e-2f3a4b5c6d7e",
            "email": "officer@example.com",
            "user_metadata": {"role": "police"},
            "identities": [{"provider": "email"}]
        }"#;
        match serde_json::from_str::<SignUpResponse>(body).expect("response") {
            SignUpResponse::User(user) => {
                let identity = user.into_identity();
                assert!(!identity.confirmed);
                assert_eq!(identity.metadata.role.as_deref(), Some("police"));
            }
            SignUpResponse::Session(_) => panic!("expected a bare user"),
        }
    }
}
