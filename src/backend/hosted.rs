use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use reqwest::{header, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use super::{
    AccountIdentity, AuthBackend, BackendError, ProfileRecord, ProfileStore, ProfileUpdate, Session,
    SessionEvent, SessionEventHub, SessionEventStream, SignUpRequest,
};
use crate::auth::read_access_claims;
use crate::config::BackendConfig;
use crate::types::Role;

/// Client for the hosted platform: GoTrue-style auth under `/auth/v1` and
/// PostgREST-style tables under `/rest/v1`.
///
/// The platform pushes no events over HTTP, so this client emits the
/// session transitions it causes itself (sign-in, refresh, sign-out).
pub struct HostedBackend {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    service_key: Option<String>,
    session: Mutex<Option<Session>>,
    events: SessionEventHub,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserList {
    users: Vec<RemoteUser>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
    }
}

impl HostedBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let url = config.url.as_deref().ok_or(BackendError::ConfigMissing("BACKEND_URL"))?;
        let anon_key = config
            .anon_key
            .clone()
            .ok_or(BackendError::ConfigMissing("BACKEND_ANON_KEY"))?;

        // Trailing slash so relative joins keep any base path
        let base = Url::parse(&format!("{}/", url.trim_end_matches('/')))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            anon_key,
            service_key: config.service_key.clone(),
            session: Mutex::new(None),
            events: SessionEventHub::default(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    fn stored_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bearer for table queries: the user's token when signed in, else the anon key
    fn bearer(&self) -> String {
        self.stored_session()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, url: Url, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        let response = Self::send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let invalid_grant = body.error.as_deref() == Some("invalid_grant");
        let message = body.into_message(status);

        Err(match status {
            StatusCode::BAD_REQUEST if invalid_grant => BackendError::InvalidCredentials(message),
            s if s.is_client_error() => BackendError::Rejected(message),
            s => BackendError::Unexpected {
                status: s.as_u16(),
                message,
            },
        })
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response: TokenResponse =
            Self::send_json(self.request(reqwest::Method::POST, url, &self.anon_key).json(&body)).await?;
        session_from_token(response)
    }

    fn commit(&self, session: Option<Session>, event: SessionEvent) {
        *self.stored_session() = session;
        self.events.emit(event);
    }
}

/// Build a session from a token grant, falling back to the token's own
/// claims for anything the response omits.
fn session_from_token(response: TokenResponse) -> Result<Session, BackendError> {
    let claims = read_access_claims(&response.access_token)?;

    let expires_at = response
        .expires_at
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .or_else(|| response.expires_in.map(|secs| Utc::now() + ChronoDuration::seconds(secs)))
        .or_else(|| claims.expires_at());

    let (subject_id, email) = match response.user {
        Some(user) => (user.id, user.email.or(claims.email)),
        None => (claims.sub, claims.email),
    };

    Ok(Session {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        subject_id,
        email,
        expires_at,
    })
}

#[async_trait]
impl AuthBackend for HostedBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let stored = self.stored_session().clone();
        let session = match stored {
            Some(session) if session.is_expired() => session,
            other => return Ok(other),
        };

        let Some(refresh_token) = session.refresh_token.clone() else {
            self.commit(None, SessionEvent::SignedOut);
            return Ok(None);
        };

        match self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(refreshed) => {
                self.commit(Some(refreshed.clone()), SessionEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(BackendError::Rejected(msg)) | Err(BackendError::InvalidCredentials(msg)) => {
                tracing::warn!("Session refresh rejected: {}", msg);
                self.commit(None, SessionEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;

        self.commit(Some(session.clone()), SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<Session>, BackendError> {
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": {
                "full_name": request.full_name,
                "role": request.role,
            }
        });

        let url = self.endpoint("auth/v1/signup")?;
        let response: Value =
            Self::send_json(self.request(reqwest::Method::POST, url, &self.anon_key).json(&body)).await?;

        // Without auto-confirm the platform answers with the bare user object
        if response.get("access_token").is_none() {
            return Ok(None);
        }

        let token: TokenResponse =
            serde_json::from_value(response).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let session = session_from_token(token)?;
        self.commit(Some(session.clone()), SessionEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let stored = self.stored_session().clone();
        let Some(session) = stored else {
            return Ok(());
        };

        let result = match self.endpoint("auth/v1/logout") {
            Ok(url) => Self::send(self.request(reqwest::Method::POST, url, &session.access_token))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        // The local session goes away even when revocation fails
        if let Err(e) = &result {
            tracing::warn!("Remote sign-out failed, clearing local session anyway: {}", e);
        }
        self.commit(None, SessionEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> SessionEventStream {
        self.events.subscribe()
    }

    fn cached_session(&self) -> Option<Session> {
        self.stored_session().clone()
    }

    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>, BackendError> {
        let service_key = self
            .service_key
            .clone()
            .ok_or(BackendError::ConfigMissing("BACKEND_SERVICE_KEY"))?;

        let url = self.endpoint("auth/v1/admin/users")?;
        let list: UserList = Self::send_json(self.request(reqwest::Method::GET, url, &service_key)).await?;

        Ok(list
            .users
            .into_iter()
            .map(|u| AccountIdentity { id: u.id, email: u.email })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for HostedBackend {
    async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>, BackendError> {
        let mut url = self.endpoint("rest/v1/profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", subject_id))
            .append_pair("select", "*")
            .append_pair("limit", "1");

        let rows: Vec<ProfileRecord> = Self::send_json(self.request(reqwest::Method::GET, url, &self.bearer())).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(&self, subject_id: &str, update: &ProfileUpdate) -> Result<(), BackendError> {
        let mut url = self.endpoint("rest/v1/profiles")?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", subject_id));

        let body = json!({
            "full_name": update.full_name,
            "updated_at": Utc::now(),
        });

        Self::send(
            self.request(reqwest::Method::PATCH, url, &self.bearer())
                .header("Prefer", "return=minimal")
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_profiles(&self, role: Option<Role>) -> Result<Vec<ProfileRecord>, BackendError> {
        let mut url = self.endpoint("rest/v1/profiles")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            if let Some(role) = role {
                query.append_pair("role", &format!("eq.{}", role));
            }
            query.append_pair("order", "created_at.desc");
        }

        Self::send_json(self.request(reqwest::Method::GET, url, &self.bearer())).await
    }
}
