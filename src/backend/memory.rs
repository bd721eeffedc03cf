use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::{
    AccountIdentity, AuthBackend, BackendError, ProfileRecord, ProfileStore, ProfileUpdate, Session,
    SessionEvent, SessionEventHub, SessionEventStream, SignUpRequest,
};
use crate::auth::{issue_access_token, AccessClaims};
use crate::config::AuthConfig;
use crate::types::Role;

/// In-process stand-in for the hosted platform.
///
/// Used when no backend URL is configured and by the test suites, which
/// drive its knobs (profile latency, fetch failures, provisioning) to
/// reproduce the timing cases of the auth state machine.
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    events: SessionEventHub,
    token_secret: String,
    token_ttl_secs: u64,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    profiles: HashMap<String, ProfileRecord>,
    session: Option<Session>,
    profile_delays: HashMap<String, Duration>,
    fail_profile_fetches: bool,
    skip_provisioning: bool,
    require_email_confirmation: bool,
    unreachable: bool,
    sign_out_calls: usize,
    profile_fetches: usize,
}

struct Account {
    id: String,
    email: String,
    password: String,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(&AuthConfig::default())
    }
}

impl InMemoryBackend {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            events: SessionEventHub::default(),
            token_secret: config.token_secret.clone(),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Register an account together with its profile record; returns the subject id
    pub fn add_account(&self, email: &str, password: &str, full_name: Option<&str>, role: Role) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut state = self.state();
        state.accounts.insert(
            email.to_lowercase(),
            Account {
                id: id.clone(),
                email: email.to_string(),
                password: password.to_string(),
            },
        );
        state.profiles.insert(
            id.clone(),
            ProfileRecord {
                id: id.clone(),
                full_name: full_name.map(str::to_string),
                role,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Register an account whose profile record has not been provisioned
    pub fn add_account_without_profile(&self, email: &str, password: &str) -> String {
        let id = self.add_account(email, password, None, Role::Tenant);
        self.state().profiles.remove(&id);
        id
    }

    pub fn account_id(&self, email: &str) -> Option<String> {
        self.state().accounts.get(&email.to_lowercase()).map(|a| a.id.clone())
    }

    /// Mint a session for an existing subject without emitting anything
    pub fn issue_session(&self, subject_id: &str, email: Option<&str>) -> Result<Session, BackendError> {
        let claims = AccessClaims::new(subject_id, email, self.token_ttl_secs);
        let access_token = issue_access_token(&claims, &self.token_secret)?;

        Ok(Session {
            access_token,
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            subject_id: subject_id.to_string(),
            email: email.map(str::to_string),
            expires_at: claims.expires_at(),
        })
    }

    /// Pretend a session survived from a previous run
    pub fn restore(&self, session: Session) {
        self.state().session = Some(session);
    }

    /// Emit a notification as if it originated from the platform
    pub fn emit(&self, event: SessionEvent) {
        {
            let mut state = self.state();
            match event.session() {
                Some(session) => state.session = Some(session.clone()),
                None => state.session = None,
            }
        }
        self.events.emit(event);
    }

    pub fn set_profile_delay(&self, subject_id: &str, delay: Duration) {
        self.state().profile_delays.insert(subject_id.to_string(), delay);
    }

    pub fn set_profile_fetch_failure(&self, fail: bool) {
        self.state().fail_profile_fetches = fail;
    }

    /// When disabled, signup creates accounts without a profile record
    pub fn set_profile_provisioning(&self, enabled: bool) {
        self.state().skip_provisioning = !enabled;
    }

    pub fn set_email_confirmation(&self, required: bool) {
        self.state().require_email_confirmation = required;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn sign_out_calls(&self) -> usize {
        self.state().sign_out_calls
    }

    pub fn profile_fetches(&self) -> usize {
        self.state().profile_fetches
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self) -> Result<(), BackendError> {
        if self.state().unreachable {
            return Err(BackendError::Unexpected {
                status: 503,
                message: "backend unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for InMemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.ensure_reachable()?;
        let session = self.state().session.clone();
        Ok(session.filter(|s| !s.is_expired()))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.ensure_reachable()?;

        let (id, email) = {
            let state = self.state();
            match state.accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => (account.id.clone(), account.email.clone()),
                _ => return Err(BackendError::InvalidCredentials("Invalid login credentials".to_string())),
            }
        };

        let session = self.issue_session(&id, Some(&email))?;
        self.state().session = Some(session.clone());
        self.events.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<Option<Session>, BackendError> {
        self.ensure_reachable()?;

        if self.state().accounts.contains_key(&request.email.to_lowercase()) {
            return Err(BackendError::Rejected("User already registered".to_string()));
        }

        let id = self.add_account(&request.email, &request.password, Some(&request.full_name), request.role);

        let (skip_provisioning, require_confirmation) = {
            let state = self.state();
            (state.skip_provisioning, state.require_email_confirmation)
        };
        if skip_provisioning {
            self.state().profiles.remove(&id);
        }
        if require_confirmation {
            return Ok(None);
        }

        let session = self.issue_session(&id, Some(&request.email))?;
        self.state().session = Some(session.clone());
        self.events.emit(SessionEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = {
            let mut state = self.state();
            state.sign_out_calls += 1;
            state.session.take()
        };

        if previous.is_some() {
            self.events.emit(SessionEvent::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> SessionEventStream {
        self.events.subscribe()
    }

    fn cached_session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    async fn list_accounts(&self) -> Result<Vec<AccountIdentity>, BackendError> {
        self.ensure_reachable()?;
        Ok(self
            .state()
            .accounts
            .values()
            .map(|a| AccountIdentity {
                id: a.id.clone(),
                email: Some(a.email.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for InMemoryBackend {
    async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>, BackendError> {
        let (delay, fail) = {
            let mut state = self.state();
            state.profile_fetches += 1;
            (
                state.profile_delays.get(subject_id).copied(),
                state.fail_profile_fetches || state.unreachable,
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            return Err(BackendError::Unexpected {
                status: 500,
                message: "profile query failed".to_string(),
            });
        }

        Ok(self.state().profiles.get(subject_id).cloned())
    }

    async fn update_profile(&self, subject_id: &str, update: &ProfileUpdate) -> Result<(), BackendError> {
        self.ensure_reachable()?;
        // Like a filtered UPDATE, a missing row is not an error
        if let Some(record) = self.state().profiles.get_mut(subject_id) {
            record.full_name = update.full_name.clone();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_profiles(&self, role: Option<Role>) -> Result<Vec<ProfileRecord>, BackendError> {
        self.ensure_reachable()?;
        let mut profiles: Vec<ProfileRecord> = self
            .state()
            .profiles
            .values()
            .filter(|p| role.map(|r| p.role == r).unwrap_or(true))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }
}
