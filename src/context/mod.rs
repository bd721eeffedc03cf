//! Process-wide authentication state.
//!
//! [`AuthContext`] is the single writer of the session/profile pair. Every
//! other component reads [`AuthState`] snapshots and the role flags derived
//! from them.
//!
//! States: `uninitialized -> loading -> {authenticated, anonymous}`, with
//! login/signup passing back through `loading`. Each transition advances a
//! generation counter, and a profile fetch commits only while the
//! generation it started under is still current, so a slow fetch for an
//! older session can never overwrite a newer one.

pub mod notify;

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

use crate::backend::{AuthBackend, BackendError, ProfileStore, ProfileUpdate, Session, SessionEvent, SignUpRequest};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::profile::{Profile, ProfileResolver, User};
use crate::session::{SessionStore, SessionSubscription};
use crate::types::{Role, RoleFlags};
use crate::validation;

pub use notify::{Notification, NotificationLevel, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

/// Committed auth state as observed by readers
#[derive(Debug, Clone)]
pub struct AuthState {
    pub status: AuthStatus,
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub user: Option<User>,
    pub error: Option<String>,
    generation: u64,
    disposed: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            status: AuthStatus::Uninitialized,
            session: None,
            profile: None,
            user: None,
            error: None,
            generation: 0,
            disposed: false,
        }
    }
}

impl AuthState {
    /// Resolution still pending; guards must neither render nor redirect
    pub fn is_loading(&self) -> bool {
        matches!(self.status, AuthStatus::Uninitialized | AuthStatus::Loading)
    }

    /// The committed user, only while authenticated
    pub fn user(&self) -> Option<&User> {
        match self.status {
            AuthStatus::Authenticated => self.user.as_ref(),
            _ => None,
        }
    }

    pub fn flags(&self) -> RoleFlags {
        RoleFlags::from_role(self.user().map(|u| u.role))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

tokio::task_local! {
    static CURRENT_AUTH: AuthContext;
}

/// Handle to the auth context currently provided to this task.
///
/// # Panics
///
/// Outside an [`AuthContext::provide`] scope. That is a wiring defect, not a
/// runtime condition. Task-locals do not cross `tokio::spawn`.
pub fn use_auth() -> AuthContext {
    CURRENT_AUTH
        .try_with(AuthContext::clone)
        .unwrap_or_else(|_| panic!("use_auth must be used within an AuthContext::provide scope"))
}

/// Injectable auth state machine with an explicit `init`/`dispose` lifecycle.
/// Clones share one state.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: SessionStore,
    resolver: ProfileResolver,
    profiles: Arc<dyn ProfileStore>,
    config: AuthConfig,
    state: watch::Sender<AuthState>,
    notifier: Notifier,
    subscription: Mutex<Option<SessionSubscription>>,
}

impl AuthContext {
    pub fn new(backend: Arc<dyn AuthBackend>, profiles: Arc<dyn ProfileStore>, config: AuthConfig) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        let notifier = Notifier::new(config.notification_capacity);

        Self {
            inner: Arc::new(Inner {
                sessions: SessionStore::new(backend),
                resolver: ProfileResolver::new(profiles.clone()),
                profiles,
                config,
                state,
                notifier,
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Build from a backend that serves both auth and profile records
    pub fn with_backend<B>(backend: Arc<B>, config: AuthConfig) -> Self
    where
        B: AuthBackend + ProfileStore + 'static,
    {
        Self::new(backend.clone(), backend, config)
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn flags(&self) -> RoleFlags {
        self.inner.state.borrow().flags()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.inner.profiles
    }

    /// Run `fut` with this context available through [`use_auth`]
    pub async fn provide<F: Future>(&self, fut: F) -> F::Output {
        CURRENT_AUTH.scope(self.clone(), fut).await
    }

    /// Subscribe to session changes, restore any surviving session, and wait
    /// until the state settles. Only the first call has an effect.
    pub async fn init(&self) {
        let started = self.inner.state.send_if_modified(|s| {
            if s.disposed || s.status != AuthStatus::Uninitialized {
                return false;
            }
            s.status = AuthStatus::Loading;
            true
        });
        if !started {
            tracing::debug!("Auth context already initialized");
            return;
        }

        // Subscribe before restoring so no transition emitted meanwhile is lost
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let subscription = self.inner.sessions.observe_session_changes(move |event| {
            if let Some(inner) = weak.upgrade() {
                AuthContext { inner }.on_session_event(event);
            }
        });
        *self.subscription() = Some(subscription);

        let generation = self.inner.state.borrow().generation;
        match self.inner.sessions.restore_session().await {
            Some(session) => {
                tracing::info!("Restored session for subject '{}'", session.subject_id);
                self.apply_session(session, Some(generation));
            }
            None => {
                self.inner.state.send_if_modified(|s| {
                    // A notification may already have moved the machine on
                    if s.disposed || s.generation != generation {
                        return false;
                    }
                    s.generation += 1;
                    s.status = AuthStatus::Anonymous;
                    true
                });
            }
        }

        self.settled().await;
    }

    /// Wait until no resolution is pending
    pub async fn settled(&self) {
        let mut rx = self.watch();
        let _ = rx.wait_for(|s| s.disposed || !s.is_loading()).await;
    }

    /// Release the session subscription and discard in-flight fetches
    pub fn dispose(&self) {
        self.inner.state.send_modify(|s| {
            s.disposed = true;
            s.generation += 1;
        });
        if let Some(subscription) = self.subscription().take() {
            subscription.unsubscribe();
        }
        tracing::debug!("Auth context disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().disposed
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.ensure_live()?;
        if let Err(fields) = validation::validate_login(email, password) {
            return Err(self.fail("Login failed", AuthError::validation(fields)));
        }

        let generation = self.begin_attempt();
        match self.backend().sign_in_with_password(email, password).await {
            Ok(session) => {
                tracing::info!("Signed in subject '{}'", session.subject_id);
                self.apply_session(session.clone(), Some(generation));
                self.await_user(&session).await
            }
            Err(e) => Err(self.fail_attempt(generation, "Login failed", e.into())),
        }
    }

    /// Sign up with the default `tenant` role
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<Option<User>, AuthError> {
        self.signup_as(email, password, name, Role::default()).await
    }

    /// Sign up requesting `role`. Resolves to `None` when the backend wants
    /// the address confirmed before issuing a session.
    ///
    /// The requested role goes to backend-side provisioning as-is; nothing
    /// here is a security boundary for the administrative role.
    pub async fn signup_as(&self, email: &str, password: &str, name: &str, role: Role) -> Result<Option<User>, AuthError> {
        self.ensure_live()?;
        if let Err(fields) = validation::validate_signup(email, password, name, self.inner.config.min_password_length) {
            return Err(self.fail("Signup failed", AuthError::validation(fields)));
        }
        if role == Role::SuperAdmin {
            if !self.inner.config.allow_admin_signup {
                return Err(self.fail("Signup failed", AuthError::RoleNotPermitted(role)));
            }
            tracing::warn!("Self-service signup for '{}' requested the {} role", email, role);
        }

        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: name.to_string(),
            role,
        };

        let generation = self.begin_attempt();
        match self.backend().sign_up(&request).await {
            Ok(Some(session)) => {
                tracing::info!("Signed up subject '{}' as {}", session.subject_id, role);
                self.apply_session(session.clone(), Some(generation));
                let user = self.await_user(&session).await?;
                self.inner
                    .notifier
                    .notify(Notification::success("Account created", "Welcome to RealtyInsight"));
                Ok(Some(user))
            }
            Ok(None) => {
                self.inner.state.send_if_modified(|s| {
                    if s.generation != generation {
                        return false;
                    }
                    s.status = Self::resting_status(s);
                    true
                });
                self.inner.notifier.notify(Notification::info(
                    "Check your email",
                    "Confirm your email address to finish creating your account",
                ));
                Ok(None)
            }
            Err(e) => Err(self.fail_attempt(generation, "Signup failed", e.into())),
        }
    }

    /// Sign out and clear local state. Returns whether a transition happened;
    /// calling it while anonymous does nothing.
    pub async fn logout(&self) -> bool {
        // Commit locally first; the backend's own SignedOut then finds
        // nothing left to clear
        if !self.apply_signed_out() {
            return false;
        }

        if let Err(e) = self.backend().sign_out().await {
            tracing::warn!("Backend sign-out failed, local session already cleared: {}", e);
        }
        self.inner.sessions.clear();
        true
    }

    /// Re-read the current subject's profile and replace the committed one.
    /// No-op without a session.
    pub async fn refresh_profile(&self) {
        let Some((session, generation)) = self.claim_generation() else {
            return;
        };

        let profile = self.inner.resolver.resolve_profile(&session).await;
        self.commit_profile(generation, &session, profile);
    }

    /// Persist a new display name, then re-fetch rather than patching locally
    pub async fn update_profile(&self, full_name: Option<String>) -> Result<(), AuthError> {
        self.ensure_live()?;
        let current = self.inner.state.borrow().session.clone();
        let Some(session) = current else {
            return Err(self.fail("Update failed", BackendError::NoSession.into()));
        };

        let update = ProfileUpdate { full_name };
        match self.inner.profiles.update_profile(&session.subject_id, &update).await {
            Ok(()) => {
                self.refresh_profile().await;
                self.inner.notifier.notify(Notification::success(
                    "Profile updated",
                    "Your profile has been updated successfully",
                ));
                Ok(())
            }
            Err(e) => Err(self.fail("Update failed", e.into())),
        }
    }

    fn backend(&self) -> &Arc<dyn AuthBackend> {
        self.inner.sessions.backend()
    }

    fn subscription(&self) -> MutexGuard<'_, Option<SessionSubscription>> {
        self.inner.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<(), AuthError> {
        if self.is_disposed() {
            tracing::warn!("Auth operation on a disposed context");
            return Err(AuthError::Disposed);
        }
        Ok(())
    }

    fn on_session_event(&self, event: SessionEvent) {
        tracing::debug!("Auth context received {}", event.kind());

        // Events queue behind the context's own calls. One that no longer
        // matches the backend's session has been overtaken by a later
        // transition, which is either applied already or still queued.
        if event.session() != self.backend().cached_session().as_ref() {
            tracing::debug!("Skipping superseded {} event", event.kind());
            return;
        }

        match event {
            SessionEvent::SignedOut | SessionEvent::InitialSession(None) => {
                self.apply_signed_out();
            }
            SessionEvent::InitialSession(Some(session))
            | SessionEvent::SignedIn(session)
            | SessionEvent::TokenRefreshed(session)
            | SessionEvent::UserUpdated(session) => self.apply_session(session, None),
        }
    }

    /// Commit a session and schedule its profile fetch on a separate task.
    ///
    /// With `expected`, nothing happens unless the generation is unchanged.
    /// A session identical to the committed one is ignored. A new token for
    /// the already-authenticated subject keeps the current profile visible
    /// while it is re-fetched.
    fn apply_session(&self, session: Session, expected: Option<u64>) {
        let mut scheduled = None;
        self.inner.state.send_if_modified(|s| {
            if s.disposed || expected.is_some_and(|g| g != s.generation) {
                return false;
            }
            let in_progress = matches!(s.status, AuthStatus::Loading | AuthStatus::Authenticated);
            if in_progress && s.session.as_ref() == Some(&session) {
                return false;
            }

            let same_subject = s.status == AuthStatus::Authenticated
                && s.user.as_ref().is_some_and(|u| u.id == session.subject_id);

            s.generation += 1;
            s.session = Some(session.clone());
            if !same_subject {
                s.status = AuthStatus::Loading;
                s.profile = None;
                s.user = None;
            }
            scheduled = Some(s.generation);
            true
        });

        if let Some(generation) = scheduled {
            self.spawn_resolution(generation, session);
        }
    }

    fn spawn_resolution(&self, generation: u64, session: Session) {
        let resolver = self.inner.resolver.clone();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let profile = resolver.resolve_profile(&session).await;
            match weak.upgrade() {
                Some(inner) => {
                    AuthContext { inner }.commit_profile(generation, &session, profile);
                }
                None => tracing::debug!("Auth context dropped before profile for '{}' arrived", session.subject_id),
            }
        });
    }

    fn commit_profile(&self, generation: u64, session: &Session, profile: Profile) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.disposed || s.generation != generation {
                tracing::debug!(
                    "Discarding stale profile for '{}' (generation {} != {})",
                    session.subject_id,
                    generation,
                    s.generation
                );
                return false;
            }

            s.user = Some(User::from_parts(session, &profile));
            s.profile = Some(profile);
            s.status = AuthStatus::Authenticated;
            s.error = None;
            true
        })
    }

    /// Clear to anonymous. Returns whether readers saw a change.
    fn apply_signed_out(&self) -> bool {
        self.inner.state.send_if_modified(|s| {
            if s.disposed {
                return false;
            }
            // Bumped even when already anonymous, so any fetch still in
            // flight can no longer commit
            s.generation += 1;
            if s.status == AuthStatus::Anonymous && s.session.is_none() {
                return false;
            }
            s.session = None;
            s.profile = None;
            s.user = None;
            s.status = AuthStatus::Anonymous;
            true
        })
    }

    /// Advance the generation for a profile refresh without notifying readers.
    /// `send_if_modified` keeps the mutation but skips the notification when
    /// the closure returns false.
    fn claim_generation(&self) -> Option<(Session, u64)> {
        let mut claimed = None;
        self.inner.state.send_if_modified(|s| {
            if s.disposed {
                return false;
            }
            if let Some(session) = s.session.clone() {
                s.generation += 1;
                claimed = Some((session, s.generation));
            }
            false
        });
        claimed
    }

    fn begin_attempt(&self) -> u64 {
        let mut generation = 0;
        self.inner.state.send_modify(|s| {
            s.generation += 1;
            s.error = None;
            s.status = AuthStatus::Loading;
            generation = s.generation;
        });
        generation
    }

    /// Where the machine rests when an attempt ends without a new session
    fn resting_status(s: &AuthState) -> AuthStatus {
        if s.session.is_some() && s.user.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        }
    }

    fn fail_attempt(&self, generation: u64, title: &str, err: AuthError) -> AuthError {
        self.inner.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.status = Self::resting_status(s);
            true
        });
        self.fail(title, err)
    }

    fn fail(&self, title: &str, err: AuthError) -> AuthError {
        let message = err.user_message();
        tracing::warn!("{}: {}", title, err);
        self.inner.state.send_modify(|s| s.error = Some(message.clone()));
        self.inner.notifier.notify(Notification::destructive(title, message));
        err
    }

    async fn await_user(&self, session: &Session) -> Result<User, AuthError> {
        let mut rx = self.watch();
        let settled = rx
            .wait_for(|s| s.disposed || !s.is_loading())
            .await
            .map(|s| s.clone());

        let state = match settled {
            Ok(state) => state,
            Err(_) => return Err(AuthError::Disposed),
        };
        if state.disposed {
            return Err(AuthError::Disposed);
        }

        match state.user() {
            Some(user) if user.id == session.subject_id => Ok(user.clone()),
            _ => {
                tracing::debug!("Session for '{}' was superseded before it resolved", session.subject_id);
                Err(AuthError::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use std::time::Duration;

    fn context() -> (Arc<InMemoryBackend>, AuthContext) {
        let backend = Arc::new(InMemoryBackend::default());
        let ctx = AuthContext::with_backend(backend.clone(), AuthConfig::default());
        (backend, ctx)
    }

    #[tokio::test]
    async fn starts_uninitialized_and_settles_anonymous() {
        let (_backend, ctx) = context();
        assert_eq!(ctx.state().status, AuthStatus::Uninitialized);
        assert!(ctx.state().is_loading());

        ctx.init().await;
        assert_eq!(ctx.state().status, AuthStatus::Anonymous);
        assert_eq!(ctx.flags(), RoleFlags::default());
    }

    #[tokio::test]
    async fn restores_surviving_session() {
        let (backend, ctx) = context();
        let id = backend.add_account("owner@example.com", "secret1", Some("Owner"), Role::Landlord);
        backend.restore(backend.issue_session(&id, Some("owner@example.com")).unwrap());

        ctx.init().await;
        let state = ctx.state();
        assert_eq!(state.status, AuthStatus::Authenticated);
        assert!(state.flags().is_landlord);
        assert_eq!(state.user().unwrap().email.as_deref(), Some("owner@example.com"));
    }

    #[tokio::test]
    async fn restore_failure_resolves_anonymous() {
        let (backend, ctx) = context();
        backend.set_unreachable(true);

        ctx.init().await;
        assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    }

    #[tokio::test]
    async fn failed_login_stays_anonymous_with_error() {
        let (backend, ctx) = context();
        backend.add_account("t@example.com", "secret1", None, Role::Tenant);
        ctx.init().await;
        let mut toasts = ctx.notifier().subscribe();

        let err = ctx.login("t@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::Backend(BackendError::InvalidCredentials(_))));

        let state = ctx.state();
        assert_eq!(state.status, AuthStatus::Anonymous);
        assert_eq!(state.error.as_deref(), Some("Invalid login credentials"));
        let toast = toasts.recv().await.unwrap();
        assert_eq!(toast.level, NotificationLevel::Destructive);
        assert_eq!(toast.title, "Login failed");
    }

    #[tokio::test]
    async fn login_validation_never_reaches_backend() {
        let (backend, ctx) = context();
        ctx.init().await;

        let err = ctx.login("", "").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { .. }));
        assert_eq!(ctx.state().status, AuthStatus::Anonymous);
        assert_eq!(backend.profile_fetches(), 0);
    }

    #[tokio::test]
    async fn admin_signup_can_be_refused_by_config() {
        let backend = Arc::new(InMemoryBackend::default());
        let config = AuthConfig {
            allow_admin_signup: false,
            ..AuthConfig::default()
        };
        let ctx = AuthContext::with_backend(backend.clone(), config);
        ctx.init().await;

        let err = ctx
            .signup_as("boss@example.com", "secret12", "Boss", Role::SuperAdmin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RoleNotPermitted(Role::SuperAdmin)));
        assert!(backend.account_id("boss@example.com").is_none());
    }

    #[tokio::test]
    async fn email_confirmation_signup_stays_anonymous() {
        let (backend, ctx) = context();
        backend.set_email_confirmation(true);
        ctx.init().await;

        let user = ctx.signup("later@example.com", "secret12", "Later").await.unwrap();
        assert!(user.is_none());
        assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    }

    #[tokio::test]
    async fn token_refresh_keeps_profile_visible() {
        let (backend, ctx) = context();
        let id = backend.add_account("t@example.com", "secret1", Some("Tess"), Role::Tenant);
        ctx.init().await;
        ctx.login("t@example.com", "secret1").await.unwrap();

        let mut rx = ctx.watch();
        rx.borrow_and_update();
        let refreshed = backend.issue_session(&id, Some("t@example.com")).unwrap();
        backend.emit(SessionEvent::TokenRefreshed(refreshed.clone()));

        rx.changed().await.unwrap();
        let state = rx.borrow().clone();
        assert_eq!(state.status, AuthStatus::Authenticated);
        assert_eq!(state.session, Some(refreshed));
        assert!(state.flags().is_tenant);
    }

    #[tokio::test]
    async fn refresh_profile_without_session_is_noop() {
        let (backend, ctx) = context();
        ctx.init().await;

        ctx.refresh_profile().await;
        assert_eq!(backend.profile_fetches(), 0);
        assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_discards_in_flight_fetch() {
        let (backend, ctx) = context();
        let id = backend.add_account("slow@example.com", "secret1", None, Role::Landlord);
        backend.set_profile_delay(&id, Duration::from_millis(50));
        ctx.init().await;

        backend.emit(SessionEvent::SignedIn(backend.issue_session(&id, None).unwrap()));
        let mut rx = ctx.watch();
        rx.wait_for(|s| s.status == AuthStatus::Loading).await.unwrap();

        ctx.dispose();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = ctx.state();
        assert!(state.is_disposed());
        assert!(state.user().is_none());
        assert_eq!(backend.subscriber_count(), 0);
        assert!(matches!(ctx.login("slow@example.com", "secret1").await, Err(AuthError::Disposed)));
    }

    #[tokio::test]
    async fn use_auth_reads_the_provided_context() {
        let (_backend, ctx) = context();
        ctx.init().await;

        let status = ctx.provide(async { use_auth().state().status }).await;
        assert_eq!(status, AuthStatus::Anonymous);
    }

    #[tokio::test]
    #[should_panic(expected = "use_auth must be used within an AuthContext::provide scope")]
    async fn use_auth_outside_scope_panics() {
        let _ = use_auth();
    }
}
