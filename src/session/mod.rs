use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{AuthBackend, Session, SessionEvent};

/// Tracks the single current session for the lifetime of the process
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    current: Arc<watch::Sender<Option<Session>>>,
}

/// Live session-change subscription. Dropping it releases the subscription;
/// no callback runs after the drop completes its abort.
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl SessionSubscription {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            backend,
            current: Arc::new(current),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.backend
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    /// Ask the backend for a surviving session. Backend errors resolve to
    /// "no session".
    pub async fn restore_session(&self) -> Option<Session> {
        let session = match self.backend.current_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Error restoring session: {}", e);
                None
            }
        };

        self.current.send_replace(session.clone());
        session
    }

    pub fn clear(&self) {
        self.current.send_replace(None);
    }

    /// Invoke `callback` once per session transition, in emission order.
    ///
    /// Callbacks run on the subscription's own task, never inside the
    /// backend call that emitted the event.
    pub fn observe_session_changes<F>(&self, mut callback: F) -> SessionSubscription
    where
        F: FnMut(SessionEvent) + Send + 'static,
    {
        let mut events = self.backend.subscribe();
        let current = Arc::clone(&self.current);

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                current.send_replace(event.session().cloned());
                callback(event);
            }
            tracing::debug!("Session event stream closed");
        });

        SessionSubscription { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::types::Role;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn restore_returns_surviving_session() {
        let backend = Arc::new(InMemoryBackend::default());
        let id = backend.add_account("t@example.com", "secret1", None, Role::Tenant);
        let session = backend.issue_session(&id, Some("t@example.com")).unwrap();
        backend.restore(session.clone());

        let store = SessionStore::new(backend);
        assert_eq!(store.restore_session().await, Some(session.clone()));
        assert_eq!(store.current(), Some(session));
    }

    #[tokio::test]
    async fn restore_swallows_backend_errors() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.set_unreachable(true);

        let store = SessionStore::new(backend);
        assert_eq!(store.restore_session().await, None);
    }

    #[tokio::test]
    async fn callbacks_follow_emission_order() {
        let backend = Arc::new(InMemoryBackend::default());
        let a = backend.issue_session("a", None).unwrap();
        let b = backend.issue_session("b", None).unwrap();
        let store = SessionStore::new(backend.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = store.observe_session_changes(move |event| {
            let _ = tx.send(event);
        });

        backend.emit(SessionEvent::SignedIn(a.clone()));
        backend.emit(SessionEvent::SignedOut);
        backend.emit(SessionEvent::SignedIn(b.clone()));

        assert_eq!(rx.recv().await, Some(SessionEvent::SignedIn(a)));
        assert_eq!(rx.recv().await, Some(SessionEvent::SignedOut));
        assert_eq!(rx.recv().await, Some(SessionEvent::SignedIn(b.clone())));
        assert_eq!(store.current(), Some(b));
    }

    #[tokio::test]
    async fn watch_follows_observed_events() {
        let backend = Arc::new(InMemoryBackend::default());
        let a = backend.issue_session("a", None).unwrap();
        let store = SessionStore::new(backend.clone());
        let mut current = store.watch();

        let subscription = store.observe_session_changes(|_| {});
        assert!(subscription.is_active());

        backend.emit(SessionEvent::SignedIn(a.clone()));
        current.changed().await.unwrap();
        assert_eq!(*current.borrow_and_update(), Some(a));

        backend.emit(SessionEvent::SignedOut);
        current.changed().await.unwrap();
        assert_eq!(*current.borrow(), None);

        drop(subscription);
    }

    #[tokio::test]
    async fn dropped_subscription_stops_callbacks() {
        let backend = Arc::new(InMemoryBackend::default());
        let store = SessionStore::new(backend.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = store.observe_session_changes(move |event| {
            let _ = tx.send(event);
        });
        subscription.unsubscribe();

        // Let the runtime drop the aborted task
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        backend.emit(SessionEvent::SignedOut);

        assert_eq!(rx.recv().await, None);
        assert_eq!(backend.subscriber_count(), 0);
    }
}
