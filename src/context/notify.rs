use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Destructive,
}

/// Transient user-facing message (a toast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, description)
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, description)
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Destructive, title, description)
    }

    fn new(level: NotificationLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn access_denied() -> Self {
        Self::destructive("Access Denied", "You don't have permission to access this page")
    }
}

/// Broadcasts notifications to whoever renders them. With no listener the
/// message is dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn notify(&self, notification: Notification) {
        tracing::debug!("Notification: {} - {}", notification.title, notification.description);
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();

        notifier.notify(Notification::access_denied());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.level, NotificationLevel::Destructive);
        assert_eq!(received.title, "Access Denied");
    }

    #[test]
    fn notify_without_listeners_is_harmless() {
        Notifier::new(1).notify(Notification::info("Hello", "nobody listening"));
    }
}
