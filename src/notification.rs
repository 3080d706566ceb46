//! User-visible notifications with automatic expiry. Errors from the
//! backend and background jobs land here instead of killing the app.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NotificationLevel, duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            message: message.into(),
            level,
            created_at: now,
            expires_at: now + duration,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug)]
pub struct NotificationManager {
    notifications: Vec<Notification>,
    default_duration: Duration,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::with_default_duration(Duration::from_secs(5))
    }
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_duration(default_duration: Duration) -> Self {
        Self {
            notifications: Vec::new(),
            default_duration,
        }
    }

    pub fn notify(&mut self, message: impl Into<String>, level: NotificationLevel) {
        self.notify_for(message, level, self.default_duration);
    }

    pub fn notify_for(
        &mut self,
        message: impl Into<String>,
        level: NotificationLevel,
        duration: Duration,
    ) {
        self.notifications
            .insert(0, Notification::new(message, level, duration));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Info);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.notify(message, NotificationLevel::Error);
    }

    /// Newest non-expired notification, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Notification> {
        self.notifications.iter().find(|n| !n.is_expired())
    }

    /// Drop expired entries. Called once per tick.
    pub fn sweep(&mut self) {
        self.notifications.retain(|n| !n.is_expired());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_notification_wins() {
        let mut manager = NotificationManager::new();
        manager.info("first");
        manager.error("second");
        assert_eq!(manager.current().unwrap().message, "second");
        assert_eq!(manager.current().unwrap().level, NotificationLevel::Error);
    }

    #[test]
    fn expired_notifications_disappear() {
        let mut manager = NotificationManager::with_default_duration(Duration::ZERO);
        manager.info("gone");
        assert!(manager.current().is_none());
        manager.sweep();
        assert!(manager.is_empty());
    }

    #[test]
    fn explicit_duration_overrides_default() {
        let mut manager = NotificationManager::with_default_duration(Duration::ZERO);
        manager.notify_for("stays", NotificationLevel::Warning, Duration::from_secs(60));
        assert_eq!(manager.current().unwrap().message, "stays");
    }
}
