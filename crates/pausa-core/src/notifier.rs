use anyhow::Result;
use notify_rust::{Hint, Notification, NotificationHandle};
use std::sync::Mutex;

pub const NOTIFICATION_TITLE: &str = "Break Reminder";

const NOTIFICATION_ICON: &str = "appointment-soon";

/// Desktop notification collaborator.
///
/// Owns the "is a notification currently showing" state so the engine
/// stays free of UI lifecycle concerns. Reminders are transient
/// (auto-dismissing); showing a new one first closes any reminder still
/// on screen, so a firing is never duplicated.
pub struct BreakNotifier {
    current: Mutex<Option<NotificationHandle>>,
}

impl BreakNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Show a transient break reminder with the configured message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification service rejects the request.
    pub fn show(&self, body: &str) -> Result<()> {
        let mut current = self.current.lock().unwrap();
        if let Some(handle) = current.take() {
            handle.close();
        }

        let handle = Notification::new()
            .summary(NOTIFICATION_TITLE)
            .body(body)
            .icon(NOTIFICATION_ICON)
            .hint(Hint::Transient(true))
            .show()?;
        *current = Some(handle);
        Ok(())
    }

    /// Release any notification still held, for daemon teardown.
    pub fn close(&self) {
        if let Some(handle) = self.current.lock().unwrap().take() {
            handle.close();
        }
    }
}

impl Default for BreakNotifier {
    fn default() -> Self {
        Self::new()
    }
}
