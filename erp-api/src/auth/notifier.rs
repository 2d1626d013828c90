//! Out-of-band delivery of password reset secrets.

use std::sync::Mutex;

/// Delivers a freshly issued reset secret to the account owner.
///
/// Called only for existing, active accounts. Implementations must not
/// fail the request; delivery problems are theirs to log.
pub trait ResetNotifier: Send + Sync {
    fn send_reset(&self, email: &str, secret: &str);
}

/// Writes a notice to the log without the secret itself.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ResetNotifier for LogNotifier {
    fn send_reset(&self, email: &str, _secret: &str) {
        info!("Password reset issued for {}", email);
    }
}

/// Keeps every delivered secret in memory, newest last.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// The most recent secret sent to `email`.
    pub fn last_secret_for(&self, email: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, secret)| secret.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ResetNotifier for RecordingNotifier {
    fn send_reset(&self, email: &str, secret: &str) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.push((email.to_string(), secret.to_string()));
    }
}
