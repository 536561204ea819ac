//! # Email Notifier
//!
//! Fire-and-forget mail transport behind the [`Notifier`] trait.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{NotifyError, NotifyResult};
use super::template::Notification;

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP server host
    pub smtp_host: String,

    /// SMTP server port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username (empty for unauthenticated local relays)
    #[serde(default)]
    pub smtp_user: String,

    /// SMTP password (should come from secrets)
    #[serde(default)]
    pub smtp_password: String,

    /// From email address
    pub from_email: String,

    /// From name
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Dead Man's Switch".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 1025,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@deadswitch.local".to_string(),
            from_name: default_from_name(),
        }
    }
}

/// Addressed message sender
pub trait Notifier: Send + Sync {
    /// Send `notification` to `to`. Returns the provider message id.
    fn send(&self, to: &str, notification: &Notification) -> NotifyResult<String>;
}

/// A recorded send
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub to: String,
    pub notification: Notification,
    pub provider_message_id: String,
}

/// In-memory notifier: records sends, can be told to fail for an address.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: RwLock<Vec<SentNotification>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `address` fail until [`MemoryNotifier::recover`].
    pub fn fail_for(&self, address: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(address.to_ascii_lowercase());
        }
    }

    /// Stop failing sends to `address`.
    pub fn recover(&self, address: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.remove(&address.to_ascii_lowercase());
        }
    }

    /// All recorded sends
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Recorded sends to one address
    pub fn sent_to(&self, address: &str) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|s| s.to.eq_ignore_ascii_case(address))
            .collect()
    }

    /// Number of recorded sends of one template kind
    pub fn count_kind(&self, kind: &str) -> usize {
        self.sent()
            .iter()
            .filter(|s| s.notification.kind() == kind)
            .count()
    }

    /// Get number of sent notifications
    pub fn sent_count(&self) -> usize {
        self.sent.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Clear sent notifications
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.write() {
            sent.clear();
        }
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, to: &str, notification: &Notification) -> NotifyResult<String> {
        let failing = self
            .failing
            .read()
            .map(|f| f.contains(&to.to_ascii_lowercase()))
            .unwrap_or(false);
        if failing {
            return Err(NotifyError::Transport(format!("mailbox unavailable: {}", to)));
        }

        let provider_message_id = format!("mem-{}", Uuid::new_v4());
        tracing::debug!(to, kind = notification.kind(), "notification recorded");
        self.sent
            .write()
            .map_err(|_| NotifyError::Transport("notifier lock poisoned".to_string()))?
            .push(SentNotification {
                to: to.to_string(),
                notification: notification.clone(),
                provider_message_id: provider_message_id.clone(),
            });
        Ok(provider_message_id)
    }
}

/// SMTP notifier owning one explicitly constructed transport.
pub struct SmtpNotifier {
    config: EmailConfig,
    base_url: String,
    mailer: SmtpTransport,
}

impl SmtpNotifier {
    /// Build the transport up front; it lives as long as the notifier.
    pub fn new(config: EmailConfig, base_url: impl Into<String>) -> NotifyResult<Self> {
        let mailer = if config.smtp_user.is_empty() {
            // No authentication (for local development SMTP servers)
            SmtpTransport::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());

            SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {}", e)))?
                .credentials(creds)
                .port(config.smtp_port)
                .build()
        };

        Ok(Self {
            config,
            base_url: base_url.into(),
            mailer,
        })
    }

    fn message_id(&self) -> String {
        let domain = self
            .config
            .from_email
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or("localhost");
        format!("<{}@{}>", Uuid::new_v4(), domain)
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, to: &str, notification: &Notification) -> NotifyResult<String> {
        let rendered = notification.render(&self.base_url);
        let message_id = self.message_id();

        let email = Message::builder()
            .message_id(Some(message_id.clone()))
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| NotifyError::InvalidAddress(format!("from: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError::InvalidAddress(format!("to: {}", e)))?)
            .subject(rendered.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.body)
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        self.mailer
            .send(&email)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        tracing::info!(kind = notification.kind(), %message_id, "email sent");
        Ok(message_id)
    }
}

/// Create the notifier for the configured transport.
///
/// Without SMTP settings sends are only recorded in memory.
pub fn create_notifier(
    config: Option<EmailConfig>,
    base_url: &str,
) -> NotifyResult<Arc<dyn Notifier>> {
    match config {
        Some(cfg) => Ok(Arc::new(SmtpNotifier::new(cfg, base_url)?)),
        None => {
            tracing::warn!("no SMTP settings; notifications are recorded in memory only");
            Ok(Arc::new(MemoryNotifier::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reminder() -> Notification {
        Notification::CheckInReminder {
            owner_name: "Ada".into(),
            switch_name: "Vault".into(),
            due_at: Utc::now(),
        }
    }

    #[test]
    fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        let id = notifier.send("ada@example.com", &reminder()).unwrap();

        assert!(id.starts_with("mem-"));
        assert_eq!(notifier.sent_count(), 1);
        assert_eq!(notifier.sent_to("ADA@example.com").len(), 1);
        assert_eq!(notifier.count_kind("check_in_reminder"), 1);

        notifier.clear();
        assert_eq!(notifier.sent_count(), 0);
    }

    #[test]
    fn test_memory_notifier_failure_injection() {
        let notifier = MemoryNotifier::new();
        notifier.fail_for("down@example.com");

        assert!(matches!(
            notifier.send("down@example.com", &reminder()),
            Err(NotifyError::Transport(_))
        ));
        assert_eq!(notifier.sent_count(), 0);

        notifier.recover("down@example.com");
        assert!(notifier.send("down@example.com", &reminder()).is_ok());
    }

    #[test]
    fn test_smtp_message_id_uses_sender_domain() {
        let notifier = SmtpNotifier::new(EmailConfig::default(), "http://localhost").unwrap();
        let id = notifier.message_id();
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@deadswitch.local>"));
    }

    #[test]
    fn test_smtp_invalid_recipient_is_rejected_before_transport() {
        let notifier = SmtpNotifier::new(EmailConfig::default(), "http://localhost").unwrap();
        assert!(matches!(
            notifier.send("not an address", &reminder()),
            Err(NotifyError::InvalidAddress(_))
        ));
    }
}
