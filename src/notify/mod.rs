//! # Notifications
//!
//! Owner reminders and warnings, verifier invitations and vote requests,
//! and final messages. The transport is best-effort; idempotency of final
//! delivery is owned by the delivery ledger, not by the transport.

mod email;
mod errors;
mod template;

pub use email::{create_notifier, EmailConfig, MemoryNotifier, Notifier, SentNotification, SmtpNotifier};
pub use errors::{NotifyError, NotifyResult};
pub use template::{Notification, Rendered};
