//! # Notification Templates

use chrono::{DateTime, Utc};

/// Template payloads handed to a [`super::Notifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Check-in due soon (non-state-changing).
    CheckInReminder {
        owner_name: String,
        switch_name: String,
        due_at: DateTime<Utc>,
    },

    /// Check-in deadline missed.
    OverdueNotice {
        owner_name: String,
        switch_name: String,
        missed_at: DateTime<Utc>,
    },

    /// Grace period started; escalation follows when it ends.
    GraceWarning {
        owner_name: String,
        switch_name: String,
        grace_ends_at: DateTime<Utc>,
    },

    /// Escalation stopped and needs the owner.
    SwitchPaused {
        owner_name: String,
        switch_name: String,
        reason: String,
    },

    /// Invitation to act as a verifier.
    VerifierInvitation {
        owner_name: String,
        switch_name: String,
        invite_token: String,
        expires_at: DateTime<Utc>,
    },

    /// Vote request carrying the link token and the one-time code.
    VerificationRequest {
        owner_name: String,
        switch_name: String,
        token: String,
        otp: String,
        expires_at: DateTime<Utc>,
    },

    /// Released message for a recipient.
    FinalMessage {
        owner_name: String,
        recipient_name: String,
        subject: String,
        body: String,
    },
}

/// Rendered email content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Template name for logs; never includes secrets.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::CheckInReminder { .. } => "check_in_reminder",
            Notification::OverdueNotice { .. } => "overdue_notice",
            Notification::GraceWarning { .. } => "grace_warning",
            Notification::SwitchPaused { .. } => "switch_paused",
            Notification::VerifierInvitation { .. } => "verifier_invitation",
            Notification::VerificationRequest { .. } => "verification_request",
            Notification::FinalMessage { .. } => "final_message",
        }
    }

    /// Render subject and plain-text body. Links are rooted at `base_url`.
    pub fn render(&self, base_url: &str) -> Rendered {
        let base_url = base_url.trim_end_matches('/');
        match self {
            Notification::CheckInReminder {
                owner_name,
                switch_name,
                due_at,
            } => Rendered {
                subject: format!("Reminder: check in to \"{}\"", switch_name),
                body: format!(
                    "Hello {},\n\n\
                    Your next check-in for \"{}\" is due at {}.\n\n\
                    Check in here: {}/switches\n",
                    owner_name,
                    switch_name,
                    due_at.to_rfc2822(),
                    base_url
                ),
            },
            Notification::OverdueNotice {
                owner_name,
                switch_name,
                missed_at,
            } => Rendered {
                subject: format!("Missed check-in for \"{}\"", switch_name),
                body: format!(
                    "Hello {},\n\n\
                    You missed the check-in for \"{}\" that was due at {}.\n\
                    Check in now to stop escalation: {}/switches\n",
                    owner_name,
                    switch_name,
                    missed_at.to_rfc2822(),
                    base_url
                ),
            },
            Notification::GraceWarning {
                owner_name,
                switch_name,
                grace_ends_at,
            } => Rendered {
                subject: format!("URGENT: \"{}\" escalates soon", switch_name),
                body: format!(
                    "Hello {},\n\n\
                    The grace period for \"{}\" ends at {}.\n\
                    After that your verifiers are contacted or your messages are scheduled for release.\n\n\
                    Check in now: {}/switches\n",
                    owner_name,
                    switch_name,
                    grace_ends_at.to_rfc2822(),
                    base_url
                ),
            },
            Notification::SwitchPaused {
                owner_name,
                switch_name,
                reason,
            } => Rendered {
                subject: format!("\"{}\" has been paused", switch_name),
                body: format!(
                    "Hello {},\n\n\
                    \"{}\" was paused: {}.\n\
                    Nothing will be released until you reactivate it: {}/switches\n",
                    owner_name, switch_name, reason, base_url
                ),
            },
            Notification::VerifierInvitation {
                owner_name,
                switch_name,
                invite_token,
                expires_at,
            } => Rendered {
                subject: format!("{} asked you to be a verifier", owner_name),
                body: format!(
                    "Hello,\n\n\
                    {} named you as a trusted verifier for \"{}\".\n\
                    If they stop checking in, you will be asked to confirm whether they are incapacitated.\n\n\
                    Accept the invitation: {}/verifiers/accept/{}\n\n\
                    This link expires at {}.\n",
                    owner_name,
                    switch_name,
                    base_url,
                    invite_token,
                    expires_at.to_rfc2822()
                ),
            },
            Notification::VerificationRequest {
                owner_name,
                switch_name,
                token,
                otp,
                expires_at,
            } => Rendered {
                subject: format!("Verification needed for {}", owner_name),
                body: format!(
                    "Hello,\n\n\
                    {} has not checked in to \"{}\".\n\
                    Please tell us whether you believe they are unable to respond.\n\n\
                    Vote here: {}/verify/{}\n\
                    Your one-time code: {}\n\n\
                    Voting closes at {}.\n",
                    owner_name,
                    switch_name,
                    base_url,
                    token,
                    otp,
                    expires_at.to_rfc2822()
                ),
            },
            Notification::FinalMessage {
                owner_name,
                recipient_name,
                subject,
                body,
            } => Rendered {
                subject: subject.clone(),
                body: format!(
                    "Dear {},\n\n\
                    {} arranged for this message to reach you.\n\n\
                    {}\n",
                    recipient_name, owner_name, body
                ),
            },
        }
    }
}
