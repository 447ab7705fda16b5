//! Outbound mail.
//!
//! Sending is synchronous from the caller's point of view: a failed send
//! aborts the registration or reset request that triggered it.

/// Mail delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery to {to} failed: {reason}")]
    Delivery { to: String, reason: String },
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers mail on behalf of the account flows.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Writes outbound mail to the log instead of a mail server.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            "outbound mail:\n{}",
            email.body
        );
        Ok(())
    }
}

pub fn verification_email(from: &str, to: &str, code: &str, ttl_minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Verify your email".to_string(),
        body: format!(
            "Your verification code is {}. It expires in {} minutes.",
            code, ttl_minutes
        ),
    }
}

pub fn password_reset_email(from: &str, to: &str, code: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Password reset".to_string(),
        body: format!("Your password reset code is {}.", code),
    }
}

/// Keeps sent mail in memory so tests can read the codes back.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingEmail>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Last token of the most recent message sent to `to`, without the trailing period.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let email = sent.iter().rev().find(|e| e.to.eq_ignore_ascii_case(to))?;
        let marker = "code is ";
        let start = email.body.find(marker)? + marker.len();
        email.body[start..]
            .split(|c: char| c == '.' || c.is_whitespace())
            .next()
            .map(str::to_string)
    }
}

#[cfg(test)]
impl Mailer for RecordingMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MailError::Delivery {
                to: email.to.clone(),
                reason: "mail server unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
