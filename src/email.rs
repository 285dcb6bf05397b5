use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

pub const VERIFICATION_SUBJECT: &str = "Verify your email";

/// EmailError
///
/// Delivery failures. The caller only reports them; nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),
    #[error("simulated delivery failure")]
    Simulated,
}

/// OutgoingEmail
///
/// A fully rendered message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// EmailSender
///
/// Delivery abstraction. Implementations decide how a message leaves the process
/// (log line, HTTP relay, in-memory capture for tests).
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: OutgoingEmail) -> Result<(), EmailError>;

    /// Sends the account activation link to `to`.
    async fn send_verification_link(&self, from: &str, to: &str, url: &str) -> Result<(), EmailError> {
        self.send(OutgoingEmail {
            from: from.to_string(),
            to: to.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            html: verification_email_html(url),
        })
        .await
    }
}

/// EmailState
///
/// The concrete type used to share the mailer across the application state.
pub type EmailState = Arc<dyn EmailSender>;

pub fn verification_email_html(url: &str) -> String {
    format!(
        r#"<div style="font-family:ui-sans-serif,system-ui,-apple-system,Segoe UI,Roboto">
  <h2>Verify your email</h2>
  <p>Thanks for signing up. Please click the link below to verify your email address:</p>
  <p><a href="{url}" target="_blank" rel="noreferrer">Verify my email</a></p>
  <p style="color:#667085;font-size:13px">If you didn't request this, you can safely ignore this message.</p>
</div>"#
    )
}

/// LogEmailSender
///
/// Local development sender: logs the message and reports success.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: OutgoingEmail) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            html = %message.html,
            "email send stub"
        );
        Ok(())
    }
}

/// HttpEmailSender
///
/// Posts each message as JSON to a transactional mail relay, authenticated
/// with a bearer API key.
#[derive(Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEmailSender {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: OutgoingEmail) -> Result<(), EmailError> {
        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EmailError::Rejected(response.status().as_u16()));
        }
        info!(to = %message.to, subject = %message.subject, "email handed to relay");
        Ok(())
    }
}

/// MockEmailSender
///
/// Captures messages in memory so tests can pull the verification link back out.
#[derive(Clone, Default)]
pub struct MockEmailSender {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    /// When true, every send fails with `EmailError::Simulated`.
    pub should_fail: bool,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            sent: Arc::default(),
            should_fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// The `href` of the most recent verification email, if any.
    pub fn last_link(&self) -> Option<String> {
        let last = self.sent().pop()?;
        let start = last.html.find("href=\"")? + "href=\"".len();
        let end = last.html[start..].find('"')? + start;
        Some(last.html[start..end].to_string())
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, message: OutgoingEmail) -> Result<(), EmailError> {
        if self.should_fail {
            return Err(EmailError::Simulated);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_captures_verification_link() {
        let mailer = MockEmailSender::new();
        mailer
            .send_verification_link(
                "no-reply@example.com",
                "ada@example.com",
                "http://localhost:3000/verify?email=ada%40example.com&token=abc",
            )
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Verify your email");
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(
            mailer.last_link().as_deref(),
            Some("http://localhost:3000/verify?email=ada%40example.com&token=abc")
        );
    }

    #[tokio::test]
    async fn failing_mock_reports_error() {
        let mailer = MockEmailSender::new_failing();
        let result = mailer.send_verification_link("a@b.c", "d@e.f", "http://x").await;
        assert!(matches!(result, Err(EmailError::Simulated)));
        assert!(mailer.sent().is_empty());
    }
}
