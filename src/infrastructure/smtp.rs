use crate::config::{SmtpSecurity, SmtpSettings};
use crate::domain::dispatch::{Message, TransportError, TransportErrorKind};
use crate::domain::ports::Transport;
use crate::error::{Result, SantaError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::{Code, Severity};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use tracing::info;

/// Delivers notifications as plain-text email through an SMTP relay.
#[derive(Clone)]
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    /// Builds the relay client. Nothing is contacted until the first send.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self> {
        let host = settings.host.as_deref().ok_or_else(|| {
            SantaError::Config("SMTP host is not set (smtp.host or SMTP_HOST)".to_string())
        })?;
        let builder = match settings.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpSecurity::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| SantaError::Config(format!("invalid SMTP host `{host}`: {e}")))?;

        let mut builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_secs)));
        if let Some(username) = &settings.username {
            let password = settings.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        let sender = settings.sender().ok_or_else(|| {
            SantaError::Config("SMTP sender is not set (smtp.from or SMTP_FROM)".to_string())
        })?;
        let from = sender
            .parse()
            .map_err(|e| SantaError::Config(format!("invalid SMTP sender `{sender}`: {e}")))?;

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

/// Class of an SMTP failure from the server's reply code, if it answered.
///
/// 5xx replies (unknown mailbox, rejected message) are permanent and 4xx
/// replies are transient. Without a reply the failure happened on the
/// connection (refused, timed out, dropped) and is transient, unless the
/// client itself rejected the message.
fn smtp_error_kind(status: Option<Code>, client_error: bool) -> TransportErrorKind {
    match status {
        Some(code) if code.severity == Severity::PermanentNegativeCompletion => {
            TransportErrorKind::Permanent
        }
        Some(_) => TransportErrorKind::Transient,
        None if client_error => TransportErrorKind::Permanent,
        None => TransportErrorKind::Transient,
    }
}

fn classify_smtp_error(error: &smtp::Error) -> TransportError {
    TransportError {
        kind: smtp_error_kind(error.status(), error.is_client()),
        message: error.to_string(),
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &Message) -> std::result::Result<(), TransportError> {
        let to: Mailbox = message.to.parse().map_err(|e| {
            TransportError::permanent(format!("invalid recipient address `{}`: {e}", message.to))
        })?;
        let email = lettre::Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| TransportError::permanent(format!("cannot build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| classify_smtp_error(&e))?;

        info!(to = %message.to, "notification sent over SMTP");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettre::transport::smtp::response::{Category, Detail};

    fn reply(severity: Severity, category: Category, detail: Detail) -> Option<Code> {
        Some(Code::new(severity, category, detail))
    }

    fn local(port: u16) -> SmtpSettings {
        SmtpSettings {
            host: Some("127.0.0.1".to_string()),
            port,
            from: Some("santa@example.com".to_string()),
            security: SmtpSecurity::None,
            timeout_secs: 2,
            ..SmtpSettings::default()
        }
    }

    #[test]
    fn test_reply_code_classification() {
        // 550 mailbox unavailable
        let rejected = reply(
            Severity::PermanentNegativeCompletion,
            Category::MailSystem,
            Detail::Zero,
        );
        assert_eq!(smtp_error_kind(rejected, false), TransportErrorKind::Permanent);

        // 421 service not available
        let busy = reply(
            Severity::TransientNegativeCompletion,
            Category::Connections,
            Detail::One,
        );
        assert_eq!(smtp_error_kind(busy, false), TransportErrorKind::Transient);

        assert_eq!(smtp_error_kind(None, false), TransportErrorKind::Transient);
        assert_eq!(smtp_error_kind(None, true), TransportErrorKind::Permanent);
    }

    #[test]
    fn test_missing_host_or_sender_is_config_error() {
        let no_host = SmtpSettings {
            host: None,
            ..local(2525)
        };
        assert!(matches!(
            SmtpTransport::from_settings(&no_host),
            Err(SantaError::Config(_))
        ));

        let no_sender = SmtpSettings {
            from: None,
            username: None,
            ..local(2525)
        };
        assert!(matches!(
            SmtpTransport::from_settings(&no_sender),
            Err(SantaError::Config(_))
        ));

        let bad_sender = SmtpSettings {
            from: Some("not an address".to_string()),
            ..local(2525)
        };
        assert!(SmtpTransport::from_settings(&bad_sender).is_err());
    }

    #[tokio::test]
    async fn test_send_errors_are_classified() {
        // Bind and drop a listener so the port is known to refuse connections.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = SmtpTransport::from_settings(&local(port)).unwrap();

        let message = Message {
            to: "ana@example.com".to_string(),
            subject: "Your Secret Santa pairing".to_string(),
            body: "Hello".to_string(),
        };
        let refused = transport.send(&message).await.unwrap_err();
        assert!(refused.is_transient(), "{refused}");

        let invalid = Message {
            to: "not an address".to_string(),
            ..message
        };
        let error = transport.send(&invalid).await.unwrap_err();
        assert_eq!(error.kind, TransportErrorKind::Permanent);
    }
}
