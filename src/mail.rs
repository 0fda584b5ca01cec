use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{ensure_valid, ReportError};
use crate::model::tenant::EmailConfig;
use crate::validation::rules;

const IMPLICIT_TLS_PORT: u16 = 465;

/// A report ready to be mailed with the tenant's email settings.
#[derive(Debug, Clone)]
pub struct SendEmailRequest {
    pub email: EmailConfig,
    pub subject: String,
    pub html: String,
}

impl SendEmailRequest {
    /// Validate, then resolve the envelope. Sender is the SMTP user.
    pub fn into_message(self) -> Result<EmailMessage, ReportError> {
        ensure_valid("SendEmailRequest", rules::send_email().validate(&self))?;
        let from = self
            .email
            .authentication
            .as_ref()
            .and_then(|a| a.user.clone())
            .unwrap_or_default();
        Ok(EmailMessage {
            from,
            to: self.email.recipients.unwrap_or_default(),
            cc: self.email.cc_recipients.unwrap_or_default(),
            subject: self.subject,
            html: self.html,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
}

pub fn report_subject(team: &str, iteration_name: Option<&str>) -> String {
    match iteration_name.filter(|name| !name.trim().is_empty()) {
        Some(name) => format!("[{team}] Daily Report - {name}"),
        None => format!("[{team}] Daily Report"),
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Builds a transport for one tenant's email settings.
pub trait MailerFactory: Send + Sync {
    fn mailer(&self, config: &EmailConfig) -> Result<Box<dyn MailTransport>>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let server = config.server.as_ref().context("SMTP server not set")?;
        let host = server.host.as_deref().context("SMTP host not set")?;
        let port = server.port.context("SMTP port not set")?;

        let builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("Invalid SMTP host {host}"))?
        .port(port);

        let builder = match &config.authentication {
            Some(auth) => {
                let user = auth.user.clone().unwrap_or_default();
                let password = auth.password.clone().unwrap_or_default();
                builder.credentials(Credentials::new(user, password))
            }
            None => builder,
        };

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .with_context(|| format!("Invalid address {address}"))
}

pub fn build_message(message: &EmailMessage) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&message.from)?)
        .subject(&message.subject)
        .header(ContentType::TEXT_HTML);
    for to in &message.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    builder
        .body(message.html.clone())
        .context("Failed to build email")
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = build_message(message)?;
        self.transport
            .send(email)
            .await
            .context("SMTP send failed")?;
        Ok(())
    }
}

pub struct SmtpMailerFactory;

impl MailerFactory for SmtpMailerFactory {
    fn mailer(&self, config: &EmailConfig) -> Result<Box<dyn MailTransport>> {
        Ok(Box::new(SmtpMailer::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tenant::{EmailAuthentication, EmailServer};

    fn config() -> EmailConfig {
        EmailConfig {
            authentication: Some(EmailAuthentication {
                user: Some("bot@example.com".into()),
                password: Some("pw".into()),
            }),
            server: Some(EmailServer {
                host: Some("smtp.example.com".into()),
                port: Some(587),
            }),
            recipients: Some(vec!["team@example.com".into(), "qa@example.com".into()]),
            cc_recipients: None,
        }
    }

    #[test]
    fn subject_includes_iteration_when_known() {
        assert_eq!(report_subject("Core", Some("Sprint 7")), "[Core] Daily Report - Sprint 7");
        assert_eq!(report_subject("Core", None), "[Core] Daily Report");
        assert_eq!(report_subject("Core", Some(" ")), "[Core] Daily Report");
    }

    #[test]
    fn valid_request_resolves_envelope() {
        let message = SendEmailRequest {
            email: config(),
            subject: "[Core] Daily Report".into(),
            html: "<p>hi</p>".into(),
        }
        .into_message()
        .unwrap();

        assert_eq!(message.from, "bot@example.com");
        assert_eq!(message.to.len(), 2);
        assert!(message.cc.is_empty());
    }

    #[test]
    fn invalid_recipient_is_rejected_before_sending() {
        let mut email = config();
        email.recipients = Some(vec!["nope".into()]);
        let result = SendEmailRequest {
            email,
            subject: "s".into(),
            html: "h".into(),
        }
        .into_message();

        match result {
            Err(ReportError::InvalidRequest { errors, .. }) => {
                assert!(errors.contains("email.recipients[0]"));
            }
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn builds_html_message_with_all_recipients() {
        let message = EmailMessage {
            from: "bot@example.com".into(),
            to: vec!["team@example.com".into()],
            cc: vec!["lead@example.com".into()],
            subject: "[Core] Daily Report".into(),
            html: "<p>hi</p>".into(),
        };
        let email = build_message(&message).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("To: team@example.com"));
        assert!(raw.contains("Cc: lead@example.com"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn smtp_mailer_needs_a_server() {
        let mut email = config();
        email.server = None;
        assert!(SmtpMailer::new(&email).is_err());
    }
}
