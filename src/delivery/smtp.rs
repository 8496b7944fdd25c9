//! Email delivery over an authenticated SMTP relay.
//!
//! lettre is built without its connection pool, so every send opens a fresh
//! session, authenticates, sends, and quits. The transport is dropped at the
//! end of [`SmtpMailer::send_html`] whether the send succeeded or not.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials as SmtpAuth;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{DeliveryError, MailTransport};
use crate::config::SmtpCredentials;

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpMailer {
    host: String,
    port: u16,
    auth: SmtpAuth,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(credentials: &SmtpCredentials) -> Self {
        Self {
            host: credentials.host.clone(),
            port: credentials.port,
            auth: SmtpAuth::new(credentials.username.clone(), credentials.password.clone()),
            from_address: credentials.from_address.clone(),
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .map_err(|e| DeliveryError::Smtp(format!("relay {}: {e}", self.host)))?;

        Ok(builder.port(self.port).credentials(self.auth.clone()).build())
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailer {
    async fn send_html(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<String, DeliveryError> {
        let email = build_message(&self.from_address, to, subject, html)?;
        let mailer = self.transport()?;

        let response = mailer
            .send(email)
            .await
            .map_err(|e| DeliveryError::Smtp(format!("send: {e}")))?;

        let detail = response.message().collect::<Vec<_>>().join(" ");
        Ok(if detail.is_empty() {
            response.code().to_string()
        } else {
            detail
        })
    }
}

fn build_message(from: &str, to: &str, subject: &str, html: &str) -> Result<Message, DeliveryError> {
    let from: Mailbox = format!("AgriBuddy <{from}>")
        .parse()
        .map_err(|e| DeliveryError::Smtp(format!("invalid sender '{from}': {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| DeliveryError::InvalidDestination(format!("'{to}': {e}")))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html.to_string())
        .map_err(|e| DeliveryError::Smtp(format!("build email: {e}")))
}
