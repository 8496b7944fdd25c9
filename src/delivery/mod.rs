pub mod smtp;
pub mod twilio;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compose;
use crate::config::Credentials;
use crate::providers::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Call,
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Sms => "sms",
            Channel::Call => "call",
            Channel::Email => "email",
        })
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("{0} provider not configured")]
    NotConfigured(Channel),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected request (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl DeliveryError {
    /// Short machine-readable label for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::NotConfigured(_) => "not_configured",
            DeliveryError::InvalidDestination(_) => "invalid_destination",
            DeliveryError::Transport(_) => "transport",
            DeliveryError::Provider { .. } => "provider",
            DeliveryError::Smtp(_) => "smtp",
        }
    }
}

// --- Provider seams ---

/// SMS and voice provider. Returns the provider-assigned id on success.
#[async_trait::async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, DeliveryError>;
    async fn place_call(&self, to: &str, twiml: &str) -> Result<String, DeliveryError>;
}

#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_html(&self, to: &str, subject: &str, html: &str)
    -> Result<String, DeliveryError>;
}

// --- Reports ---

#[derive(Debug)]
pub struct DeliveryReport {
    pub channel: Channel,
    pub destination: String,
    pub outcome: Result<String, DeliveryError>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(String::as_str)
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        self.outcome.as_ref().err()
    }

    pub fn status(&self) -> &'static str {
        if self.is_success() { "success" } else { "failed" }
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            channel: self.channel,
            sent_to: self.destination.clone(),
            status: self.status(),
            provider_id: self.provider_id().map(str::to_string),
            error: self.error().map(ToString::to_string),
            error_kind: self.error().map(DeliveryError::kind),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliverySummary {
    pub channel: Channel,
    pub sent_to: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

// --- Client ---

/// Best-effort sender for every channel. Never returns an error: each
/// attempt becomes a [`DeliveryReport`] and one log line.
pub struct DeliveryClient {
    messaging: Option<Arc<dyn MessagingProvider>>,
    mail: Option<Arc<dyn MailTransport>>,
}

impl DeliveryClient {
    pub fn new(
        messaging: Option<Arc<dyn MessagingProvider>>,
        mail: Option<Arc<dyn MailTransport>>,
    ) -> Self {
        Self { messaging, mail }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        let messaging = credentials
            .twilio
            .as_ref()
            .map(|c| Arc::new(twilio::TwilioClient::new(c)) as Arc<dyn MessagingProvider>);
        let mail = credentials
            .smtp
            .as_ref()
            .map(|c| Arc::new(smtp::SmtpMailer::new(c)) as Arc<dyn MailTransport>);
        Self::new(messaging, mail)
    }

    pub async fn send_sms(
        &self,
        destination: &str,
        name: &str,
        commodity: &str,
        reading: &Reading,
    ) -> DeliveryReport {
        let outcome = match self.phone_provider(Channel::Sms, destination) {
            Ok(provider) => {
                let body = compose::sms_body(name, commodity, reading);
                provider.send_sms(destination, &body).await
            }
            Err(e) => Err(e),
        };
        finish(Channel::Sms, destination, outcome)
    }

    pub async fn make_call(
        &self,
        destination: &str,
        name: &str,
        commodity: &str,
        reading: &Reading,
    ) -> DeliveryReport {
        let outcome = match self.phone_provider(Channel::Call, destination) {
            Ok(provider) => {
                let twiml = compose::voice_script(name, commodity, reading);
                provider.place_call(destination, &twiml).await
            }
            Err(e) => Err(e),
        };
        finish(Channel::Call, destination, outcome)
    }

    pub async fn send_email(
        &self,
        destination: &str,
        name: &str,
        commodity: &str,
        reading: &Reading,
    ) -> DeliveryReport {
        let outcome = match &self.mail {
            Some(mail) => {
                let subject = compose::email_subject(commodity);
                let html = compose::email_html(name, commodity, reading);
                mail.send_html(destination, &subject, &html).await
            }
            None => Err(DeliveryError::NotConfigured(Channel::Email)),
        };
        finish(Channel::Email, destination, outcome)
    }

    fn phone_provider(
        &self,
        channel: Channel,
        destination: &str,
    ) -> Result<&Arc<dyn MessagingProvider>, DeliveryError> {
        let provider = self
            .messaging
            .as_ref()
            .ok_or(DeliveryError::NotConfigured(channel))?;
        if !is_e164(destination) {
            return Err(DeliveryError::InvalidDestination(format!(
                "'{destination}' is not an E.164 phone number"
            )));
        }
        Ok(provider)
    }
}

fn finish(
    channel: Channel,
    destination: &str,
    outcome: Result<String, DeliveryError>,
) -> DeliveryReport {
    match &outcome {
        Ok(id) => tracing::info!("{channel} delivered to {destination} (id {id})"),
        Err(e) => tracing::error!("{channel} to {destination} failed: {e}"),
    }
    DeliveryReport {
        channel,
        destination: destination.to_string(),
        outcome,
    }
}

/// `+` followed by 8 to 15 digits.
pub fn is_e164(number: &str) -> bool {
    number.strip_prefix('+').is_some_and(|digits| {
        (8..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
    })
}
