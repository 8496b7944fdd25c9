//! In-memory providers shared by the unit tests.

use std::sync::Mutex;

use crate::delivery::{Channel, DeliveryError, MailTransport, MessagingProvider};
use crate::providers::Reading;

#[derive(Debug, Clone)]
pub struct Sent {
    pub kind: Channel,
    pub to: String,
    pub content: String,
}

pub struct FakeMessaging {
    fail: bool,
    sent: Mutex<Vec<Sent>>,
}

impl FakeMessaging {
    pub fn ok() -> Self {
        Self {
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    fn record(&self, kind: Channel, to: &str, content: &str) -> Result<String, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Provider {
                status: 400,
                message: "The 'To' number is not a valid phone number. (code 21211)".into(),
            });
        }
        let mut sent = self.sent.lock().expect("sent lock poisoned");
        sent.push(Sent {
            kind,
            to: to.to_string(),
            content: content.to_string(),
        });
        let prefix = if kind == Channel::Call { "CA" } else { "SM" };
        Ok(format!("{prefix}{:04}", sent.len()))
    }
}

#[async_trait::async_trait]
impl MessagingProvider for FakeMessaging {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, DeliveryError> {
        self.record(Channel::Sms, to, body)
    }

    async fn place_call(&self, to: &str, twiml: &str) -> Result<String, DeliveryError> {
        self.record(Channel::Call, to, twiml)
    }
}

pub struct FakeMail {
    fail: bool,
    sent: Mutex<Vec<Sent>>,
}

impl FakeMail {
    pub fn ok() -> Self {
        Self {
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl MailTransport for FakeMail {
    async fn send_html(
        &self,
        to: &str,
        _subject: &str,
        html: &str,
    ) -> Result<String, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Smtp("send: 535 authentication failed".into()));
        }
        self.sent.lock().expect("sent lock poisoned").push(Sent {
            kind: Channel::Email,
            to: to.to_string(),
            content: html.to_string(),
        });
        Ok("2.0.0 OK queued".into())
    }
}

pub fn reading() -> Reading {
    Reading {
        temperature: 30.0,
        rainfall: 7.5,
        weather_confidence: 0.85,
        price: 2350.0,
        price_confidence: 0.9,
    }
}
