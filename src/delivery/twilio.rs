use reqwest::Client;
use serde::Deserialize;

use super::{DeliveryError, MessagingProvider};
use crate::config::TwilioCredentials;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// Twilio REST client for outbound SMS and voice calls.
pub struct TwilioClient {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Deserialize)]
struct CreatedResource {
    sid: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: String,
}

impl TwilioClient {
    pub fn new(credentials: &TwilioCredentials) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            account_sid: credentials.account_sid.clone(),
            auth_token: credentials.auth_token.clone(),
            from_number: credentials.from_number.clone(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn create(&self, resource: &str, params: &[(&str, &str)]) -> Result<String, DeliveryError> {
        let url = format!(
            "{}/Accounts/{}/{resource}.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        // Twilio accepted the request; an unreadable body is still its fault.
        let created: CreatedResource = response.json().await.map_err(|e| DeliveryError::Provider {
            status: status.as_u16(),
            message: format!("unreadable {resource} response: {e}"),
        })?;
        Ok(created.sid)
    }
}

#[async_trait::async_trait]
impl MessagingProvider for TwilioClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, DeliveryError> {
        self.create(
            "Messages",
            &[("To", to), ("From", self.from_number.as_str()), ("Body", body)],
        )
        .await
    }

    async fn place_call(&self, to: &str, twiml: &str) -> Result<String, DeliveryError> {
        self.create(
            "Calls",
            &[("To", to), ("From", self.from_number.as_str()), ("Twiml", twiml)],
        )
        .await
    }
}

fn api_error(status: u16, body: &str) -> DeliveryError {
    let message = match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError {
            code: Some(code),
            message,
        }) => format!("{message} (code {code})"),
        Ok(ApiError { message, .. }) => message,
        Err(_) => body.to_string(),
    };
    DeliveryError::Provider { status, message }
}
