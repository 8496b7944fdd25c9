use reqwest::Client;
use serde::de::DeserializeOwned;

use super::{
    PriceReading, PriceSource, ProviderError, WeatherReading, WeatherSource, check_confidence,
};

/// Weather from a JSON endpoint returning `{"temperature", "rainfall", "confidence"}`.
pub struct HttpWeather {
    client: Client,
    url: String,
}

/// Mandi price from a JSON endpoint returning `{"price", "confidence"}`.
pub struct HttpPrice {
    client: Client,
    url: String,
}

impl HttpWeather {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

impl HttpPrice {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl WeatherSource for HttpWeather {
    async fn fetch_weather(&self) -> Result<WeatherReading, ProviderError> {
        let reading: WeatherReading = get_json(&self.client, &self.url, "weather").await?;
        validate_weather(reading)
    }
}

#[async_trait::async_trait]
impl PriceSource for HttpPrice {
    async fn fetch_price(&self) -> Result<PriceReading, ProviderError> {
        let reading: PriceReading = get_json(&self.client, &self.url, "price").await?;
        validate_price(reading)
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    source_name: &'static str,
) -> Result<T, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| ProviderError::Transport { source_name, error })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            source_name,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|error| ProviderError::Decode { source_name, error })
}

fn validate_weather(reading: WeatherReading) -> Result<WeatherReading, ProviderError> {
    check_confidence("weather", reading.confidence)?;
    if !reading.temperature.is_finite() || !reading.rainfall.is_finite() || reading.rainfall < 0.0 {
        return Err(ProviderError::Invalid {
            source_name: "weather",
            detail: format!(
                "temperature {} / rainfall {} not usable",
                reading.temperature, reading.rainfall
            ),
        });
    }
    Ok(reading)
}

fn validate_price(reading: PriceReading) -> Result<PriceReading, ProviderError> {
    check_confidence("price", reading.confidence)?;
    if !reading.price.is_finite() || reading.price < 0.0 {
        return Err(ProviderError::Invalid {
            source_name: "price",
            detail: format!("price {} not usable", reading.price),
        });
    }
    Ok(reading)
}
