pub mod fixed;
pub mod http;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DataConfig;

// --- Readings ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// °C
    pub temperature: f64,
    /// mm
    pub rainfall: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceReading {
    /// Currency units per quintal
    pub price: f64,
    pub confidence: f64,
}

/// One snapshot shared by every channel of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f64,
    pub rainfall: f64,
    pub weather_confidence: f64,
    pub price: f64,
    pub price_confidence: f64,
}

impl Reading {
    pub fn new(weather: WeatherReading, price: PriceReading) -> Self {
        Self {
            temperature: weather.temperature,
            rainfall: weather.rainfall,
            weather_confidence: weather.confidence,
            price: price.price,
            price_confidence: price.confidence,
        }
    }
}

// --- Errors ---

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{source_name} request failed: {error}")]
    Transport {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },

    #[error("{source_name} returned HTTP {status}: {body}")]
    Status {
        source_name: &'static str,
        status: u16,
        body: String,
    },

    #[error("{source_name} returned an unreadable body: {error}")]
    Decode {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },

    #[error("{source_name} returned invalid data: {detail}")]
    Invalid {
        source_name: &'static str,
        detail: String,
    },
}

// --- Source traits ---

#[async_trait::async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_weather(&self) -> Result<WeatherReading, ProviderError>;
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self) -> Result<PriceReading, ProviderError>;
}

/// Fetch weather and price concurrently. Either failure aborts the snapshot.
pub async fn take_reading(
    weather: &dyn WeatherSource,
    price: &dyn PriceSource,
) -> Result<Reading, ProviderError> {
    let (w, p) = tokio::try_join!(weather.fetch_weather(), price.fetch_price())?;
    Ok(Reading::new(w, p))
}

pub(crate) fn check_confidence(source_name: &'static str, value: f64) -> Result<f64, ProviderError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ProviderError::Invalid {
            source_name,
            detail: format!("confidence {value} outside [0, 1]"),
        })
    }
}

// --- Factory ---

pub fn create_weather_source(config: &DataConfig) -> Box<dyn WeatherSource> {
    match &config.weather_url {
        Some(url) => Box::new(http::HttpWeather::new(url)),
        None => Box::new(fixed::FixedWeather),
    }
}

pub fn create_price_source(config: &DataConfig) -> Box<dyn PriceSource> {
    match &config.price_url {
        Some(url) => Box::new(http::HttpPrice::new(url)),
        None => Box::new(fixed::FixedPrice),
    }
}
