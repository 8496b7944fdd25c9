//! Constant readings used until a real upstream is configured.

use super::{PriceReading, PriceSource, ProviderError, WeatherReading, WeatherSource};

pub struct FixedWeather;

pub struct FixedPrice;

#[async_trait::async_trait]
impl WeatherSource for FixedWeather {
    async fn fetch_weather(&self) -> Result<WeatherReading, ProviderError> {
        Ok(WeatherReading {
            temperature: 32.0,
            rainfall: 5.0,
            confidence: 0.9,
        })
    }
}

#[async_trait::async_trait]
impl PriceSource for FixedPrice {
    async fn fetch_price(&self) -> Result<PriceReading, ProviderError> {
        Ok(PriceReading {
            price: 2200.0,
            confidence: 0.92,
        })
    }
}
