use chrono::{DateTime, Local};
use serde::Serialize;

use crate::config::FarmerConfig;
use crate::delivery::{Channel, DeliveryClient, DeliveryReport, DeliverySummary};
use crate::providers::{self, PriceSource, ProviderError, Reading, WeatherSource};

/// Who a single dispatch is addressed to. Ad-hoc recipients live only as long
/// as the request that named them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub destination: String,
}

/// The fetch -> compose -> deliver pipeline. Holds no mutable state, so the
/// timer and any number of requests may run it at the same time.
pub struct Dispatcher {
    farmer: FarmerConfig,
    weather: Box<dyn WeatherSource>,
    prices: Box<dyn PriceSource>,
    delivery: DeliveryClient,
}

/// Result of a single-channel dispatch.
pub struct ChannelRun {
    pub recipient: Recipient,
    pub outcome: Result<(Reading, DeliveryReport), ProviderError>,
}

#[derive(Debug, Serialize)]
pub struct DailyReport {
    pub started_at: DateTime<Local>,
    /// `success`, `partial`, `failed`, or `error` when no reading could be taken.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub deliveries: Vec<DeliverySummary>,
}

impl Dispatcher {
    pub fn new(
        farmer: FarmerConfig,
        weather: Box<dyn WeatherSource>,
        prices: Box<dyn PriceSource>,
        delivery: DeliveryClient,
    ) -> Self {
        Self {
            farmer,
            weather,
            prices,
            delivery,
        }
    }

    pub fn farmer(&self) -> &FarmerConfig {
        &self.farmer
    }

    pub fn default_recipient(&self, channel: Channel) -> Option<Recipient> {
        let destination = match channel {
            Channel::Sms | Channel::Call => Some(self.farmer.phone.clone()),
            Channel::Email => self.farmer.email.clone(),
        }?;
        Some(Recipient {
            name: self.farmer.name.clone(),
            destination,
        })
    }

    pub async fn reading(&self) -> Result<Reading, ProviderError> {
        providers::take_reading(self.weather.as_ref(), self.prices.as_ref())
            .await
            .inspect_err(|e| tracing::error!("Reading unavailable, dispatch aborted: {e}"))
    }

    /// The scheduled job: one reading, SMS and call to the farmer, plus email
    /// when the farmer has an address on file.
    pub async fn run_daily(&self) -> DailyReport {
        let started_at = Local::now();
        tracing::info!("Daily dispatch for {} started", self.farmer.name);

        let reading = match self.reading().await {
            Ok(r) => r,
            Err(e) => {
                return DailyReport {
                    started_at,
                    status: "error",
                    reading: None,
                    error: Some(e.to_string()),
                    deliveries: Vec::new(),
                };
            }
        };

        let farmer = &self.farmer;
        let (sms, call) = tokio::join!(
            self.delivery
                .send_sms(&farmer.phone, &farmer.name, &farmer.commodity, &reading),
            self.delivery
                .make_call(&farmer.phone, &farmer.name, &farmer.commodity, &reading),
        );
        let mut reports = vec![sms, call];
        if let Some(email) = &farmer.email {
            reports.push(
                self.delivery
                    .send_email(email, &farmer.name, &farmer.commodity, &reading)
                    .await,
            );
        }

        let delivered = reports.iter().filter(|r| r.is_success()).count();
        let status = match delivered {
            0 => "failed",
            n if n == reports.len() => "success",
            _ => "partial",
        };
        tracing::info!(
            "Daily dispatch for {} finished: {delivered}/{} channels delivered",
            farmer.name,
            reports.len()
        );

        DailyReport {
            started_at,
            status,
            reading: Some(reading),
            error: None,
            deliveries: reports.iter().map(DeliveryReport::summary).collect(),
        }
    }

    /// Run the pipeline for one channel and one recipient.
    pub async fn notify(&self, channel: Channel, recipient: Recipient) -> ChannelRun {
        let reading = match self.reading().await {
            Ok(r) => r,
            Err(e) => {
                return ChannelRun {
                    recipient,
                    outcome: Err(e),
                };
            }
        };

        let Recipient { name, destination } = &recipient;
        let commodity = &self.farmer.commodity;
        let report = match channel {
            Channel::Sms => {
                self.delivery
                    .send_sms(destination, name, commodity, &reading)
                    .await
            }
            Channel::Call => {
                self.delivery
                    .make_call(destination, name, commodity, &reading)
                    .await
            }
            Channel::Email => {
                self.delivery
                    .send_email(destination, name, commodity, &reading)
                    .await
            }
        };

        ChannelRun {
            recipient,
            outcome: Ok((reading, report)),
        }
    }
}
