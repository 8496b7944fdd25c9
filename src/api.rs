use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{FarmerConfig, redact_email, redact_phone};
use crate::delivery::{Channel, DeliveryError};
use crate::dispatch::{Dispatcher, Recipient};
use crate::scheduler::{DailyTrigger, JobInfo};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub trigger: DailyTrigger,
    pub twilio_configured: bool,
    pub email_configured: bool,
}

/// Body (or query string) of the single-channel action routes.
///
/// `destination` also accepts `phone`, `email`, or `to`. When it is missing or
/// blank the configured farmer is used and the response says so via
/// `used_default_recipient`. `name` defaults to the farmer's name.
#[derive(Debug, Default, Deserialize)]
pub struct TargetRequest {
    #[serde(default, alias = "phone", alias = "email", alias = "to")]
    pub destination: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    /// `success`, `failed` (provider refused), or `error` (nothing was sent).
    pub status: &'static str,
    pub channel: Channel,
    pub sent_to: String,
    pub name: String,
    pub used_default_recipient: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rainfall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ChannelResponse {
    /// A response for a request that never reached a provider.
    fn rejected(
        channel: Channel,
        sent_to: String,
        name: String,
        used_default_recipient: bool,
        error: String,
        error_kind: &'static str,
    ) -> Self {
        Self {
            status: "error",
            channel,
            sent_to,
            name,
            used_default_recipient,
            temperature: None,
            rainfall: None,
            price: None,
            confidence: None,
            provider_id: None,
            error: Some(error),
            error_kind: Some(error_kind),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FarmerView {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub commodity: String,
    pub preferred_time: String,
}

impl From<&FarmerConfig> for FarmerView {
    fn from(farmer: &FarmerConfig) -> Self {
        Self {
            name: farmer.name.clone(),
            phone: redact_phone(&farmer.phone),
            email: farmer.email.as_deref().map(redact_email),
            district: farmer.district.clone(),
            commodity: farmer.commodity.clone(),
            preferred_time: farmer.preferred_time.clone(),
        }
    }
}

const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /start",
    "GET /health",
    "GET /farmer_info",
    "POST /run_now",
    "POST /send_sms_to",
    "POST /call_number",
    "POST /send_email_to",
    "GET /send_sms_get",
    "GET /call_get",
    "GET /send_email_get",
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/start", get(handle_start))
        .route("/health", get(handle_health))
        .route("/farmer_info", get(handle_farmer_info))
        .route("/run_now", post(handle_run_now))
        .route("/send_sms_to", post(sms_post))
        .route("/call_number", post(call_post))
        .route("/send_email_to", post(email_post))
        .route("/send_sms_get", get(sms_get))
        .route("/call_get", get(call_get))
        .route("/send_email_get", get(email_get))
        .with_state(state)
}

async fn handle_index() -> impl IntoResponse {
    Json(json!({
        "service": "AgriBuddy Notifications",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

async fn handle_start(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "Schedulers running",
        "job": JobInfo::describe(&state.trigger),
    }))
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "twilio_configured": state.twilio_configured,
        "email_configured": state.email_configured,
        "job": JobInfo::describe(&state.trigger),
        "time": Local::now(),
    }))
}

async fn handle_farmer_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(FarmerView::from(state.dispatcher.farmer()))
}

async fn handle_run_now(State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("Manual run requested");
    let report = state.dispatcher.run_daily().await;
    if report.status == "error" {
        Json(json!({
            "status": "error",
            "error": report.error.clone(),
            "report": report,
        }))
    } else {
        Json(json!({
            "status": report.status,
            "farmer": FarmerView::from(state.dispatcher.farmer()),
            "report": report,
        }))
    }
}

async fn sms_post(State(state): State<AppState>, body: Bytes) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Sms, parse_body(&body)).await)
}

async fn call_post(State(state): State<AppState>, body: Bytes) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Call, parse_body(&body)).await)
}

async fn email_post(State(state): State<AppState>, body: Bytes) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Email, parse_body(&body)).await)
}

async fn sms_get(
    State(state): State<AppState>,
    query: Result<Query<TargetRequest>, QueryRejection>,
) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Sms, parse_query(query)).await)
}

async fn call_get(
    State(state): State<AppState>,
    query: Result<Query<TargetRequest>, QueryRejection>,
) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Call, parse_query(query)).await)
}

async fn email_get(
    State(state): State<AppState>,
    query: Result<Query<TargetRequest>, QueryRejection>,
) -> Json<ChannelResponse> {
    Json(handle_request(&state, Channel::Email, parse_query(query)).await)
}

/// Only an empty body means "use the configured farmer". Anything else must be
/// a valid `TargetRequest`, whatever its content type.
fn parse_body(body: &[u8]) -> Result<TargetRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TargetRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))
}

fn parse_query(query: Result<Query<TargetRequest>, QueryRejection>) -> Result<TargetRequest, String> {
    query
        .map(|Query(req)| req)
        .map_err(|e| format!("invalid query string: {}", e.body_text()))
}

async fn handle_request(
    state: &AppState,
    channel: Channel,
    req: Result<TargetRequest, String>,
) -> ChannelResponse {
    match req {
        Ok(req) => run_channel(state, channel, req).await,
        Err(detail) => {
            tracing::warn!("Rejected {channel} request: {detail}");
            ChannelResponse::rejected(
                channel,
                String::new(),
                String::new(),
                false,
                detail,
                "invalid_request",
            )
        }
    }
}

async fn run_channel(state: &AppState, channel: Channel, req: TargetRequest) -> ChannelResponse {
    let dispatcher = &state.dispatcher;
    let farmer = dispatcher.farmer();
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| farmer.name.clone());

    let (recipient, used_default) = match req.destination.filter(|d| !d.trim().is_empty()) {
        Some(destination) => (
            Recipient {
                name,
                destination: destination.trim().to_string(),
            },
            false,
        ),
        None => match dispatcher.default_recipient(channel) {
            Some(default) => {
                tracing::warn!("No destination in {channel} request, using configured farmer");
                (Recipient { name, ..default }, true)
            }
            None => {
                let err = DeliveryError::InvalidDestination(format!(
                    "no destination given and no default {channel} destination configured"
                ));
                return ChannelResponse::rejected(
                    channel,
                    String::new(),
                    name,
                    true,
                    err.to_string(),
                    err.kind(),
                );
            }
        },
    };

    let run = dispatcher.notify(channel, recipient).await;
    let Recipient { name, destination } = run.recipient;
    match run.outcome {
        Ok((reading, report)) => ChannelResponse {
            status: report.status(),
            channel,
            sent_to: destination,
            name,
            used_default_recipient: used_default,
            temperature: Some(reading.temperature),
            rainfall: Some(reading.rainfall),
            price: Some(reading.price),
            confidence: Some(reading.price_confidence),
            provider_id: report.provider_id().map(str::to_string),
            error: report.error().map(ToString::to_string),
            error_kind: report.error().map(DeliveryError::kind),
        },
        Err(e) => ChannelResponse::rejected(
            channel,
            destination,
            name,
            used_default,
            e.to_string(),
            "reading_unavailable",
        ),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::FarmerConfig;
    use crate::delivery::DeliveryClient;
    use crate::providers::fixed::{FixedPrice, FixedWeather};
    use crate::test_support::{FakeMail, FakeMessaging};

    struct Harness {
        app: Router,
        messaging: Arc<FakeMessaging>,
        mail: Arc<FakeMail>,
    }

    fn harness(messaging: FakeMessaging, configured: bool) -> Harness {
        let messaging = Arc::new(messaging);
        let mail = Arc::new(FakeMail::ok());
        let dispatcher = Dispatcher::new(
            FarmerConfig::default(),
            Box::new(FixedWeather),
            Box::new(FixedPrice),
            DeliveryClient::new(Some(messaging.clone()), Some(mail.clone())),
        );
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            trigger: DailyTrigger::parse("07:00").expect("valid"),
            twilio_configured: configured,
            email_configured: configured,
        };
        Harness {
            app: router(state),
            messaging,
            mail,
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.expect("infallible");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn test_send_sms_to_ad_hoc_recipient() {
        let h = harness(FakeMessaging::ok(), true);
        let (status, body) = send(
            &h.app,
            post_json(
                "/send_sms_to",
                json!({"phone": "+911234567890", "name": "Sita"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sent_to"], "+911234567890");
        assert_eq!(body["name"], "Sita");
        assert_eq!(body["status"], "success");
        assert_eq!(body["channel"], "sms");
        assert_eq!(body["used_default_recipient"], false);
        assert_eq!(body["price"], 2200.0);
        assert_eq!(body["rainfall"], 5.0);
        assert_eq!(h.messaging.sent()[0].to, "+911234567890");
    }

    #[tokio::test]
    async fn test_missing_destination_falls_back_to_farmer() {
        let h = harness(FakeMessaging::ok(), true);
        let (_, body) = send(&h.app, post_json("/call_number", json!({}))).await;
        assert_eq!(body["sent_to"], "+919876543210");
        assert_eq!(body["name"], "Ram");
        assert_eq!(body["used_default_recipient"], true);
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn test_post_without_body_falls_back_to_farmer() {
        let h = harness(FakeMessaging::ok(), true);
        let req = Request::post("/send_sms_to")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["used_default_recipient"], true);
    }

    #[tokio::test]
    async fn test_body_without_content_type_still_honours_destination() {
        let h = harness(FakeMessaging::ok(), true);
        let req = Request::post("/send_sms_to")
            .body(Body::from(r#"{"phone":"+911234567890","name":"Sita"}"#))
            .expect("request");
        let (_, body) = send(&h.app, req).await;
        assert_eq!(body["sent_to"], "+911234567890");
        assert_eq!(body["name"], "Sita");
        assert_eq!(body["used_default_recipient"], false);
        let sent = h.messaging.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+911234567890");
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected_without_sending() {
        let h = harness(FakeMessaging::ok(), true);
        let bad_bodies = [
            json!({"phone": "+911234567890", "name": 5}),
            json!({"phone": "+911234567890", "destination": "+911234567891"}),
        ];
        for bad in bad_bodies {
            let (status, body) = send(&h.app, post_json("/call_number", bad.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "error", "{bad}");
            assert_eq!(body["error_kind"], "invalid_request", "{bad}");
            assert_eq!(body["used_default_recipient"], false);
            assert_ne!(body["sent_to"], "+919876543210");
        }
        let req = Request::post("/send_email_to")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (_, body) = send(&h.app, req).await;
        assert_eq!(body["error_kind"], "invalid_request");
        assert!(h.messaging.sent().is_empty());
        assert!(h.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_query_is_structured_error() {
        let h = harness(FakeMessaging::ok(), true);
        let (status, body) = send(
            &h.app,
            get("/send_sms_get?phone=%2B911234567890&destination=%2B911234567891"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["channel"], "sms");
        assert_eq!(body["error_kind"], "invalid_request");
        assert!(body["error"].as_str().is_some_and(|e| e.contains("duplicate")));
        assert!(h.messaging.sent().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported_not_thrown() {
        let h = harness(FakeMessaging::failing(), true);
        let (status, body) = send(
            &h.app,
            post_json("/send_sms_to", json!({"destination": "+911234567890"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error_kind"], "provider");
        assert!(body["error"].as_str().is_some_and(|e| e.contains("21211")));
    }

    #[tokio::test]
    async fn test_get_variants_use_query_params() {
        let h = harness(FakeMessaging::ok(), true);
        let (_, body) = send(&h.app, get("/call_get?phone=%2B14155552671&name=Asha")).await;
        assert_eq!(body["sent_to"], "+14155552671");
        assert_eq!(body["name"], "Asha");
        assert_eq!(body["channel"], "call");

        let (_, body) = send(&h.app, get("/send_email_get?email=asha@example.com")).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["sent_to"], "asha@example.com");
        assert_eq!(h.mail.sent()[0].to, "asha@example.com");
    }

    #[tokio::test]
    async fn test_email_without_any_destination_is_error() {
        let h = harness(FakeMessaging::ok(), true);
        let (status, body) = send(&h.app, post_json("/send_email_to", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_kind"], "invalid_destination");
        assert!(h.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_farmer_info_redacts_phone() {
        let h = harness(FakeMessaging::ok(), true);
        let (_, body) = send(&h.app, get("/farmer_info")).await;
        let raw = body.to_string();
        assert!(!raw.contains("+919876543210"));
        assert!(!raw.contains("9876543210"));
        assert!(body["phone"].as_str().is_some_and(|p| p.ends_with("3210")));
        assert_eq!(body["name"], "Ram");
        assert_eq!(body["commodity"], "Wheat");
    }

    #[tokio::test]
    async fn test_health_reports_unconfigured() {
        let h = harness(FakeMessaging::ok(), false);
        let (_, body) = send(&h.app, get("/health")).await;
        assert_eq!(body["twilio_configured"], false);
        assert_eq!(body["email_configured"], false);
        assert_eq!(body["job"]["hour"], 7);
        assert_eq!(body["job"]["minute"], 0);
    }

    #[tokio::test]
    async fn test_run_now_runs_daily_pipeline() {
        let h = harness(FakeMessaging::ok(), true);
        let req = Request::post("/run_now").body(Body::empty()).expect("request");
        let (_, body) = send(&h.app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["farmer"]["name"], "Ram");
        assert_eq!(body["report"]["deliveries"].as_array().map(Vec::len), Some(2));
        assert_eq!(h.messaging.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_run_now_surfaces_failed_status() {
        let h = harness(FakeMessaging::failing(), true);
        let req = Request::post("/run_now").body(Body::empty()).expect("request");
        let (_, body) = send(&h.app, req).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["report"]["status"], "failed");
        assert_eq!(body["farmer"]["name"], "Ram");
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let h = harness(FakeMessaging::ok(), true);
        let (_, body) = send(&h.app, get("/")).await;
        let endpoints = body["endpoints"].as_array().expect("array");
        assert!(endpoints.iter().any(|e| e == "POST /send_sms_to"));
        let (_, body) = send(&h.app, get("/start")).await;
        assert_eq!(body["status"], "Schedulers running");
    }
}
