use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub farmer: FarmerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Filled from the environment after the file is parsed, never from TOML.
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

/// The default recipient notified by the daily job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmerConfig {
    pub name: String,
    /// E.164, e.g. +919876543210
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    pub commodity: String,
    /// HH:MM, 24-hour, local time
    pub preferred_time: String,
}

impl Default for FarmerConfig {
    fn default() -> Self {
        Self {
            name: "Ram".into(),
            phone: "+919876543210".into(),
            email: None,
            district: Some("Nashik".into()),
            commodity: "Wheat".into(),
            preferred_time: "07:00".into(),
        }
    }
}

/// Upstream JSON endpoints. Unset means the built-in stand-in readings.
#[derive(Debug, Default, Deserialize)]
pub struct DataConfig {
    pub weather_url: Option<String>,
    pub price_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub twilio: Option<TwilioCredentials>,
    pub smtp: Option<SmtpCredentials>,
}

#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl Credentials {
    pub fn from_env(smtp: &SmtpConfig) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), smtp)
    }

    /// Resolve credentials through `lookup`. A channel is configured only when
    /// every variable it requires is present and non-blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, smtp: &SmtpConfig) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let twilio = match (var("TWILIO_SID"), var("TWILIO_TOKEN"), var("TWILIO_FROM")) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioCredentials {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        let smtp = match (var("SMTP_USER"), var("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => {
                let port = match var("SMTP_PORT") {
                    Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                        tracing::warn!("Ignoring invalid SMTP_PORT '{raw}', using {}", smtp.port);
                        smtp.port
                    }),
                    None => smtp.port,
                };
                Some(SmtpCredentials {
                    host: var("SMTP_HOST").unwrap_or_else(|| smtp.host.clone()),
                    port,
                    from_address: var("EMAIL_FROM").unwrap_or_else(|| username.clone()),
                    username,
                    password,
                })
            }
            _ => None,
        };

        Self { twilio, smtp }
    }
}

/// Load the config file if it exists, then overlay environment credentials.
/// A missing file is not an error: the built-in farmer profile is used.
pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?
    } else {
        tracing::info!("No config at {}, using built-in defaults", path.display());
        Config::default()
    };

    if let Ok(bind) = std::env::var("BIND_ADDR")
        && !bind.trim().is_empty()
    {
        config.server.bind = bind;
    }
    config.credentials = Credentials::from_env(&config.smtp);
    Ok(config)
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = base_dir();
    tokio::fs::create_dir_all(&base).await?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[server]
bind = "0.0.0.0:8000"

[farmer]
name = "Ram"
phone = "+919876543210"   # E.164
# email = "ram@example.com"
district = "Nashik"
commodity = "Wheat"
preferred_time = "07:00"  # HH:MM, local time

# Leave unset to use the built-in stand-in readings.
# [data]
# weather_url = "https://example.com/weather.json"  # {"temperature", "rainfall", "confidence"}
# price_url = "https://example.com/price.json"      # {"price", "confidence"}

[smtp]
host = "smtp.gmail.com"
port = 587

# Credentials are read from the environment:
#   TWILIO_SID, TWILIO_TOKEN, TWILIO_FROM
#   SMTP_USER, SMTP_PASSWORD, SMTP_HOST, SMTP_PORT, EMAIL_FROM
"#,
        )
        .await?;
    }

    Ok(config_path)
}

/// `+919876543210` -> `********3210`
pub fn redact_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let hidden = chars.len() - 4;
    let tail: String = chars[hidden..].iter().collect();
    format!("{}{tail}", "*".repeat(hidden))
}

/// `ram@example.com` -> `r***@example.com`
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agribuddy")
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
