mod api;
mod compose;
mod config;
mod delivery;
mod dispatch;
mod providers;
mod scheduler;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;

use config::Config;
use delivery::DeliveryClient;
use dispatch::Dispatcher;
use scheduler::{DailyTrigger, JobInfo, Scheduler};

#[derive(Parser)]
#[command(
    name = "agribuddy",
    version,
    about = "Daily weather and mandi price alerts for farmers over SMS, voice and email"
)]
struct Cli {
    #[arg(short, long, env = "AGRIBUDDY_CONFIG", default_value = "~/.agribuddy/config.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the daily scheduler
    Run,
    /// Run the daily notification once and print the report
    Once,
    /// Show the resolved configuration and next scheduled run
    Status,
    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config).await?,
        Commands::Once => {
            let cfg = config::load(&cli.config)?;
            DailyTrigger::parse(&cfg.farmer.preferred_time)?;
            let report = build_dispatcher(&cfg).run_daily().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            let trigger = DailyTrigger::parse(&cfg.farmer.preferred_time)?;
            let status = serde_json::json!({
                "farmer": api::FarmerView::from(&cfg.farmer),
                "bind": cfg.server.bind,
                "twilio_configured": cfg.credentials.twilio.is_some(),
                "email_configured": cfg.credentials.smtp.is_some(),
                "weather_source": cfg.data.weather_url.as_deref().unwrap_or("built-in"),
                "price_source": cfg.data.price_url.as_deref().unwrap_or("built-in"),
                "job": JobInfo::describe(&trigger),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Init => {
            let path = config::init_config_dir().await?;
            tracing::info!("Initialized {}", path.display());
        }
    }
    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let trigger = DailyTrigger::parse(&cfg.farmer.preferred_time)
        .context("Cannot schedule the daily notification")?;

    let twilio_configured = cfg.credentials.twilio.is_some();
    let email_configured = cfg.credentials.smtp.is_some();
    if !twilio_configured {
        tracing::warn!("Twilio not configured (TWILIO_SID/TWILIO_TOKEN/TWILIO_FROM): SMS and calls will fail");
    }
    if !email_configured {
        tracing::warn!("SMTP not configured (SMTP_USER/SMTP_PASSWORD): email will fail");
    }

    let dispatcher = Arc::new(build_dispatcher(&cfg));
    Scheduler::new(trigger, dispatcher.clone()).start();

    let state = api::AppState {
        dispatcher,
        trigger,
        twilio_configured,
        email_configured,
    };
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("AgriBuddy listening on {}", cfg.server.bind);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

fn build_dispatcher(cfg: &Config) -> Dispatcher {
    Dispatcher::new(
        cfg.farmer.clone(),
        providers::create_weather_source(&cfg.data),
        providers::create_price_source(&cfg.data),
        DeliveryClient::from_credentials(&cfg.credentials),
    )
}
