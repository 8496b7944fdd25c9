use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, LocalResult, NaiveTime, TimeZone, Timelike};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::dispatch::{DailyReport, Dispatcher};

/// The only job the process ever registers.
pub const JOB_ID: &str = "daily_farmer_notification";

/// "Every day at HH:MM" in the timezone of the clock it is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
}

impl DailyTrigger {
    /// Parse a 24-hour `HH:MM` string.
    pub fn parse(s: &str) -> Result<Self> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .with_context(|| format!("preferred_time '{s}' is not HH:MM"))?;
        let hour = two_digits(h).with_context(|| format!("preferred_time '{s}': bad hour"))?;
        let minute = two_digits(m).with_context(|| format!("preferred_time '{s}': bad minute"))?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .with_context(|| format!("preferred_time '{s}' is out of range"))?;
        Ok(Self { time })
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    /// Next firing strictly after `now`. A wall-clock time skipped by a DST
    /// jump fires an hour later that day; a repeated one fires on its first
    /// occurrence.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        // Today, tomorrow, and one spare day in case both land in a DST gap.
        for _ in 0..3 {
            let local = date.and_time(self.time);
            let candidate = match tz.from_local_datetime(&local) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t),
                LocalResult::None => tz.from_local_datetime(&(local + Duration::hours(1))).earliest(),
            };
            if let Some(t) = candidate
                && t > *now
            {
                return Some(t);
            }
            date = date.succ_opt()?;
        }
        None
    }
}

/// One or two ASCII digits, nothing else.
fn two_digits(s: &str) -> Option<u32> {
    if !(1..=2).contains(&s.len()) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for DailyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Serialize)]
pub struct JobInfo {
    pub id: &'static str,
    pub trigger: String,
    pub hour: u32,
    pub minute: u32,
    pub next_run: Option<DateTime<Local>>,
}

impl JobInfo {
    pub fn describe(trigger: &DailyTrigger) -> Self {
        Self {
            id: JOB_ID,
            trigger: format!("daily at {trigger}"),
            hour: trigger.hour(),
            minute: trigger.minute(),
            next_run: trigger.next_after(&Local::now()),
        }
    }
}

pub struct Scheduler {
    trigger: DailyTrigger,
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    pub fn new(trigger: DailyTrigger, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            trigger,
            dispatcher,
        }
    }

    /// Register the daily job and run its timer until the process exits.
    /// Each firing runs on its own task, so a slow run never delays the next.
    pub fn start(self) -> JoinHandle<()> {
        tracing::info!("Registered job '{JOB_ID}' daily at {}", self.trigger);
        tokio::spawn(async move {
            let mut after = Local::now();
            while let Some((fired, _run)) = self.fire_next(&after, Local::now()).await {
                after = fired.max(Local::now());
            }
            tracing::error!("No future run for '{JOB_ID}', timer stopped");
        })
    }

    /// Sleep from `now` until the first firing after `after`, then spawn the
    /// daily run. Returns the firing time and the run's task.
    async fn fire_next<Tz>(
        &self,
        after: &DateTime<Tz>,
        now: DateTime<Tz>,
    ) -> Option<(DateTime<Tz>, JoinHandle<DailyReport>)>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let next = self.trigger.next_after(after)?;
        tracing::info!("Next '{JOB_ID}' run at {next}");
        let wait = (next.clone() - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let dispatcher = self.dispatcher.clone();
        let run = tokio::spawn(async move {
            let report = dispatcher.run_daily().await;
            tracing::info!("Job '{JOB_ID}' run finished: {}", report.status);
            report
        });
        Some((next, run))
    }
}
