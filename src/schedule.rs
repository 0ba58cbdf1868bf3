//! Wall-clock scheduling for watch mode.
//!
//! Rounds fire at configured local times ("09:00", "13:00", ...), with an
//! optional weekdays-only gate. The schedule itself is pure arithmetic over
//! `chrono` types so it can be tested without sleeping.

use crate::config::ScheduleSettings;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone};

/// A parsed, sorted run schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    times: Vec<NaiveTime>,
    weekdays_only: bool,
}

impl Schedule {
    pub fn from_settings(settings: &ScheduleSettings) -> Result<Self> {
        let mut times = Vec::with_capacity(settings.run_times.len());
        for raw in &settings.run_times {
            let time = NaiveTime::parse_from_str(raw, "%H:%M")
                .with_context(|| format!("invalid schedule time: {raw}"))?;
            times.push(time);
        }
        times.sort();
        times.dedup();
        anyhow::ensure!(!times.is_empty(), "schedule declares no run times");
        Ok(Self {
            times,
            weekdays_only: settings.weekdays_only,
        })
    }

    /// The next instant at or after `now` when a round should fire.
    pub fn next_run(&self, now: DateTime<Local>) -> DateTime<Local> {
        // Walk forward day by day; the weekday gate can skip at most two
        // days in a row, so this terminates quickly.
        let mut date = now.date_naive();
        loop {
            if self.runs_on(date) {
                for time in &self.times {
                    let candidate = date.and_time(*time);
                    if let Some(candidate) = Local.from_local_datetime(&candidate).single() {
                        if candidate > now {
                            return candidate;
                        }
                    }
                }
            }
            date += Duration::days(1);
        }
    }

    fn runs_on(&self, date: chrono::NaiveDate) -> bool {
        !self.weekdays_only || date.weekday().number_from_monday() <= 5
    }
}

/// Sleep until the next scheduled slot, checking the stop flag roughly
/// every 30 seconds so Ctrl-C does not hang until the next round.
pub async fn sleep_until_next(
    schedule: &Schedule,
    stop: &std::sync::atomic::AtomicBool,
) -> bool {
    let next = schedule.next_run(Local::now());
    tracing::info!(next = %next.format("%Y-%m-%d %H:%M"), "waiting for next scheduled round");

    loop {
        if stop.load(std::sync::atomic::Ordering::Relaxed) {
            return false;
        }
        let remaining = next - Local::now();
        if remaining <= Duration::zero() {
            return true;
        }
        let chunk = remaining
            .to_std()
            .unwrap_or_default()
            .min(std::time::Duration::from_secs(30));
        tokio::time::sleep(chunk).await;
    }
}
