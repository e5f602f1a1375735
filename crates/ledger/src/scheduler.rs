//! Daily driver for recurring rules.
//!
//! [`run_scheduler`] performs one catch-up tick at startup, then sleeps until
//! the configured local time each day and runs [`Engine::run_due_rules`] for
//! that calendar day in the configured timezone.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::{Engine, EngineError, ResultEngine};

/// A rule that failed during a tick. It keeps its `next_run_date` and is
/// retried on the next tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub error: String,
}

/// Result of one scheduler tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub date: NaiveDate,
    pub fired: Vec<Uuid>,
    pub deactivated: Vec<Uuid>,
    pub failed: Vec<RuleFailure>,
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl SchedulerConfig {
    pub fn new(hour: u32, minute: u32, timezone: Tz) -> ResultEngine<Self> {
        if hour > 23 || minute > 59 {
            return Err(EngineError::InvalidValue(format!(
                "invalid scheduler time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self {
            hour,
            minute,
            timezone,
        })
    }

    /// Calendar day of `now` in the scheduler timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

/// The next instant strictly after `now` at which the local wall clock reads
/// `hour:minute`. Skipped local times (DST gaps) move to the following day.
pub fn next_wakeup(now: DateTime<Utc>, config: &SchedulerConfig) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(config.hour, config.minute, 0)?;
    let mut day = config.today(now);
    for _ in 0..3 {
        let local = config
            .timezone
            .from_local_datetime(&day.and_time(time))
            .earliest();
        if let Some(local) = local {
            let at = local.with_timezone(&Utc);
            if at > now {
                return Some(at);
            }
        }
        day = day.checked_add_days(Days::new(1))?;
    }
    None
}

async fn tick(engine: &Engine, config: &SchedulerConfig) {
    let today = config.today(Utc::now());
    if let Err(err) = engine.run_due_rules(today).await {
        tracing::error!(%today, error = %err, "scheduler tick aborted");
    }
}

/// Runs until `shutdown` resolves.
pub async fn run_scheduler<F>(engine: Arc<Engine>, config: SchedulerConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    tracing::info!(
        hour = config.hour,
        minute = config.minute,
        timezone = %config.timezone,
        "scheduler started"
    );
    tick(&engine, &config).await;

    loop {
        let now = Utc::now();
        let Some(at) = next_wakeup(now, &config) else {
            tracing::error!("no scheduler wake-up time could be computed");
            break;
        };
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next = %at, "scheduler sleeping");
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(wait) => tick(&engine, &config).await,
        }
    }
    tracing::info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn wakes_later_today_or_tomorrow() {
        let config = SchedulerConfig::new(2, 0, chrono_tz::UTC).unwrap();
        assert_eq!(
            next_wakeup(utc(2025, 3, 1, 1, 0), &config),
            Some(utc(2025, 3, 1, 2, 0))
        );
        assert_eq!(
            next_wakeup(utc(2025, 3, 1, 2, 0), &config),
            Some(utc(2025, 3, 2, 2, 0))
        );
    }

    #[test]
    fn local_day_follows_timezone() {
        let config = SchedulerConfig::new(0, 5, chrono_tz::Europe::Budapest).unwrap();
        // 23:30 UTC on Jan 31 is already Feb 1 in Budapest.
        let now = utc(2025, 1, 31, 23, 30);
        assert_eq!(config.today(now), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(next_wakeup(now, &config), Some(utc(2025, 2, 1, 23, 5)));
    }

    #[test]
    fn dst_gap_moves_to_next_day() {
        let config = SchedulerConfig::new(2, 30, chrono_tz::Europe::Budapest).unwrap();
        // 02:30 does not exist in Budapest on 2025-03-30.
        let now = utc(2025, 3, 29, 23, 0);
        assert_eq!(next_wakeup(now, &config), Some(utc(2025, 3, 31, 0, 30)));
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(SchedulerConfig::new(24, 0, chrono_tz::UTC).is_err());
        assert!(SchedulerConfig::new(6, 60, chrono_tz::UTC).is_err());
    }
}
