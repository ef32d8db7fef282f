//! Customer-facing maintenance page: time remaining, progress and the
//! "notify me" e-mail subscription.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::{ConsoleError, Result};
use crate::maintenance::{Bucket, MaintenanceStore, MaintenanceWindow};
use crate::storage::SlotStore;

pub const DEFAULT_NOTIFY_EMAIL_KEY: &str = "maintenanceNotifyEmail";

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownDisplay {
    pub days: String,
    pub hours: String,
    pub minutes: String,
    pub seconds: String,
}

impl TimeRemaining {
    pub fn from_ms(distance_ms: i64) -> Self {
        if distance_ms < 0 {
            return Self::default();
        }
        Self {
            days: distance_ms / MS_PER_DAY,
            hours: (distance_ms % MS_PER_DAY) / MS_PER_HOUR,
            minutes: (distance_ms % MS_PER_HOUR) / MS_PER_MINUTE,
            seconds: (distance_ms % MS_PER_MINUTE) / MS_PER_SECOND,
            total_ms: distance_ms,
        }
    }

    pub fn display(&self) -> CountdownDisplay {
        CountdownDisplay {
            days: format!("{:02}", self.days),
            hours: format!("{:02}", self.hours),
            minutes: format!("{:02}", self.minutes),
            seconds: format!("{:02}", self.seconds),
        }
    }
}

/// Countdown from the moment the page opened to the end of maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub started_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl Countdown {
    pub fn new(started_at: NaiveDateTime, ends_at: NaiveDateTime) -> Self {
        Self { started_at, ends_at }
    }

    pub fn for_window(window: &MaintenanceWindow, opened_at: NaiveDateTime) -> Self {
        Self::new(opened_at, window.end_at)
    }

    pub fn remaining(&self, now: NaiveDateTime) -> TimeRemaining {
        TimeRemaining::from_ms((self.ends_at - now).num_milliseconds())
    }

    pub fn is_complete(&self, now: NaiveDateTime) -> bool {
        self.remaining(now).total_ms <= 0
    }

    /// Elapsed share of the span, clamped to `[0, 100]`.
    pub fn progress_percent(&self, now: NaiveDateTime) -> f64 {
        let total = (self.ends_at - self.started_at).num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let remaining = self.remaining(now).total_ms;
        let elapsed = total - remaining;
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Countdown for the active window of `module_name`, falling back to the
/// whole-system (`all`) window. The latest ending window wins.
pub fn current_countdown<S: SlotStore>(
    store: &MaintenanceStore<S>,
    module_name: &str,
    opened_at: NaiveDateTime,
    now: NaiveDateTime,
) -> Option<Countdown> {
    store
        .windows()
        .iter()
        .filter(|w| w.bucket(now) == Bucket::Active)
        .filter(|w| w.module_name == module_name || w.module_name == "all")
        .max_by_key(|w| w.end_at)
        .map(|w| Countdown::for_window(w, opened_at))
}

/// Accepts `local@domain.tld`: no whitespace, one `@`, a dot after it with
/// text on both sides.
pub fn validate_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub struct NotifySubscription;

impl NotifySubscription {
    pub fn register<S: SlotStore + ?Sized>(slots: &S, key: &str, email: &str) -> Result<String> {
        let email = email.trim();
        if !validate_email(email) {
            return Err(ConsoleError::validation("Please enter a valid e-mail address."));
        }
        slots.set(key, email)?;
        info!("maintenance notification registered");
        Ok(email.to_string())
    }

    pub fn saved<S: SlotStore + ?Sized>(slots: &S, key: &str) -> Result<Option<String>> {
        Ok(slots
            .get(key)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemorySlotStore;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn remaining_breaks_down_distance() {
        let start = t(0, 0, 0);
        let end = start
            + Duration::days(2)
            + Duration::hours(5)
            + Duration::minutes(30)
            + Duration::seconds(45);
        let countdown = Countdown::new(start, end);

        let left = countdown.remaining(start);
        assert_eq!((left.days, left.hours, left.minutes, left.seconds), (2, 5, 30, 45));
        assert_eq!(left.display().seconds, "45");
        assert_eq!(left.display().days, "02");
    }

    #[test]
    fn remaining_is_zero_after_end() {
        let countdown = Countdown::new(t(1, 0, 0), t(2, 0, 0));
        assert_eq!(countdown.remaining(t(3, 0, 0)), TimeRemaining::default());
        assert!(countdown.is_complete(t(2, 0, 0)));
        assert!(!countdown.is_complete(t(1, 59, 59)));
    }

    #[test]
    fn progress_is_clamped() {
        let countdown = Countdown::new(t(1, 0, 0), t(3, 0, 0));
        assert_eq!(countdown.progress_percent(t(0, 0, 0)), 0.0);
        assert_eq!(countdown.progress_percent(t(2, 0, 0)), 50.0);
        assert_eq!(countdown.progress_percent(t(5, 0, 0)), 100.0);
        assert_eq!(Countdown::new(t(3, 0, 0), t(1, 0, 0)).progress_percent(t(2, 0, 0)), 100.0);
    }

    #[test]
    fn email_shapes() {
        assert!(validate_email("ops@example.com"));
        assert!(validate_email("a.b@c.d.e"));
        assert!(!validate_email("ops@example"));
        assert!(!validate_email("ops example@x.com"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("ops@.com"));
        assert!(!validate_email("ops@example."));
        assert!(!validate_email("a@b@c.com"));
    }

    #[test]
    fn subscription_round_trip() {
        let slots = MemorySlotStore::new();
        assert_eq!(NotifySubscription::saved(&slots, DEFAULT_NOTIFY_EMAIL_KEY).unwrap(), None);

        let err = NotifySubscription::register(&slots, DEFAULT_NOTIFY_EMAIL_KEY, "nope").unwrap_err();
        assert!(matches!(err, ConsoleError::Validation(_)));

        NotifySubscription::register(&slots, DEFAULT_NOTIFY_EMAIL_KEY, "  ops@example.com ").unwrap();
        assert_eq!(
            NotifySubscription::saved(&slots, DEFAULT_NOTIFY_EMAIL_KEY).unwrap().as_deref(),
            Some("ops@example.com")
        );
    }

    #[test]
    fn countdown_targets_latest_active_window_for_module() {
        let now = t(12, 0, 0);
        let windows = vec![
            MaintenanceWindow {
                id: 1,
                module_name: "auth".to_string(),
                is_active: false,
                start_at: t(11, 0, 0),
                end_at: t(13, 0, 0),
                message: String::new(),
                created_at: now.and_utc(),
            },
            MaintenanceWindow {
                id: 2,
                module_name: "all".to_string(),
                is_active: true,
                start_at: t(11, 0, 0),
                end_at: t(15, 0, 0),
                message: String::new(),
                created_at: now.and_utc(),
            },
            MaintenanceWindow {
                id: 3,
                module_name: "payments".to_string(),
                is_active: true,
                start_at: t(11, 0, 0),
                end_at: t(20, 0, 0),
                message: String::new(),
                created_at: now.and_utc(),
            },
        ];
        let slots = Arc::new(MemorySlotStore::with_entry(
            crate::maintenance::DEFAULT_MAINTENANCE_KEY,
            &serde_json::to_string(&windows).unwrap(),
        ));
        let mut store = MaintenanceStore::new(slots).with_clock(Arc::new(FixedClock::at_local(now)));
        store.load().unwrap();

        let countdown = current_countdown(&store, "auth", now, now).unwrap();
        assert_eq!(countdown.ends_at, t(15, 0, 0));
        let fallback = current_countdown(&store, "search", now, now).unwrap();
        assert_eq!(fallback.ends_at, t(15, 0, 0));

        store.delete(2).unwrap();
        assert!(current_countdown(&store, "search", now, now).is_none());
        assert!(current_countdown(&store, "auth", now, now + Duration::hours(2)).is_none());
    }
}
