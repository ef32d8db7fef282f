//! Maintenance windows: the records, their time-based buckets, and the store
//! that owns and persists the collection.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{self, Clock, SystemClock};
use crate::error::{ConsoleError, Result};
use crate::storage::SlotStore;

pub const DEFAULT_MAINTENANCE_KEY: &str = "maintenanceData";
pub const LOAD_ERROR_NOTICE: &str = "Error loading maintenance data.";

/// Display vocabulary for `module_name`. The store never validates against it.
pub const MODULE_LABELS: [(&str, &str); 6] = [
    ("all", "Full system"),
    ("auth", "Authentication"),
    ("payments", "Payments"),
    ("search", "Search"),
    ("api", "API"),
    ("reports", "Reports"),
];

pub fn module_label(module_name: &str) -> Option<&'static str> {
    MODULE_LABELS
        .iter()
        .find(|(key, _)| *key == module_name)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: u64,
    pub module_name: String,
    pub is_active: bool,
    #[serde(with = "clock::local_minute")]
    pub start_at: NaiveDateTime,
    #[serde(with = "clock::local_minute")]
    pub end_at: NaiveDateTime,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Active,
    Scheduled,
    Past,
}

impl MaintenanceWindow {
    /// The manual flag and the time window are OR-ed: a window still inside
    /// its interval is Active even when the flag is off.
    pub fn bucket(&self, now: NaiveDateTime) -> Bucket {
        if self.is_active || (self.start_at <= now && now <= self.end_at) {
            Bucket::Active
        } else if now < self.start_at {
            Bucket::Scheduled
        } else {
            Bucket::Past
        }
    }

    pub fn module_label(&self) -> &str {
        module_label(&self.module_name).unwrap_or(self.module_name.as_str())
    }
}

/// Fields the create form submits.
#[derive(Debug, Clone)]
pub struct NewMaintenance {
    pub module_name: String,
    pub is_active: bool,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub message: Option<String>,
}

/// Replaceable fields; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct MaintenancePatch {
    pub module_name: Option<String>,
    pub is_active: Option<bool>,
    pub start_at: Option<NaiveDateTime>,
    pub end_at: Option<NaiveDateTime>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceBuckets {
    pub active: Vec<MaintenanceWindow>,
    pub scheduled: Vec<MaintenanceWindow>,
    pub past: Vec<MaintenanceWindow>,
}

impl MaintenanceBuckets {
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.active.len(), self.scheduled.len(), self.past.len())
    }

    pub fn total(&self) -> usize {
        self.active.len() + self.scheduled.len() + self.past.len()
    }
}

/// What `load` found in the slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    pub seeded: bool,
    /// Set when the snapshot could not be decoded; the collection is empty.
    pub notice: Option<String>,
}

fn validate_interval(start_at: &NaiveDateTime, end_at: &NaiveDateTime) -> Result<()> {
    if start_at >= end_at {
        return Err(ConsoleError::validation(
            "End time must be after the start time.",
        ));
    }
    Ok(())
}

fn example_windows(now_utc: DateTime<Utc>, now_local: NaiveDateTime) -> Vec<MaintenanceWindow> {
    let now_local = clock::truncate_to_minute(now_local);
    vec![
        MaintenanceWindow {
            id: 1,
            module_name: "auth".to_string(),
            is_active: true,
            start_at: now_local - Duration::hours(1),
            end_at: now_local + Duration::hours(1),
            message: "Scheduled maintenance of the authentication system. Some features may be unavailable."
                .to_string(),
            created_at: now_utc,
        },
        MaintenanceWindow {
            id: 2,
            module_name: "payments".to_string(),
            is_active: false,
            start_at: now_local + Duration::hours(24),
            end_at: now_local + Duration::hours(25),
            message: "Payment gateway upgrade. The system will be temporarily offline.".to_string(),
            created_at: now_utc,
        },
    ]
}

/// Owns the maintenance collection and writes a whole snapshot after every
/// mutation. Not meant for parallel mutation; wrap it in a lock to share.
pub struct MaintenanceStore<S: SlotStore> {
    slots: S,
    key: String,
    clock: Arc<dyn Clock>,
    seed_examples: bool,
    windows: Vec<MaintenanceWindow>,
    last_id: u64,
}

impl<S: SlotStore> MaintenanceStore<S> {
    pub fn new(slots: S) -> Self {
        Self {
            slots,
            key: DEFAULT_MAINTENANCE_KEY.to_string(),
            clock: Arc::new(SystemClock),
            seed_examples: true,
            windows: Vec::new(),
            last_id: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_seed_examples(mut self, seed: bool) -> Self {
        self.seed_examples = seed;
        self
    }

    pub fn windows(&self) -> &[MaintenanceWindow] {
        &self.windows
    }

    pub fn get(&self, id: u64) -> Option<&MaintenanceWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn now_local(&self) -> NaiveDateTime {
        self.clock.now_local()
    }

    pub fn load(&mut self) -> Result<LoadReport> {
        let raw = match self.slots.get(&self.key) {
            Ok(raw) => raw,
            Err(err) if err.is_corrupt() => return Ok(self.recover_from_corrupt(&err.to_string())),
            Err(err) => return Err(err.into()),
        };
        let Some(raw) = raw else {
            self.windows = if self.seed_examples {
                example_windows(self.clock.now_utc(), self.clock.now_local())
            } else {
                Vec::new()
            };
            self.sync_last_id();
            self.persist()?;
            info!(
                "maintenance slot {} empty; seeded {} windows",
                self.key,
                self.windows.len()
            );
            return Ok(LoadReport {
                restored: 0,
                seeded: self.seed_examples,
                notice: None,
            });
        };

        match serde_json::from_str::<Vec<MaintenanceWindow>>(&raw) {
            Ok(windows) => {
                self.windows = windows;
                self.sync_last_id();
                debug!("restored {} maintenance windows", self.windows.len());
                Ok(LoadReport {
                    restored: self.windows.len(),
                    seeded: false,
                    notice: None,
                })
            }
            Err(parse_error) => Ok(self.recover_from_corrupt(&parse_error.to_string())),
        }
    }

    /// Sets the unreadable snapshot aside and starts from an empty collection.
    fn recover_from_corrupt(&mut self, reason: &str) -> LoadReport {
        warn!("maintenance snapshot unreadable: {reason}");
        if let Err(err) = self.slots.quarantine(&self.key) {
            warn!("failed to quarantine maintenance snapshot: {err}");
        }
        self.windows.clear();
        self.sync_last_id();
        LoadReport {
            restored: 0,
            seeded: false,
            notice: Some(LOAD_ERROR_NOTICE.to_string()),
        }
    }

    pub fn create(&mut self, fields: NewMaintenance) -> Result<MaintenanceWindow> {
        let start_at = clock::truncate_to_minute(fields.start_at);
        let end_at = clock::truncate_to_minute(fields.end_at);
        validate_interval(&start_at, &end_at)?;

        let now = self.clock.now_utc();
        let window = MaintenanceWindow {
            id: self.next_id(&now)?,
            module_name: fields.module_name.trim().to_string(),
            is_active: fields.is_active,
            start_at,
            end_at,
            message: fields.message.unwrap_or_default(),
            created_at: now,
        };
        self.windows.push(window.clone());
        info!(id = window.id, module = %window.module_name, "maintenance created");
        self.persist()?;
        Ok(window)
    }

    pub fn update(&mut self, id: u64, patch: MaintenancePatch) -> Result<MaintenanceWindow> {
        let Some(index) = self.windows.iter().position(|w| w.id == id) else {
            return Err(ConsoleError::not_found("maintenance", id));
        };

        let current = &self.windows[index];
        let start_at = patch
            .start_at
            .map(clock::truncate_to_minute)
            .unwrap_or(current.start_at);
        let end_at = patch
            .end_at
            .map(clock::truncate_to_minute)
            .unwrap_or(current.end_at);
        validate_interval(&start_at, &end_at)?;

        let window = &mut self.windows[index];
        if let Some(module_name) = patch.module_name {
            window.module_name = module_name.trim().to_string();
        }
        if let Some(is_active) = patch.is_active {
            window.is_active = is_active;
        }
        if let Some(message) = patch.message {
            window.message = message;
        }
        window.start_at = start_at;
        window.end_at = end_at;
        let updated = window.clone();

        info!(id, "maintenance updated");
        self.persist()?;
        Ok(updated)
    }

    pub fn toggle_active(&mut self, id: u64) -> Result<bool> {
        let Some(window) = self.windows.iter_mut().find(|w| w.id == id) else {
            return Err(ConsoleError::not_found("maintenance", id));
        };
        window.is_active = !window.is_active;
        let is_active = window.is_active;

        info!(id, is_active, "maintenance toggled");
        self.persist()?;
        Ok(is_active)
    }

    /// Removing an unknown id is not an error; the snapshot is still written.
    pub fn delete(&mut self, id: u64) -> Result<bool> {
        let before = self.windows.len();
        self.windows.retain(|w| w.id != id);
        let removed = self.windows.len() != before;

        if removed {
            info!(id, "maintenance deleted");
        } else {
            debug!(id, "delete of unknown maintenance id ignored");
        }
        self.persist()?;
        Ok(removed)
    }

    pub fn classify(&self, now: NaiveDateTime) -> MaintenanceBuckets {
        let mut buckets = MaintenanceBuckets::default();
        for window in &self.windows {
            match window.bucket(now) {
                Bucket::Active => buckets.active.push(window.clone()),
                Bucket::Scheduled => buckets.scheduled.push(window.clone()),
                Bucket::Past => buckets.past.push(window.clone()),
            }
        }
        buckets
    }

    /// Classification against the store's own clock.
    pub fn classify_now(&self) -> MaintenanceBuckets {
        self.classify(self.clock.now_local())
    }

    fn persist(&self) -> Result<()> {
        let content = serde_json::to_string(&self.windows)?;
        if let Err(err) = self.slots.set(&self.key, &content) {
            warn!("failed to persist maintenance snapshot: {err}");
            return Err(err.into());
        }
        Ok(())
    }

    fn sync_last_id(&mut self) {
        self.last_id = self.windows.iter().map(|w| w.id).max().unwrap_or(0);
    }

    fn next_id(&mut self, now: &DateTime<Utc>) -> Result<u64> {
        let max_existing = self.windows.iter().map(|w| w.id).max().unwrap_or(0);
        let floor = self
            .last_id
            .max(max_existing)
            .checked_add(1)
            .ok_or_else(|| ConsoleError::validation("No maintenance ids left."))?;
        let id = clock::unix_ms(now).max(floor);
        self.last_id = id;
        Ok(id)
    }
}
