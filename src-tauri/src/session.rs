//! Start-up wiring shared by every front-end: config, then the stores.
//! Nothing here is fatal; a store that cannot be read starts empty and the
//! failure becomes a notice.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::board::BoardStore;
use crate::clock::Clock;
use crate::config::{ConfigSource, ConsoleConfig};
use crate::maintenance::{MaintenanceStore, LOAD_ERROR_NOTICE};
use crate::notice::Notice;
use crate::storage::SlotStore;

const BOARD_ERROR_NOTICE: &str = "Error loading board data.";

pub struct ConsoleSession<S: SlotStore + Clone> {
    pub config: ConsoleConfig,
    pub maintenance: MaintenanceStore<S>,
    pub board: BoardStore<S>,
    /// Load problems to show once the UI is up.
    pub notices: Vec<Notice>,
}

impl<S: SlotStore + Clone> ConsoleSession<S> {
    /// `on_config` runs as soon as the config is known and before anything
    /// else logs, so the caller can install a subscriber with its filter.
    pub fn open(slots: S, clock: Arc<dyn Clock>, on_config: impl FnOnce(&ConsoleConfig)) -> Self {
        let (config, source) = match ConsoleConfig::load_with_source(&slots) {
            Ok(found) => found,
            Err(err) => (ConsoleConfig::default(), ConfigSource::Fallback(err.to_string())),
        };
        on_config(&config);
        if let ConfigSource::Fallback(reason) = &source {
            warn!("console config unreadable, using defaults: {reason}");
        }

        let mut notices = Vec::new();
        let mut maintenance = MaintenanceStore::new(slots.clone())
            .with_key(config.maintenance_key.clone())
            .with_clock(clock.clone())
            .with_seed_examples(config.seed_examples);
        match maintenance.load() {
            Ok(report) => {
                info!(
                    restored = report.restored,
                    seeded = report.seeded,
                    "maintenance store ready"
                );
                notices.extend(report.notice.map(Notice::error));
            }
            Err(err) => {
                error!("maintenance load failed, continuing with what is in memory: {err}");
                notices.push(Notice::error(LOAD_ERROR_NOTICE));
            }
        }

        let board = match BoardStore::open(slots.clone(), config.board_key.clone(), clock.now_utc()) {
            Ok(board) => board,
            Err(err) => {
                error!("board load failed, starting with default columns: {err}");
                notices.push(Notice::error(BOARD_ERROR_NOTICE));
                BoardStore::fresh(slots, config.board_key.clone(), clock.now_utc())
            }
        };

        let notices = notices
            .into_iter()
            .map(|notice| notice.with_duration(config.notice_duration_ms))
            .collect();
        Self {
            config,
            maintenance,
            board,
            notices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::CONFIG_KEY;
    use crate::notice::NoticeLevel;
    use crate::storage::MemorySlotStore;
    use chrono::NaiveDate;

    fn clock() -> Arc<dyn Clock> {
        let noon = NaiveDate::from_ymd_opt(2025, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        Arc::new(FixedClock::at_local(noon))
    }

    #[test]
    fn fresh_slots_open_cleanly_and_config_is_seen_first() {
        let slots = Arc::new(MemorySlotStore::new());
        let mut seen = None;
        let session = ConsoleSession::open(slots, clock(), |config| seen = Some(config.clone()));

        assert_eq!(seen, Some(ConsoleConfig::default()));
        assert!(session.notices.is_empty());
        assert_eq!(session.maintenance.windows().len(), 2);
        assert_eq!(session.board.board().columns.len(), 4);
    }

    #[test]
    fn failing_writes_do_not_stop_start_up() {
        let slots = Arc::new(MemorySlotStore::with_entry(
            CONFIG_KEY,
            r#"{"notice_duration_ms": 5000}"#,
        ));
        slots.fail_writes(true);

        let session = ConsoleSession::open(slots, clock(), |_| {});
        assert_eq!(session.notices.len(), 1);
        assert_eq!(session.notices[0].level, NoticeLevel::Error);
        assert_eq!(session.notices[0].message, LOAD_ERROR_NOTICE);
        assert_eq!(session.notices[0].duration_ms, 5000);
        assert_eq!(session.board.board().columns.len(), 4);
    }
}
