use serde::Serialize;

use crate::error::ConsoleError;

pub const DEFAULT_NOTICE_DURATION_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// Transient toast shown after an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub duration_ms: u64,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            duration_ms: DEFAULT_NOTICE_DURATION_MS,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn maintenance_created() -> Self {
        Self::success("Maintenance created.")
    }

    pub fn maintenance_updated() -> Self {
        Self::success("Maintenance updated.")
    }

    pub fn maintenance_toggled(is_active: bool) -> Self {
        if is_active {
            Self::success("Maintenance activated.")
        } else {
            Self::success("Maintenance deactivated.")
        }
    }

    pub fn maintenance_deleted() -> Self {
        Self::success("Maintenance deleted.")
    }

    pub fn maintenance_already_removed() -> Self {
        Self::info("Maintenance was already removed.")
    }

    pub fn task_created() -> Self {
        Self::success("Task created.")
    }

    pub fn task_moved(column_name: &str) -> Self {
        Self::success(format!("Task moved to {column_name}"))
    }
}

impl From<&ConsoleError> for Notice {
    fn from(err: &ConsoleError) -> Self {
        let message = match err {
            ConsoleError::Validation(message) => message.clone(),
            ConsoleError::NotFound { entity, .. } => format!("The {entity} no longer exists."),
            ConsoleError::Persistence(_) => "Could not save changes.".to_string(),
        };
        Self::error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn errors_become_error_notices() {
        let notice = Notice::from(&ConsoleError::validation("End time must be after the start time."));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "End time must be after the start time.");
        assert_eq!(notice.duration_ms, DEFAULT_NOTICE_DURATION_MS);

        let notice = Notice::from(&ConsoleError::not_found("maintenance", 3));
        assert_eq!(notice.message, "The maintenance no longer exists.");

        let notice = Notice::from(&ConsoleError::Persistence(StorageError::Other("x".into())));
        assert_eq!(notice.message, "Could not save changes.");
    }

    #[test]
    fn toggle_wording_follows_state() {
        assert_eq!(Notice::maintenance_toggled(true).message, "Maintenance activated.");
        assert_eq!(Notice::maintenance_toggled(false).message, "Maintenance deactivated.");
        assert_eq!(Notice::info("x").with_duration(500).duration_ms, 500);
        assert_eq!(Notice::maintenance_already_removed().level, NoticeLevel::Info);
    }
}
