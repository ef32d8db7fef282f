//! App-update screen. The native host drives the download; this side keeps the
//! screen state and forwards user intent to the host.

use serde::Serialize;
use tracing::{debug, info, warn};

pub const DEFAULT_ERROR_MESSAGE: &str = "Error downloading update";

/// Calls into the native host. Fire-and-forget: no buffering, no retry.
pub trait UpdateHost {
    fn start_update(&self);

    fn dismiss_update(&self);

    fn install_update(&self);

    fn open_release_notes(&self);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Downloading { percent: u8 },
    Installing,
    Failed { message: String },
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub percent: u8,
    pub label: &'static str,
}

pub fn clamp_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.round().clamp(0.0, 100.0) as u8
}

pub fn progress_label(percent: u8) -> &'static str {
    match percent {
        0..=29 => "Downloading update...",
        30..=59 => "Downloading...",
        60..=89 => "Preparing installation...",
        90..=99 => "Almost ready...",
        _ => "Download complete!",
    }
}

pub struct UpdateScreen<H: UpdateHost> {
    host: H,
    state: UpdateState,
}

impl<H: UpdateHost> UpdateScreen<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// "Update now", also used as retry after a failure.
    pub fn start(&mut self) -> bool {
        match self.state {
            UpdateState::Idle | UpdateState::Failed { .. } => {
                self.state = UpdateState::Downloading { percent: 0 };
                info!("update started");
                self.host.start_update();
                true
            }
            _ => {
                debug!("start ignored in state {:?}", self.state);
                false
            }
        }
    }

    /// "Later". Only offered before the download begins.
    pub fn dismiss(&mut self) -> bool {
        if self.state != UpdateState::Idle {
            return false;
        }
        self.state = UpdateState::Dismissed;
        self.host.dismiss_update();
        true
    }

    pub fn open_release_notes(&self) {
        self.host.open_release_notes();
    }

    /// Inbound from the host. Returns what the progress bar should show, or
    /// None when the screen no longer shows progress.
    pub fn set_progress(&mut self, percent: f64) -> Option<ProgressView> {
        let percent = clamp_percent(percent);
        match self.state {
            UpdateState::Idle | UpdateState::Downloading { .. } => {
                self.state = UpdateState::Downloading { percent };
                Some(ProgressView {
                    percent,
                    label: progress_label(percent),
                })
            }
            _ => None,
        }
    }

    /// Inbound from the host once the download finished.
    pub fn complete(&mut self) -> bool {
        match self.state {
            UpdateState::Idle | UpdateState::Downloading { .. } => {
                self.state = UpdateState::Installing;
                info!("update downloaded; installing");
                self.host.install_update();
                true
            }
            _ => false,
        }
    }

    pub fn show_error(&mut self, message: Option<&str>) {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
            .to_string();
        warn!("update failed: {message}");
        self.state = UpdateState::Failed { message };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHost {
        calls: RefCell<Vec<&'static str>>,
    }

    impl UpdateHost for RecordingHost {
        fn start_update(&self) {
            self.calls.borrow_mut().push("start");
        }
        fn dismiss_update(&self) {
            self.calls.borrow_mut().push("dismiss");
        }
        fn install_update(&self) {
            self.calls.borrow_mut().push("install");
        }
        fn open_release_notes(&self) {
            self.calls.borrow_mut().push("notes");
        }
    }

    #[test]
    fn percent_is_clamped_and_rounded() {
        assert_eq!(clamp_percent(-5.0), 0);
        assert_eq!(clamp_percent(42.4), 42);
        assert_eq!(clamp_percent(42.5), 43);
        assert_eq!(clamp_percent(250.0), 100);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(progress_label(0), "Downloading update...");
        assert_eq!(progress_label(30), "Downloading...");
        assert_eq!(progress_label(89), "Preparing installation...");
        assert_eq!(progress_label(90), "Almost ready...");
        assert_eq!(progress_label(100), "Download complete!");
    }

    #[test]
    fn happy_path_calls_host_in_order() {
        let mut screen = UpdateScreen::new(RecordingHost::default());
        assert!(screen.start());
        let view = screen.set_progress(120.0).unwrap();
        assert_eq!(view.percent, 100);
        assert!(screen.complete());
        assert!(!screen.complete());
        assert_eq!(screen.state(), &UpdateState::Installing);
        assert_eq!(*screen.host().calls.borrow(), vec!["start", "install"]);
    }

    #[test]
    fn dismiss_only_before_start() {
        let mut screen = UpdateScreen::new(RecordingHost::default());
        assert!(screen.start());
        assert!(!screen.dismiss());

        let mut fresh = UpdateScreen::new(RecordingHost::default());
        assert!(fresh.dismiss());
        assert_eq!(fresh.state(), &UpdateState::Dismissed);
        assert!(!fresh.start());
        assert_eq!(*fresh.host().calls.borrow(), vec!["dismiss"]);
    }

    #[test]
    fn error_stops_progress_and_start_retries() {
        let mut screen = UpdateScreen::new(RecordingHost::default());
        screen.start();
        screen.show_error(None);
        assert_eq!(
            screen.state(),
            &UpdateState::Failed {
                message: DEFAULT_ERROR_MESSAGE.to_string()
            }
        );
        assert_eq!(screen.set_progress(50.0), None);

        assert!(screen.start());
        assert_eq!(screen.state(), &UpdateState::Downloading { percent: 0 });
        assert_eq!(*screen.host().calls.borrow(), vec!["start", "start"]);
    }

    #[test]
    fn error_keeps_host_message() {
        let mut screen = UpdateScreen::new(RecordingHost::default());
        screen.show_error(Some("  disk full "));
        assert_eq!(
            screen.state(),
            &UpdateState::Failed {
                message: "disk full".to_string()
            }
        );
    }
}
