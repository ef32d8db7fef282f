use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

const POLL_STEP: Duration = Duration::from_millis(50);

/// Background ticker for read-only re-classification. A panicking tick is
/// logged and the loop keeps going.
pub struct RefreshLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshLoop {
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            debug!("refresh loop started, every {:?}", interval);
            while !flag.load(Ordering::SeqCst) {
                let _ = panic::catch_unwind(AssertUnwindSafe(&mut tick)).map_err(|_| {
                    error!("refresh tick panicked; loop continues");
                });

                let deadline = Instant::now() + interval;
                while Instant::now() < deadline {
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }
                    thread::sleep(POLL_STEP.min(interval));
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
