//! Ops Console: maintenance windows, the maintenance countdown page, the
//! update screen and the team board, on top of a pluggable slot store.

pub mod board;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod notice;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod update;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use error::{ConsoleError, Result, StorageError};
pub use maintenance::{
    Bucket, LoadReport, MaintenanceBuckets, MaintenancePatch, MaintenanceStore, MaintenanceWindow,
    NewMaintenance,
};
pub use storage::{FileSlotStore, MemorySlotStore, SlotStore};
