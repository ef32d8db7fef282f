//! Tauri shell: app state, invoke commands and the refresh loop.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_opener::OpenerExt;
use tracing::{info, warn};

use crate::board::{BoardStore, NewTask};
use crate::clock::{self, Clock, SystemClock};
use crate::config::ConsoleConfig;
use crate::countdown::{self, NotifySubscription};
use crate::error::ConsoleError;
use crate::logging;
use crate::maintenance::{
    MaintenancePatch, MaintenanceStore, MaintenanceWindow, NewMaintenance, MODULE_LABELS,
};
use crate::notice::Notice;
use crate::refresh::RefreshLoop;
use crate::session::ConsoleSession;
use crate::storage::FileSlotStore;
use crate::update::{UpdateHost, UpdateScreen};

const STORAGE_DIR: &str = "OpsConsole";
const BUCKETS_EVENT: &str = "maintenance://buckets";
const UPDATE_HOST_EVENT: &str = "update://host";
const UPDATE_STATE_EVENT: &str = "update://state";

type Slots = Arc<FileSlotStore>;

struct TauriUpdateHost {
    app: AppHandle,
    release_notes_url: Option<String>,
}

impl TauriUpdateHost {
    fn notify(&self, action: &'static str) {
        info!("update host call: {action}");
        if let Err(err) = self.app.emit(UPDATE_HOST_EVENT, json!({ "action": action })) {
            warn!("failed to emit {action} to update host: {err}");
        }
    }
}

impl UpdateHost for TauriUpdateHost {
    fn start_update(&self) {
        self.notify("start_update");
    }

    fn dismiss_update(&self) {
        self.notify("dismiss_update");
    }

    fn install_update(&self) {
        self.notify("install_update");
    }

    fn open_release_notes(&self) {
        let Some(url) = self.release_notes_url.clone() else {
            self.notify("open_release_notes");
            return;
        };
        if let Err(err) = self.app.opener().open_url(url, Option::<String>::None) {
            warn!("failed to open release notes: {err}");
        }
    }
}

pub struct AppState {
    config: ConsoleConfig,
    slots: Slots,
    clock: Arc<dyn Clock>,
    maintenance: Mutex<MaintenanceStore<Slots>>,
    board: Mutex<BoardStore<Slots>>,
    update: Mutex<UpdateScreen<TauriUpdateHost>>,
    startup_notices: Mutex<Vec<Notice>>,
    refresh: Mutex<Option<RefreshLoop>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("state mutex poisoned; continuing with inner state");
            poisoned.into_inner()
        }
    }
}

fn storage_root_dir(app: &AppHandle) -> Result<PathBuf, String> {
    let base = app.path().app_data_dir().map_err(|err| err.to_string())?;
    let root = base.join(STORAGE_DIR);
    fs::create_dir_all(root.as_path()).map_err(|err| err.to_string())?;
    Ok(root)
}

impl AppState {
    fn open(app: &AppHandle) -> Result<Self, Box<dyn std::error::Error>> {
        let root = storage_root_dir(app)?;
        let slots: Slots = Arc::new(FileSlotStore::open(root)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let session = ConsoleSession::open(slots.clone(), clock.clone(), |config| {
            logging::init(&config.log_filter);
        });
        info!("storage root {}", slots.root().display());

        let ConsoleSession {
            config,
            maintenance,
            board,
            notices,
        } = session;
        let update = UpdateScreen::new(TauriUpdateHost {
            app: app.clone(),
            release_notes_url: config.release_notes_url.clone(),
        });

        Ok(Self {
            config,
            slots,
            clock,
            maintenance: Mutex::new(maintenance),
            board: Mutex::new(board),
            update: Mutex::new(update),
            startup_notices: Mutex::new(notices),
            refresh: Mutex::new(None),
        })
    }

    fn notice(&self, notice: Notice) -> Notice {
        notice.with_duration(self.config.notice_duration_ms)
    }

    fn reply<T: Serialize>(
        &self,
        result: Result<T, ConsoleError>,
        success: impl FnOnce(&T) -> Option<Notice>,
    ) -> serde_json::Value {
        match result {
            Ok(data) => {
                let notice = success(&data).map(|n| self.notice(n));
                json!({ "ok": true, "data": data, "notice": notice })
            }
            Err(err) => {
                warn!(kind = err.kind(), "command failed: {err}");
                json!({
                    "ok": false,
                    "kind": err.kind(),
                    "error": err.to_string(),
                    "notice": self.notice(Notice::from(&err)),
                })
            }
        }
    }
}

fn start_refresh_loop(app: &AppHandle) {
    let state = app.state::<AppState>();
    let interval = Duration::from_secs(state.config.refresh_interval_secs);
    let handle = app.clone();
    let refresh = RefreshLoop::spawn(interval, move || {
        let state = handle.state::<AppState>();
        let buckets = lock(&state.maintenance).classify_now();
        if let Err(err) = handle.emit(BUCKETS_EVENT, &buckets) {
            warn!("failed to emit maintenance buckets: {err}");
        }
    });
    *lock(&state.refresh) = Some(refresh);
}

#[derive(Deserialize)]
struct MaintenanceCreateRequest {
    module_name: String,
    is_active: Option<bool>,
    start_at: String,
    end_at: String,
    message: Option<String>,
}

#[derive(Deserialize)]
struct MaintenanceUpdateRequest {
    id: u64,
    module_name: Option<String>,
    is_active: Option<bool>,
    start_at: Option<String>,
    end_at: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct MaintenanceIdRequest {
    id: u64,
}

#[derive(Deserialize)]
struct CountdownRequest {
    module_name: Option<String>,
    opened_at: Option<String>,
}

#[derive(Deserialize)]
struct NotifyRegisterRequest {
    email: String,
}

#[derive(Deserialize)]
struct BoardColumnRequest {
    name: String,
}

#[derive(Deserialize)]
struct BoardColumnIdRequest {
    column_id: String,
}

#[derive(Deserialize)]
struct BoardMoveTaskRequest {
    task_id: String,
    column_id: String,
}

#[derive(Deserialize)]
struct BoardReorderRequest {
    column_id: String,
    task_ids: Vec<String>,
}

#[derive(Deserialize)]
struct BoardTaskIdRequest {
    task_id: String,
}

#[derive(Deserialize)]
struct UpdateProgressRequest {
    percent: f64,
}

#[derive(Deserialize)]
struct UpdateErrorRequest {
    message: Option<String>,
}

fn parse_optional_minute(value: Option<String>) -> Result<Option<chrono::NaiveDateTime>, ConsoleError> {
    value.map(|raw| clock::parse_local_minute(&raw)).transpose()
}

fn create_window(
    state: &AppState,
    payload: MaintenanceCreateRequest,
) -> Result<MaintenanceWindow, ConsoleError> {
    let fields = NewMaintenance {
        module_name: payload.module_name,
        is_active: payload.is_active.unwrap_or(false),
        start_at: clock::parse_local_minute(&payload.start_at)?,
        end_at: clock::parse_local_minute(&payload.end_at)?,
        message: payload.message,
    };
    lock(&state.maintenance).create(fields)
}

fn update_window(
    state: &AppState,
    payload: MaintenanceUpdateRequest,
) -> Result<MaintenanceWindow, ConsoleError> {
    let patch = MaintenancePatch {
        module_name: payload.module_name,
        is_active: payload.is_active,
        start_at: parse_optional_minute(payload.start_at)?,
        end_at: parse_optional_minute(payload.end_at)?,
        message: payload.message,
    };
    lock(&state.maintenance).update(payload.id, patch)
}

fn countdown_view(
    state: &AppState,
    payload: CountdownRequest,
) -> Result<Option<serde_json::Value>, ConsoleError> {
    let now = state.clock.now_local();
    let opened_at = parse_optional_minute(payload.opened_at)?.unwrap_or(now);
    let module_name = payload.module_name.unwrap_or_else(|| "all".to_string());
    let store = lock(&state.maintenance);
    let view = countdown::current_countdown(&store, &module_name, opened_at, now).map(|cd| {
        let remaining = cd.remaining(now);
        json!({
            "ends_at": clock::format_local_minute(&cd.ends_at),
            "remaining": remaining,
            "display": remaining.display(),
            "progress_percent": cd.progress_percent(now).round(),
            "complete": cd.is_complete(now),
        })
    });
    Ok(view)
}

#[tauri::command]
fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn platform_name() -> String {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        "android" => "android",
        _ => "linux",
    }
    .to_string()
}

#[tauri::command]
fn startup_notices(state: tauri::State<AppState>) -> Vec<Notice> {
    std::mem::take(&mut *lock(&state.startup_notices))
}

#[tauri::command]
fn maintenance_modules() -> serde_json::Value {
    let modules: Vec<serde_json::Value> = MODULE_LABELS
        .iter()
        .map(|(key, label)| json!({ "key": key, "label": label }))
        .collect();
    json!(modules)
}

#[tauri::command]
fn maintenance_list(state: tauri::State<AppState>) -> serde_json::Value {
    let store = lock(&state.maintenance);
    let now = store.now_local();
    let buckets = store.classify(now);
    let (active, scheduled, past) = buckets.counts();
    json!({
        "now": clock::format_local_minute(&now),
        "counts": { "active": active, "scheduled": scheduled, "past": past },
        "buckets": buckets,
    })
}

#[tauri::command]
fn maintenance_create(
    state: tauri::State<AppState>,
    payload: MaintenanceCreateRequest,
) -> serde_json::Value {
    let result = create_window(&state, payload);
    state.reply(result, |_| Some(Notice::maintenance_created()))
}

#[tauri::command]
fn maintenance_update(
    state: tauri::State<AppState>,
    payload: MaintenanceUpdateRequest,
) -> serde_json::Value {
    let result = update_window(&state, payload);
    state.reply(result, |_| Some(Notice::maintenance_updated()))
}

#[tauri::command]
fn maintenance_toggle(
    state: tauri::State<AppState>,
    payload: MaintenanceIdRequest,
) -> serde_json::Value {
    let result = lock(&state.maintenance).toggle_active(payload.id);
    state.reply(result, |is_active| Some(Notice::maintenance_toggled(*is_active)))
}

#[tauri::command]
fn maintenance_delete(
    state: tauri::State<AppState>,
    payload: MaintenanceIdRequest,
) -> serde_json::Value {
    let result = lock(&state.maintenance).delete(payload.id);
    state.reply(result, |removed| {
        Some(if *removed {
            Notice::maintenance_deleted()
        } else {
            Notice::maintenance_already_removed()
        })
    })
}

#[tauri::command]
fn countdown_get(state: tauri::State<AppState>, payload: CountdownRequest) -> serde_json::Value {
    let result = countdown_view(&state, payload);
    state.reply(result, |_| None)
}

#[tauri::command]
fn notify_register(
    state: tauri::State<AppState>,
    payload: NotifyRegisterRequest,
) -> serde_json::Value {
    let result = NotifySubscription::register(
        state.slots.as_ref(),
        &state.config.notify_email_key,
        &payload.email,
    );
    state.reply(result, |_| Some(Notice::success("We will let you know when we are back.")))
}

#[tauri::command]
fn notify_saved(state: tauri::State<AppState>) -> serde_json::Value {
    let result = NotifySubscription::saved(state.slots.as_ref(), &state.config.notify_email_key);
    state.reply(result, |_| None)
}

#[tauri::command]
fn board_get(state: tauri::State<AppState>) -> serde_json::Value {
    let board = lock(&state.board);
    let counts: serde_json::Map<String, serde_json::Value> = board
        .board()
        .column_counts()
        .into_iter()
        .map(|(id, count)| (id, json!(count)))
        .collect();
    json!({ "board": board.board(), "counts": counts })
}

#[tauri::command]
fn board_add_column(state: tauri::State<AppState>, payload: BoardColumnRequest) -> serde_json::Value {
    let now = state.clock.now_utc();
    let result = lock(&state.board).add_column(&payload.name, now);
    state.reply(result, |_| None)
}

#[tauri::command]
fn board_remove_column(
    state: tauri::State<AppState>,
    payload: BoardColumnIdRequest,
) -> serde_json::Value {
    let result = lock(&state.board).remove_column(&payload.column_id);
    state.reply(result, |_| None)
}

#[tauri::command]
fn board_add_task(state: tauri::State<AppState>, payload: NewTask) -> serde_json::Value {
    let now = state.clock.now_utc();
    let result = lock(&state.board).add_task(payload, now);
    state.reply(result, |_| Some(Notice::task_created()))
}

#[tauri::command]
fn board_move_task(state: tauri::State<AppState>, payload: BoardMoveTaskRequest) -> serde_json::Value {
    let now = state.clock.now_utc();
    let mut board = lock(&state.board);
    let result = board.move_task(&payload.task_id, &payload.column_id, now);
    let column_name = board
        .board()
        .column_name(&payload.column_id)
        .unwrap_or_default()
        .to_string();
    drop(board);
    state.reply(result, |_| Some(Notice::task_moved(&column_name)))
}

#[tauri::command]
fn board_reorder_column(
    state: tauri::State<AppState>,
    payload: BoardReorderRequest,
) -> serde_json::Value {
    let now = state.clock.now_utc();
    let result = lock(&state.board).reorder_column(&payload.column_id, &payload.task_ids, now);
    state.reply(result, |_| None)
}

#[tauri::command]
fn board_delete_task(state: tauri::State<AppState>, payload: BoardTaskIdRequest) -> serde_json::Value {
    let result = lock(&state.board).delete_task(&payload.task_id);
    state.reply(result, |_| None)
}

fn emit_update_state(app: &AppHandle, state: &AppState) -> serde_json::Value {
    let screen = lock(&state.update);
    let value = json!(screen.state());
    if let Err(err) = app.emit(UPDATE_STATE_EVENT, value.clone()) {
        warn!("failed to emit update state: {err}");
    }
    value
}

#[tauri::command]
fn update_state(state: tauri::State<AppState>) -> serde_json::Value {
    json!(lock(&state.update).state())
}

#[tauri::command]
fn update_start(app: AppHandle, state: tauri::State<AppState>) -> bool {
    let started = lock(&state.update).start();
    emit_update_state(&app, &state);
    started
}

#[tauri::command]
fn update_dismiss(app: AppHandle, state: tauri::State<AppState>) -> bool {
    let dismissed = lock(&state.update).dismiss();
    emit_update_state(&app, &state);
    dismissed
}

#[tauri::command]
fn update_release_notes(state: tauri::State<AppState>) {
    lock(&state.update).open_release_notes();
}

#[tauri::command]
fn update_set_progress(
    app: AppHandle,
    state: tauri::State<AppState>,
    payload: UpdateProgressRequest,
) -> serde_json::Value {
    let view = lock(&state.update).set_progress(payload.percent);
    emit_update_state(&app, &state);
    json!(view)
}

#[tauri::command]
fn update_complete(app: AppHandle, state: tauri::State<AppState>) -> bool {
    let completed = lock(&state.update).complete();
    emit_update_state(&app, &state);
    completed
}

#[tauri::command]
fn update_error(
    app: AppHandle,
    state: tauri::State<AppState>,
    payload: UpdateErrorRequest,
) -> serde_json::Value {
    lock(&state.update).show_error(payload.message.as_deref());
    emit_update_state(&app, &state)
}

pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let state = AppState::open(app.handle())?;
            app.manage(state);
            start_refresh_loop(app.handle());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            app_version,
            platform_name,
            startup_notices,
            maintenance_modules,
            maintenance_list,
            maintenance_create,
            maintenance_update,
            maintenance_toggle,
            maintenance_delete,
            countdown_get,
            notify_register,
            notify_saved,
            board_get,
            board_add_column,
            board_remove_column,
            board_add_task,
            board_move_task,
            board_reorder_column,
            board_delete_task,
            update_state,
            update_start,
            update_dismiss,
            update_release_notes,
            update_set_progress,
            update_complete,
            update_error
        ])
        .run(tauri::generate_context!())
        .expect("failed to run Ops Console");
}
