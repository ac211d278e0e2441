use std::ffi::{CStr, CString};
use std::future::Future;
use std::os::raw::c_char;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use rentscope_core::fetch::FetchOutcome;
use rentscope_core::logging::init_logging;
use rentscope_core::models::{CoreError, HistoryEntryId, LatLng, Operation, SavedSearchId};
use rentscope_core::persistence::QueryStateStore;
use rentscope_core::session::QueryTransition;
use rentscope_core::sources::http::HttpListingSource;
use rentscope_core::sqlite::SqliteStore;
use rentscope_core::{EngineConfig, EngineStores, LibraryBackend, SearchEngine};
use serde::Serialize;
use tokio::runtime::Handle;

struct RentscopeState {
    engine: Arc<SearchEngine>,
    tokio_rt: tokio::runtime::Runtime,
}

lazy_static! {
    static ref STATE: Mutex<Option<RentscopeState>> = Mutex::new(None);
}

/// Initialize the search engine.
///
/// `config_json` may be null, in which case defaults are used.
///
/// # Safety
///
/// `db_path` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
/// `config_json` must be null or a valid pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_init(
    db_path: *const c_char,
    config_json: *const c_char,
) -> bool {
    let Some(path_str) = (unsafe { read_c_str(db_path) }) else {
        return false;
    };

    let Ok(mut guard) = STATE.lock() else {
        return false;
    };
    if guard.is_some() {
        return true;
    }

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let Some(raw) = (unsafe { read_c_str(config_json) }) else {
            return false;
        };
        match EngineConfig::from_json(raw) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid engine config: {e}");
                return false;
            }
        }
    };

    if let Err(e) = init_logging("rentscope_core=info,rentscope_ffi=info") {
        eprintln!("Failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(message = %e, "failed to create tokio runtime");
            return false;
        }
    };

    let store = Arc::new(SqliteStore::new(path_str));
    if let Err(e) = store.migrate_to_latest() {
        tracing::error!(kind = ?e.kind, message = %e.message, "failed to migrate search database");
        return false;
    }

    let http = Arc::new(HttpListingSource::new(&config));
    let query_state = Some(store.clone() as Arc<dyn QueryStateStore>);
    let stores = match config.library_backend {
        LibraryBackend::Local => EngineStores {
            saved_searches: store.clone(),
            history: store,
            query_state,
        },
        LibraryBackend::Remote => EngineStores {
            saved_searches: http.clone(),
            history: http.clone(),
            query_state,
        },
    };

    let engine = rt.block_on(SearchEngine::new(config, http, stores));
    tracing::info!(url = %engine.session().url(), "search engine initialized");

    *guard = Some(RentscopeState {
        engine: Arc::new(engine),
        tokio_rt: rt,
    });

    true
}

/// Apply a JSON-encoded query transition, e.g. `{"type":"set_city","city":"Boston"}`.
/// Returns the resulting update as JSON, or null on failure.
///
/// # Safety
///
/// `transition_json` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_apply_transition(
    transition_json: *const c_char,
) -> *mut c_char {
    let Some(raw) = (unsafe { read_c_str(transition_json) }) else {
        return std::ptr::null_mut();
    };
    let transition: QueryTransition = match serde_json::from_str(raw) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(message = %e, "rejected malformed transition");
            return std::ptr::null_mut();
        }
    };

    run_json("apply transition", |engine| async move { engine.apply(transition).await })
}

/// Replace the query with the one encoded in a shared URL or query string.
///
/// # Safety
///
/// `url` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_navigate(url: *const c_char) -> *mut c_char {
    let Some(url) = (unsafe { read_c_str(url) }) else {
        return std::ptr::null_mut();
    };
    let transition = QueryTransition::Navigate {
        url: url.to_string(),
    };

    run_json("navigate", |engine| async move { engine.apply(transition).await })
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_current_query_url() -> *mut c_char {
    match current_engine() {
        Some((engine, _)) => to_c_string(engine.session().url()),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_filter_chips() -> *mut c_char {
    match current_engine() {
        Some((engine, _)) => to_json(&engine.chips()),
        None => std::ptr::null_mut(),
    }
}

/// Start fetching results for the current query. Poll
/// `rentscope_latest_outcome` for the status and `rentscope_latest_results`
/// for the applied page.
#[unsafe(no_mangle)]
pub extern "C" fn rentscope_execute_search() -> bool {
    let Some((engine, handle)) = current_engine() else {
        return false;
    };

    handle.spawn(async move {
        if let FetchOutcome::Failed(error) = engine.execute_list().await {
            log_failure("execute_search", &error);
        }
    });

    true
}

/// Status of the newest resolved search as JSON:
/// `{"status":"ready"|"failed"|"superseded","fingerprint":...}` plus `total`
/// when ready or `error` when failed. Null before any search has resolved.
#[unsafe(no_mangle)]
pub extern "C" fn rentscope_latest_outcome() -> *mut c_char {
    let Some((engine, _)) = current_engine() else {
        return std::ptr::null_mut();
    };
    match engine.fetcher().last_report() {
        Some(report) => to_json(&report),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_latest_results() -> *mut c_char {
    let Some((engine, _)) = current_engine() else {
        return std::ptr::null_mut();
    };
    match engine.fetcher().current() {
        Some(page) => to_json(&*page),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_favorites() -> *mut c_char {
    run_json("favorites", |engine| async move {
        engine.fetcher().favorites().await
    })
}

/// Feed one keystroke of the search box to the suggestion debouncer.
///
/// # Safety
///
/// `text` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_suggest_input(text: *const c_char) -> bool {
    let Some(text) = (unsafe { read_c_str(text) }) else {
        return false;
    };
    let Some((engine, handle)) = current_engine() else {
        return false;
    };

    match handle.block_on(engine.suggestions().input(text)) {
        Ok(()) => true,
        Err(e) => {
            log_failure("suggestion input", &e);
            false
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_suggestions() -> *mut c_char {
    match current_engine() {
        Some((engine, _)) => to_json(&engine.suggestions().current()),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_enter_map_mode() -> *mut c_char {
    run_json("enter map mode", |engine| async move {
        engine.enter_map_mode().await
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_leave_map_mode() -> *mut c_char {
    run_json("leave map mode", |engine| async move {
        engine.leave_map_mode().await
    })
}

/// Report a settled map center (`moveend`).
#[unsafe(no_mangle)]
pub extern "C" fn rentscope_map_moved(lat: f64, lng: f64) -> *mut c_char {
    run_json("map moved", move |engine| async move {
        engine.map_moved(LatLng::new(lat, lng)).await
    })
}

/// Move the radius slider. Returns the clamped radius in miles, or NaN on failure.
#[unsafe(no_mangle)]
pub extern "C" fn rentscope_set_radius(radius_miles: f64) -> f64 {
    let Some((engine, _)) = current_engine() else {
        return f64::NAN;
    };
    match engine.set_radius(radius_miles) {
        Ok(clamped) => clamped,
        Err(e) => {
            log_failure("set radius", &e);
            f64::NAN
        }
    }
}

/// Radius of the circle overlay in meters, or NaN on failure.
#[unsafe(no_mangle)]
pub extern "C" fn rentscope_circle_radius_meters() -> f64 {
    let Some((engine, _)) = current_engine() else {
        return f64::NAN;
    };
    engine.circle_radius_meters().unwrap_or(f64::NAN)
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_release_radius() -> *mut c_char {
    run_json("release radius", |engine| async move {
        engine.release_radius().await
    })
}

/// Save the current query under `name`.
///
/// # Safety
///
/// `name` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_save_search(
    name: *const c_char,
    email_alerts: bool,
) -> *mut c_char {
    let Some(name) = (unsafe { read_c_str(name) }) else {
        return std::ptr::null_mut();
    };
    let name = name.to_string();

    run_json("save search", |engine| async move {
        engine.save_current(&name, email_alerts).await
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_list_saved_searches() -> *mut c_char {
    run_json("list saved searches", |engine| async move {
        engine.library().list_saved().await
    })
}

/// # Safety
///
/// `id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_apply_saved_search(id: *const c_char) -> *mut c_char {
    let Some(id) = (unsafe { read_c_str(id) }) else {
        return std::ptr::null_mut();
    };
    let id = SavedSearchId(id.to_string());

    run_json("apply saved search", |engine| async move {
        engine.apply_saved_search(&id).await
    })
}

/// Flip email alerts. Returns 1 when now enabled, 0 when disabled, -1 on failure.
///
/// # Safety
///
/// `id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_toggle_email_alerts(id: *const c_char) -> i32 {
    let Some(id) = (unsafe { read_c_str(id) }) else {
        return -1;
    };
    let id = SavedSearchId(id.to_string());

    let toggled = run_blocking(|engine| async move {
        engine.library().toggle_email_alerts(&id).await
    });
    match toggled {
        Some(Ok(true)) => 1,
        Some(Ok(false)) => 0,
        Some(Err(e)) => {
            log_failure("toggle email alerts", &e);
            -1
        }
        None => -1,
    }
}

/// # Safety
///
/// `id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_delete_saved_search(id: *const c_char) -> bool {
    let Some(id) = (unsafe { read_c_str(id) }) else {
        return false;
    };
    let id = SavedSearchId(id.to_string());

    run_bool("delete saved search", |engine| async move {
        engine.library().delete(&id).await
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_list_history() -> *mut c_char {
    run_json("list history", |engine| async move { engine.history().await })
}

/// Replace the query with a history entry's text and filters.
///
/// # Safety
///
/// `id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_replay_history(id: *const c_char) -> *mut c_char {
    let Some(id) = (unsafe { read_c_str(id) }) else {
        return std::ptr::null_mut();
    };
    let id = HistoryEntryId(id.to_string());

    run_json("replay history", |engine| async move {
        let history = engine.history().await?;
        let Some(entry) = history.into_iter().find(|entry| entry.id == id) else {
            return Err(CoreError::not_found(
                Operation::ListHistory,
                format!("history entry '{}' does not exist", id.0),
            ));
        };
        engine.replay_history(&entry).await
    })
}

/// # Safety
///
/// `id` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_delete_history_entry(id: *const c_char) -> bool {
    let Some(id) = (unsafe { read_c_str(id) }) else {
        return false;
    };
    let id = HistoryEntryId(id.to_string());

    run_bool("delete history entry", |engine| async move {
        engine.library().delete_history_entry(&id).await
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn rentscope_clear_history() -> bool {
    run_bool("clear history", |engine| async move {
        engine.library().clear_history().await
    })
}

fn current_engine() -> Option<(Arc<SearchEngine>, Handle)> {
    let guard = STATE.lock().ok()?;
    let state = guard.as_ref()?;
    Some((Arc::clone(&state.engine), state.tokio_rt.handle().clone()))
}

/// Runs `call` to completion on the engine runtime. The state lock is not
/// held while the future runs.
fn run_blocking<T, F, Fut>(call: F) -> Option<T>
where
    F: FnOnce(Arc<SearchEngine>) -> Fut,
    Fut: Future<Output = T>,
{
    let (engine, handle) = current_engine()?;
    Some(handle.block_on(call(engine)))
}

fn run_json<T, F, Fut>(action: &str, call: F) -> *mut c_char
where
    T: Serialize,
    F: FnOnce(Arc<SearchEngine>) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    match run_blocking(call) {
        Some(Ok(value)) => to_json(&value),
        Some(Err(e)) => {
            log_failure(action, &e);
            std::ptr::null_mut()
        }
        None => std::ptr::null_mut(),
    }
}

fn run_bool<F, Fut>(action: &str, call: F) -> bool
where
    F: FnOnce(Arc<SearchEngine>) -> Fut,
    Fut: Future<Output = Result<(), CoreError>>,
{
    match run_blocking(call) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            log_failure(action, &e);
            false
        }
        None => false,
    }
}

fn log_failure(action: &str, error: &CoreError) {
    tracing::error!(
        action,
        operation = ?error.operation,
        kind = ?error.kind,
        message = %error.message,
        "ffi call failed"
    );
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_string(json),
        Err(_) => std::ptr::null_mut(),
    }
}

fn to_c_string(value: String) -> *mut c_char {
    match CString::new(value) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated C string that outlives `'a`.
unsafe fn read_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Free a string previously returned by a `rentscope_*` function.
///
/// # Safety
///
/// `s` must be a pointer previously returned by a `rentscope_*` function, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rentscope_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}
