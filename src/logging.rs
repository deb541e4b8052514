//! db-router-core/src/logging.rs
//! Logging initialization and runtime updates. Mirrors the teacher's
//! `logging::init_logging`/`RELOAD_HANDLE` pair: a reloadable `EnvFilter`
//! layer so the log level can change without a restart, set up once per
//! process.

use std::sync::{Mutex, Once};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter::EnvFilter, fmt, reload::Handle as ReloadHandle, reload::Layer as ReloadLayer};

static LOG_INIT: Once = Once::new();
static RELOAD_HANDLE: Mutex<Option<ReloadHandle<EnvFilter, tracing_subscriber::Registry>>> =
    Mutex::new(None);

/// Installs the global `tracing` subscriber. Idempotent: subsequent calls
/// after the first are no-ops, matching the teacher's `Once`-guarded init.
pub fn init_logging(default: &str) {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::new(default);
        let (reload_layer, handle) = ReloadLayer::new(filter);
        let subscriber = tracing_subscriber::registry()
            .with(reload_layer)
            .with(fmt::layer());
        tracing::subscriber::set_global_default(subscriber).expect("set global tracing subscriber");
        *RELOAD_HANDLE.lock().unwrap() = Some(handle);
    });
}

/// Replaces the active `EnvFilter` directive string at runtime. A no-op if
/// `init_logging` has not run yet.
pub fn set_log_level(directive: &str) {
    if let Some(handle) = RELOAD_HANDLE.lock().unwrap().as_ref() {
        let _ = handle.modify(|filter| *filter = EnvFilter::new(directive));
    }
}
