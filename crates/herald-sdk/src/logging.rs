//! # Logging
//!
//! Installs a `tracing` subscriber whose level can change at runtime.
//!
//! ```text
//! LogLevel ──filter_directive()──► EnvFilter ──► reload::Layer ──► fmt
//!                                     ▲
//!                       RUST_LOG (wins at install time)
//! ```
//!
//! Hosts that install their own subscriber simply never call
//! [`init_logging`]; the SDK's `tracing` events then go to theirs.

use std::sync::OnceLock;

use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use herald_core::LogLevel;

static RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(level.filter_directive())
}

/// Installs the global subscriber.
///
/// Returns false if a global subscriber was already installed.
pub fn init_logging(level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));
    let (filter_layer, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        let _ = RELOAD_HANDLE.set(handle);
    }
    installed
}

/// Changes the level of the subscriber installed by [`init_logging`].
///
/// Returns false if this module's subscriber is not the installed one.
pub fn set_log_level(level: LogLevel) -> bool {
    let Some(handle) = RELOAD_HANDLE.get() else {
        return false;
    };
    let changed = handle.reload(filter_for(level)).is_ok();
    if changed {
        debug!(level = ?level, "Log level changed");
    }
    changed
}
