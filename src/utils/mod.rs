//! Host glue shared by the engine and the wasm facade.

use std::sync::Once;

static LOGGER: Once = Once::new();

/// Milliseconds since the Unix epoch.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    web_sys::js_sys::Date::now()
}

/// Milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Routes `log` records to the browser console. Later calls are ignored.
pub fn init_logging(level: log::Level) {
    LOGGER.call_once(|| {
        if console_log::init_with_level(level).is_err() {
            web_sys::console::warn_1(&"lane_battler: a logger is already installed".into());
        }
    });
}

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
pub fn set_panic_hook() {}
