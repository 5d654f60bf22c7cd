use std::panic;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber and a panic hook that logs
/// through it instead of writing straight to stderr. Production builds
/// emit flat JSON for log aggregation; debug builds get a compact,
/// human-readable format. `RUST_LOG` always overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("dossier_server={default_level},tower_http=warn").into());

    if cfg!(debug_assertions) {
        tracing_subscriber::registry().with(filter).with(fmt::layer().compact().with_target(false)).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json().flatten_event(true)).init();
    }

    panic::set_hook(Box::new(|info| {
        let location = info.location().map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())).unwrap_or_else(|| "unknown".to_string());
        let message = info.payload().downcast_ref::<&str>().copied().or_else(|| info.payload().downcast_ref::<String>().map(String::as_str)).unwrap_or("no message");
        tracing::error!(%location, %message, "process panicked");
    }));
}
