use std::sync::Mutex;

use slog::{Discard, Drain, Fuse};
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Logger};

/// Builds the root logger: JSON lines on stderr, written from a
/// background thread, tagged with build information.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(drain, build_values())
}

/// A logger that drops every record, for tests and helpers that
/// must not write to stderr.
pub fn discard_logger() -> Logger {
    Logger::root(Discard, build_values())
}

fn build_values() -> slog::OwnedKV<impl slog::SendSyncRefUnwindSafeKV> {
    o!(
        "version" => info::VERSION,
        "revision" => info::REVISION,
        "build_timestamp" => info::BUILD_TIMESTAMP
    )
}
