use std::str::FromStr;

use tracing::Level;

/// Initialize tracing for the binary and for tests.
///
/// Unknown level names fall back to `info`. Uses `try_init` so calling this
/// more than once (for example from several tests) is harmless.
pub fn init(default_level: &str) {
    let level = Level::from_str(default_level.trim()).unwrap_or(Level::INFO);

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
