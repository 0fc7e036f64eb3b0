pub mod capture_sink;
pub mod exit_hooks;

use std::sync::{Arc, Once};
use std::time::Duration;

use procwatch::{Settings, ShutdownCoordinator};
use tracing_subscriber::{fmt, EnvFilter};

pub use capture_sink::CaptureSink;
pub use exit_hooks::RecordingExitHooks;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 15-second timeout (longer than any default bound).
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(15), f)
        .await
        .expect("Test timed out after 15 seconds")
}

/// argv running `script` through `sh -c`.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Settings with short bounds so tests don't sit on ten-second timeouts.
pub fn fast_settings() -> Settings {
    Settings::default()
        .with_grace_period(Duration::from_millis(500))
        .with_stop_timeout(Duration::from_secs(5))
        .with_shutdown_join_timeout(Duration::from_secs(5))
}

/// Coordinator without an exit hook, using [`fast_settings`].
pub fn test_coordinator() -> Arc<ShutdownCoordinator> {
    ShutdownCoordinator::new(fast_settings())
}
