pub mod builders;
pub mod fake_fetcher;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{ConfigFileBuilder, JobBuilder, JobConfigBuilder};
pub use fake_fetcher::{ScriptedFetcher, Step};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary. Output only shows
/// for failing tests (or with `--nocapture`); `RUST_LOG` picks the level,
/// defaulting to `changewatch=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,changewatch=debug"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test if `f` takes longer than five seconds.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("test timed out after 5 seconds")
}
