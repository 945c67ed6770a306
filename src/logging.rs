//! Logging setup.
//!
//! Logs go to stderr so `ingest` and `ask` can keep stdout for their
//! results. `RUST_LOG` overrides the default filter:
//!
//! ```bash
//! RUST_LOG=docqa=debug docqa ask "What is in the report?"
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "docqa=info";

static INIT: Once = Once::new();

/// Initialize logging. Only the first call takes effect.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

fn init_with_filter(default_filter: &str) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(default_filter)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .with_filter(filter);

        // Another subscriber may already be installed (e.g. by a test harness).
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
