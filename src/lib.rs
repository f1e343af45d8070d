pub mod config;
pub mod db;
pub mod models;
pub mod pipeline; // Intake, batch transfer, analysis pipeline
pub mod storage; // Local sink + SQLite registry / deal store

use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` wins; otherwise `config::default_log_filter()`.
/// Safe to call more than once: later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
