//! # filerelay
//!
//! Profile-driven file relay between SFTP servers and an S3-compatible
//! bucket. The pipeline lives in `filerelay-core`; this crate loads the
//! configuration, opens the endpoints and runs every profile in order.

pub mod config;
pub mod error;
pub mod runner;

pub use config::{AppConfig, ProfileConfig, DEFAULT_CONFIG_FILE};
pub use error::{ConfigError, RelayError, RelayResult};
pub use runner::{ProfileRunner, RemoteConnector, RunReport, SftpConnector};

use filerelay_s3::S3Fs;
use std::path::Path;

/// Load `config_path`, build the object-store client and run all profiles.
///
/// Configuration errors are returned before any log sink exists; an
/// object-store failure is written to the transfer log as `[FATAL]` first.
pub async fn run(config_path: &Path) -> RelayResult<RunReport> {
    let config = AppConfig::load(config_path)?;
    let journal = config.journal();

    let object_store = match S3Fs::from_config(&config.s3) {
        Ok(fs) => fs,
        Err(e) => {
            journal.fatal(&e);
            return Err(e.into());
        }
    };

    let runner = ProfileRunner::new(&journal, &object_store, &SftpConnector)
        .with_staging_dir(config.staging_dir.clone());
    let report = runner.run_all(&config).await;
    if !report.is_success() {
        log::warn!("{} profile(s) failed: {}", report.failed.len(), report.failed.join(", "));
    }
    Ok(report)
}
