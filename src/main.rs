use clap::Parser;
use filerelay_core::Journal;
use filerelay_lib::{RelayError, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code when at least one profile failed.
const PROFILE_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "filerelay", version, about = "Relay files between SFTP servers and S3 buckets")]
struct Cli {
    /// Configuration file (default: filerelay.config.json next to the executable)
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    tracing::debug!(config = %config_path.display(), "starting relay");

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            Journal::new(None, None).fatal(e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(filerelay_lib::run(&config_path)) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(PROFILE_FAILURE),
        Err(e) => {
            // Object-store failures were already journaled with the config's sinks.
            if matches!(e, RelayError::Config(_)) {
                Journal::new(None, None).fatal(&e);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
