// ── Profile runner ───────────────────────────────────────────────────────────
//
// Resolves each profile's direction to a (source, destination) pair and runs
// the transfer engine. A failing profile is logged and the next one runs;
// SFTP sessions are opened per profile and dropped when it finishes.

use crate::config::{AppConfig, ProfileConfig};
use crate::error::RelayResult;
use async_trait::async_trait;
use filerelay_core::fs::{FsResult, RemoteFs};
use filerelay_core::{Journal, Mode, TransferEngine, TransferSummary};
use filerelay_sftp::{SftpEndpointConfig, SftpFs};
use serde::Serialize;
use std::path::PathBuf;

/// Opens the remote endpoint of a profile.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, settings: &SftpEndpointConfig) -> FsResult<Box<dyn RemoteFs>>;
}

/// Real SFTP sessions over `ssh2`.
pub struct SftpConnector;

#[async_trait]
impl RemoteConnector for SftpConnector {
    async fn connect(&self, settings: &SftpEndpointConfig) -> FsResult<Box<dyn RemoteFs>> {
        match SftpFs::connect(settings).await {
            Ok(fs) => Ok(Box::new(fs)),
            Err(e) => Err(e.into_fs_error(&settings.endpoint())),
        }
    }
}

/// Outcome of a full run, in profile order.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ProfileRunner<'a> {
    journal: &'a Journal,
    object_store: &'a dyn RemoteFs,
    connector: &'a dyn RemoteConnector,
    staging_dir: Option<PathBuf>,
}

impl<'a> ProfileRunner<'a> {
    pub fn new(
        journal: &'a Journal,
        object_store: &'a dyn RemoteFs,
        connector: &'a dyn RemoteConnector,
    ) -> Self {
        Self {
            journal,
            object_store,
            connector,
            staging_dir: None,
        }
    }

    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Run every profile of `config` in declaration order.
    pub async fn run_all(&self, config: &AppConfig) -> RunReport {
        let mut report = RunReport::default();
        for (name, profile) in config.profiles() {
            self.journal.log(format!("Executing transfer for {}", name));
            let ok = match profile {
                Ok(profile) => self.run_profile(name, &profile).await,
                Err(e) => {
                    self.journal.error(e);
                    false
                }
            };
            if ok {
                report.succeeded.push(name.to_string());
            } else {
                report.failed.push(name.to_string());
            }
        }
        report
    }

    /// Run one profile. Errors are logged, never propagated.
    pub async fn run_profile(&self, name: &str, profile: &ProfileConfig) -> bool {
        match self.transfer(profile).await {
            Ok(summary) => {
                log::info!(
                    "profile {}: {} uploaded, {} skipped",
                    name,
                    summary.uploaded.len(),
                    summary.skipped.len()
                );
                true
            }
            Err(e) => {
                self.journal.error(e);
                false
            }
        }
    }

    async fn transfer(&self, profile: &ProfileConfig) -> RelayResult<TransferSummary> {
        let remote = self.connector.connect(&profile.sftp).await?;

        let (source, destination): (&dyn RemoteFs, &dyn RemoteFs) = match profile.transfer.mode {
            Mode::Pull => (remote.as_ref(), self.object_store),
            Mode::Push => (self.object_store, remote.as_ref()),
        };

        let mut engine = TransferEngine::new(self.journal);
        if let Some(ref dir) = self.staging_dir {
            engine = engine.with_staging_dir(dir.clone());
        }
        Ok(engine.run(source, destination, &profile.transfer).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filerelay_core::{FsError, MemoryFs};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Hands out shared in-memory endpoints by host name.
    #[derive(Default)]
    struct FakeConnector {
        hosts: HashMap<String, Arc<MemoryFs>>,
        connects: Mutex<Vec<String>>,
    }

    struct Shared(Arc<MemoryFs>);

    #[async_trait]
    impl RemoteFs for Shared {
        async fn list(&self, path: &str) -> FsResult<Vec<filerelay_core::RemoteEntry>> {
            self.0.list(path).await
        }
        async fn read_stream(
            &self,
            path: &str,
            sink: &mut (dyn std::io::Write + Send),
        ) -> FsResult<u64> {
            self.0.read_stream(path, sink).await
        }
        async fn write_stream(
            &self,
            path: &str,
            source: &mut (dyn std::io::Read + Send),
        ) -> FsResult<u64> {
            self.0.write_stream(path, source).await
        }
        async fn delete(&self, path: &str) -> FsResult<()> {
            self.0.delete(path).await
        }
        async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
            self.0.rename(from, to).await
        }
    }

    #[async_trait]
    impl RemoteConnector for FakeConnector {
        async fn connect(&self, settings: &SftpEndpointConfig) -> FsResult<Box<dyn RemoteFs>> {
            self.connects.lock().unwrap().push(settings.host.clone());
            match self.hosts.get(&settings.host) {
                Some(fs) => Ok(Box::new(Shared(fs.clone()))),
                None => Err(FsError::connection(settings.endpoint(), "connection refused")),
            }
        }
    }

    fn config(profiles: &str) -> AppConfig {
        AppConfig::from_json(&format!(
            r#"{{"s3": {{"region": "us-east-1", "bucket": "b"}}, "profiles": {}}}"#,
            profiles
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn failing_profile_does_not_stop_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("transfer.log");
        let journal = Journal::new(Some(log.clone()), None).quiet();

        let remote = Arc::new(MemoryFs::new().with_file("out/a.edi", "hello"));
        let mut connector = FakeConnector::default();
        connector.hosts.insert("good".into(), remote.clone());
        let store = MemoryFs::new();

        let cfg = config(
            r#"{
            "first": {"sftp": {"host": "down", "username": "u"}, "source_path": "out", "destination_path": "in"},
            "second": {"sftp": {"host": "good", "username": "u"}, "source_path": "out", "destination_path": "in"}
        }"#,
        );
        let runner = ProfileRunner::new(&journal, &store, &connector)
            .with_staging_dir(Some(dir.path().to_path_buf()));
        let report = runner.run_all(&cfg).await;

        assert_eq!(report.failed, vec!["first"]);
        assert_eq!(report.succeeded, vec!["second"]);
        assert!(!report.is_success());
        assert_eq!(store.contents("in/a.edi").unwrap(), b"hello");
        assert!(!remote.exists("out/a.edi"));
        assert_eq!(*connector.connects.lock().unwrap(), vec!["down", "good"]);

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("]: Executing transfer for first\n"));
        assert!(text.contains("]: [ERROR] sftp://u@down:22 connection failed: connection refused\n"));
        assert!(text.contains("]: Executing transfer for second\n"));
    }

    #[tokio::test]
    async fn push_reads_from_the_object_store() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(None, None).quiet();
        let remote = Arc::new(MemoryFs::new());
        let mut connector = FakeConnector::default();
        connector.hosts.insert("h".into(), remote.clone());
        let store = MemoryFs::new().with_file("out/r.xml", "<a/>");

        let cfg = config(
            r#"{"p": {"sftp": {"host": "h", "username": "u"}, "source_path": "out",
                 "destination_path": "returns", "mode": "push"}}"#,
        );
        let runner = ProfileRunner::new(&journal, &store, &connector)
            .with_staging_dir(Some(dir.path().to_path_buf()));
        let report = runner.run_all(&cfg).await;

        assert!(report.is_success());
        assert_eq!(remote.contents("returns/r.xml").unwrap(), b"<a/>");
        assert!(!store.exists("out/r.xml"));
    }

    #[tokio::test]
    async fn invalid_profile_is_reported_and_skipped() {
        let journal = Journal::new(None, None).quiet();
        let connector = FakeConnector::default();
        let store = MemoryFs::new();
        let cfg = config(r#"{"bad": {"source_path": "x"}, "s3": {}}"#);

        let report = ProfileRunner::new(&journal, &store, &connector).run_all(&cfg).await;
        assert_eq!(report.failed, vec!["bad"]);
        assert!(connector.connects.lock().unwrap().is_empty());
    }
}
