use async_trait::async_trait;
use filerelay_core::fs::{FsError, FsResult, RemoteEntry, RemoteFs};
use filerelay_core::{Journal, MemoryFs};
use filerelay_lib::{AppConfig, ProfileRunner, RemoteConnector};
use filerelay_sftp::SftpEndpointConfig;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const EDI_NAME: &str = "856_D20200507T193946.edi";
const XML_NAME: &str = "CAT202221 856.xml";

fn fixture(name: &str) -> Vec<u8> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("crates/filerelay-core/tests/fixtures");
    std::fs::read(dir.join(name)).unwrap()
}

/// In-memory endpoint shared between the test and the runner.
struct SharedFs(Arc<MemoryFs>);

#[async_trait]
impl RemoteFs for SharedFs {
    async fn list(&self, path: &str) -> FsResult<Vec<RemoteEntry>> {
        self.0.list(path).await
    }
    async fn read_stream(&self, path: &str, sink: &mut (dyn Write + Send)) -> FsResult<u64> {
        self.0.read_stream(path, sink).await
    }
    async fn write_stream(&self, path: &str, source: &mut (dyn Read + Send)) -> FsResult<u64> {
        self.0.write_stream(path, source).await
    }
    async fn delete(&self, path: &str) -> FsResult<()> {
        self.0.delete(path).await
    }
    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.0.rename(from, to).await
    }
}

#[derive(Default)]
struct Hosts {
    endpoints: HashMap<String, Arc<MemoryFs>>,
    opened: Mutex<Vec<String>>,
}

impl Hosts {
    fn with(mut self, host: &str, fs: &Arc<MemoryFs>) -> Self {
        self.endpoints.insert(host.to_string(), fs.clone());
        self
    }
}

#[async_trait]
impl RemoteConnector for Hosts {
    async fn connect(&self, settings: &SftpEndpointConfig) -> FsResult<Box<dyn RemoteFs>> {
        self.opened.lock().unwrap().push(settings.host.clone());
        self.endpoints
            .get(&settings.host)
            .map(|fs| Box::new(SharedFs(fs.clone())) as Box<dyn RemoteFs>)
            .ok_or_else(|| FsError::connection(settings.endpoint(), "Connection refused"))
    }
}

struct Scratch {
    _dir: tempfile::TempDir,
    staging: PathBuf,
    transfer_log: PathBuf,
    audit_log: PathBuf,
}

impl Scratch {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        Self {
            transfer_log: dir.path().join("transfer.log"),
            audit_log: dir.path().join("audit.log"),
            staging,
            _dir: dir,
        }
    }

    fn journal(&self) -> Journal {
        Journal::new(Some(self.transfer_log.clone()), Some(self.audit_log.clone())).quiet()
    }

    fn config(&self, profiles: &str) -> AppConfig {
        AppConfig::from_json(&format!(
            r#"{{"s3": {{"region": "us-east-1", "bucket": "edi", "credentials": {{"key": "k", "secret": "s"}}}},
                "profiles": {}}}"#,
            profiles
        ))
        .unwrap()
    }

    fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(&self.staging).unwrap().next().is_none()
    }
}

#[tokio::test]
async fn pull_profile_renames_from_interchange_header() {
    let scratch = Scratch::new();
    let journal = scratch.journal();
    let remote = Arc::new(
        MemoryFs::new()
            .with_file(&format!("outbound/{}", EDI_NAME), fixture(EDI_NAME))
            .with_file(&format!("outbound/{}", XML_NAME), fixture(XML_NAME)),
    );
    let hosts = Hosts::default().with("amazon.example", &remote);
    let bucket = MemoryFs::new();

    let config = scratch.config(
        r#"{"amazon": {
            "sftp": {"host": "amazon.example", "username": "edi", "password": "pw"},
            "source_path": "outbound",
            "destination_path": "inbound",
            "wildcard_filters": ["*.edi"],
            "rename_pattern": "%meta[ISA08]%_%filename%.%extension%"
        }}"#,
    );

    let report = ProfileRunner::new(&journal, &bucket, &hosts)
        .with_staging_dir(Some(scratch.staging.clone()))
        .run_all(&config)
        .await;

    assert!(report.is_success());
    let uploaded = format!("inbound/AMAZONDS_{}", EDI_NAME);
    assert_eq!(bucket.paths(), vec![uploaded.clone()]);
    assert_eq!(bucket.contents(&uploaded).unwrap(), fixture(EDI_NAME));
    assert_eq!(remote.paths(), vec![format!("outbound/{}", XML_NAME)]);
    assert!(scratch.staging_is_empty());

    let log = std::fs::read_to_string(&scratch.transfer_log).unwrap();
    assert!(log.contains("]: Executing transfer for amazon\n"));
    assert!(log.contains(&format!("]: Downloaded file: {} of 342 bytes\n", EDI_NAME)));
    assert!(log.contains(&format!("]: Uploaded file: AMAZONDS_{} of 342 bytes\n", EDI_NAME)));
    assert!(log.contains(&format!("]: Downloaded files: {{\"{}\":342}}\n", EDI_NAME)));

    let audit = std::fs::read_to_string(&scratch.audit_log).unwrap();
    assert!(audit.contains(&format!(
        "]: Transfer sftp://outbound/{} -> S3://{} (342 bytes)\n",
        EDI_NAME, uploaded
    )));
}

#[tokio::test]
async fn tag_metadata_and_replacements_on_xml() {
    let scratch = Scratch::new();
    let journal = scratch.journal();
    let remote = Arc::new(MemoryFs::new().with_file(&format!("out/{}", XML_NAME), fixture(XML_NAME)));
    let hosts = Hosts::default().with("h", &remote);
    let bucket = MemoryFs::new();

    let config = scratch.config(
        r#"{"xml": {
            "sftp": {"host": "h", "username": "u"},
            "source_path": "out",
            "destination_path": "in",
            "wildcard_filters": ["*.xml"],
            "rename_pattern": "%meta[ShipToCode]%-%meta[DocumentNumber]%.xml",
            "search_replace_patterns": {"<ShipToCode>DQ</ShipToCode>": "<ShipToCode>XX</ShipToCode>"},
            "disposition": "archive",
            "archive_path": "out/archive"
        }}"#,
    );

    let report = ProfileRunner::new(&journal, &bucket, &hosts)
        .with_staging_dir(Some(scratch.staging.clone()))
        .run_all(&config)
        .await;

    assert!(report.is_success());
    // Rendering reads the transformed file.
    let stored = bucket.contents("in/XX-CAT202221.xml").unwrap();
    assert!(String::from_utf8_lossy(&stored).contains("<ShipToCode>XX</ShipToCode>"));
    assert_eq!(remote.contents(&format!("out/archive/{}", XML_NAME)).unwrap(), fixture(XML_NAME));
    assert!(!remote.exists(&format!("out/{}", XML_NAME)));
}

#[tokio::test]
async fn unreachable_profile_is_isolated() {
    let scratch = Scratch::new();
    let journal = scratch.journal();
    let healthy = Arc::new(MemoryFs::new().with_file("out/a.edi", fixture(EDI_NAME)));
    let hosts = Hosts::default().with("up", &healthy);
    let bucket = MemoryFs::new();

    let config = scratch.config(
        r#"{
            "down": {"sftp": {"host": "down", "username": "u"}, "source_path": "out", "destination_path": "in"},
            "s3": {"ignored": true},
            "up": {"sftp": {"host": "up", "username": "u"}, "source_path": "out", "destination_path": "in"}
        }"#,
    );

    let report = ProfileRunner::new(&journal, &bucket, &hosts)
        .with_staging_dir(Some(scratch.staging.clone()))
        .run_all(&config)
        .await;

    assert_eq!(report.failed, vec!["down"]);
    assert_eq!(report.succeeded, vec!["up"]);
    assert_eq!(*hosts.opened.lock().unwrap(), vec!["down", "up"]);
    assert!(bucket.exists("in/a.edi"));

    let log = std::fs::read_to_string(&scratch.transfer_log).unwrap();
    let down = log.find("Executing transfer for down").unwrap();
    let error = log.find("[ERROR] sftp://u@down:22 connection failed: Connection refused").unwrap();
    let up = log.find("Executing transfer for up").unwrap();
    assert!(down < error && error < up);
    assert!(!log.contains("Executing transfer for s3"));
}

#[tokio::test]
async fn short_reads_skip_without_disposal() {
    let scratch = Scratch::new();
    let journal = scratch.journal();
    let remote = Arc::new(MemoryFs::new().with_file("out/a.edi", fixture(EDI_NAME)));
    remote.truncate_reads("out/a.edi", 3);
    let hosts = Hosts::default().with("h", &remote);
    let bucket = MemoryFs::new();

    let config = scratch.config(
        r#"{"p": {"sftp": {"host": "h", "username": "u"}, "source_path": "out", "destination_path": "in"}}"#,
    );

    let report = ProfileRunner::new(&journal, &bucket, &hosts)
        .with_staging_dir(Some(scratch.staging.clone()))
        .run_all(&config)
        .await;

    assert!(report.is_success());
    assert!(bucket.paths().is_empty());
    assert!(remote.exists("out/a.edi"));
    assert_eq!(remote.read_count("out/a.edi"), 3);
    assert!(scratch.staging_is_empty());
}
