// ── Transfer engine ──────────────────────────────────────────────────────────
//
// Drives one profile from listing to summary:
//
//   list → filter → download (verified, retried) → transform → render name
//        → upload → audit → dispose
//
// Every remote call goes through `RemoteFs`. Local work happens on temporary
// files that are removed when they go out of scope, whichever way the entry
// finishes.

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::fs::{base_name, join_path, FsError, FsResult, RemoteEntry, RemoteFs};
use crate::journal::Journal;
use crate::profile::{Disposition, TransferProfile};
use crate::render;
use crate::retry::{self, RetryPolicy};
use crate::transform;
use glob::Pattern;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Download attempts per entry before it is skipped.
pub const DOWNLOAD_ATTEMPTS: u32 = 3;

const STAGING_PREFIX: &str = "filerelay-download";
const TRANSFORMED_PREFIX: &str = "filerelay-modified";

// ── Records ──────────────────────────────────────────────────────────────────

/// Per-entry bookkeeping, discarded once the entry is finished.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAttempt {
    pub source_name: String,
    pub bytes_expected: u64,
    pub bytes_downloaded: u64,
    pub attempt_count: u32,
    pub local_staging_path: Option<PathBuf>,
    pub local_transformed_path: Option<PathBuf>,
    pub rendered_target_name: Option<String>,
}

impl TransferAttempt {
    fn for_entry(entry: &RemoteEntry) -> Self {
        Self {
            source_name: entry.base_name().to_string(),
            bytes_expected: entry.size_bytes,
            ..Default::default()
        }
    }
}

/// Outcome of one profile run.
#[derive(Debug, Default, Serialize)]
pub struct TransferSummary {
    /// Base name → verified byte count.
    pub downloaded: IndexMap<String, u64>,
    /// Base name → name it was uploaded as.
    pub uploaded: IndexMap<String, String>,
    /// Base names abandoned after failed download verification.
    pub skipped: Vec<String>,
    #[serde(skip)]
    pub attempts: Vec<TransferAttempt>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct TransferEngine<'a> {
    journal: &'a Journal,
    staging_dir: Option<PathBuf>,
}

impl<'a> TransferEngine<'a> {
    pub fn new(journal: &'a Journal) -> Self {
        Self {
            journal,
            staging_dir: None,
        }
    }

    /// Stage temporary files under `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Run `profile` once, reading from `source` and writing to `destination`.
    pub async fn run(
        &self,
        source: &dyn RemoteFs,
        destination: &dyn RemoteFs,
        profile: &TransferProfile,
    ) -> PipelineResult<TransferSummary> {
        let filters = compile_filters(&profile.wildcard_filters)?;

        let entries = source
            .list(&profile.source_path)
            .await
            .map_err(|e| PipelineError::fs(Stage::Listing, &profile.source_path, e))?;
        debug!("{} entries under {}", entries.len(), profile.source_path);

        let mut seen = HashSet::new();
        let mut summary = TransferSummary::default();
        for entry in entries.iter().filter(|e| e.is_file()) {
            if !filters.iter().any(|p| p.matches(entry.base_name())) {
                continue;
            }
            if !seen.insert(entry.path.as_str()) {
                continue;
            }
            self.transfer_entry(source, destination, profile, entry, &mut summary)
                .await?;
        }

        self.journal.log(format!(
            "Downloaded files: {}",
            serde_json::to_string(&summary.downloaded)?
        ));
        self.journal.log(format!(
            "Uploaded files: {}",
            serde_json::to_string(&summary.uploaded)?
        ));
        Ok(summary)
    }

    async fn transfer_entry(
        &self,
        source: &dyn RemoteFs,
        destination: &dyn RemoteFs,
        profile: &TransferProfile,
        entry: &RemoteEntry,
        summary: &mut TransferSummary,
    ) -> PipelineResult<()> {
        let mut attempt = TransferAttempt::for_entry(entry);

        let Some(staged) = self.download(source, entry, &mut attempt).await? else {
            self.journal.log(format!(
                "Unable to download completely the file: {} expected {} bytes, {} downloaded",
                attempt.source_name, attempt.bytes_expected, attempt.bytes_downloaded
            ));
            summary.skipped.push(attempt.source_name.clone());
            summary.attempts.push(attempt);
            return Ok(());
        };
        self.journal.log(format!(
            "Downloaded file: {} of {} bytes",
            attempt.source_name, attempt.bytes_downloaded
        ));
        summary
            .downloaded
            .insert(attempt.source_name.clone(), attempt.bytes_downloaded);

        // Transforming
        let modified = self
            .transform_staged(staged.path(), profile)
            .map_err(PipelineError::staging(Stage::Transforming))?;
        attempt.local_transformed_path = Some(modified.path().to_path_buf());
        drop(staged);

        // Renaming
        let new_name = render::render(
            profile.rename_pattern.as_deref(),
            &attempt.source_name,
            modified.path(),
        );
        attempt.rendered_target_name = Some(new_name.clone());
        let target = join_path(&profile.destination_path, &new_name);

        // Uploading
        let (target_path, local_path) = (target.as_str(), modified.path());
        let max_uploads = profile.upload_attempts.max(1);
        let outcome = retry::attempt(
            RetryPolicy::immediate(max_uploads),
            move |n| self.upload_once(destination, target_path, local_path, n, max_uploads),
            |r| r.is_ok(),
        )
        .await;
        let written = outcome
            .value
            .map_err(|e| PipelineError::fs(Stage::Uploading, &target, e))?;
        drop(modified);
        debug!("wrote {} bytes to {}", written, target);

        // Both records carry the verified download size, not the rewritten one.
        self.journal.log(format!(
            "Uploaded file: {} of {} bytes",
            new_name, attempt.bytes_downloaded
        ));
        self.journal
            .audit(profile.mode, &entry.path, &target, attempt.bytes_downloaded);
        summary
            .uploaded
            .insert(attempt.source_name.clone(), new_name);

        // Disposing
        self.dispose(source, profile, entry).await?;

        debug!("finished {:?}", attempt);
        summary.attempts.push(attempt);
        Ok(())
    }

    /// Download `entry` until the staged size matches the advertised size.
    /// `Ok(None)` means every attempt came up short.
    async fn download(
        &self,
        source: &dyn RemoteFs,
        entry: &RemoteEntry,
        attempt: &mut TransferAttempt,
    ) -> PipelineResult<Option<NamedTempFile>> {
        let expected = entry.size_bytes;
        let outcome = retry::attempt(
            RetryPolicy::immediate(DOWNLOAD_ATTEMPTS),
            move |n| self.download_once(source, entry, n),
            |r| matches!(r, Ok((_, size)) if *size == expected),
        )
        .await;
        attempt.attempt_count = outcome.tries;

        let (staged, size) = outcome
            .value
            .map_err(|e| PipelineError::fs(Stage::Downloading, &entry.path, e))?;
        attempt.bytes_downloaded = size;
        attempt.local_staging_path = Some(staged.path().to_path_buf());
        if !outcome.accepted {
            return Ok(None);
        }
        Ok(Some(staged))
    }

    async fn download_once(
        &self,
        source: &dyn RemoteFs,
        entry: &RemoteEntry,
        n: u32,
    ) -> FsResult<(NamedTempFile, u64)> {
        let result = async {
            let mut staged = self.staging_file(STAGING_PREFIX)?;
            source.read_stream(&entry.path, staged.as_file_mut()).await?;
            staged.as_file_mut().flush()?;
            let size = staged.as_file().metadata()?.len();
            if size != entry.size_bytes {
                info!(
                    "Attempt {}/{} for {}: {} of {} bytes",
                    n, DOWNLOAD_ATTEMPTS, entry.path, size, entry.size_bytes
                );
            }
            Ok::<_, FsError>((staged, size))
        }
        .await;
        if let Err(e) = &result {
            if n < DOWNLOAD_ATTEMPTS {
                warn!("Attempt {}/{} for {} failed: {}", n, DOWNLOAD_ATTEMPTS, entry.path, e);
            }
        }
        result
    }

    async fn upload_once(
        &self,
        destination: &dyn RemoteFs,
        target: &str,
        local: &Path,
        n: u32,
        max: u32,
    ) -> FsResult<u64> {
        let result = async {
            let mut file = std::fs::File::open(local)?;
            destination.write_stream(target, &mut file).await
        }
        .await;
        if let Err(e) = &result {
            if n < max {
                warn!("Upload attempt {}/{} to {} failed: {}", n, max, target, e);
            }
        }
        result
    }

    async fn dispose(
        &self,
        source: &dyn RemoteFs,
        profile: &TransferProfile,
        entry: &RemoteEntry,
    ) -> PipelineResult<()> {
        match profile.disposition {
            Disposition::Delete => {
                self.journal
                    .log(format!("Removing {} from server", entry.path));
                source
                    .delete(&entry.path)
                    .await
                    .map_err(|e| PipelineError::fs(Stage::Disposing, &entry.path, e))?;
            }
            Disposition::Archive => match &profile.archive_path {
                Some(dir) => {
                    let to = join_path(dir, base_name(&entry.path));
                    self.journal
                        .log(format!("Archiving {} on server", entry.path));
                    source
                        .rename(&entry.path, &to)
                        .await
                        .map_err(|e| PipelineError::fs(Stage::Disposing, &entry.path, e))?;
                }
                None => {
                    warn!(
                        "archive requested for {} but no archive path is configured",
                        entry.path
                    );
                    self.journal.log(format!(
                        "Archiving {} skipped: no archive path configured, file left in place",
                        entry.path
                    ));
                }
            },
        }
        Ok(())
    }

    fn transform_staged(
        &self,
        staged: &Path,
        profile: &TransferProfile,
    ) -> std::io::Result<NamedTempFile> {
        let modified = self.staging_file(TRANSFORMED_PREFIX)?;
        let original = std::fs::read(staged)?;
        let rewritten = transform::transform(&original, &profile.search_replace_patterns);
        let mut out = modified.as_file();
        out.write_all(&rewritten)?;
        out.flush()?;
        Ok(modified)
    }

    fn staging_file(&self, prefix: &str) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

fn compile_filters(filters: &[String]) -> PipelineResult<Vec<Pattern>> {
    filters
        .iter()
        .map(|f| {
            Pattern::new(f).map_err(|e| PipelineError::Filter {
                pattern: f.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;
    use crate::profile::Mode;

    const EDI_NAME: &str = "856_D20200507T193946.edi";

    fn edi_bytes() -> Vec<u8> {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        std::fs::read(fixtures.join(EDI_NAME)).unwrap()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        staging: PathBuf,
        audit: PathBuf,
        log: PathBuf,
        journal: Journal,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let staging = dir.path().join("staging");
            std::fs::create_dir(&staging).unwrap();
            let audit = dir.path().join("audit.log");
            let log = dir.path().join("transfer.log");
            let journal = Journal::new(Some(log.clone()), Some(audit.clone())).quiet();
            Self {
                _dir: dir,
                staging,
                audit,
                log,
                journal,
            }
        }

        fn engine(&self) -> TransferEngine<'_> {
            TransferEngine::new(&self.journal).with_staging_dir(&self.staging)
        }

        fn staging_is_empty(&self) -> bool {
            std::fs::read_dir(&self.staging).unwrap().next().is_none()
        }

        fn read(path: &Path) -> String {
            std::fs::read_to_string(path).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn pull_renames_from_header_and_deletes_source() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file(&format!("outbound/{}", EDI_NAME), edi_bytes());
        let store = MemoryFs::new();
        let profile = TransferProfile::new("outbound", "inbound")
            .with_rename_pattern("%meta[ISA08]%_%filename%.%extension%");

        let summary = h.engine().run(&remote, &store, &profile).await.unwrap();

        let target = format!("inbound/AMAZONDS_{}", EDI_NAME);
        assert_eq!(store.contents(&target).unwrap(), edi_bytes());
        assert!(remote.paths().is_empty());
        assert_eq!(summary.uploaded[EDI_NAME], format!("AMAZONDS_{}", EDI_NAME));
        assert_eq!(summary.downloaded[EDI_NAME], edi_bytes().len() as u64);

        let audit = Harness::read(&h.audit);
        assert_eq!(audit.lines().count(), 1);
        assert!(audit.contains(&format!(
            "Transfer sftp://outbound/{} -> S3://{} ({} bytes)",
            EDI_NAME,
            target,
            edi_bytes().len()
        )));
        let log = Harness::read(&h.log);
        assert!(log.contains(&format!("Removing outbound/{} from server", EDI_NAME)));
        assert!(log.contains("Downloaded files: {\"856_D20200507T193946.edi\":342}"));
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn download_succeeds_on_third_attempt() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "0123456789");
        remote.truncate_reads("out/a.edi", 2);
        let store = MemoryFs::new();

        let summary = h
            .engine()
            .run(&remote, &store, &TransferProfile::new("out", "in"))
            .await
            .unwrap();

        assert_eq!(remote.read_count("out/a.edi"), 3);
        assert_eq!(summary.attempts[0].attempt_count, 3);
        assert_eq!(store.contents("in/a.edi").unwrap(), b"0123456789");
        assert!(summary.skipped.is_empty());
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn entry_skipped_after_three_short_downloads() {
        let h = Harness::new();
        let remote = MemoryFs::new()
            .with_file("out/a.edi", "0123456789")
            .with_file("out/b.edi", "ok");
        remote.truncate_reads("out/a.edi", 3);
        let store = MemoryFs::new();

        let summary = h
            .engine()
            .run(&remote, &store, &TransferProfile::new("out", "in"))
            .await
            .unwrap();

        assert_eq!(remote.read_count("out/a.edi"), 3);
        assert_eq!(summary.skipped, vec!["a.edi"]);
        assert!(!store.exists("in/a.edi"));
        assert!(remote.exists("out/a.edi"));
        // The next entry is still processed.
        assert!(store.exists("in/b.edi"));
        assert!(!remote.exists("out/b.edi"));

        let log = Harness::read(&h.log);
        assert!(log.contains(
            "Unable to download completely the file: a.edi expected 10 bytes, 9 downloaded"
        ));
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn filters_match_base_names_once() {
        let h = Harness::new();
        let remote = MemoryFs::new()
            .with_file("out/a.edi", "a")
            .with_file("out/b.xml", "b")
            .with_file("out/c.txt", "c")
            .with_file("out/README", "r")
            .with_file("out/sub.edi/nested.edi", "n");
        let store = MemoryFs::new();
        let profile =
            TransferProfile::new("out", "in").with_filters(["*.edi", "[ab].xml", "?.edi"]);

        let summary = h.engine().run(&remote, &store, &profile).await.unwrap();

        assert_eq!(store.paths(), vec!["in/a.edi", "in/b.xml"]);
        assert_eq!(summary.uploaded.len(), 2);
        assert!(remote.exists("out/c.txt"));
        assert!(remote.exists("out/README"));
        assert!(remote.exists("out/sub.edi/nested.edi"));
        assert_eq!(Harness::read(&h.audit).lines().count(), 2);
    }

    #[tokio::test]
    async fn default_filter_requires_a_dot() {
        let h = Harness::new();
        let remote = MemoryFs::new()
            .with_file("out/a.edi", "a")
            .with_file("out/README", "r");
        let store = MemoryFs::new();

        h.engine()
            .run(&remote, &store, &TransferProfile::new("out", "in"))
            .await
            .unwrap();

        assert_eq!(store.paths(), vec!["in/a.edi"]);
    }

    #[tokio::test]
    async fn replacements_apply_in_order_before_rename() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.xml", "<Code>A</Code>");
        let store = MemoryFs::new();
        let profile = TransferProfile::new("out", "in")
            .with_replacement("A", "B")
            .with_replacement("B", "C")
            .with_rename_pattern("%meta[Code]%-%filename%.%extension%");

        h.engine().run(&remote, &store, &profile).await.unwrap();

        assert_eq!(store.contents("in/C-a.xml").unwrap(), b"<Code>C</Code>");
    }

    #[tokio::test]
    async fn records_downloaded_size_when_rewrite_changes_length() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "AAAA");
        let store = MemoryFs::new();
        let profile = TransferProfile::new("out", "in").with_replacement("A", "BBBBBB");

        let summary = h.engine().run(&remote, &store, &profile).await.unwrap();

        assert_eq!(store.contents("in/a.edi").unwrap().len(), 24);
        assert_eq!(summary.downloaded["a.edi"], 4);
        let log = Harness::read(&h.log);
        assert!(log.contains("Downloaded file: a.edi of 4 bytes"));
        assert!(log.contains("Uploaded file: a.edi of 4 bytes"));
        assert!(Harness::read(&h.audit)
            .contains("Transfer sftp://out/a.edi -> S3://in/a.edi (4 bytes)"));
    }

    #[tokio::test]
    async fn staging_failure_is_tagged_with_its_stage() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "a");
        let store = MemoryFs::new();
        let engine = TransferEngine::new(&h.journal).with_staging_dir(h.staging.join("gone"));

        let err = engine
            .run(&remote, &store, &TransferProfile::new("out", "in"))
            .await
            .unwrap_err();

        // The first staging file is created while downloading.
        assert_eq!(err.stage(), Stage::Downloading);
        assert!(remote.exists("out/a.edi"));
        assert!(store.paths().is_empty());
    }

    #[test]
    fn transform_staging_failure_reports_transforming() {
        let err = PipelineError::staging(Stage::Transforming)(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "staging dir removed",
        ));
        assert_eq!(err.stage(), Stage::Transforming);
        assert!(err.to_string().starts_with("transforming: local staging failed"));
    }

    #[tokio::test]
    async fn archive_moves_source_into_archive_path() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "a");
        let store = MemoryFs::new();
        let profile = TransferProfile::new("out", "in")
            .with_disposition(Disposition::Archive)
            .with_archive_path("out/archive");

        h.engine().run(&remote, &store, &profile).await.unwrap();

        assert!(!remote.exists("out/a.edi"));
        assert_eq!(remote.contents("out/archive/a.edi").unwrap(), b"a");
        assert!(Harness::read(&h.log).contains("Archiving out/a.edi on server"));
    }

    #[tokio::test]
    async fn archive_without_path_leaves_source() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "a");
        let store = MemoryFs::new();
        let profile = TransferProfile::new("out", "in").with_disposition(Disposition::Archive);

        h.engine().run(&remote, &store, &profile).await.unwrap();

        assert!(store.exists("in/a.edi"));
        assert!(remote.exists("out/a.edi"));
    }

    #[tokio::test]
    async fn upload_failure_is_fatal_and_keeps_source() {
        let h = Harness::new();
        let remote = MemoryFs::new().with_file("out/a.edi", "a");
        let store = MemoryFs::new();
        store.fail_writes("in/a.edi");
        let profile = TransferProfile::new("out", "in").with_upload_attempts(2);

        let err = h.engine().run(&remote, &store, &profile).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Uploading);
        assert!(remote.exists("out/a.edi"));
        assert_eq!(Harness::read(&h.audit), "");
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn push_direction_is_audited_from_the_store() {
        let h = Harness::new();
        let store = MemoryFs::new().with_file("exports/a.csv", "1,2");
        let remote = MemoryFs::new();
        let profile = TransferProfile::new("exports", "/incoming").with_mode(Mode::Push);

        h.engine().run(&store, &remote, &profile).await.unwrap();

        assert_eq!(remote.contents("incoming/a.csv").unwrap(), b"1,2");
        assert!(Harness::read(&h.audit)
            .contains("Transfer S3://exports/a.csv -> sftp:///incoming/a.csv (3 bytes)"));
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected_before_listing() {
        let h = Harness::new();
        let remote = MemoryFs::new();
        let store = MemoryFs::new();
        let profile = TransferProfile::new("out", "in").with_filters(["[unclosed"]);

        let err = h.engine().run(&remote, &store, &profile).await.unwrap_err();
        assert!(matches!(err, PipelineError::Filter { .. }));
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let h = Harness::new();
        let remote = MemoryFs::new();
        let store = MemoryFs::new();

        let err = h
            .engine()
            .run(&remote, &store, &TransferProfile::new("missing", "in"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Listing);
    }

    #[test]
    fn compile_filters_keeps_order() {
        let patterns = compile_filters(&["*.edi".to_string(), "x?".to_string()]).unwrap();
        assert_eq!(patterns[0].as_str(), "*.edi");
        assert!(patterns[1].matches("xy"));
        assert!(!patterns[1].matches("x"));
    }
}
