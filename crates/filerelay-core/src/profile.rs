// ── Transfer profile ─────────────────────────────────────────────────────────

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_wildcard_filters() -> Vec<String> {
    vec!["*.*".to_string()]
}
fn default_upload_attempts() -> u32 {
    1
}

// ── Direction ────────────────────────────────────────────────────────────────

/// Direction of a transfer. Pull reads from the SFTP endpoint and writes to
/// the object store; Push is the reverse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Pull,
    Push,
}

impl Mode {
    /// `(source, destination)` scheme labels used in audit lines.
    pub fn schemes(self) -> (&'static str, &'static str) {
        match self {
            Mode::Pull => ("sftp", "S3"),
            Mode::Push => ("S3", "sftp"),
        }
    }
}

// ── Disposition ──────────────────────────────────────────────────────────────

/// What happens to the source file once it has been uploaded.
///
/// Accepts `"delete"` / `"archive"` as well as the numeric codes `1` / `2`
/// used by older configuration files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", try_from = "DispositionRepr")]
pub enum Disposition {
    #[default]
    Delete,
    Archive,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DispositionRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<DispositionRepr> for Disposition {
    type Error = String;

    fn try_from(repr: DispositionRepr) -> Result<Self, Self::Error> {
        match repr {
            DispositionRepr::Code(1) => Ok(Disposition::Delete),
            DispositionRepr::Code(2) => Ok(Disposition::Archive),
            DispositionRepr::Code(other) => Err(format!(
                "unknown disposition code {} (expected 1 = delete, 2 = archive)",
                other
            )),
            DispositionRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "delete" => Ok(Disposition::Delete),
                "archive" => Ok(Disposition::Archive),
                _ => Err(format!(
                    "unknown disposition '{}' (expected \"delete\" or \"archive\")",
                    name
                )),
            },
        }
    }
}

// ── Profile ──────────────────────────────────────────────────────────────────

/// One configured transfer job. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProfile {
    pub source_path: String,
    pub destination_path: String,
    /// Glob filters tried in order against each entry's base name.
    #[serde(default = "default_wildcard_filters")]
    pub wildcard_filters: Vec<String>,
    /// Token pattern for the uploaded name; `None` keeps the original name.
    #[serde(default)]
    pub rename_pattern: Option<String>,
    /// Literal search → replacement rules, applied in declaration order.
    #[serde(default)]
    pub search_replace_patterns: IndexMap<String, String>,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub mode: Mode,
    /// Directory on the source endpoint that archived files are moved into.
    #[serde(default)]
    pub archive_path: Option<String>,
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,
}

impl TransferProfile {
    pub fn new(source_path: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            wildcard_filters: default_wildcard_filters(),
            rename_pattern: None,
            search_replace_patterns: IndexMap::new(),
            disposition: Disposition::default(),
            mode: Mode::default(),
            archive_path: None,
            upload_attempts: default_upload_attempts(),
        }
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wildcard_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rename_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rename_pattern = Some(pattern.into());
        self
    }

    pub fn with_replacement(
        mut self,
        search: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        self.search_replace_patterns.insert(search.into(), replace.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_archive_path(mut self, path: impl Into<String>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    pub fn with_upload_attempts(mut self, attempts: u32) -> Self {
        self.upload_attempts = attempts.max(1);
        self
    }
}
