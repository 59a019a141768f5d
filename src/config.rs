// ── Relay configuration ──────────────────────────────────────────────────────
//
// One JSON document: the shared `s3` block, the two log sinks and an ordered
// map of transfer profiles. Profiles are decoded one by one so a malformed
// profile fails on its own turn instead of taking the whole run down.

use crate::error::ConfigError;
use filerelay_core::{Journal, TransferProfile};
use filerelay_s3::S3Config;
use filerelay_sftp::SftpEndpointConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "filerelay.config.json";

/// Profile names that are never run.
const RESERVED_PROFILE_NAMES: [&str; 2] = ["s3", "sftp"];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub s3: S3Config,
    #[serde(default)]
    pub transfer_log: Option<PathBuf>,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
    /// Directory for staging files; the system temp dir when unset.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    #[serde(default)]
    profiles: IndexMap<String, serde_json::Value>,
}

/// A transfer profile together with its SFTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub sftp: SftpEndpointConfig,
    #[serde(flatten)]
    pub transfer: TransferProfile,
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.sftp.validate()?;
        if self.transfer.wildcard_filters.is_empty() {
            return Err("wildcard_filters must not be empty".into());
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::debug!(
            "loaded {} with {} profile(s)",
            path.display(),
            config.profile_names().count()
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Checks that make the whole run impossible. Individual profiles are
    /// checked when they are decoded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.s3.validate().map_err(ConfigError::ObjectStore)
    }

    pub fn journal(&self) -> Journal {
        Journal::new(self.transfer_log.clone(), self.audit_log.clone())
    }

    /// Runnable profile names in declaration order.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles
            .keys()
            .map(String::as_str)
            .filter(|name| !RESERVED_PROFILE_NAMES.contains(name))
    }

    /// Runnable profiles in declaration order, each decoded and validated.
    pub fn profiles(&self) -> impl Iterator<Item = (&str, Result<ProfileConfig, ConfigError>)> {
        self.profiles
            .iter()
            .filter(|(name, _)| !RESERVED_PROFILE_NAMES.contains(&name.as_str()))
            .map(|(name, raw)| (name.as_str(), decode_profile(name, raw)))
    }
}

fn decode_profile(name: &str, raw: &serde_json::Value) -> Result<ProfileConfig, ConfigError> {
    let invalid = |message: String| ConfigError::Profile {
        name: name.to_string(),
        message,
    };
    let profile = ProfileConfig::deserialize(raw).map_err(|e| invalid(e.to_string()))?;
    profile.validate().map_err(invalid)?;
    Ok(profile)
}
