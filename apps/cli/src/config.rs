//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/dbxup/config.toml`
//! - Windows: `%APPDATA%/dbxup/config.toml`
//!
//! The file may hold the access token, so it is written owner-only.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use dbxup_upload::{RetryPolicy, UploadConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Args;

const MIB: u64 = 1024 * 1024;

/// Largest chunk or threshold the remote accepts in one request.
const MAX_MIB: u64 = 150;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// OAuth2 access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Size of each session append, in MiB.
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: u64,

    /// Files up to this size are sent in one request, in MiB.
    #[serde(default = "default_direct_threshold_mib")]
    pub direct_threshold_mib: u64,

    /// Attempts per chunk, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Files uploaded concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Compare the local content hash with the remote one after commit.
    #[serde(default = "default_true")]
    pub verify_content_hash: bool,
}

fn default_chunk_size_mib() -> u64 {
    50
}

fn default_direct_threshold_mib() -> u64 {
    150
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jobs() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            chunk_size_mib: default_chunk_size_mib(),
            direct_threshold_mib: default_direct_threshold_mib(),
            max_attempts: default_max_attempts(),
            jobs: default_jobs(),
            verify_content_hash: default_true(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, or creates a default
    /// file if none exists.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Loads configuration from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line values on top of the file values.
    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(token) = &args.token {
            self.token = Some(token.clone());
        }
        if let Some(mib) = args.chunk_size_mib {
            self.chunk_size_mib = mib;
        }
        if let Some(mib) = args.threshold_mib {
            self.direct_threshold_mib = mib;
        }
        if let Some(attempts) = args.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(jobs) = args.jobs {
            self.jobs = jobs;
        }
        if args.no_verify {
            self.verify_content_hash = false;
        }
        self
    }

    /// Checks the values and turns them into orchestrator settings.
    pub fn upload_config(&self) -> anyhow::Result<UploadConfig> {
        if !(1..=MAX_MIB).contains(&self.chunk_size_mib) {
            bail!(
                "chunk_size_mib must be between 1 and {MAX_MIB}, got {}",
                self.chunk_size_mib
            );
        }
        if !(1..=MAX_MIB).contains(&self.direct_threshold_mib) {
            bail!(
                "direct_threshold_mib must be between 1 and {MAX_MIB}, got {}",
                self.direct_threshold_mib
            );
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }

        let chunk_size = NonZeroU64::new(self.chunk_size_mib * MIB)
            .context("chunk size must not be zero")?;
        Ok(UploadConfig {
            chunk_size,
            direct_upload_threshold: self.direct_threshold_mib * MIB,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
            verify_content_hash: self.verify_content_hash,
            ..UploadConfig::default()
        })
    }

    /// The access token, if one is configured and not blank.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("dbxup")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("dbxup").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("dbxup")
            .join("config.toml"))
    }
}
