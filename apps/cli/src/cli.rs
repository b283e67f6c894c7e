//! Command-line arguments.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, ValueEnum};
use dbxup_protocol::WriteMode;
use dbxup_transfer::resolve_destination;
use dbxup_upload::UploadTarget;

/// Upload large files to Dropbox through resumable upload sessions.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Access token (falls back to the config file)
    #[arg(short = 't', long, env = "DBXUP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Local file to upload; repeat to upload several files
    #[arg(short = 's', long = "source", required = true, action = ArgAction::Append)]
    pub sources: Vec<PathBuf>,

    /// Remote path; end with '/' to upload into that folder
    #[arg(short = 'd', long)]
    pub destination: String,

    /// What to do when the destination already exists
    #[arg(short = 'm', long, value_enum, default_value_t = Mode::Overwrite)]
    pub mode: Mode,

    /// Revision to replace (required with --mode update)
    #[arg(long, required_if_eq("mode", "update"))]
    pub rev: Option<String>,

    /// Fail instead of renaming on conflict
    #[arg(long)]
    pub no_autorename: bool,

    /// Do not notify the account's devices about the change
    #[arg(long)]
    pub mute: bool,

    /// Modification time to record, RFC 3339 (e.g. 2024-05-01T12:00:00Z)
    #[arg(long, value_parser = parse_timestamp, conflicts_with = "preserve_mtime")]
    pub client_modified: Option<DateTime<Utc>>,

    /// Record each source file's modification time
    #[arg(long)]
    pub preserve_mtime: bool,

    /// Append size in MiB (1-150)
    #[arg(long)]
    pub chunk_size_mib: Option<u64>,

    /// Largest file sent in a single request, in MiB (1-150)
    #[arg(long)]
    pub threshold_mib: Option<u64>,

    /// Files uploaded concurrently
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Attempts per chunk before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Skip the content hash comparison after commit
    #[arg(long)]
    pub no_verify: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Conflict handling for the committed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Add,
    Overwrite,
    Update,
}

impl Args {
    pub fn write_mode(&self) -> anyhow::Result<WriteMode> {
        Ok(match self.mode {
            Mode::Add => WriteMode::Add,
            Mode::Overwrite => WriteMode::Overwrite,
            Mode::Update => {
                let rev = self
                    .rev
                    .clone()
                    .context("--mode update needs --rev <REVISION>")?;
                WriteMode::Update(rev)
            }
        })
    }

    /// One upload target per source.
    ///
    /// Several sources need a folder destination (ending in `/`).
    pub fn targets(&self) -> anyhow::Result<Vec<UploadTarget>> {
        if self.sources.len() > 1 && !self.destination.ends_with('/') {
            bail!(
                "{} sources given: the destination must be a folder ending in '/'",
                self.sources.len()
            );
        }

        let mode = self.write_mode()?;
        self.sources
            .iter()
            .map(|source| -> anyhow::Result<UploadTarget> {
                let destination = resolve_destination(&self.destination, source)?;
                let client_modified = if self.preserve_mtime {
                    Some(modified_time(source)?)
                } else {
                    self.client_modified
                };
                Ok(UploadTarget::new(source, destination)
                    .with_mode(mode.clone())
                    .with_autorename(!self.no_autorename)
                    .with_mute(self.mute)
                    .with_client_modified(client_modified))
            })
            .collect()
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn modified_time(path: &Path) -> anyhow::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("cannot read modification time of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("dbxup").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults() {
        let args = parse(&["-s", "db.tar", "-d", "/backups/db.tar"]).unwrap();
        assert_eq!(args.sources, vec![PathBuf::from("db.tar")]);
        assert_eq!(args.mode, Mode::Overwrite);
        assert!(!args.no_autorename);
        assert!(!args.mute);
        assert!(!args.preserve_mtime);
        assert!(args.client_modified.is_none());
        assert!(args.chunk_size_mib.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn source_and_destination_required() {
        assert!(parse(&["-d", "/x"]).is_err());
        assert!(parse(&["-s", "x"]).is_err());
    }

    #[test]
    fn update_mode_requires_rev() {
        assert!(parse(&["-s", "a", "-d", "/a", "-m", "update"]).is_err());

        let args = parse(&["-s", "a", "-d", "/a", "-m", "update", "--rev", "a1c10ce0dd78"]).unwrap();
        assert_eq!(
            args.write_mode().unwrap(),
            WriteMode::Update("a1c10ce0dd78".into())
        );
    }

    #[test]
    fn mode_values() {
        let args = parse(&["-s", "a", "-d", "/a", "--mode", "add"]).unwrap();
        assert_eq!(args.write_mode().unwrap(), WriteMode::Add);
        assert!(parse(&["-s", "a", "-d", "/a", "--mode", "replace"]).is_err());
    }

    #[test]
    fn client_modified_parses_rfc3339() {
        let args = parse(&[
            "-s",
            "a",
            "-d",
            "/a",
            "--client-modified",
            "2024-05-01T14:00:00+02:00",
        ])
        .unwrap();
        assert_eq!(
            args.client_modified,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert!(parse(&["-s", "a", "-d", "/a", "--client-modified", "yesterday"]).is_err());
    }

    #[test]
    fn client_modified_conflicts_with_preserve_mtime() {
        assert!(parse(&[
            "-s",
            "a",
            "-d",
            "/a",
            "--client-modified",
            "2024-05-01T12:00:00Z",
            "--preserve-mtime",
        ])
        .is_err());
    }

    #[test]
    fn single_target_uses_destination_as_file() {
        let args = parse(&["-s", "/tmp/db.tar", "-d", "/backups/latest.tar", "--mute"]).unwrap();
        let targets = args.targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].destination, "/backups/latest.tar");
        assert_eq!(targets[0].mode, WriteMode::Overwrite);
        assert!(targets[0].autorename);
        assert!(targets[0].mute);
    }

    #[test]
    fn folder_destination_appends_file_names() {
        let args = parse(&[
            "-s",
            "/tmp/a.bin",
            "-s",
            "/tmp/b.bin",
            "-d",
            "/backups/",
            "--no-autorename",
        ])
        .unwrap();
        let targets = args.targets().unwrap();
        let destinations: Vec<&str> = targets.iter().map(|t| t.destination.as_str()).collect();
        assert_eq!(destinations, vec!["/backups/a.bin", "/backups/b.bin"]);
        assert!(targets.iter().all(|t| !t.autorename));
    }

    #[test]
    fn several_sources_need_folder_destination() {
        let args = parse(&["-s", "a.bin", "-s", "b.bin", "-d", "/backups/one.bin"]).unwrap();
        assert!(args.targets().is_err());
    }

    #[test]
    fn relative_destination_rejected() {
        let args = parse(&["-s", "a.bin", "-d", "backups/a.bin"]).unwrap();
        assert!(args.targets().is_err());
    }

    #[test]
    fn preserve_mtime_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();
        let expected = DateTime::<Utc>::from(std::fs::metadata(&path).unwrap().modified().unwrap());

        let path_str = path.to_str().unwrap();
        let args = parse(&["-s", path_str, "-d", "/a.bin", "--preserve-mtime"]).unwrap();
        let targets = args.targets().unwrap();
        assert_eq!(targets[0].client_modified, Some(expected));
    }

    #[test]
    fn preserve_mtime_missing_source_fails() {
        let args = parse(&["-s", "/definitely/not/here.bin", "-d", "/a.bin", "--preserve-mtime"])
            .unwrap();
        assert!(args.targets().is_err());
    }
}
