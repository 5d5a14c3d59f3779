//! Version sources: where a component's history comes from.
//!
//! A source lists the versions of one component (earliest first), names its
//! newest version and can materialize a given version on disk. The search
//! itself only ever reads version lists; materialization happens outside the
//! generation loop.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

/// Errors raised by a version source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Source at {0} lists no versions")]
    Empty(String),
    #[error("{operation} is not supported by {kind} sources")]
    Unsupported {
        kind: &'static str,
        operation: &'static str,
    },
}

/// Backend that discovers and materializes versions of one component.
pub trait VersionSource: Send + Sync + Debug {
    /// Ordered version identifiers, earliest first.
    fn versions(&self) -> Result<Vec<String>, SourceError>;

    /// Newest known version.
    fn head(&self) -> Result<String, SourceError> {
        let versions = self.versions()?;
        versions
            .last()
            .cloned()
            .ok_or_else(|| SourceError::Empty(self.describe()))
    }

    /// Materialize the given version.
    fn checkout(&self, version: &str) -> Result<(), SourceError>;

    /// Short human readable location, used in errors and logs.
    fn describe(&self) -> String;
}

// ============================================================================
// In-memory
// ============================================================================

/// Fixed, in-memory version list.
#[derive(Debug, Default)]
pub struct InlineSource {
    versions: Vec<String>,
    checked_out: Mutex<Option<String>>,
}

impl InlineSource {
    /// Create from an ordered (earliest first) list.
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
            checked_out: Mutex::new(None),
        }
    }

    /// Numbered versions `v0..v{count-1}`.
    pub fn numbered(count: usize) -> Self {
        Self::new((0..count).map(|i| format!("v{i}")))
    }

    /// Last version passed to `checkout`.
    pub fn checked_out(&self) -> Option<String> {
        self.checked_out
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl VersionSource for InlineSource {
    fn versions(&self) -> Result<Vec<String>, SourceError> {
        if self.versions.is_empty() {
            return Err(SourceError::Empty(self.describe()));
        }
        Ok(self.versions.clone())
    }

    fn checkout(&self, version: &str) -> Result<(), SourceError> {
        if let Ok(mut guard) = self.checked_out.lock() {
            *guard = Some(version.to_string());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("inline list of {} versions", self.versions.len())
    }
}

// ============================================================================
// File based
// ============================================================================

/// A `versions.txt` listing, newest first, as produced by
/// `git log --all --oneline > versions.txt`.
///
/// Only the first whitespace separated token of each line is used; the rest
/// is usually a commit subject.
#[derive(Debug, Clone)]
pub struct VersionsFileSource {
    path: PathBuf,
}

impl VersionsFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VersionSource for VersionsFileSource {
    fn versions(&self) -> Result<Vec<String>, SourceError> {
        let text = read_to_string(&self.path)?;
        let mut versions: Vec<String> = text
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect();
        if versions.is_empty() {
            return Err(SourceError::Empty(self.describe()));
        }
        versions.reverse();
        Ok(versions)
    }

    fn checkout(&self, _version: &str) -> Result<(), SourceError> {
        Err(SourceError::Unsupported {
            kind: "versions file",
            operation: "checkout",
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Debian style changelog. Entries are newest first and start with a header
/// line of the form `package (version) distribution; urgency=...`.
#[derive(Debug, Clone)]
pub struct ChangelogSource {
    path: PathBuf,
}

impl ChangelogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Extract the version from a changelog header line.
fn changelog_version(line: &str) -> Option<&str> {
    // Headers start in column zero; entry bodies and trailers are indented.
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let open = line.find('(')?;
    let close = open + line[open..].find(')')?;
    let version = line[open + 1..close].trim();
    (!version.is_empty()).then_some(version)
}

impl VersionSource for ChangelogSource {
    fn versions(&self) -> Result<Vec<String>, SourceError> {
        let text = read_to_string(&self.path)?;
        let mut versions: Vec<String> = text
            .lines()
            .filter_map(changelog_version)
            .map(str::to_string)
            .collect();
        if versions.is_empty() {
            return Err(SourceError::Empty(self.describe()));
        }
        versions.reverse();
        Ok(versions)
    }

    fn checkout(&self, _version: &str) -> Result<(), SourceError> {
        Err(SourceError::Unsupported {
            kind: "changelog",
            operation: "checkout",
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn read_to_string(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Git
// ============================================================================

/// A local git clone driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitSource {
    repo: PathBuf,
}

impl GitSource {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git(&self, args: &[&str]) -> Result<String, SourceError> {
        let command = format!("git {}", args.join(" "));
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|source| SourceError::Io {
                path: self.repo.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VersionSource for GitSource {
    fn versions(&self) -> Result<Vec<String>, SourceError> {
        let versions: Vec<String> = self
            .git(&["rev-list", "--reverse", "HEAD"])?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if versions.is_empty() {
            return Err(SourceError::Empty(self.describe()));
        }
        Ok(versions)
    }

    fn head(&self) -> Result<String, SourceError> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn checkout(&self, version: &str) -> Result<(), SourceError> {
        self.git(&["checkout", "--quiet", version]).map(|_| ())
    }

    fn describe(&self) -> String {
        self.repo.display().to_string()
    }
}
