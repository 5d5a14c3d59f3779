//! A single upgradeable piece of software.

use std::sync::{Arc, OnceLock};

use log::debug;

use super::source::{SourceError, VersionSource};

/// Component errors.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Invalid component name {0:?}: must be non-empty and start with a letter")]
    InvalidName(String),
    #[error("Component {component} has no version {version:?}")]
    UnknownVersion { component: String, version: String },
    #[error("Component {component}: index {index} + {step} is outside 0..{count}")]
    OutOfRange {
        component: String,
        index: usize,
        step: usize,
        count: usize,
    },
    #[error("No component named {0:?} in this configuration")]
    UnknownComponent(String),
    #[error("Component {0} has not resolved its versions yet")]
    Unresolved(String),
    #[error("Version source for {component} failed: {source}")]
    Source {
        component: String,
        #[source]
        source: SourceError,
    },
}

/// Check a component name: non-empty, first character an ASCII letter.
pub fn is_valid_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// One upgradeable component: an ordered version history plus the current
/// position within it.
///
/// Cloning copies the `(index, installed)` pair and shares the version
/// cache, so every clone sees the versions once any of them resolves.
#[derive(Debug, Clone)]
pub struct Component {
    name: Arc<str>,
    source: Arc<dyn VersionSource>,
    versions: Arc<OnceLock<Vec<String>>>,
    index: usize,
    installed: bool,
}

impl Component {
    /// Create a component backed by the given version source.
    pub fn new(
        source: Arc<dyn VersionSource>,
        name: &str,
        installed: bool,
    ) -> Result<Self, ComponentError> {
        if !is_valid_name(name) {
            return Err(ComponentError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name: Arc::from(name),
            source,
            versions: Arc::new(OnceLock::new()),
            index: 0,
            installed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn installed(&self) -> bool {
        self.installed
    }

    pub fn set_installed(&mut self, installed: bool) {
        self.installed = installed;
    }

    pub fn source(&self) -> &Arc<dyn VersionSource> {
        &self.source
    }

    /// Version identifiers, earliest first. Resolved from the source on
    /// first use and cached afterwards.
    pub fn versions(&self) -> Result<&[String], ComponentError> {
        if let Some(versions) = self.versions.get() {
            return Ok(versions.as_slice());
        }

        let discovered = self.source.versions().map_err(|source| ComponentError::Source {
            component: self.name.to_string(),
            source,
        })?;
        debug!(
            "Discovered {} versions of {} from {}",
            discovered.len(),
            self.name,
            self.source.describe()
        );

        // Another clone may have won the race; either list is identical.
        let _ = self.versions.set(discovered);
        self.versions
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| ComponentError::Unresolved(self.name.to_string()))
    }

    /// Whether the version list has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.versions.get().is_some()
    }

    /// Number of known versions, zero while unresolved.
    pub fn version_count(&self) -> usize {
        self.versions.get().map_or(0, Vec::len)
    }

    /// Index of the newest version.
    pub fn latest_index(&self) -> Result<usize, ComponentError> {
        // Non-empty sources are guaranteed by `VersionSource::versions`.
        Ok(self.versions()?.len().saturating_sub(1))
    }

    /// Position of a version identifier in the history.
    pub fn index_of(&self, version: &str) -> Result<usize, ComponentError> {
        self.versions()?
            .iter()
            .position(|v| v == version)
            .ok_or_else(|| ComponentError::UnknownVersion {
                component: self.name.to_string(),
                version: version.to_string(),
            })
    }

    /// Version identifier at an arbitrary index.
    pub fn version_from_index(&self, index: usize) -> Result<&str, ComponentError> {
        let versions = self.versions()?;
        versions
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ComponentError::OutOfRange {
                component: self.name.to_string(),
                index,
                step: 0,
                count: versions.len(),
            })
    }

    /// Identifier of the current version.
    pub fn version_id(&self) -> Result<&str, ComponentError> {
        self.version_from_index(self.index)
    }

    /// Move to a version and materialize it through the source.
    pub fn checkout(&mut self, version: &str) -> Result<(), ComponentError> {
        let index = self.index_of(version)?;
        self.source
            .checkout(version)
            .map_err(|source| ComponentError::Source {
                component: self.name.to_string(),
                source,
            })?;
        self.index = index;
        Ok(())
    }

    /// Set the current index without touching the source. Used to simulate
    /// hypothetical states during search.
    pub fn set_version_index(&mut self, index: usize) -> Result<(), ComponentError> {
        if self.is_resolved() && index >= self.version_count() {
            return Err(ComponentError::OutOfRange {
                component: self.name.to_string(),
                index,
                step: 0,
                count: self.version_count(),
            });
        }
        self.index = index;
        Ok(())
    }

    /// True if moving `n` versions forward stays within the history.
    pub fn can_upgrade(&self, n: usize) -> bool {
        self.index
            .checked_add(n)
            .is_some_and(|target| target < self.version_count())
    }

    /// Move `n` versions forward. Leaves the component untouched on failure.
    pub fn upgrade(&mut self, n: usize) -> Result<(), ComponentError> {
        if !self.can_upgrade(n) {
            return Err(ComponentError::OutOfRange {
                component: self.name.to_string(),
                index: self.index,
                step: n,
                count: self.version_count(),
            });
        }
        self.index += n;
        Ok(())
    }

    /// Same `(index, installed)` state.
    pub fn same_state(&self, other: &Self) -> bool {
        self.index == other.index && self.installed == other.installed
    }
}
