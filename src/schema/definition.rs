//! System definitions: which components exist, where their versions come
//! from and where each one starts.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::SearchConfig;
use crate::system::{
    ChangelogSource, Component, ComponentError, Configuration, GitSource, InlineSource,
    VersionSource, VersionsFileSource,
};

/// Components making up the system to upgrade, in a fixed order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemDefinition {
    pub components: Vec<ComponentDefinition>,
}

/// One component of the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Component name (must start with a letter).
    pub name: String,
    /// Where the version history comes from.
    pub source: SourceDefinition,
    /// Whether the component is installed at the start.
    #[serde(default)]
    pub installed: bool,
    /// Starting version. Defaults to the earliest known version.
    #[serde(default)]
    pub start_version: Option<String>,
}

/// Version source selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceDefinition {
    /// Versions listed directly, earliest first.
    Inline { versions: Vec<String> },
    /// A `versions.txt` file, newest first.
    VersionsFile { path: PathBuf },
    /// A Debian style changelog, newest first.
    Changelog { path: PathBuf },
    /// A local git clone.
    Git { path: PathBuf },
}

impl SourceDefinition {
    /// Instantiate the backend.
    pub fn build(&self) -> Arc<dyn VersionSource> {
        match self {
            Self::Inline { versions } => Arc::new(InlineSource::new(versions.iter().cloned())),
            Self::VersionsFile { path } => Arc::new(VersionsFileSource::new(path)),
            Self::Changelog { path } => Arc::new(ChangelogSource::new(path)),
            Self::Git { path } => Arc::new(GitSource::new(path)),
        }
    }
}

/// Errors while turning a definition into a configuration.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("System definition has no components")]
    Empty,
    #[error("Component {0} is defined more than once")]
    Duplicate(String),
    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl SystemDefinition {
    /// Build the start configuration, resolving every version history.
    ///
    /// Components are positioned at their start version by index only; no
    /// checkout takes place.
    pub fn build(&self) -> Result<Configuration, DefinitionError> {
        if self.components.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut config = Configuration::default();
        for def in &self.components {
            if config.index_of_name(&def.name).is_some() {
                return Err(DefinitionError::Duplicate(def.name.clone()));
            }

            let mut component = Component::new(def.source.build(), &def.name, def.installed)?;
            let start = match &def.start_version {
                Some(version) => component.index_of(version)?,
                None => {
                    component.versions()?;
                    0
                }
            };
            component.set_version_index(start)?;
            config.push(component);
        }
        Ok(config)
    }
}

/// Everything the command line needs for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    /// The system to upgrade.
    pub system: SystemDefinition,
    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// How plans are scored.
    #[serde(default)]
    pub evaluator: EvaluatorDefinition,
}

/// Evaluator selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum EvaluatorDefinition {
    /// Score by how far the end configuration has moved toward the goal.
    /// Performs no build; useful for dry runs.
    #[default]
    Proximity,
    /// Run an external build-and-test command for every plan.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}
