//! Aligned snapshots of every component in a system.

use serde::{Deserialize, Serialize};

use super::component::{Component, ComponentError};

/// A complete snapshot of a system: every component at some version.
///
/// Configurations within a run are aligned by position. Step `i` of any plan,
/// the start and the goal all hold the same component at index `p`.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    components: Vec<Component>,
}

impl Configuration {
    pub fn new(components: Vec<Component>) -> Self {
        Self { components }
    }

    /// Number of components.
    #[inline]
    pub fn count(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, position: usize) -> Option<&Component> {
        self.components.get(position)
    }

    pub fn component_mut(&mut self, position: usize) -> Option<&mut Component> {
        self.components.get_mut(position)
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Position picked by a random draw. `None` for an empty configuration.
    pub fn random_component(&self, draw: u32) -> Option<usize> {
        if self.components.is_empty() {
            return None;
        }
        Some(draw as usize % self.components.len())
    }

    /// Resolve the version history of every component.
    pub fn resolve(&self) -> Result<(), ComponentError> {
        for component in &self.components {
            component.versions()?;
        }
        Ok(())
    }

    /// Position of the component with the given name.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name() == name)
    }

    /// Same component names in the same order.
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        self.count() == other.count()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.name() == b.name())
    }

    /// Check out every component at its current version.
    ///
    /// This is the only operation on a configuration with external side
    /// effects. The search never calls it.
    pub fn materialize(&mut self) -> Result<(), ComponentError> {
        for component in &mut self.components {
            let version = component.version_id()?.to_string();
            component.checkout(&version)?;
        }
        Ok(())
    }

    /// Move components to the versions recorded in a snapshot, matching them
    /// by name. Components the snapshot does not mention are left alone.
    pub fn restore(&mut self, snapshot: &ConfigurationSnapshot) -> Result<(), ComponentError> {
        for state in &snapshot.components {
            let position = self
                .index_of_name(&state.name)
                .ok_or_else(|| ComponentError::UnknownComponent(state.name.clone()))?;
            let component = &mut self.components[position];
            component.set_version_index(state.index)?;
            component.set_installed(state.installed);
        }
        Ok(())
    }

    /// Serializable view of the configuration.
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            components: self
                .components
                .iter()
                .map(|c| ComponentState {
                    name: c.name().to_string(),
                    version: c.version_id().ok().map(str::to_string),
                    index: c.index(),
                    installed: c.installed(),
                })
                .collect(),
        }
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.count() == other.count()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.same_state(b))
    }
}

impl Eq for Configuration {}

/// Serializable state of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    /// Component name.
    pub name: String,
    /// Version identifier, if the history is resolved.
    pub version: Option<String>,
    /// Index within the version history.
    pub index: usize,
    /// Installed flag.
    pub installed: bool,
}

/// Serializable view of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfigurationSnapshot {
    pub components: Vec<ComponentState>,
}
