//! Target configurations for a search.

use super::component::ComponentError;
use super::configuration::Configuration;

/// Score a plan must reach to satisfy its goal.
pub const MAX_SCORE: f32 = 1.0;

/// The configuration a search is trying to reach, plus its score ceiling.
#[derive(Debug, Clone)]
pub struct Goal {
    target: Configuration,
    max_score: f32,
}

impl Goal {
    /// Goal with an explicit target configuration.
    pub fn new(target: Configuration) -> Self {
        Self {
            target,
            max_score: MAX_SCORE,
        }
    }

    /// Every component installed and on its newest version.
    pub fn latest_version(config: &Configuration) -> Result<Self, ComponentError> {
        let mut target = Configuration::default();
        for component in config.components() {
            let mut latest = component.clone();
            latest.set_version_index(component.latest_index()?)?;
            latest.set_installed(true);
            target.push(latest);
        }
        Ok(Self::new(target))
    }

    pub fn target(&self) -> &Configuration {
        &self.target
    }

    /// Score ceiling of the evaluation function.
    pub fn max_score(&self) -> f32 {
        self.max_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{Component, InlineSource};
    use std::sync::Arc;

    #[test]
    fn test_latest_version() {
        let start = Configuration::new(vec![
            Component::new(Arc::new(InlineSource::numbered(5)), "alpha", false).unwrap(),
            Component::new(Arc::new(InlineSource::numbered(3)), "beta", true).unwrap(),
        ]);

        let goal = Goal::latest_version(&start).unwrap();
        let target = goal.target();
        assert_eq!(target.count(), 2);
        assert_eq!(target.component(0).unwrap().index(), 4);
        assert_eq!(target.component(1).unwrap().index(), 2);
        assert!(target.components().iter().all(|c| c.installed()));
        assert!(target.is_aligned_with(&start));

        // The start configuration is untouched.
        assert_eq!(start.component(0).unwrap().index(), 0);
        assert!(!start.component(0).unwrap().installed());
        assert!((goal.max_score() - MAX_SCORE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_latest_version_source_failure() {
        let start = Configuration::new(vec![
            Component::new(Arc::new(InlineSource::new(Vec::<String>::new())), "gamma", false)
                .unwrap(),
        ]);
        assert!(Goal::latest_version(&start).is_err());
    }
}
