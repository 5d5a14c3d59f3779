//! Configuration types for the upgrade-path search.

use serde::{Deserialize, Serialize};

/// Largest supported population.
pub const MAX_POPULATION_SIZE: usize = 256;

/// Top-level search configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Genetic operator settings.
    #[serde(default)]
    pub operators: OperatorConfig,
    /// Evaluation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Random seed for reproducibility. Chosen at random when absent.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of upgrade plans per generation.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Maximum number of generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stagnation limit: stop if no improvement for N generations.
    #[serde(default)]
    pub stagnation_limit: Option<usize>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            max_generations: default_max_generations(),
            stagnation_limit: None,
        }
    }
}

fn default_population_size() -> usize {
    16
}
fn default_max_generations() -> usize {
    100
}

/// Genetic operator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Fraction of components touched when a mutation fires (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    /// Probability that a child is produced by crossover rather than by
    /// copying its first parent (0.0-1.0).
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    /// Probability of inserting or deleting an upgrade step in a child.
    #[serde(default = "default_step_mutation_rate")]
    pub step_mutation_rate: f32,
    /// Number of best plans carried unchanged into the next generation.
    /// At most `size - 1` are carried, so every generation breeds a child.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Keep one plan that goes straight from start to goal, as long as a
    /// slot for a bred child remains after the elites.
    #[serde(default = "default_direct_ascent")]
    pub direct_ascent: bool,
    /// Attempts at producing a child not already in the new generation.
    #[serde(default = "default_max_unique_tries")]
    pub max_unique_tries: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            step_mutation_rate: default_step_mutation_rate(),
            elitism: default_elitism(),
            direct_ascent: default_direct_ascent(),
            max_unique_tries: default_max_unique_tries(),
        }
    }
}

fn default_mutation_rate() -> f32 {
    0.5
}
fn default_crossover_rate() -> f32 {
    1.0
}
fn default_step_mutation_rate() -> f32 {
    0.1
}
fn default_elitism() -> usize {
    1
}
fn default_direct_ascent() -> bool {
    true
}
fn default_max_unique_tries() -> usize {
    32
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Time budget for a single evaluation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Evaluate a generation's plans in parallel.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            parallel: default_parallel(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    600
}
fn default_parallel() -> bool {
    true
}

impl EvaluationConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be between 1 and 256, got {0}")]
    InvalidPopulationSize(usize),
    #[error("{name} must be within 0.0-1.0, got {value}")]
    InvalidRate { name: &'static str, value: f32 },
    #[error("Evaluation timeout must be positive")]
    InvalidTimeout,
    #[error("At least one unique-child attempt is required")]
    InvalidUniqueTries,
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.population.size;
        if size == 0 || size > MAX_POPULATION_SIZE {
            return Err(ConfigError::InvalidPopulationSize(size));
        }

        let check_rate = |value: f32, name: &'static str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidRate { name, value })
            }
        };
        check_rate(self.operators.mutation_rate, "mutation_rate")?;
        check_rate(self.operators.crossover_rate, "crossover_rate")?;
        check_rate(self.operators.step_mutation_rate, "step_mutation_rate")?;

        if self.operators.max_unique_tries == 0 {
            return Err(ConfigError::InvalidUniqueTries);
        }
        if self.evaluation.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_population_size_bounds() {
        let mut config = SearchConfig::default();
        config.population.size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPopulationSize(0))
        ));

        config.population.size = MAX_POPULATION_SIZE + 1;
        assert!(config.validate().is_err());

        config.population.size = MAX_POPULATION_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rates() {
        let mut config = SearchConfig::default();
        config.operators.mutation_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate {
                name: "mutation_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_elitism_is_not_bounded_by_size() {
        // A single-plan population with default operators is valid.
        let mut config = SearchConfig::default();
        config.population.size = 1;
        assert!(config.validate().is_ok());

        config.population.size = 2;
        config.operators.elitism = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{ "population": { "size": 8 }, "random_seed": 42 }"#)
                .unwrap();
        assert_eq!(config.population.size, 8);
        assert_eq!(config.population.max_generations, 100);
        assert_eq!(config.operators.elitism, 1);
        assert_eq!(config.random_seed, Some(42));
        assert!(config.validate().is_ok());
    }
}
