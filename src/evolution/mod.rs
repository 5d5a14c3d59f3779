//! Evolutionary search for upgrade plans.
//!
//! A plan moves a system from its start configuration to a goal through a
//! series of intermediate configurations. Plans are evolved generation by
//! generation and scored by an external build-and-test evaluator.
//!
//! # Overview
//!
//! - **Genome** (`genome`): a plan, with random creation, crossover and mutation
//! - **Evaluator** (`evaluator`): pluggable plan scoring and its failure policy
//! - **Population** (`population`): selection, reproduction and statistics
//! - **Search** (`search`): the generation loop with progress reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use upgrade_search::evolution::{ProximityEvaluator, SearchEngine};
//! use upgrade_search::schema::SearchConfig;
//! use upgrade_search::system::{Component, Configuration, Goal, InlineSource};
//!
//! let start = Configuration::new(vec![
//!     Component::new(Arc::new(InlineSource::numbered(5)), "zlib", true).unwrap(),
//!     Component::new(Arc::new(InlineSource::numbered(8)), "openssl", true).unwrap(),
//! ]);
//! let goal = Arc::new(Goal::latest_version(&start).unwrap());
//! let start = Arc::new(start);
//!
//! let evaluator = ProximityEvaluator::new(Arc::clone(&start), Arc::clone(&goal));
//! let mut engine = SearchEngine::new(start, goal, SearchConfig::default(), evaluator).unwrap();
//! let result = engine
//!     .run_with_callback(|progress| {
//!         println!("Generation {}: best score = {:.3}",
//!             progress.generation, progress.best_score);
//!     })
//!     .unwrap();
//!
//! println!("Best plan has {} steps", result.best.steps.len());
//! ```

mod evaluator;
mod genome;
mod population;
mod search;

#[cfg(test)]
mod testing;

pub use evaluator::{
    CommandEvaluator, EvaluationBudget, EvaluationError, Evaluator, FnEvaluator,
    ProximityEvaluator, from_definition, score_genome,
};
pub use genome::{Genome, GenomeError, GenomeRates, MAX_STEPS, MIN_STEPS, plan_distance};
pub use population::{Population, PopulationError, SCORE_EPSILON};
pub use search::SearchEngine;
