//! Upgrade Search - Evolutionary search for upgrade paths.
//!
//! Given a system made of versioned components, this crate searches for a
//! sequence of intermediate configurations that upgrades every component
//! from its current version to its newest one while keeping the system
//! buildable along the way.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `system`: Components, version sources, configurations and goals
//! - `evolution`: Plans, evaluators, populations and the search loop
//! - `schema`: Configuration, system definition and report types
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use upgrade_search::{
//!     evolution::{FnEvaluator, SearchEngine},
//!     schema::SearchConfig,
//!     system::{Component, Configuration, Goal, InlineSource},
//! };
//!
//! // Two components with five versions each, both on their first version
//! let start = Configuration::new(vec![
//!     Component::new(Arc::new(InlineSource::numbered(5)), "libfoo", true).unwrap(),
//!     Component::new(Arc::new(InlineSource::numbered(5)), "libbar", true).unwrap(),
//! ]);
//! let goal = Arc::new(Goal::latest_version(&start).unwrap());
//!
//! // Score a configuration by how far its components have moved
//! let evaluator = FnEvaluator(|config: &Configuration| {
//!     config.components().iter().map(|c| c.index()).sum::<usize>() as f32 / 8.0
//! });
//!
//! let mut engine =
//!     SearchEngine::new(Arc::new(start), goal, SearchConfig::default(), evaluator).unwrap();
//! let result = engine.run().unwrap();
//!
//! println!("Best score after {} generations: {}", result.stats.generations, result.stats.best_score);
//! ```

pub mod evolution;
pub mod schema;
pub mod system;

// Re-export commonly used types
pub use evolution::{Evaluator, Genome, Population, SearchEngine};
pub use schema::{RunFile, SearchConfig, SystemDefinition};
pub use system::{Component, Configuration, Goal, RandomStream};
