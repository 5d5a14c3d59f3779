//! The generation loop driving a population toward its goal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};

use super::evaluator::{EvaluationBudget, Evaluator};
use super::genome::Genome;
use super::population::{Population, PopulationError, SCORE_EPSILON};
use crate::schema::{
    PlanSnapshot, SearchConfig, SearchHistory, SearchProgress, SearchResult, SearchStats,
    StopReason,
};
use crate::system::{Configuration, Goal};

/// Runs a search: evaluate, stop or breed, repeat.
pub struct SearchEngine<E> {
    config: SearchConfig,
    seed: u64,
    population: Population,
    evaluator: E,
    history: SearchHistory,
    best_score: f32,
    best_plan: Option<PlanSnapshot>,
    stagnation_count: usize,
    last_evaluations: usize,
    total_evaluations: u64,
    cancelled: Arc<AtomicBool>,
}

impl<E: Evaluator> SearchEngine<E> {
    /// Create an engine and its initial population.
    ///
    /// Without a configured seed one is picked at random; it is reported in
    /// progress and results so the run can be replayed.
    pub fn new(
        start: Arc<Configuration>,
        goal: Arc<Goal>,
        config: SearchConfig,
        evaluator: E,
    ) -> Result<Self, PopulationError> {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let population = Population::new(start, goal, seed, &config)?;
        info!(
            "Searching with {} plans for up to {} generations (seed {seed})",
            config.population.size, config.population.max_generations
        );

        Ok(Self {
            config,
            seed,
            population,
            evaluator,
            history: SearchHistory::default(),
            best_score: f32::NEG_INFINITY,
            best_plan: None,
            stagnation_count: 0,
            last_evaluations: 0,
            total_evaluations: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get cancellation handle. Raising it also cancels running evaluations.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    fn evaluate_population(&mut self) {
        let budget = EvaluationBudget::new(
            self.config.evaluation.timeout(),
            Arc::clone(&self.cancelled),
        );
        let evaluated =
            self.population
                .evaluate(&self.evaluator, &budget, self.config.evaluation.parallel);
        self.last_evaluations = evaluated;
        self.total_evaluations += evaluated as u64;
    }

    /// Record the statistics of the current, evaluated generation.
    fn record_generation(&mut self) {
        let pop = &self.population;
        let gen_best = pop.max_score().unwrap_or(0.0);

        self.history.best_score.push(gen_best);
        self.history.avg_score.push(pop.avg_score().unwrap_or(0.0));
        self.history.worst_score.push(pop.min_score().unwrap_or(0.0));
        self.history.variance.push(pop.variance().unwrap_or(0.0));
        self.history.diversity.push(pop.diversity());
        self.history.scores.push(
            pop.genomes()
                .iter()
                .map(|g| g.score().unwrap_or(0.0))
                .collect(),
        );

        if gen_best > self.best_score + SCORE_EPSILON || self.best_plan.is_none() {
            self.best_score = gen_best;
            self.best_plan = pop.best().map(Genome::to_snapshot);
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }
    }

    /// Get current progress.
    pub fn progress(&self) -> SearchProgress {
        let pop = &self.population;
        SearchProgress {
            generation: pop.generation(),
            max_generations: self.config.population.max_generations,
            seed: self.seed,
            best_score: self.best_score.max(0.0),
            generation_best: pop.max_score().unwrap_or(0.0),
            avg_score: pop.avg_score().unwrap_or(0.0),
            worst_score: pop.min_score().unwrap_or(0.0),
            variance: pop.variance().unwrap_or(0.0),
            diversity: self.history.diversity.last().copied().unwrap_or(0.0),
            stagnation_count: self.stagnation_count,
            evaluations_completed: self.last_evaluations,
            goal_met: pop.is_goal_met(),
            best_plan: self.best_plan.clone(),
        }
    }

    /// Check if the search should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }

        if self.population.is_goal_met() {
            return Some(StopReason::GoalMet);
        }

        if self.population.generation() >= self.config.population.max_generations {
            return Some(StopReason::MaxGenerations);
        }

        if let Some(limit) = self.config.population.stagnation_limit
            && self.stagnation_count >= limit
        {
            return Some(StopReason::Stagnation);
        }

        None
    }

    /// Run the search, reporting progress after every evaluated generation.
    pub fn run_with_callback<F>(&mut self, callback: F) -> Result<SearchResult, PopulationError>
    where
        F: Fn(&SearchProgress),
    {
        let start_time = Instant::now();

        self.evaluate_population();
        self.record_generation();
        callback(&self.progress());

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }

            self.population.next_generation()?;
            self.evaluate_population();
            self.record_generation();
            debug!(
                "Generation {}: best {:.4}, avg {:.4}",
                self.population.generation(),
                self.population.max_score().unwrap_or(0.0),
                self.population.avg_score().unwrap_or(0.0)
            );

            callback(&self.progress());
        };

        let elapsed = start_time.elapsed().as_secs_f64();
        info!(
            "Search stopped after {} generations ({stop_reason:?}), best score {:.4}",
            self.population.generation(),
            self.best_score
        );

        let best = match &self.best_plan {
            Some(best) => best.clone(),
            None => return Err(PopulationError::Unevaluated { index: 0 }),
        };

        Ok(SearchResult {
            best,
            stats: SearchStats {
                generations: self.population.generation(),
                total_evaluations: self.total_evaluations,
                best_score: self.best_score,
                final_avg_score: self.population.avg_score().unwrap_or(0.0),
                elapsed_seconds: elapsed,
                evaluations_per_second: if elapsed > 0.0 {
                    self.total_evaluations as f64 / elapsed
                } else {
                    0.0
                },
                seed: self.seed,
                stop_reason,
            },
            history: self.history.clone(),
        })
    }

    /// Run the search (blocking).
    pub fn run(&mut self) -> Result<SearchResult, PopulationError> {
        self.run_with_callback(|_| {})
    }
}
