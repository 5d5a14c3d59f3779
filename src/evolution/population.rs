//! Fixed-size generations of upgrade plans.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use super::evaluator::{EvaluationBudget, Evaluator, score_genome};
use super::genome::{Genome, GenomeError, GenomeRates, plan_distance};
use crate::schema::{ConfigError, OperatorConfig, SearchConfig};
use crate::system::{ComponentError, Configuration, Goal, RandomStream};

/// Tolerance for comparing scores.
pub const SCORE_EPSILON: f32 = 1e-4;

/// Population errors.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    #[error("Start and goal configurations do not list the same components")]
    Misaligned,
    #[error("Plan {index} has not been evaluated")]
    Unevaluated { index: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error(transparent)]
    Genome(#[from] GenomeError),
}

/// A generation of plans sharing one start configuration and goal.
#[derive(Debug, Clone)]
pub struct Population {
    start: Arc<Configuration>,
    goal: Arc<Goal>,
    seed: u64,
    rng: RandomStream,
    operators: OperatorConfig,
    genomes: Vec<Genome>,
    generation: usize,
}

impl Population {
    /// Create the initial generation.
    ///
    /// Every plan's seed is drawn from the population's own stream in index
    /// order, so the whole population is reproducible from `seed`. With
    /// direct ascent enabled, slot 0 holds the plan that goes straight to
    /// the goal.
    pub fn new(
        start: Arc<Configuration>,
        goal: Arc<Goal>,
        seed: u64,
        config: &SearchConfig,
    ) -> Result<Self, PopulationError> {
        config.validate()?;
        if !start.is_aligned_with(goal.target()) {
            return Err(PopulationError::Misaligned);
        }
        start.resolve()?;
        goal.target().resolve()?;

        let size = config.population.size;
        let operators = config.operators.clone();
        let rates = GenomeRates::from(&operators);
        let mut rng = RandomStream::new(seed);

        let mut genomes = Vec::with_capacity(size);
        for index in 0..size {
            let genome_seed = u64::from(rng.next());
            let genome = if index == 0 && operators.direct_ascent {
                Genome::direct_ascent(Arc::clone(&start), Arc::clone(&goal), genome_seed, rates)?
            } else {
                Genome::create_random(Arc::clone(&start), Arc::clone(&goal), genome_seed, rates)?
            };
            genomes.push(genome);
        }

        debug!(
            "Created population of {size} plans over {} components (seed {seed})",
            start.count()
        );

        Ok(Self {
            start,
            goal,
            seed,
            rng,
            operators,
            genomes,
            generation: 0,
        })
    }

    /// True when some plan scores within `SCORE_EPSILON` of the goal's
    /// maximum.
    pub fn is_goal_met(&self) -> bool {
        let max = self.goal.max_score();
        self.genomes
            .iter()
            .filter_map(Genome::score)
            .any(|score| (score - max).abs() < SCORE_EPSILON)
    }

    /// Sort plans by descending score. Unevaluated plans go last.
    pub fn sort(&mut self) {
        self.genomes.sort_by(|a, b| match (a.score(), b.score()) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    /// Index of a parent in the current generation, biased toward the front.
    ///
    /// The generation must already be sorted. Draws `u` in `[0, 1)` and
    /// returns `floor(u² × N)`.
    pub fn select_parent(&mut self) -> usize {
        let n = self.genomes.len();
        let u = self.rng.next_normalised();
        ((u * u * n as f64) as usize).min(n.saturating_sub(1))
    }

    /// Replace the current generation with its offspring.
    ///
    /// Every plan must be scored first. Elites are carried over with their
    /// scores, then the direct plan when enabled, then children bred from
    /// selected parents until the generation is full again. Carried plans
    /// never take the last slot: at least one child is bred per generation.
    pub fn next_generation(&mut self) -> Result<(), PopulationError> {
        if let Some(index) = self.genomes.iter().position(|g| g.score().is_none()) {
            return Err(PopulationError::Unevaluated { index });
        }
        self.sort();

        let size = self.genomes.len();
        let elites = self.operators.elitism.min(size.saturating_sub(1));
        let mut next: Vec<Genome> = Vec::with_capacity(size);
        next.extend(self.genomes.iter().take(elites).cloned());

        if self.operators.direct_ascent && next.len() + 1 < size {
            let seed = u64::from(self.rng.next());
            let direct = Genome::direct_ascent(
                Arc::clone(&self.start),
                Arc::clone(&self.goal),
                seed,
                self.rates(),
            )?;
            if !next.contains(&direct) {
                let carried = self.genomes.iter().find(|g| **g == direct).cloned();
                next.push(carried.unwrap_or(direct));
            }
        }

        while next.len() < size {
            let child = self.breed_unique(&next);
            next.push(child);
        }

        self.genomes = next;
        self.generation += 1;
        Ok(())
    }

    /// Breed children until one is not already in `next`, giving up after
    /// `max_unique_tries` attempts.
    fn breed_unique(&mut self, next: &[Genome]) -> Genome {
        let mut child = self.breed();
        for _ in 1..self.operators.max_unique_tries {
            if !next.contains(&child) {
                return child;
            }
            child = self.breed();
        }
        if next.contains(&child) {
            debug!(
                "No unique child after {} attempts; accepting a duplicate",
                self.operators.max_unique_tries
            );
        }
        child
    }

    fn breed(&mut self) -> Genome {
        let p1 = self.select_parent();
        let p2 = self.select_parent();
        let seed = u64::from(self.rng.next());

        let mut child = if self
            .rng
            .chance(f64::from(self.operators.crossover_rate))
        {
            Genome::crossover(&self.genomes[p1], &self.genomes[p2], seed)
        } else {
            self.genomes[p1].offspring(seed)
        };

        child.mutate();

        if self
            .rng
            .chance(f64::from(self.operators.step_mutation_rate))
        {
            let result = if self.rng.chance(0.5) {
                child.mutate_insertion()
            } else {
                child.mutate_deletion()
            };
            if let Err(e) = result {
                debug!("Step mutation skipped: {e}");
            }
        }
        child
    }

    /// Score every unscored plan. Returns how many were evaluated.
    pub fn evaluate<E: Evaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        budget: &EvaluationBudget,
        parallel: bool,
    ) -> usize {
        let pending = self.genomes.iter().filter(|g| g.score().is_none()).count();
        let score = |genome: &mut Genome| {
            if genome.score().is_none() {
                let value = score_genome(evaluator, genome, budget);
                genome.set_score(value);
            }
        };

        if parallel {
            self.genomes.par_iter_mut().for_each(score);
        } else {
            self.genomes.iter_mut().for_each(score);
        }
        pending
    }

    fn scored(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.genomes
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.score().map(|s| (i, s)))
    }

    /// Index of the highest-scoring plan. `None` when nothing is scored.
    pub fn best_index(&self) -> Option<usize> {
        self.scored()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Index of the lowest-scoring plan. `None` when nothing is scored.
    pub fn worst_index(&self) -> Option<usize> {
        self.scored()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    pub fn best(&self) -> Option<&Genome> {
        self.best_index().map(|i| &self.genomes[i])
    }

    pub fn max_score(&self) -> Option<f32> {
        self.best_index().and_then(|i| self.genomes[i].score())
    }

    pub fn min_score(&self) -> Option<f32> {
        self.worst_index().and_then(|i| self.genomes[i].score())
    }

    /// Mean over scored plans.
    pub fn avg_score(&self) -> Option<f32> {
        let (sum, count) = self
            .scored()
            .fold((0.0f32, 0usize), |(sum, count), (_, s)| (sum + s, count + 1));
        (count > 0).then(|| sum / count as f32)
    }

    /// Root-mean-square deviation of the scores from their mean.
    pub fn variance(&self) -> Option<f32> {
        let avg = self.avg_score()?;
        let (sum, count) = self.scored().fold((0.0f32, 0usize), |(sum, count), (_, s)| {
            (sum + (s - avg).powi(2), count + 1)
        });
        Some((sum / count as f32).sqrt())
    }

    /// Mean pairwise distance between plans.
    pub fn diversity(&self) -> f32 {
        let n = self.genomes.len();
        if n < 2 {
            return 0.0;
        }

        let mut total = 0.0f32;
        let mut count = 0usize;
        for i in 0..n {
            for j in (i + 1)..n {
                total += plan_distance(&self.genomes[i], &self.genomes[j]);
                count += 1;
            }
        }
        total / count as f32
    }

    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    pub fn size(&self) -> usize {
        self.genomes.len()
    }

    /// Number of completed generation transitions.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn start(&self) -> &Arc<Configuration> {
        &self.start
    }

    pub fn goal(&self) -> &Arc<Goal> {
        &self.goal
    }

    fn rates(&self) -> GenomeRates {
        GenomeRates::from(&self.operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::evaluator::FnEvaluator;
    use crate::evolution::testing::fixture;
    use std::time::Duration;

    fn config(size: usize) -> SearchConfig {
        let mut config = SearchConfig::default();
        config.population.size = size;
        config
    }

    fn population(counts: &[usize], size: usize, seed: u64) -> Population {
        let (start, goal) = fixture(counts);
        Population::new(start, goal, seed, &config(size)).unwrap()
    }

    fn budget() -> EvaluationBudget {
        EvaluationBudget::with_timeout(Duration::from_secs(10))
    }

    /// Sum of indices over the sum of latest indices.
    fn index_sum(config: &Configuration) -> f32 {
        let sum: usize = config.components().iter().map(|c| c.index()).sum();
        let max: usize = config
            .components()
            .iter()
            .map(|c| c.version_count() - 1)
            .sum();
        sum as f32 / max as f32
    }

    #[test]
    fn test_population_creation() {
        let pop = population(&[5, 5], 8, 42);
        assert_eq!(pop.size(), 8);
        assert_eq!(pop.generation(), 0);
        assert_eq!(pop.genomes()[0].end_configuration(), pop.goal().target());
        assert_eq!(pop.genomes()[0].step_count(), 1);
        assert!(pop.genomes().iter().all(|g| g.score().is_none()));
    }

    #[test]
    fn test_population_reproducible() {
        let a = population(&[5, 5, 5], 10, 7);
        let b = population(&[5, 5, 5], 10, 7);
        assert_eq!(a.genomes(), b.genomes());

        let c = population(&[5, 5, 5], 10, 8);
        assert_ne!(a.genomes(), c.genomes());
    }

    #[test]
    fn test_invalid_size() {
        let (start, goal) = fixture(&[3]);
        let err = Population::new(Arc::clone(&start), Arc::clone(&goal), 1, &config(0));
        assert!(matches!(err, Err(PopulationError::Config(_))));
        let err = Population::new(start, goal, 1, &config(257));
        assert!(matches!(err, Err(PopulationError::Config(_))));
    }

    #[test]
    fn test_misaligned() {
        let (start, _) = fixture(&[3, 3]);
        let (_, goal) = fixture(&[3]);
        assert!(matches!(
            Population::new(start, goal, 1, &config(4)),
            Err(PopulationError::Misaligned)
        ));
    }

    #[test]
    fn test_next_generation_requires_scores() {
        let mut pop = population(&[5, 5], 4, 1);
        assert!(matches!(
            pop.next_generation(),
            Err(PopulationError::Unevaluated { index: 0 })
        ));
        assert_eq!(pop.generation(), 0);
    }

    #[test]
    fn test_sort_descending_unscored_last() {
        let mut pop = population(&[5, 5], 5, 3);
        let scores = [Some(0.2), None, Some(0.9), Some(0.5), None];
        for (genome, score) in pop.genomes.iter_mut().zip(scores) {
            if let Some(s) = score {
                genome.set_score(s);
            }
        }
        pop.sort();
        let sorted: Vec<Option<f32>> = pop.genomes().iter().map(Genome::score).collect();
        assert_eq!(sorted[..3], [Some(0.9), Some(0.5), Some(0.2)]);
        assert_eq!(sorted[3..], [None, None]);
    }

    #[test]
    fn test_is_goal_met() {
        let mut pop = population(&[5, 5], 4, 5);
        assert!(!pop.is_goal_met());

        for genome in &mut pop.genomes {
            genome.set_score(0.0);
        }
        assert!(!pop.is_goal_met());

        pop.genomes[2].set_score(1.0 - SCORE_EPSILON / 2.0);
        assert!(pop.is_goal_met());
    }

    #[test]
    fn test_select_parent_bias() {
        let mut pop = population(&[5, 5], 8, 11);
        let mut counts = [0usize; 8];
        for _ in 0..4000 {
            let index = pop.select_parent();
            assert!(index < 8);
            counts[index] += 1;
        }
        // P(index 0) = sqrt(1/8) ≈ 0.35, P(index 7) ≈ 0.06.
        assert!(counts[0] > counts[7] * 3);
        assert!(counts[0] > 1000);
    }

    #[test]
    fn test_aggregates() {
        let mut pop = population(&[5, 5], 3, 2);
        assert_eq!(pop.best_index(), None);
        assert_eq!(pop.worst_index(), None);
        assert_eq!(pop.max_score(), None);
        assert_eq!(pop.avg_score(), None);
        assert_eq!(pop.variance(), None);

        pop.genomes[0].set_score(0.5);
        pop.genomes[1].set_score(1.0);
        pop.genomes[2].set_score(0.0);
        assert_eq!(pop.best_index(), Some(1));
        assert_eq!(pop.worst_index(), Some(2));
        assert_eq!(pop.max_score(), Some(1.0));
        assert_eq!(pop.min_score(), Some(0.0));
        assert!((pop.avg_score().unwrap() - 0.5).abs() < 1e-6);
        let expected = (0.5f32 / 3.0).sqrt();
        assert!((pop.variance().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_parallel_matches_sequential() {
        let evaluator = FnEvaluator(index_sum);
        let mut a = population(&[5, 5, 5], 12, 9);
        let mut b = a.clone();

        assert_eq!(a.evaluate(&evaluator, &budget(), true), 12);
        assert_eq!(b.evaluate(&evaluator, &budget(), false), 12);
        let sa: Vec<_> = a.genomes().iter().map(Genome::score).collect();
        let sb: Vec<_> = b.genomes().iter().map(Genome::score).collect();
        assert_eq!(sa, sb);

        // Already scored plans are skipped.
        assert_eq!(a.evaluate(&evaluator, &budget(), true), 0);
    }

    #[test]
    fn test_next_generation() {
        let evaluator = FnEvaluator(index_sum);
        let mut pop = population(&[5, 5, 5], 10, 13);
        pop.evaluate(&evaluator, &budget(), true);
        let best = pop.max_score().unwrap();

        pop.next_generation().unwrap();
        assert_eq!(pop.size(), 10);
        assert_eq!(pop.generation(), 1);

        // The elite keeps its score; children are unscored.
        assert_eq!(pop.genomes()[0].score(), Some(best));
        assert!(pop.genomes()[2..].iter().all(|g| g.score().is_none()));

        pop.evaluate(&evaluator, &budget(), true);
        assert!(pop.max_score().unwrap() >= best);
    }

    #[test]
    fn test_children_are_unique() {
        let evaluator = FnEvaluator(|_: &Configuration| 0.0);
        let mut pop = population(&[10, 10, 10], 12, 21);
        for _ in 0..3 {
            pop.evaluate(&evaluator, &budget(), false);
            pop.next_generation().unwrap();
        }
        let genomes = pop.genomes();
        for i in 0..genomes.len() {
            for j in (i + 1)..genomes.len() {
                assert_ne!(genomes[i], genomes[j]);
            }
        }
    }

    #[test]
    fn test_generation_is_reproducible() {
        let evaluator = FnEvaluator(index_sum);
        let mut a = population(&[5, 5], 6, 42);
        let mut b = population(&[5, 5], 6, 42);
        for _ in 0..3 {
            a.evaluate(&evaluator, &budget(), true);
            b.evaluate(&evaluator, &budget(), false);
            a.next_generation().unwrap();
            b.next_generation().unwrap();
        }
        assert_eq!(a.genomes(), b.genomes());
    }

    #[test]
    fn test_diversity() {
        let pop = population(&[5, 5], 6, 4);
        assert!(pop.diversity() >= 0.0);

        let single = population(&[5, 5], 1, 4);
        assert_eq!(single.diversity(), 0.0);
    }

    /// Scores the goal configuration 0 and everything else 0.5, so the
    /// direct plan sorts last.
    fn goal_rejecting(pop: &Population) -> impl Evaluator + use<> {
        let target = pop.goal().target().clone();
        FnEvaluator(move |config: &Configuration| if *config == target { 0.0 } else { 0.5 })
    }

    #[test]
    fn test_single_plan_population_keeps_breeding() {
        let mut pop = population(&[5, 5], 1, 42);
        let evaluator = goal_rejecting(&pop);
        assert_eq!(pop.evaluate(&evaluator, &budget(), false), 1);

        for generation in 1..=10 {
            pop.next_generation().unwrap();
            assert_eq!(pop.size(), 1);
            assert_eq!(pop.generation(), generation);
            assert_eq!(pop.evaluate(&evaluator, &budget(), false), 1);
        }
    }

    #[test]
    fn test_two_plan_population_keeps_breeding() {
        let mut pop = population(&[5, 5], 2, 42);
        let evaluator = goal_rejecting(&pop);
        assert_eq!(pop.evaluate(&evaluator, &budget(), false), 2);

        for _ in 0..10 {
            pop.next_generation().unwrap();
            assert_eq!(pop.size(), 2);
            // The elite keeps its slot; the other one is a fresh child.
            assert!(pop.genomes()[0].score().is_some());
            assert!(pop.genomes()[1].score().is_none());
            assert_eq!(pop.evaluate(&evaluator, &budget(), false), 1);
        }
    }

    #[test]
    fn test_direct_plan_needs_a_spare_slot() {
        let mut pop = population(&[5, 5], 3, 42);
        let evaluator = goal_rejecting(&pop);
        pop.evaluate(&evaluator, &budget(), false);
        pop.next_generation().unwrap();

        // Elite, carried direct plan, one child.
        assert_eq!(pop.genomes()[1].score(), Some(0.0));
        assert_eq!(pop.genomes()[1].step_count(), 1);
        assert_eq!(pop.genomes()[1].end_configuration(), pop.goal().target());
        assert_eq!(pop.evaluate(&evaluator, &budget(), false), 1);
    }
}
