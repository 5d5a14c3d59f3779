//! Upgrade plans and the operators that create, mutate and recombine them.
//!
//! A genome is an ordered list of intermediate configurations ("steps")
//! leading from the start configuration toward the goal. Every genome draws
//! from its own `RandomStream`, so plans are reproducible from their seed
//! alone and can be handled on different threads without coordination.

use std::sync::Arc;

use crate::schema::{OperatorConfig, PlanSnapshot};
use crate::system::{ComponentError, Configuration, Goal, RandomStream};

/// Most upgrade steps a plan may hold.
pub const MAX_STEPS: usize = 32;

/// Fewest upgrade steps a plan may hold.
pub const MIN_STEPS: usize = 1;

/// Genome errors.
#[derive(Debug, thiserror::Error)]
pub enum GenomeError {
    #[error("Plan already has {steps} steps (allowed 1..=32)")]
    StepLimit { steps: usize },
    #[error("Start and goal configurations do not list the same components")]
    Misaligned,
    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// Per-genome operator rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenomeRates {
    /// Fraction of components touched by a mutation.
    pub mutation_rate: f32,
    /// Probability of producing a child by crossover.
    pub crossover_rate: f32,
}

impl Default for GenomeRates {
    fn default() -> Self {
        Self::from(&OperatorConfig::default())
    }
}

impl From<&OperatorConfig> for GenomeRates {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            mutation_rate: config.mutation_rate,
            crossover_rate: config.crossover_rate,
        }
    }
}

/// One candidate upgrade plan.
#[derive(Debug, Clone)]
pub struct Genome {
    seed: u64,
    rng: RandomStream,
    start: Arc<Configuration>,
    goal: Arc<Goal>,
    steps: Vec<Configuration>,
    rates: GenomeRates,
    score: Option<f32>,
}

impl Genome {
    /// Create a random plan.
    ///
    /// Creation does not ratchet through versions: each step holds, for
    /// every component, a version anywhere between its start and goal
    /// index. Long or non-monotonic plans are left to scoring to penalise.
    pub fn create_random(
        start: Arc<Configuration>,
        goal: Arc<Goal>,
        seed: u64,
        rates: GenomeRates,
    ) -> Result<Self, GenomeError> {
        check_alignment(&start, &goal)?;
        let mut rng = RandomStream::new(seed);

        let step_count = MIN_STEPS + rng.below(MAX_STEPS - MIN_STEPS + 1);
        let steps = (0..step_count)
            .map(|_| random_step(&mut rng, &start, &goal))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            seed,
            rng,
            start,
            goal,
            steps,
            rates,
            score: None,
        })
    }

    /// A single-step plan going straight from start to goal.
    pub fn direct_ascent(
        start: Arc<Configuration>,
        goal: Arc<Goal>,
        seed: u64,
        rates: GenomeRates,
    ) -> Result<Self, GenomeError> {
        check_alignment(&start, &goal)?;
        Ok(Self {
            seed,
            rng: RandomStream::new(seed),
            steps: vec![goal.target().clone()],
            start,
            goal,
            rates,
            score: None,
        })
    }

    /// Create a child from two parents.
    ///
    /// The child takes its length from one parent and each step from either
    /// parent at the same position, falling back to the other parent when
    /// the chosen one is too short. Parents are left untouched.
    pub fn crossover(parent1: &Genome, parent2: &Genome, seed: u64) -> Genome {
        let mut rng = RandomStream::new(seed);

        let step_count = if rng.chance(0.5) {
            parent1.steps.len()
        } else {
            parent2.steps.len()
        };

        let steps: Vec<Configuration> = (0..step_count)
            .filter_map(|i| {
                let (chosen, other) = if rng.chance(0.5) {
                    (parent1, parent2)
                } else {
                    (parent2, parent1)
                };
                chosen.steps.get(i).or_else(|| other.steps.get(i)).cloned()
            })
            .collect();

        Genome {
            seed,
            rng,
            start: Arc::clone(&parent1.start),
            goal: Arc::clone(&parent1.goal),
            steps,
            rates: parent1.rates,
            score: None,
        }
    }

    /// Copy of this plan drawing from a fresh stream, unscored.
    pub fn offspring(&self, seed: u64) -> Genome {
        Genome {
            seed,
            rng: RandomStream::new(seed),
            start: Arc::clone(&self.start),
            goal: Arc::clone(&self.goal),
            steps: self.steps.clone(),
            rates: self.rates,
            score: None,
        }
    }

    /// Point mutation: upgrade randomly chosen (component, step) positions
    /// by a single version.
    ///
    /// Fires on half of the calls. When it fires it touches
    /// `round(mutation_rate * components)` positions; a position that
    /// cannot be upgraded any further is skipped. Steps are drawn with a
    /// bias toward the end of the plan, and an upgraded version is carried
    /// forward to every later step still holding an older one. Returns
    /// whether anything changed.
    pub fn mutate(&mut self) -> bool {
        if self.rng.next_normalised() <= 0.5 {
            return false;
        }

        let component_count = self.start.count();
        let touches = (self.rates.mutation_rate * component_count as f32).round() as usize;
        let mut changed = false;

        for _ in 0..touches {
            let Some(position) = self.start.random_component(self.rng.next()) else {
                break;
            };
            let step = self.late_step();
            let Some(component) = self.steps[step].component_mut(position) else {
                continue;
            };
            if !component.can_upgrade(1) || component.upgrade(1).is_err() {
                continue;
            }
            let index = component.index();
            changed = true;

            for later in &mut self.steps[step + 1..] {
                if let Some(component) = later.component_mut(position)
                    && component.index() < index
                {
                    // Later steps share the component's version list.
                    let _ = component.set_version_index(index);
                }
            }
        }

        if changed {
            self.score = None;
        }
        changed
    }

    /// Step index for a point mutation, `n - 1 - floor(u^2 * n)`.
    fn late_step(&mut self) -> usize {
        let n = self.steps.len();
        let u = self.rng.next_normalised();
        n - 1 - ((u * u * n as f64) as usize).min(n - 1)
    }

    /// Insert a random step at a random position.
    pub fn mutate_insertion(&mut self) -> Result<(), GenomeError> {
        if self.steps.len() >= MAX_STEPS {
            return Err(GenomeError::StepLimit {
                steps: self.steps.len(),
            });
        }
        let position = self.rng.below(self.steps.len() + 1);
        let step = random_step(&mut self.rng, &self.start, &self.goal)?;
        self.steps.insert(position, step);
        self.score = None;
        Ok(())
    }

    /// Remove the step at a random position.
    pub fn mutate_deletion(&mut self) -> Result<(), GenomeError> {
        if self.steps.len() <= MIN_STEPS {
            return Err(GenomeError::StepLimit {
                steps: self.steps.len(),
            });
        }
        let position = self.rng.below(self.steps.len());
        self.steps.remove(position);
        self.score = None;
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn steps(&self) -> &[Configuration] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn start(&self) -> &Arc<Configuration> {
        &self.start
    }

    pub fn goal(&self) -> &Arc<Goal> {
        &self.goal
    }

    pub fn rates(&self) -> GenomeRates {
        self.rates
    }

    /// Configuration the plan ends in.
    pub fn end_configuration(&self) -> &Configuration {
        self.steps.last().unwrap_or(&self.start)
    }

    /// Cached fitness; `None` until evaluated or after the plan changed.
    pub fn score(&self) -> Option<f32> {
        self.score
    }

    pub fn set_score(&mut self, score: f32) {
        self.score = Some(score);
    }

    /// Serializable form of the plan.
    pub fn to_snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            seed: self.seed,
            score: self.score,
            steps: self.steps.iter().map(Configuration::snapshot).collect(),
        }
    }
}

/// Structural equality: same number of steps and identical steps.
impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.steps == other.steps
    }
}

fn check_alignment(start: &Configuration, goal: &Goal) -> Result<(), GenomeError> {
    if start.is_aligned_with(goal.target()) {
        Ok(())
    } else {
        Err(GenomeError::Misaligned)
    }
}

/// A step with every component somewhere between its start and goal index.
fn random_step(
    rng: &mut RandomStream,
    start: &Configuration,
    goal: &Goal,
) -> Result<Configuration, GenomeError> {
    let mut step = start.clone();
    for (position, target) in goal.target().components().iter().enumerate() {
        let Some(component) = step.component_mut(position) else {
            continue;
        };
        let lo = component.index().min(target.index());
        let hi = component.index().max(target.index());
        let index = if lo == hi {
            lo
        } else {
            lo + rng.below(hi - lo + 1)
        };
        component.set_version_index(index)?;
        component.set_installed(rng.chance(0.5));
    }
    Ok(step)
}

/// Mean per-position difference between two plans.
///
/// Steps are compared positionally; surplus steps in the longer plan add a
/// fixed penalty each.
pub fn plan_distance(a: &Genome, b: &Genome) -> f32 {
    let mut distance = 0.0f32;
    let mut count = 0usize;

    for (sa, sb) in a.steps.iter().zip(&b.steps) {
        for (ca, cb) in sa.components().iter().zip(sb.components()) {
            distance += ca.index().abs_diff(cb.index()) as f32;
            if ca.installed() != cb.installed() {
                distance += 1.0;
            }
            count += 1;
        }
    }
    distance += a.steps.len().abs_diff(b.steps.len()) as f32 * 0.1;

    if count > 0 {
        distance / count as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::testing::{fixture, pinned_fixture};
    use proptest::prelude::*;

    fn genome(seed: u64) -> Genome {
        let (start, goal) = fixture(&[5, 5, 3]);
        Genome::create_random(start, goal, seed, GenomeRates::default()).unwrap()
    }

    fn assert_within_bounds(genome: &Genome) {
        let start = genome.start();
        let target = genome.goal().target();
        for step in genome.steps() {
            assert!(step.is_aligned_with(start));
            for (p, c) in step.components().iter().enumerate() {
                let s = start.component(p).unwrap().index();
                let g = target.component(p).unwrap().index();
                assert!(c.index() >= s.min(g) && c.index() <= s.max(g));
            }
        }
    }

    #[test]
    fn test_create_random() {
        let g = genome(42);
        assert!((MIN_STEPS..=MAX_STEPS).contains(&g.step_count()));
        assert!(g.score().is_none());
        assert_within_bounds(&g);
    }

    #[test]
    fn test_create_random_reproducible() {
        assert_eq!(genome(7), genome(7));
        assert_eq!(genome(7).step_count(), genome(7).step_count());
    }

    #[test]
    fn test_pinned_component_keeps_index() {
        let (start, goal) = pinned_fixture();
        for seed in 0..50 {
            let g = Genome::create_random(
                Arc::clone(&start),
                Arc::clone(&goal),
                seed,
                GenomeRates::default(),
            )
            .unwrap();
            for step in g.steps() {
                assert_eq!(step.component(1).unwrap().index(), 2);
            }
        }
    }

    #[test]
    fn test_misaligned_goal_rejected() {
        let (start, _) = fixture(&[3, 3]);
        let (_, other_goal) = fixture(&[3]);
        assert!(matches!(
            Genome::create_random(start, other_goal, 1, GenomeRates::default()),
            Err(GenomeError::Misaligned)
        ));
    }

    #[test]
    fn test_equality() {
        let a = genome(11);
        let mut b = a.clone();
        assert_eq!(a, b);

        let flipped = !b.steps[0].component(0).unwrap().installed();
        b.steps[0].component_mut(0).unwrap().set_installed(flipped);
        assert_ne!(a, b);

        let mut c = a.clone();
        c.steps.push(a.steps[0].clone());
        assert_ne!(a, c);
    }

    #[test]
    fn test_mutate_upgrades_and_clears_score() {
        let mut g = genome(3);
        g.rates.mutation_rate = 1.0;
        g.set_score(0.5);

        let before = g.clone();
        let mut changed = false;
        for _ in 0..20 {
            changed |= g.mutate();
        }
        assert!(changed);
        assert_ne!(g, before);
        assert!(g.score().is_none());

        // Only upgrades: no index ever goes down.
        for (after, prior) in g.steps().iter().zip(before.steps()) {
            for (ca, cb) in after.components().iter().zip(prior.components()) {
                assert!(ca.index() >= cb.index());
                assert!(ca.index() < ca.version_count());
            }
        }
    }

    #[test]
    fn test_mutate_carries_upgrades_forward() {
        let mut g = genome(3);
        g.rates.mutation_rate = 1.0;
        g.steps = vec![(**g.start()).clone(); 6];

        let mut changed = false;
        for _ in 0..30 {
            changed |= g.mutate();
        }
        assert!(changed);

        // Every component's version never goes down along the plan.
        for pair in g.steps().windows(2) {
            for (earlier, later) in pair[0].components().iter().zip(pair[1].components()) {
                assert!(later.index() >= earlier.index());
            }
        }
    }

    #[test]
    fn test_mutation_step_bias() {
        let mut g = genome(5);
        g.steps = vec![(**g.start()).clone(); 8];
        let mut counts = [0usize; 8];
        for _ in 0..4000 {
            counts[g.late_step()] += 1;
        }
        // P(step 7) = sqrt(1/8) ≈ 0.35, P(step 0) ≈ 0.06.
        assert!(counts[7] > counts[0] * 3);
        assert!(counts[7] > 1000);
    }

    #[test]
    fn test_mutate_at_latest_is_a_no_op() {
        let (start, goal) = fixture(&[4, 4]);
        let mut g = Genome::direct_ascent(start, goal, 5, GenomeRates {
            mutation_rate: 1.0,
            crossover_rate: 1.0,
        })
        .unwrap();
        g.set_score(1.0);
        for _ in 0..20 {
            assert!(!g.mutate());
        }
        assert_eq!(g.score(), Some(1.0));
    }

    #[test]
    fn test_zero_mutation_rate_never_changes() {
        let mut g = genome(9);
        g.rates.mutation_rate = 0.0;
        for _ in 0..20 {
            assert!(!g.mutate());
        }
    }

    #[test]
    fn test_insertion_and_deletion_limits() {
        let mut g = genome(21);
        while g.step_count() < MAX_STEPS {
            g.mutate_insertion().unwrap();
        }
        assert!(matches!(
            g.mutate_insertion(),
            Err(GenomeError::StepLimit { steps: MAX_STEPS })
        ));
        assert_within_bounds(&g);

        while g.step_count() > MIN_STEPS {
            g.mutate_deletion().unwrap();
        }
        assert!(matches!(
            g.mutate_deletion(),
            Err(GenomeError::StepLimit { steps: MIN_STEPS })
        ));
        assert_eq!(g.step_count(), MIN_STEPS);
    }

    #[test]
    fn test_crossover_takes_steps_from_parents() {
        let p1 = genome(100);
        let p2 = genome(200);

        for seed in 0..20 {
            let child = Genome::crossover(&p1, &p2, seed);
            assert!(
                child.step_count() == p1.step_count() || child.step_count() == p2.step_count()
            );
            for (i, step) in child.steps().iter().enumerate() {
                let from_p1 = p1.steps().get(i) == Some(step);
                let from_p2 = p2.steps().get(i) == Some(step);
                assert!(from_p1 || from_p2);
            }
            assert!(child.score().is_none());
        }

        // Parents are donors only.
        assert_eq!(p1, genome(100));
        assert_eq!(p2, genome(200));
    }

    #[test]
    fn test_crossover_of_identical_parents() {
        let p = genome(5);
        let child = Genome::crossover(&p, &p, 77);
        assert_eq!(child, p);
    }

    #[test]
    fn test_offspring() {
        let mut parent = genome(12);
        parent.set_score(0.5);
        let child = parent.offspring(99);
        assert_eq!(child, parent);
        assert_eq!(child.seed(), 99);
        assert!(child.score().is_none());
    }

    #[test]
    fn test_direct_ascent() {
        let (start, goal) = fixture(&[5, 2]);
        let g = Genome::direct_ascent(start, Arc::clone(&goal), 1, GenomeRates::default())
            .unwrap();
        assert_eq!(g.step_count(), 1);
        assert_eq!(g.end_configuration(), goal.target());
    }

    #[test]
    fn test_plan_distance() {
        let a = genome(1);
        let b = genome(2);
        assert!(plan_distance(&a, &a.clone()).abs() < 1e-6);
        assert!(plan_distance(&a, &b) > 0.0 || a == b);
    }

    #[test]
    fn test_snapshot() {
        let mut g = genome(8);
        g.set_score(0.25);
        let snapshot = g.to_snapshot();
        assert_eq!(snapshot.seed, 8);
        assert_eq!(snapshot.score, Some(0.25));
        assert_eq!(snapshot.steps.len(), g.step_count());
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"steps\""));
    }

    proptest! {
        #[test]
        fn prop_create_random_within_bounds(seed in any::<u64>()) {
            let g = genome(seed);
            prop_assert!((MIN_STEPS..=MAX_STEPS).contains(&g.step_count()));
            assert_within_bounds(&g);
        }
    }
}
