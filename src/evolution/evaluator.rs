//! Plan scoring.
//!
//! An [`Evaluator`] scores the configuration a plan ends in. Scoring is the
//! only slow step of a search and the only one that runs in parallel, so
//! evaluators must be `Send + Sync` and must not share mutable state.
//!
//! Evaluators report infrastructure problems as [`EvaluationError`]; an
//! ordinary build or test failure is a score of 0. [`score_genome`] reduces
//! every error to a score of 0 so that selection always sees a total order.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::genome::Genome;
use crate::schema::EvaluatorDefinition;
use crate::system::{Configuration, Goal};

/// Evaluation errors. None of these escape a population.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Evaluation exceeded its {0:?} budget")]
    Timeout(Duration),
    #[error("Evaluation cancelled")]
    Cancelled,
    #[error("Evaluation failed: {0}")]
    Failure(String),
    #[error("I/O error during evaluation: {0}")]
    Io(#[from] std::io::Error),
}

/// Time and cancellation budget for a single evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationBudget {
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl EvaluationBudget {
    pub fn new(timeout: Duration, cancel: Arc<AtomicBool>) -> Self {
        Self { timeout, cancel }
    }

    /// Budget with its own, never-raised cancel flag.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, Arc::new(AtomicBool::new(false)))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Flag that cancels every evaluation sharing this budget.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Scores a configuration in `[0, max_score]`.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        config: &Configuration,
        budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError>;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(
        &self,
        config: &Configuration,
        budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError> {
        (**self).evaluate(config, budget)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Arc<E> {
    fn evaluate(
        &self,
        config: &Configuration,
        budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError> {
        (**self).evaluate(config, budget)
    }
}

/// Score a plan by evaluating its end configuration.
///
/// Cancellation, errors, overrunning the timeout and NaN all give 0. Any
/// other result is clamped to `[0, max_score]`.
pub fn score_genome<E: Evaluator + ?Sized>(
    evaluator: &E,
    genome: &Genome,
    budget: &EvaluationBudget,
) -> f32 {
    if budget.is_cancelled() {
        return 0.0;
    }

    let started = Instant::now();
    let result = evaluator.evaluate(genome.end_configuration(), budget);
    let elapsed = started.elapsed();

    match result {
        Ok(_) if elapsed > budget.timeout() => {
            warn!(
                "Plan {} took {:?}, over its {:?} budget; scoring 0",
                genome.seed(),
                elapsed,
                budget.timeout()
            );
            0.0
        }
        Ok(score) if score.is_nan() => {
            warn!("Plan {} scored NaN; scoring 0", genome.seed());
            0.0
        }
        Ok(score) => score.clamp(0.0, genome.goal().max_score()),
        Err(EvaluationError::Cancelled) => {
            debug!("Plan {} evaluation cancelled", genome.seed());
            0.0
        }
        Err(e) => {
            warn!("Plan {}: {e}; scoring 0", genome.seed());
            0.0
        }
    }
}

/// Adapts a closure into an evaluator.
pub struct FnEvaluator<F>(pub F);

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&Configuration) -> f32 + Send + Sync,
{
    fn evaluate(
        &self,
        config: &Configuration,
        _budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError> {
        Ok((self.0)(config))
    }
}

/// Scores the fraction of the start-to-goal version distance a
/// configuration has covered. Installed flags are not considered.
#[derive(Debug, Clone)]
pub struct ProximityEvaluator {
    start: Arc<Configuration>,
    goal: Arc<Goal>,
}

impl ProximityEvaluator {
    pub fn new(start: Arc<Configuration>, goal: Arc<Goal>) -> Self {
        Self { start, goal }
    }
}

impl Evaluator for ProximityEvaluator {
    fn evaluate(
        &self,
        config: &Configuration,
        _budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError> {
        let target = self.goal.target();
        if !config.is_aligned_with(target) {
            return Err(EvaluationError::Failure(
                "configuration does not match the goal's components".to_string(),
            ));
        }

        let mut total = 0usize;
        let mut remaining = 0usize;
        for ((s, g), c) in self
            .start
            .components()
            .iter()
            .zip(target.components())
            .zip(config.components())
        {
            total += s.index().abs_diff(g.index());
            remaining += c.index().abs_diff(g.index()).min(s.index().abs_diff(g.index()));
        }

        let max = self.goal.max_score();
        if total == 0 {
            return Ok(max);
        }
        Ok(max * (total - remaining) as f32 / total as f32)
    }
}

/// Runs an external build-and-test command for every configuration.
///
/// Each evaluation gets a fresh temporary working directory. The
/// configuration is written to the command's stdin as JSON and the score is
/// read from the last non-empty line of its stdout. A nonzero exit status is
/// an ordinary failure and scores 0.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
    poll_interval: Duration,
}

impl CommandEvaluator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            poll_interval: Duration::from_millis(10),
        }
    }

    /// How often a running command is checked for exit, timeout and
    /// cancellation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for a pipe reader under the command's deadline.
    ///
    /// A process left running in the background can hold a pipe open after
    /// the command itself exits; its reader is abandoned at the deadline.
    fn collect(
        &self,
        handle: Option<Drain>,
        deadline: Instant,
        budget: &EvaluationBudget,
    ) -> Result<String, EvaluationError> {
        let Some(handle) = handle else {
            return Ok(String::new());
        };
        while !handle.is_finished() {
            if budget.is_cancelled() {
                return Err(EvaluationError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(EvaluationError::Timeout(budget.timeout()));
            }
            thread::sleep(self.poll_interval);
        }
        handle
            .join()
            .map_err(|_| EvaluationError::Failure("output reader panicked".to_string()))?
            .map_err(EvaluationError::from)
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(
        &self,
        config: &Configuration,
        budget: &EvaluationBudget,
    ) -> Result<f32, EvaluationError> {
        if budget.is_cancelled() {
            return Err(EvaluationError::Cancelled);
        }

        let workdir = tempfile::Builder::new()
            .prefix("upgrade-search-")
            .tempdir()?;
        let payload = serde_json::to_vec(&config.snapshot())
            .map_err(|e| EvaluationError::Failure(e.to_string()))?;

        let deadline = Instant::now() + budget.timeout();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes are serviced on their own threads so a chatty or
        // non-reading command cannot block the timeout check.
        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            });
        }
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if budget.is_cancelled() || Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                if budget.is_cancelled() {
                    return Err(EvaluationError::Cancelled);
                }
                return Err(EvaluationError::Timeout(budget.timeout()));
            }
            thread::sleep(self.poll_interval);
        };

        if !status.success() {
            let stderr = self.collect(stderr, deadline, budget).unwrap_or_default();
            debug!("{} exited with {status}: {}", self.program, stderr.trim());
            return Ok(0.0);
        }
        let stdout = self.collect(stdout, deadline, budget)?;

        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| EvaluationError::Failure(format!("{} printed no score", self.program)))?;
        line.parse::<f32>().map_err(|_| {
            EvaluationError::Failure(format!("{} printed {line:?}, not a score", self.program))
        })
    }
}

type Drain = thread::JoinHandle<std::io::Result<String>>;

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drain {
    thread::spawn(move || {
        let mut buffer = String::new();
        pipe.read_to_string(&mut buffer)?;
        Ok(buffer)
    })
}


/// Build the evaluator a run file asks for.
pub fn from_definition(
    definition: &EvaluatorDefinition,
    start: Arc<Configuration>,
    goal: Arc<Goal>,
) -> Box<dyn Evaluator> {
    match definition {
        EvaluatorDefinition::Proximity => Box::new(ProximityEvaluator::new(start, goal)),
        EvaluatorDefinition::Command { program, args } => {
            Box::new(CommandEvaluator::new(program.clone(), args.clone()))
        }
    }
}
