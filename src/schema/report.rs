//! Search progress, history and result types.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::system::ConfigurationSnapshot;

/// Serializable plan, enough to checkpoint and replay a genome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Seed the plan was created from.
    pub seed: u64,
    /// Fitness, if evaluated.
    pub score: Option<f32>,
    /// Upgrade steps, in order.
    pub steps: Vec<ConfigurationSnapshot>,
}

/// Progress update passed to the search observer after every generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Current generation number.
    pub generation: usize,
    /// Generation budget.
    pub max_generations: usize,
    /// Seed the run can be replayed with.
    pub seed: u64,
    /// Best score seen so far.
    pub best_score: f32,
    /// Best score this generation.
    pub generation_best: f32,
    /// Average score this generation.
    pub avg_score: f32,
    /// Worst score this generation.
    pub worst_score: f32,
    /// RMS deviation of this generation's scores.
    pub variance: f32,
    /// Mean pairwise plan distance.
    pub diversity: f32,
    /// Generations since last improvement.
    pub stagnation_count: usize,
    /// Evaluations run this generation.
    pub evaluations_completed: usize,
    /// Some plan reached the goal's maximum score.
    pub goal_met: bool,
    /// Best plan found so far.
    pub best_plan: Option<PlanSnapshot>,
}

/// Per-generation statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    pub best_score: Vec<f32>,
    pub avg_score: Vec<f32>,
    pub worst_score: Vec<f32>,
    pub variance: Vec<f32>,
    pub diversity: Vec<f32>,
    /// Every plan's score, per generation, in population order.
    pub scores: Vec<Vec<f32>>,
}

impl SearchHistory {
    /// Number of recorded generations.
    pub fn len(&self) -> usize {
        self.best_score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best_score.is_empty()
    }

    /// Write every recorded score as `cycle_ix,genome_ix,score` rows.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "cycle_ix,genome_ix,score")?;
        for (cycle, scores) in self.scores.iter().enumerate() {
            for (genome, score) in scores.iter().enumerate() {
                writeln!(writer, "{cycle},{genome},{score}")?;
            }
        }
        writer.flush()
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Some plan reached the goal's maximum score.
    GoalMet,
    /// Generation budget exhausted.
    MaxGenerations,
    /// Stagnation limit hit.
    Stagnation,
    /// Cancelled through the engine's cancel handle.
    Cancelled,
}

/// Summary statistics of a finished search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    /// Generation transitions performed.
    pub generations: usize,
    /// Plans evaluated over the whole run.
    pub total_evaluations: u64,
    /// Best score achieved.
    pub best_score: f32,
    /// Average score of the final generation.
    pub final_avg_score: f32,
    /// Wall-clock time, in seconds.
    pub elapsed_seconds: f64,
    pub evaluations_per_second: f64,
    /// Seed the run can be replayed with.
    pub seed: u64,
    pub stop_reason: StopReason,
}

/// Outcome of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Best plan found over the whole run.
    pub best: PlanSnapshot,
    pub stats: SearchStats,
    pub history: SearchHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_csv() {
        let history = SearchHistory {
            scores: vec![vec![0.5, 0.25], vec![1.0, 0.5]],
            ..Default::default()
        };
        let mut out = Vec::new();
        history.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "cycle_ix,genome_ix,score",
                "0,0,0.5",
                "0,1,0.25",
                "1,0,1",
                "1,1,0.5"
            ]
        );
    }

    #[test]
    fn test_stop_reason_serde() {
        let json = serde_json::to_string(&StopReason::GoalMet).unwrap();
        assert_eq!(json, "\"GoalMet\"");
        let back: StopReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StopReason::GoalMet);
    }
}
