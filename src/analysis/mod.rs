//! Theme analyzers.
//!
//! Each analyzer replays the parsed solution on the entry's board and pushes
//! the facts it detects into a shared [`FactAccumulator`]. Analyzers run one
//! after the other on the same board; every one of them must leave the board
//! exactly as it found it.

pub mod trajectories;
pub mod zilahi;

use crate::board::Board;
use crate::config::AnalysisConfig;
use crate::entry::ProblemEntry;
use crate::error::AnalysisError;
use crate::nodes::Node;
use crate::predicate::FactAccumulator;

pub use trajectories::TrajectoryAnalyzer;
pub use zilahi::ZilahiAnalyzer;

/// Everything an analyzer sees while processing one entry.
pub struct AnalysisContext<'a, 'c> {
    pub entry: &'a ProblemEntry,
    pub solution: &'a Node,
    /// Initial position. Mutated during replay, restored afterwards.
    pub board: &'a mut Board,
    pub config: &'a AnalysisConfig,
    pub facts: &'a mut FactAccumulator<'c>,
}

/// Trait that all analyzers implement.
pub trait SolutionAnalyzer: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Replay the solution and push the detected facts.
    fn analyze(&self, ctx: &mut AnalysisContext<'_, '_>) -> Result<(), AnalysisError>;
}

/// The analyzers run for every entry, in order.
pub fn analyzers() -> Vec<Box<dyn SolutionAnalyzer>> {
    vec![Box::new(TrajectoryAnalyzer), Box::new(ZilahiAnalyzer)]
}
