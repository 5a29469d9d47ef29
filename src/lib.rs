//! Theme indexing for chess problem solutions written in Popeye output
//! notation.
//!
//! The pipeline for one [`ProblemEntry`]:
//! 1. [`parser::parse`] lexes the solution text and builds the ply tree.
//! 2. The tree is replayed on the entry's board with [`semantics::traverse`],
//!    asserting every ply against the position it is played from.
//! 3. The [`analysis`] modules replay it again and push theme facts, each
//!    validated against the predicate catalog, into a [`FactSet`].
//!
//! Batches are analyzed in parallel, one entry per task.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

pub mod analysis;
pub mod board;
pub mod config;
pub mod entry;
pub mod error;
pub mod lexer;
pub mod nodes;
pub mod parser;
pub mod predicate;
pub mod semantics;
pub mod stipulation;

pub use board::{Board, Color, Origin, Piece};
pub use config::{AnalysisConfig, ValidationPolicy};
pub use entry::{Algebraic, ProblemEntry};
pub use error::{AnalysisError, EntryError, LexError, ParseError, SemanticError, ValidationError};
pub use nodes::{Node, NodeKind};
pub use parser::parse;
pub use predicate::{Fact, FactAccumulator, FactParam, FactSet, PredicateCatalog};

use analysis::AnalysisContext;
use semantics::{traverse, SemanticValidator};

/// Analyze one entry and return the facts found in its solution.
///
/// ```
/// use popeye_themes::{analyze_entry, AnalysisConfig, ProblemEntry};
///
/// let entry = ProblemEntry::from_json(
///     r#"{"stipulation": "ser-h~4",
///         "algebraic": {"neutral": ["Qa8", "Qa7", "Qb7"]},
///         "solution": "1.nQa7-b8 nQa8-a7 2.nQb7-a8 nQb8-b7"}"#,
/// )
/// .unwrap();
/// let facts = analyze_entry(&entry, &AnalysisConfig::default()).unwrap();
/// assert_eq!(facts.count("PW(3)"), 1);
/// assert_eq!(facts.count("PWPiece(nQ)"), 3);
/// ```
pub fn analyze_entry(entry: &ProblemEntry, config: &AnalysisConfig) -> Result<FactSet, AnalysisError> {
    let solution = parse(&entry.solution)?;
    let mut board = entry.board()?;

    let mut validator = SemanticValidator::default();
    traverse(&solution, &mut board, &mut validator)?;
    if validator.nodes > config.max_plies {
        return Err(AnalysisError::SolutionTooLong {
            plies: validator.nodes,
            limit: config.max_plies,
        });
    }
    check_twins(entry, &solution);

    let catalog = PredicateCatalog::builtin()?;
    let mut facts = FactAccumulator::new(catalog, config.validation);
    for analyzer in analysis::analyzers() {
        let mut ctx = AnalysisContext {
            entry,
            solution: &solution,
            board: &mut board,
            config,
            facts: &mut facts,
        };
        analyzer.analyze(&mut ctx)?;
        debug!(entry = %entry.label(), analyzer = analyzer.name(), "analyzer finished");
    }
    Ok(facts.into_facts())
}

/// Analyze a batch in parallel. Results keep the order of `entries`; a
/// failing entry never affects the others.
pub fn analyze_entries(
    entries: &[ProblemEntry],
    config: &AnalysisConfig,
) -> Vec<Result<FactSet, AnalysisError>> {
    let analyze = |entry: &ProblemEntry| {
        let result = analyze_entry(entry, config);
        if let Err(e) = &result {
            warn!(entry = %entry.label(), error = %e, "skipping entry");
        }
        result
    };

    let num_threads = config.num_threads.unwrap_or_else(num_cpus::get);
    match ThreadPoolBuilder::new().num_threads(num_threads).build() {
        Ok(thread_pool) => thread_pool.install(|| entries.par_iter().map(analyze).collect()),
        Err(e) => {
            warn!(error = %e, "failed to build thread pool, analyzing sequentially");
            entries.iter().map(analyze).collect()
        }
    }
}

/// Log entries whose declared twins do not match the twin headers of the
/// solution.
fn check_twins(entry: &ProblemEntry, solution: &Node) {
    if entry.twins.is_empty() {
        return;
    }
    let headers = solution
        .children
        .iter()
        .filter(|twin| matches!(&twin.kind, NodeKind::Twin(t) if !t.implicit))
        .count();
    if headers != entry.twins.len() + 1 {
        warn!(
            entry = %entry.label(),
            declared = entry.twins.len() + 1,
            found = headers,
            "twin count mismatch"
        );
    }
}
