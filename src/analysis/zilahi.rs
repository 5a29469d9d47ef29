//! Phase and twin counting, and the Zilahi theme.
//!
//! Every line of play ends with a finalizer: the piece making the last move
//! of the side that completes the line. A Zilahi cycle links lines where the
//! finalizer of one line is captured in the next, until the chain comes back
//! to the first line.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{AnalysisContext, SolutionAnalyzer};
use crate::board::{Board, Origin};
use crate::error::AnalysisError;
use crate::nodes::{Node, NodeKind};
use crate::predicate::{Fact, FactParam};
use crate::stipulation::{self, Stipulation};

/// Emits `Twins`, `Phases`, `Zilahi` and `ZilahiPiece` facts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZilahiAnalyzer;

impl SolutionAnalyzer for ZilahiAnalyzer {
    fn name(&self) -> &'static str {
        "zilahi"
    }

    fn analyze(&self, ctx: &mut AnalysisContext<'_, '_>) -> Result<(), AnalysisError> {
        let text = &ctx.entry.stipulation;
        let parity = usize::from(stipulation::side_completing_line(text) != stipulation::side_to_move(text));
        let mut walker = LineWalker::new(parity);
        walker.visit(ctx.solution, ctx.board, &BTreeMap::new(), &BTreeSet::new())?;
        debug!(
            entry = %ctx.entry.label(),
            lines = walker.lines.len(),
            twins = walker.twins,
            phases = walker.phases,
            "lines collected"
        );

        for _ in 0..walker.phases.max(0) {
            ctx.facts.push(Fact::bare("Phases"))?;
        }
        for _ in 0..walker.twins {
            ctx.facts.push(Fact::bare("Twins"))?;
        }

        let cycles = walker.cycles();
        let mut in_cycles = BTreeSet::new();
        for cycle in &cycles {
            ctx.facts
                .push(Fact::new("Zilahi", vec![FactParam::Int(cycle.len())]))?;
            for link in cycle {
                in_cycles.insert(link.origin.clone());
                ctx.facts.push(zilahi_piece(&link.piece, link.passive))?;
            }
        }

        let help_play = Stipulation::parse(text).is_some_and(|s| s.is_help_play());
        if help_play {
            for (piece, passive) in walker.exchanged_pieces(&in_cycles) {
                ctx.facts.push(zilahi_piece(&piece, passive))?;
            }
        }
        Ok(())
    }
}

fn zilahi_piece(piece: &str, passive: bool) -> Fact {
    Fact::new(
        "ZilahiPiece",
        vec![FactParam::Piece(piece.to_string()), FactParam::Bool(passive)],
    )
}

/// What happened along one complete line of play.
#[derive(Debug)]
struct Line {
    /// Captured identity to its piece code and whether it never moved
    /// before being captured.
    captured: BTreeMap<Origin, (String, bool)>,
    finalizer: Origin,
}

/// One step of a cycle: `origin`, finalizer of the previous line, is
/// captured in line `line`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Link {
    origin: Origin,
    piece: String,
    passive: bool,
    line: usize,
}

struct LineWalker {
    parity: usize,
    twins: usize,
    phases: i64,
    lines: Vec<Line>,
}

impl LineWalker {
    fn new(parity: usize) -> Self {
        LineWalker {
            parity,
            twins: 0,
            phases: 0,
            lines: Vec::new(),
        }
    }

    fn visit(
        &mut self,
        node: &Node,
        board: &mut Board,
        captured: &BTreeMap<Origin, String>,
        moved: &BTreeSet<Origin>,
    ) -> Result<(), AnalysisError> {
        if node.depth == 1 {
            self.twins += 1;
            // a twin whose only child is set play has one phase per set line
            if let [only] = node.children.as_slice() {
                if only.is_null() {
                    self.phases += only.children.len() as i64 - 1;
                }
            }
        }
        if node.depth == 2 {
            self.phases += 1;
        }

        let mover = node
            .departure(board)
            .and_then(|square| board.at(square))
            .map(|piece| piece.origin.clone());
        let mut moved = moved.clone();
        if let Some(origin) = &mover {
            moved.insert(origin.clone());
        }
        let mut captured = captured.clone();
        if let NodeKind::Move(m) = &node.kind {
            if let Some(victim) = m.capture.and_then(|square| board.at(square)) {
                captured.insert(victim.origin.clone(), victim.code());
            }
        }

        // a leaf of the wrong parity is a refutation, not a line end
        if node.children.is_empty() && node.depth % 2 == self.parity {
            if let Some(finalizer) = mover {
                self.lines.push(Line {
                    captured: captured
                        .into_iter()
                        .map(|(origin, code)| {
                            let passive = !moved.contains(&origin);
                            (origin, (code, passive))
                        })
                        .collect(),
                    finalizer,
                });
                return Ok(());
            }
        }

        let undo = node.make(board)?;
        let result = node
            .children
            .iter()
            .try_for_each(|child| self.visit(child, board, &captured, &moved));
        node.unmake(board, undo);
        result
    }

    /// All distinct cycles, each rotated to start at its smallest origin.
    fn cycles(&self) -> BTreeSet<Vec<Link>> {
        let mut found = BTreeSet::new();
        for (start, line) in self.lines.iter().enumerate() {
            let mut accounted = BTreeSet::from([line.finalizer.clone()]);
            self.extend(start, &line.finalizer, &mut accounted, &mut Vec::new(), &mut found);
        }
        found
    }

    /// Follow the lines capturing `finalizer`. Only lines after `start` are
    /// entered, so every cycle is found from its first line alone.
    fn extend(
        &self,
        start: usize,
        finalizer: &Origin,
        accounted: &mut BTreeSet<Origin>,
        cycle: &mut Vec<Link>,
        found: &mut BTreeSet<Vec<Link>>,
    ) {
        for (k, line) in self.lines.iter().enumerate() {
            let Some((piece, passive)) = line.captured.get(finalizer) else {
                continue;
            };
            cycle.push(Link {
                origin: finalizer.clone(),
                piece: piece.clone(),
                passive: *passive,
                line: k,
            });
            if k == start {
                if cycle.len() > 1 {
                    found.insert(normalize(cycle));
                }
            } else if k > start && !accounted.contains(&line.finalizer) {
                accounted.insert(line.finalizer.clone());
                self.extend(start, &line.finalizer, accounted, cycle, found);
                accounted.remove(&line.finalizer);
            }
            cycle.pop();
        }
    }

    /// Finalizers outside every cycle that are captured in some other line,
    /// one entry per identity.
    fn exchanged_pieces(&self, in_cycles: &BTreeSet<Origin>) -> Vec<(String, bool)> {
        let mut reported = BTreeSet::new();
        let mut pieces = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            let origin = &line.finalizer;
            if in_cycles.contains(origin) || reported.contains(origin) {
                continue;
            }
            let capture = self
                .lines
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .find_map(|(_, other)| other.captured.get(origin));
            if let Some((piece, passive)) = capture {
                pieces.push((piece.clone(), *passive));
                reported.insert(origin.clone());
            }
        }
        pieces
    }
}

fn normalize(cycle: &[Link]) -> Vec<Link> {
    let first = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.origin.cmp(&b.origin))
        .map_or(0, |(i, _)| i);
    cycle[first..].iter().chain(&cycle[..first]).cloned().collect()
}
