//! Piece trajectories and the themes read off them.
//!
//! A trajectory is the tree of squares visited by one piece identity
//! ([`Origin`]) across the whole solution: it branches wherever the solution
//! tree branches and the piece moves differently in the branches. The
//! trajectories are built in a single make/unmake walk over the solution;
//! place exchanges (Platzwechsel) are detected during that same walk by
//! comparing point-in-time snapshots of the position along the current line.
//!
//! Once built, every root-to-leaf path is classified for cycles (tracebacks,
//! linear and areal cycles, generic closed walks), every branching square is
//! matched against the fixed geometric patterns, and corner visits are
//! collected for the corner themes.

use std::collections::{BTreeSet, HashMap, HashSet};

use shakmaty::Square;
use tracing::debug;

use super::{AnalysisContext, SolutionAnalyzer};
use crate::board::{coords, square_at, Board, Origin};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::nodes::{Node, NodeKind};
use crate::predicate::{Fact, FactParam};

const CORNERS: [Square; 4] = [Square::A1, Square::H1, Square::A8, Square::H8];

/// Bound on the number of pieces chained in one place-exchange walk.
const MAX_CHAIN: usize = 64;

/// Square vectors pivoted at a branching square. Ranks grow towards black.
const PATTERNS: &[(&str, &[(i32, i32)])] = &[
    ("Star", &[(1, 1), (1, -1), (-1, 1), (-1, -1)]),
    ("BigStar", &[(2, 2), (2, -2), (-2, 2), (-2, -2)]),
    ("Cross", &[(0, 1), (0, -1), (-1, 0), (1, 0)]),
    ("BigCross", &[(0, 2), (0, -2), (-2, 0), (2, 0)]),
    (
        "Wheel",
        &[(1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2)],
    ),
    ("Albino", &[(-1, 1), (1, 1), (0, 1), (0, 2)]),
    ("Pickaninny", &[(-1, -1), (1, -1), (0, -1), (0, -2)]),
];

/// Detects cycle classes, geometric patterns, corner themes and place
/// exchanges.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrajectoryAnalyzer;

impl SolutionAnalyzer for TrajectoryAnalyzer {
    fn name(&self) -> &'static str {
        "trajectories"
    }

    fn analyze(&self, ctx: &mut AnalysisContext<'_, '_>) -> Result<(), AnalysisError> {
        let mut builder = Builder::new(ctx.config);
        builder.visit(ctx.solution, ctx.board, &Front::new())?;
        let Builder {
            trajectories,
            mut facts,
            ..
        } = builder;

        let roots = trajectories.roots();
        debug!(
            entry = %ctx.entry.label(),
            trajectories = roots.len(),
            place_exchanges = facts.len(),
            "trajectories built"
        );
        trajectories.search(&mut Vec::new(), &roots, &mut facts);
        trajectories.four_corners(&roots, &mut facts);

        for fact in facts {
            ctx.facts.push(fact)?;
        }
        Ok(())
    }
}

/// One square on a trajectory.
#[derive(Debug)]
struct TNode {
    square: Square,
    origin: Origin,
    /// Piece code on arrival, so promotions show up along the path.
    piece: String,
    is_capture: bool,
    branches: Vec<usize>,
}

/// Arena of trajectory nodes. `starts` holds the first node of every
/// identity in the order the identities appeared.
#[derive(Debug, Default)]
struct Trajectories {
    nodes: Vec<TNode>,
    starts: Vec<usize>,
}

/// Latest trajectory node of every identity along the current line.
type Front = HashMap<Origin, usize>;

#[derive(Debug, Clone)]
struct Displacement {
    origin: Origin,
    /// `None` for an identity seen for the first time.
    departure: Option<Square>,
    arrival: Square,
    piece: String,
}

/// Position before a node is made, completed with what the node changed.
#[derive(Debug, Default)]
struct Snapshot {
    origin_squares: HashMap<Origin, Square>,
    square_origins: HashMap<Square, Origin>,
    displacements: Vec<Displacement>,
    after: HashMap<Origin, Square>,
}

impl Snapshot {
    fn take(board: &Board) -> Self {
        let mut snapshot = Snapshot::default();
        for (square, piece) in board.pieces() {
            snapshot.origin_squares.insert(piece.origin.clone(), square);
            snapshot.square_origins.insert(square, piece.origin.clone());
        }
        snapshot
    }

    fn complete(&mut self, board: &Board, displacements: Vec<Displacement>) {
        self.displacements = displacements;
        self.after = board
            .pieces()
            .map(|(square, piece)| (piece.origin.clone(), square))
            .collect();
    }

    fn displaced(&self, origin: &Origin) -> bool {
        self.displacements.iter().any(|d| &d.origin == origin)
    }
}

struct Builder<'a> {
    config: &'a AnalysisConfig,
    trajectories: Trajectories,
    /// Snapshots of the move-like nodes on the current line.
    snapshots: Vec<Snapshot>,
    facts: Vec<Fact>,
}

impl<'a> Builder<'a> {
    fn new(config: &'a AnalysisConfig) -> Self {
        Builder {
            config,
            trajectories: Trajectories::default(),
            snapshots: Vec::new(),
            facts: Vec::new(),
        }
    }

    fn visit(&mut self, node: &Node, board: &mut Board, front: &Front) -> Result<(), AnalysisError> {
        if !self.config.keeps(node) {
            return Ok(());
        }
        let snapshot = Snapshot::take(board);
        let undo = node.make(board)?;
        let result = self.visit_made(node, board, front, snapshot);
        node.unmake(board, undo);
        result
    }

    fn visit_made(
        &mut self,
        node: &Node,
        board: &mut Board,
        front: &Front,
        mut snapshot: Snapshot,
    ) -> Result<(), AnalysisError> {
        let displacements = self.trajectories.displacements(board, front);

        let mut extended: Option<Front> = None;
        for d in &displacements {
            let is_capture = match &node.kind {
                NodeKind::Move(m) => d.departure == Some(m.departure) && m.capture.is_some(),
                _ => false,
            };
            let id = self.trajectories.nodes.len();
            self.trajectories.nodes.push(TNode {
                square: d.arrival,
                origin: d.origin.clone(),
                piece: d.piece.clone(),
                is_capture,
                branches: Vec::new(),
            });
            match front.get(&d.origin) {
                Some(&parent) => self.trajectories.nodes[parent].branches.push(id),
                None => self.trajectories.starts.push(id),
            }
            extended
                .get_or_insert_with(|| front.clone())
                .insert(d.origin.clone(), id);
        }
        let front = extended.as_ref().unwrap_or(front);

        snapshot.complete(board, displacements);
        let movelike = !snapshot.displacements.is_empty() && node.depth > 0;
        if movelike {
            self.search_place_exchanges(&snapshot, board);
            self.snapshots.push(snapshot);
        }

        let result = node
            .children
            .iter()
            .try_for_each(|child| self.visit(child, board, front));

        if movelike {
            self.snapshots.pop();
        }
        result
    }

    fn search_place_exchanges(&mut self, current: &Snapshot, board: &Board) {
        for earlier in &self.snapshots {
            for cycle in place_exchanges(current, earlier) {
                self.facts
                    .push(Fact::new("PW", vec![FactParam::Int(cycle.len())]));
                for origin in &cycle {
                    let piece = current.after.get(origin).and_then(|&sq| board.at(sq));
                    if let Some(piece) = piece {
                        self.facts.push(piece_fact("PWPiece", &piece.code()));
                    }
                }
            }
        }
    }
}

/// Chains of pieces that, between `earlier` and `current`, took each other's
/// places. The chain starts with a piece displaced by the current node and
/// follows whoever stood on its arrival square at the earlier point.
fn place_exchanges(current: &Snapshot, earlier: &Snapshot) -> Vec<Vec<Origin>> {
    let mut cycles = Vec::new();
    for d in &current.displacements {
        let Some(&home) = earlier.origin_squares.get(&d.origin) else {
            continue;
        };
        let mut square = d.arrival;
        let mut cycle = vec![d.origin.clone()];
        let mut completed = false;
        while cycle.len() <= MAX_CHAIN {
            let Some(occupant) = earlier.square_origins.get(&square) else {
                break;
            };
            if square == home {
                completed = true;
                break;
            }
            // the occupant was captured in between
            let Some(&next) = current.after.get(occupant) else {
                break;
            };
            square = next;
            cycle.push(occupant.clone());
        }
        // a chain with no member moved by the earlier node is counted against
        // an earlier snapshot already
        if completed && cycle.len() > 1 && cycle.iter().any(|o| earlier.displaced(o)) {
            cycles.push(cycle);
        }
    }
    cycles
}

impl Trajectories {
    /// Identities whose square changed since `front` was recorded.
    fn displacements(&self, board: &Board, front: &Front) -> Vec<Displacement> {
        board
            .pieces()
            .filter_map(|(square, piece)| {
                let departure = match front.get(&piece.origin) {
                    None => None,
                    Some(&id) if self.nodes[id].square != square => Some(self.nodes[id].square),
                    Some(_) => return None,
                };
                Some(Displacement {
                    origin: piece.origin.clone(),
                    departure,
                    arrival: square,
                    piece: piece.code(),
                })
            })
            .collect()
    }

    /// Starting nodes of identities that moved at least once.
    fn roots(&self) -> Vec<usize> {
        self.starts
            .iter()
            .copied()
            .filter(|&id| !self.nodes[id].branches.is_empty())
            .collect()
    }

    fn path(&self, ids: &[usize]) -> Vec<&TNode> {
        ids.iter().map(|&id| &self.nodes[id]).collect()
    }

    /// Depth-first over every trajectory path: cycles at leaves, patterns at
    /// branching squares, corner-to-corner at every corner.
    fn search(&self, head: &mut Vec<usize>, tail: &[usize], facts: &mut Vec<Fact>) {
        if tail.is_empty() {
            closed_walks(&self.path(head), true, facts);
        }

        if let Some(&last) = head.last() {
            let tnode = &self.nodes[last];
            if tnode.branches.len() > 3 {
                let arrivals: BTreeSet<Square> = tnode
                    .branches
                    .iter()
                    .map(|&id| self.nodes[id].square)
                    .collect();
                for (name, squares) in patterns(tnode.square) {
                    if squares == arrivals {
                        facts.push(piece_fact(name, &tnode.piece));
                    }
                }
            }

            if head.len() > 1 && CORNERS.contains(&tnode.square) {
                let previous = head[..head.len() - 1].iter().rev().find(|&&id| {
                    let square = self.nodes[id].square;
                    square != tnode.square && CORNERS.contains(&square)
                });
                if let Some(&id) = previous {
                    facts.push(piece_fact("CornerToCorner", &self.nodes[id].piece));
                }
            }
        }

        for &id in tail {
            head.push(id);
            self.search(head, &self.nodes[id].branches, facts);
            head.pop();
        }
    }

    fn four_corners(&self, roots: &[usize], facts: &mut Vec<Fact>) {
        let mut visited: HashMap<&Origin, HashSet<Square>> = HashMap::new();
        let mut stack = roots.to_vec();
        while let Some(id) = stack.pop() {
            let tnode = &self.nodes[id];
            if CORNERS.contains(&tnode.square) {
                visited
                    .entry(&tnode.origin)
                    .or_default()
                    .insert(tnode.square);
            }
            stack.extend(&tnode.branches);
        }
        for &id in roots {
            let tnode = &self.nodes[id];
            if visited
                .get(&tnode.origin)
                .is_some_and(|corners| corners.len() == CORNERS.len())
            {
                facts.push(piece_fact("FourCorners", &tnode.piece));
            }
        }
    }
}

/// Classify every closed stretch of `path`. Generic closed walks are only
/// reported at the top level; their insides are searched again for the
/// simpler classes.
fn closed_walks(path: &[&TNode], with_generics: bool, facts: &mut Vec<Fact>) {
    let squares: Vec<Square> = path.iter().map(|t| t.square).collect();
    let mut i = 0;
    while i < squares.len() {
        if let Some(j) = last_occurrence(&squares, i) {
            let piece = &path[i].piece;
            let capture = path[i..=j].iter().any(|t| t.is_capture);
            if is_palindrome(&squares[i..=j]) {
                facts.push(cycle_fact("TraceBack", piece, (j - i) / 2, capture));
            } else if all_different(&squares[i..j]) {
                let class = if collinear(&squares[i..j]) {
                    "LinearCycle"
                } else {
                    "ArealCycle"
                };
                facts.push(cycle_fact(class, piece, j - i, capture));
            } else {
                if with_generics {
                    facts.push(cycle_fact("ClosedWalk", piece, j - i, capture));
                }
                closed_walks(&path[i..j], false, facts);
            }
            i = j;
        }
        i += 1;
    }
}

/// Last index after `i` holding the same square as `i`.
fn last_occurrence(squares: &[Square], i: usize) -> Option<usize> {
    (i + 1..squares.len()).rev().find(|&k| squares[k] == squares[i])
}

fn is_palindrome(squares: &[Square]) -> bool {
    squares.iter().eq(squares.iter().rev())
}

fn all_different(squares: &[Square]) -> bool {
    let mut seen = HashSet::new();
    squares.iter().all(|sq| seen.insert(*sq))
}

fn collinear(squares: &[Square]) -> bool {
    if squares.len() < 3 {
        return true;
    }
    let (x0, y0) = coords(squares[0]);
    let (x1, y1) = coords(squares[1]);
    let (dx, dy) = (x1 - x0, y1 - y0);
    squares[2..].iter().all(|&sq| {
        let (x, y) = coords(sq);
        dx * (y - y0) == (x - x0) * dy
    })
}

/// The patterns that fit on the board around `square`.
fn patterns(square: Square) -> impl Iterator<Item = (&'static str, BTreeSet<Square>)> {
    let (file, rank) = coords(square);
    PATTERNS.iter().filter_map(move |&(name, vectors)| {
        vectors
            .iter()
            .map(|&(df, dr)| square_at(file + df, rank + dr))
            .collect::<Option<BTreeSet<Square>>>()
            .map(|squares| (name, squares))
    })
}

fn piece_fact(name: &str, piece: &str) -> Fact {
    Fact::new(name, vec![FactParam::Piece(piece.to_string())])
}

fn cycle_fact(name: &str, piece: &str, length: usize, capture: bool) -> Fact {
    Fact::new(
        name,
        vec![
            FactParam::Piece(piece.to_string()),
            FactParam::Int(length),
            FactParam::Bool(capture),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationPolicy;
    use crate::entry::{Algebraic, ProblemEntry};
    use crate::parser::parse;
    use crate::predicate::{FactAccumulator, FactSet, PredicateCatalog};

    fn entry(white: &[&str], black: &[&str], stipulation: &str, solution: &str) -> ProblemEntry {
        ProblemEntry {
            id: None,
            stipulation: stipulation.to_string(),
            algebraic: Algebraic {
                white: white.iter().map(|s| s.to_string()).collect(),
                black: black.iter().map(|s| s.to_string()).collect(),
                neutral: Vec::new(),
            },
            twins: Default::default(),
            intended_solutions: None,
            options: Vec::new(),
            solution: solution.to_string(),
        }
    }

    fn run(entry: &ProblemEntry, config: &AnalysisConfig) -> FactSet {
        let solution = parse(&entry.solution).unwrap();
        let mut board = entry.board().unwrap();
        let catalog = PredicateCatalog::builtin().unwrap();
        let mut facts = FactAccumulator::new(catalog, ValidationPolicy::Strict);
        let mut ctx = AnalysisContext {
            entry,
            solution: &solution,
            board: &mut board,
            config,
            facts: &mut facts,
        };
        TrajectoryAnalyzer.analyze(&mut ctx).unwrap();
        assert_eq!(board, entry.board().unwrap());
        facts.into_facts()
    }

    fn squares(names: &[&str]) -> Vec<Square> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    #[test]
    fn test_collinear() {
        assert!(collinear(&squares(&["a1", "a4"])));
        assert!(collinear(&squares(&["a1", "c3", "h8"])));
        assert!(collinear(&squares(&["b1", "b5", "b8", "b2"])));
        assert!(!collinear(&squares(&["a1", "a4", "d4"])));
    }

    #[test]
    fn test_palindrome_and_distinct() {
        assert!(is_palindrome(&squares(&["a1", "a5", "a1"])));
        assert!(!is_palindrome(&squares(&["a1", "a5", "b5", "a1"])));
        assert!(all_different(&squares(&["a1", "a5", "b5"])));
        assert!(!all_different(&squares(&["a1", "a5", "a1"])));
        assert_eq!(last_occurrence(&squares(&["a1", "a5", "a1", "a5"]), 1), Some(3));
        assert_eq!(last_occurrence(&squares(&["a1", "a5"]), 0), None);
    }

    #[test]
    fn test_patterns_clip_at_board_edge() {
        let names: Vec<&str> = patterns(Square::E2).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Star", "Cross", "Albino"]);

        let (_, albino) = patterns(Square::E2)
            .find(|(name, _)| *name == "Albino")
            .unwrap();
        let fan: BTreeSet<Square> = squares(&["d3", "f3", "e3", "e4"]).into_iter().collect();
        assert_eq!(albino, fan);
        assert_eq!(patterns(Square::A1).count(), 0);
        assert_eq!(patterns(Square::E5).count(), PATTERNS.len());
    }

    #[test]
    fn test_traceback() {
        let e = entry(
            &["Ke1", "Ra1"],
            &["Kh8"],
            "#3",
            "1.Ra1-a5 Kh8-g8 2.Ra5-a1 Kg8-h8",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("TraceBack(wR, 1, false)"), 1);
        assert_eq!(facts.count("TraceBack(bK, 1, false)"), 1);
        assert!(!facts.contains("CornerToCorner(wR)"));
    }

    #[test]
    fn test_areal_cycle() {
        let e = entry(
            &["Ke1", "Ra1"],
            &["Kh8"],
            "#5",
            "1.Ra1-a4 Kh8-g8 2.Ra4-d4 Kg8-h8 3.Rd4-d1 Kh8-g8 4.Rd1-a1 Kg8-h8",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("ArealCycle(wR, 4, false)"), 1);
        assert_eq!(facts.count("TraceBack(bK, 2, false)"), 1);
    }

    #[test]
    fn test_linear_cycle_and_corner_to_corner() {
        let e = entry(
            &["Ke1", "Ra1"],
            &["Kh8"],
            "#4",
            "1.Ra1-a4 Kh8-g8 2.Ra4-a8 Kg8-h8 3.Ra8-a1 Kh8-g8",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("LinearCycle(wR, 3, false)"), 1);
        assert_eq!(facts.count("CornerToCorner(wR)"), 2);
        assert_eq!(facts.count("TraceBack(bK, 1, false)"), 1);
    }

    #[test]
    fn test_four_corners() {
        let e = entry(
            &["Kc3", "Ra1"],
            &["Kd5"],
            "#5",
            "1.Ra1-a8 Kd5-d6 2.Ra8-h8 Kd6-d5 3.Rh8-h1 Kd5-d6 4.Rh1-a1",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("FourCorners(wR)"), 1);
        assert_eq!(facts.count("ArealCycle(wR, 4, false)"), 1);
        assert_eq!(facts.count("CornerToCorner(wR)"), 4);
    }

    #[test]
    fn test_albino() {
        let e = entry(
            &["Ka1", "Pe2"],
            &["Kh8", "Pd3", "Pf3"],
            "#1",
            "1.e2-e3 # 1.e2-e4 # 1.e2*d3 # 1.e2*f3 #",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("Albino(wP)"), 1);
        assert!(!facts.contains("Pickaninny(bP)"));
    }

    #[test]
    fn test_place_exchange() {
        let e = entry(
            &["Ke1", "Qa1", "Bb2"],
            &["Kh8"],
            "#3",
            "1.Qa1-c3 Kh8-g8 2.Bb2-a1 Kg8-h8 3.Qc3-b2 #",
        );
        let facts = run(&e, &AnalysisConfig::default());
        assert_eq!(facts.count("PW(2)"), 1);
        assert_eq!(facts.count("PWPiece(wQ)"), 1);
        assert_eq!(facts.count("PWPiece(wB)"), 1);
    }

    #[test]
    fn test_refutations_can_be_excluded() {
        let e = entry(
            &["Ke1", "Ra1"],
            &["Kh8"],
            "#2",
            "1.Ra1-a5 ? but 1...Kh8-h1 ! 1.Ra1-a7 ! Kh8-g8 2.Ra7-a1",
        );
        let all = run(&e, &AnalysisConfig::default());
        assert_eq!(all.count("CornerToCorner(bK)"), 1);
        assert_eq!(all.count("TraceBack(wR, 1, false)"), 1);

        let config = AnalysisConfig {
            include_tries: false,
            ..AnalysisConfig::default()
        };
        let keyplay = run(&e, &config);
        assert!(!keyplay.contains("CornerToCorner(bK)"));
        assert_eq!(keyplay.count("TraceBack(wR, 1, false)"), 1);
    }
}
