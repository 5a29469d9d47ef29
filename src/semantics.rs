//! Replaying a solution tree on a board.
//!
//! Every node can be made and unmade: [`Node::make`] applies the node to the
//! board and returns the [`Undo`] journal that [`Node::unmake`] consumes to
//! restore the exact previous state. [`traverse`] walks a tree depth first
//! under that discipline, handing every node to a [`PlyVisitor`] together
//! with the position it is played from.

use shakmaty::{File, Rank, Square};

use crate::board::{coords, square_at, Board, Color, Origin, Piece, Undo};
use crate::error::{AnalysisError, SemanticError};
use crate::nodes::{Castling, Move, Node, NodeKind, PieceDecl, SideEffects, Twin, TwinCommand};

/// Callback invoked by [`traverse`] for every node before it is made.
pub trait PlyVisitor {
    fn visit(&mut self, node: &Node, board: &Board) -> Result<(), AnalysisError>;
}

/// Depth-first make/visit/unmake walk. The board is restored even when a
/// visitor or a descendant fails.
pub fn traverse<V: PlyVisitor>(
    node: &Node,
    board: &mut Board,
    visitor: &mut V,
) -> Result<(), AnalysisError> {
    visitor.visit(node, board)?;
    let undo = node.make(board)?;
    let result = node
        .children
        .iter()
        .try_for_each(|child| traverse(child, board, visitor));
    node.unmake(board, undo);
    result
}

/// Asserts each ply against the position it is played from and counts nodes.
#[derive(Debug, Default)]
pub struct SemanticValidator {
    pub nodes: usize,
}

impl PlyVisitor for SemanticValidator {
    fn visit(&mut self, node: &Node, board: &Board) -> Result<(), AnalysisError> {
        self.nodes += 1;
        node.assert_semantics(board)?;
        Ok(())
    }
}

/// Applies journaled changes to a board. Dropping a recorder without calling
/// `finish` leaves the changes in place, `abort` reverts them.
struct Recorder<'b> {
    board: &'b mut Board,
    undo: Undo,
}

impl<'b> Recorder<'b> {
    fn new(board: &'b mut Board) -> Self {
        Recorder {
            board,
            undo: Undo::default(),
        }
    }

    fn put(&mut self, at: Square, piece: Option<Piece>) {
        self.board.record(&mut self.undo, at, piece);
    }

    fn take(&mut self, at: Square) -> Option<Piece> {
        let piece = self.board.at(at).cloned();
        if piece.is_some() {
            self.put(at, None);
        }
        piece
    }

    fn relocate(&mut self, from: Square, to: Square) -> Option<()> {
        let piece = self.take(from)?;
        self.put(to, Some(piece));
        Some(())
    }

    fn flip(&mut self) {
        let next = self.board.side_to_move().opposite();
        self.board.record_side_to_move(&mut self.undo, next);
    }

    fn finish(self) -> Undo {
        self.undo
    }

    fn abort<T>(self, error: SemanticError) -> Result<T, SemanticError> {
        self.board.revert(self.undo);
        Err(error)
    }
}

impl Node {
    /// Apply this node to `board`. Fails without touching the board when the
    /// node does not fit the position.
    pub fn make(&self, board: &mut Board) -> Result<Undo, SemanticError> {
        match &self.kind {
            NodeKind::Root => Ok(Undo::default()),
            NodeKind::Twin(twin) => make_twin(twin, board, self.depth),
            NodeKind::Move(m) => {
                self.assert_semantics(board)?;
                make_move(m, board, self.depth)
            }
            NodeKind::Castling(c) => {
                self.assert_semantics(board)?;
                make_castling(c, board, self.depth)
            }
            NodeKind::Null { .. } => {
                let mut rec = Recorder::new(board);
                rec.flip();
                Ok(rec.finish())
            }
        }
    }

    pub fn unmake(&self, board: &mut Board, undo: Undo) {
        board.revert(undo);
    }

    /// Square the moving unit leaves, if this node moves anything.
    pub fn departure(&self, board: &Board) -> Option<Square> {
        match &self.kind {
            NodeKind::Move(m) => Some(m.departure),
            NodeKind::Castling(c) => Some(castling_squares(board.side_to_move(), c.kingside)[0]),
            _ => None,
        }
    }

    /// Check that this ply is consistent with `board`. Twins, nulls and the
    /// root always are.
    pub fn assert_semantics(&self, board: &Board) -> Result<(), SemanticError> {
        let fail = |message: String| Err(SemanticError::new(self.depth, message));
        match &self.kind {
            NodeKind::Move(m) => {
                if board.at(m.departure).is_none() {
                    return fail(format!("departure from empty square {}", m.departure));
                }
                if board.at(m.arrival).is_some() && m.arrival != m.departure {
                    match m.capture {
                        None => {
                            return fail(format!(
                                "arrival square {} is occupied but no capture is specified",
                                m.arrival
                            ))
                        }
                        Some(cap) if cap != m.arrival => {
                            return fail(format!(
                                "arrival square {} is occupied but the capture is at {}",
                                m.arrival, cap
                            ))
                        }
                        Some(_) => {}
                    }
                }
                if let Some(cap) = m.capture {
                    if board.at(cap).is_none() {
                        return fail(format!("capture at empty square {}", cap));
                    }
                }
                if m.effects.reborn_at(m.arrival) {
                    return fail(format!("rebirth at arrival square {}", m.arrival));
                }
                Ok(())
            }
            NodeKind::Castling(c) => {
                let [king, king_to, rook, rook_to] = castling_squares(board.side_to_move(), c.kingside);
                if board.at(king).is_none() {
                    return fail(format!("can't castle: the king square {} is empty", king));
                }
                if board.at(rook).is_none() {
                    return fail(format!("can't castle: the rook square {} is empty", rook));
                }
                if let Some(square) = [king_to, rook_to].into_iter().find(|&sq| c.effects.reborn_at(sq)) {
                    return fail(format!("rebirth at arrival square {}", square));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// King from/to and rook from/to for `side` castling on the given wing.
fn castling_squares(side: Color, kingside: bool) -> [Square; 4] {
    let rank = if side == Color::Black {
        Rank::Eighth
    } else {
        Rank::First
    };
    let at = |file: File| Square::from_coords(file, rank);
    if kingside {
        [at(File::E), at(File::G), at(File::H), at(File::F)]
    } else {
        [at(File::E), at(File::C), at(File::A), at(File::D)]
    }
}

fn make_castling(c: &Castling, board: &mut Board, depth: usize) -> Result<Undo, SemanticError> {
    let side = board.side_to_move();
    let [king_from, king_to, rook_from, rook_to] = castling_squares(side, c.kingside);
    let mut rec = Recorder::new(board);
    rec.relocate(king_from, king_to);
    rec.relocate(rook_from, rook_to);
    rec.flip();
    if let Err(error) = apply_effects(&c.effects, &mut rec, side, None, depth) {
        return rec.abort(error);
    }
    Ok(rec.finish())
}

fn declared_piece(decl: &PieceDecl, fallback: Color, origin: Origin) -> Piece {
    Piece::new(
        &decl.name,
        decl.color.unwrap_or(fallback),
        decl.specs.clone(),
        origin,
    )
}

fn make_move(m: &Move, board: &mut Board, depth: usize) -> Result<Undo, SemanticError> {
    let side = board.side_to_move();
    let mut rec = Recorder::new(board);

    let Some(mover) = rec.take(m.departure) else {
        return rec.abort(SemanticError::new(
            depth,
            format!("departure from empty square {}", m.departure),
        ));
    };
    let captured = m.capture.and_then(|cap| rec.take(cap));
    let arriving = match &m.promotion {
        Some(decl) => declared_piece(decl, mover.color, mover.origin.clone()),
        None => mover,
    };
    rec.put(m.arrival, Some(arriving));
    rec.flip();

    let captured_origin = captured.map(|piece| piece.origin);
    if let Err(error) = apply_effects(&m.effects, &mut rec, side, captured_origin, depth) {
        return rec.abort(error);
    }
    Ok(rec.finish())
}

/// Apply the bracketed consequences of a ply made by `side`. Rebirths take
/// the identity of the piece captured by the ply, if any.
fn apply_effects(
    effects: &SideEffects,
    rec: &mut Recorder<'_>,
    side: Color,
    captured: Option<Origin>,
    depth: usize,
) -> Result<(), SemanticError> {
    for (color, squares) in &effects.recolorings {
        for &sq in squares {
            if let Some(mut piece) = rec.take(sq) {
                piece.color = *color;
                rec.put(sq, Some(piece));
            }
        }
    }

    for anti in &effects.antirebirths {
        let Some(mut piece) = rec.take(anti.from) else {
            return Err(SemanticError::new(
                depth,
                format!("antirebirth from empty square {}", anti.from),
            ));
        };
        if let Some(decl) = &anti.promotion {
            piece.name = decl.name.clone();
            piece.specs = decl.specs.clone();
        }
        rec.put(anti.to, Some(piece));
    }

    for rebirth in &effects.rebirths {
        let origin = captured
            .clone()
            .unwrap_or_else(|| Origin::synthetic(rebirth.at, depth));
        let unit_color = rebirth.unit.color.unwrap_or(side);
        let piece = match &rebirth.promotion {
            Some(decl) => declared_piece(decl, unit_color, origin),
            None => declared_piece(&rebirth.unit, unit_color, origin),
        };
        rec.put(rebirth.at, Some(piece));
    }

    // only the name changes, and the specs when the unit names some
    for promotion in &effects.remote_promotions {
        let Some(mut piece) = rec.take(promotion.at) else {
            return Err(SemanticError::new(
                depth,
                format!("promotion on empty square {}", promotion.at),
            ));
        };
        piece.name = promotion.unit.name.clone();
        if !promotion.unit.specs.is_empty() {
            piece.specs = promotion.unit.specs.clone();
        }
        rec.put(promotion.at, Some(piece));
    }

    if !effects.imitators.is_empty() {
        rec.board.record_imitators(&mut rec.undo, effects.imitators.clone());
    }

    for &sq in &effects.removals {
        rec.take(sq);
    }
    Ok(())
}

fn make_twin(twin: &Twin, board: &mut Board, depth: usize) -> Result<Undo, SemanticError> {
    let mut rec = Recorder::new(board);
    if let Err(error) = apply_twin(twin, &mut rec, depth) {
        return rec.abort(error);
    }
    Ok(rec.finish())
}

/// Apply the anticipator chain first, then this twin's own commands.
fn apply_twin(twin: &Twin, rec: &mut Recorder<'_>, depth: usize) -> Result<(), SemanticError> {
    if let Some(anticipator) = &twin.anticipator {
        apply_twin(anticipator, rec, depth)?;
    }
    for command in &twin.commands {
        apply_command(command, &twin.id, rec, depth)?;
    }
    Ok(())
}

fn apply_command(
    command: &TwinCommand,
    twin_id: &str,
    rec: &mut Recorder<'_>,
    depth: usize,
) -> Result<(), SemanticError> {
    let empty = |sq: Square| SemanticError::new(depth, format!("twin {}) refers to empty square {}", twin_id, sq));
    match command {
        TwinCommand::Move { from, to, .. } => {
            rec.relocate(*from, *to).ok_or_else(|| empty(*from))?;
        }
        TwinCommand::Exchange { from, to } => {
            let first = rec.take(*from).ok_or_else(|| empty(*from))?;
            let second = rec.take(*to).ok_or_else(|| empty(*to))?;
            rec.put(*to, Some(first));
            rec.put(*from, Some(second));
        }
        TwinCommand::Remove { at, .. } => {
            rec.take(*at).ok_or_else(|| empty(*at))?;
        }
        TwinCommand::Add { piece, at } => {
            let color = piece.color.unwrap_or(Color::White);
            rec.put(*at, Some(declared_piece(piece, color, Origin::initial(twin_id, *at))));
        }
        TwinCommand::Substitute { from, to } => {
            let targets: Vec<Square> = rec
                .board
                .pieces()
                .filter(|(_, p)| from.matches(&p.name, p.color))
                .map(|(sq, _)| sq)
                .collect();
            for sq in targets {
                if let Some(piece) = rec.take(sq) {
                    rec.put(sq, Some(declared_piece(to, piece.color, piece.origin)));
                }
            }
        }
        TwinCommand::Rotate(angle) => {
            let turns = angle / 90;
            transform(rec, |file, rank| {
                (0..turns).fold((file, rank), |(f, r), _| (7 - r, f))
            });
        }
        TwinCommand::Mirror(a, b) => {
            let reflect: fn(i32, i32) -> (i32, i32) = match (*a, *b) {
                (Square::A1, Square::H1) | (Square::H1, Square::A1) => |f, r| (7 - f, r),
                (Square::A1, Square::A8) | (Square::A8, Square::A1) => |f, r| (f, 7 - r),
                (Square::A1, Square::H8) | (Square::H8, Square::A1) => |f, r| (7 - r, 7 - f),
                (Square::H1, Square::A8) | (Square::A8, Square::H1) => |f, r| (r, f),
                _ => {
                    return Err(SemanticError::new(
                        depth,
                        format!("unsupported mirror axis {}<-->{}", a, b),
                    ))
                }
            };
            transform(rec, reflect);
        }
        TwinCommand::Shift(p, q) => {
            let ((pf, pr), (qf, qr)) = (coords(*p), coords(*q));
            let (df, dr) = (qf - pf, qr - pr);
            transform(rec, |f, r| (f + df, r + dr));
        }
        TwinCommand::PolishType => {
            let targets: Vec<Square> = rec.board.pieces().map(|(sq, _)| sq).collect();
            for sq in targets {
                if let Some(mut piece) = rec.take(sq) {
                    piece.color = match piece.color {
                        Color::Neutral => Color::Neutral,
                        color => color.opposite(),
                    };
                    rec.put(sq, Some(piece));
                }
            }
        }
        TwinCommand::Imitator(squares) => {
            rec.board.record_imitators(&mut rec.undo, squares.clone());
        }
    }
    Ok(())
}

/// Move every piece through `f`; pieces mapped off the board are dropped.
fn transform<F: Fn(i32, i32) -> (i32, i32)>(rec: &mut Recorder<'_>, f: F) {
    let occupied: Vec<Square> = rec.board.pieces().map(|(sq, _)| sq).collect();
    let lifted: Vec<(Square, Piece)> = occupied
        .into_iter()
        .filter_map(|sq| rec.take(sq).map(|p| (sq, p)))
        .collect();
    for (sq, piece) in lifted {
        let (file, rank) = coords(sq);
        let (file, rank) = f(file, rank);
        if let Some(target) = square_at(file, rank) {
            rec.put(target, Some(piece));
        }
    }
}
