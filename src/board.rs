//! Mutable 8x8 position: pieces with tracked origins, side to move and
//! imitator squares.
//!
//! Squares use the `shakmaty` numbering (a1 = 0, h8 = 63). Every mutation
//! made while replaying a solution goes through [`Board::replace`] and is
//! journaled in an [`Undo`] record so it can be reverted exactly.

use std::fmt;

use shakmaty::Square;

use crate::error::EntryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    White,
    Black,
    Neutral,
}

impl Color {
    pub fn from_letter(letter: char) -> Option<Color> {
        match letter {
            'w' => Some(Color::White),
            'b' => Some(Color::Black),
            'n' => Some(Color::Neutral),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
            Color::Neutral => 'n',
        }
    }

    /// The other side. Neutral has no opponent and maps to itself.
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
            Color::Neutral => Color::Neutral,
        }
    }
}

/// Stable identity of a piece across the whole solution tree.
///
/// Initial pieces are named after the twin that introduced them and their
/// square (`"Ae4"`, `"Bh1"`), reborn pieces without a captured origin get a
/// synthetic `"<square>/<depth>"` label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(String);

impl Origin {
    pub fn initial(twin_id: &str, square: Square) -> Origin {
        Origin(format!("{}{}", twin_id.to_uppercase(), square))
    }

    pub fn synthetic(square: Square, depth: usize) -> Origin {
        Origin(format!("{}/{}", square, depth))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Piece {
    pub name: String,
    pub color: Color,
    /// Fairy properties, e.g. `["Chameleon"]` or `["hm"]`.
    pub specs: Vec<String>,
    pub origin: Origin,
}

impl Piece {
    pub fn new(name: &str, color: Color, specs: Vec<String>, origin: Origin) -> Self {
        Piece {
            name: name.to_string(),
            color,
            specs,
            origin,
        }
    }

    /// Color letter followed by the upper-cased name, e.g. `wK` or `n25`.
    pub fn code(&self) -> String {
        format!("{}{}", self.color.letter(), self.name.to_uppercase())
    }
}

/// Build a square from zero-based file and rank, `None` when off the board.
pub fn square_at(file: i32, rank: i32) -> Option<Square> {
    if (0..8).contains(&file) && (0..8).contains(&rank) {
        Some(Square::new((rank * 8 + file) as u32))
    } else {
        None
    }
}

pub fn coords(square: Square) -> (i32, i32) {
    (square.file() as i32, square.rank() as i32)
}

/// Journal of the changes made by one `make`, consumed by [`Board::revert`].
#[derive(Clone, Debug, Default)]
pub struct Undo {
    cells: Vec<(Square, Option<Piece>)>,
    side_to_move: Option<Color>,
    imitators: Option<Vec<Square>>,
}

impl Undo {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.side_to_move.is_none() && self.imitators.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Piece>; 64],
    side_to_move: Color,
    imitators: Vec<Square>,
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            cells: std::array::from_fn(|_| None),
            side_to_move: Color::White,
            imitators: Vec::new(),
        }
    }

    /// Build the initial position from per-color piece lists such as
    /// `["Kc7", "Chameleon Qd4", "25a1"]`. Origins are `A` + square.
    pub fn from_algebraic(
        white: &[String],
        black: &[String],
        neutral: &[String],
    ) -> Result<Board, EntryError> {
        let mut board = Board::new();
        for (color, decls) in [
            (Color::White, white),
            (Color::Black, black),
            (Color::Neutral, neutral),
        ] {
            for decl in decls {
                let (piece, square) = parse_declaration(decl, color)?;
                if board.at(square).is_some() {
                    return Err(EntryError::DuplicateSquare {
                        square: square.to_string(),
                    });
                }
                board.replace(square, Some(piece));
            }
        }
        Ok(board)
    }

    pub fn at(&self, square: Square) -> Option<&Piece> {
        self.cells[square as usize].as_ref()
    }

    /// Put `piece` (or nothing) on `square`, returning what was there.
    pub fn replace(&mut self, square: Square, piece: Option<Piece>) -> Option<Piece> {
        std::mem::replace(&mut self.cells[square as usize], piece)
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn set_side_to_move(&mut self, color: Color) {
        self.side_to_move = color;
    }

    pub fn imitators(&self) -> &[Square] {
        &self.imitators
    }

    /// Occupied squares in a1..h8 order.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, &Piece)> + '_ {
        Square::ALL
            .into_iter()
            .filter_map(move |sq| self.cells[sq as usize].as_ref().map(|p| (sq, p)))
    }

    /// Square currently holding the piece with `origin`.
    pub fn find(&self, origin: &Origin) -> Option<Square> {
        self.pieces()
            .find(|(_, piece)| &piece.origin == origin)
            .map(|(sq, _)| sq)
    }

    pub(crate) fn record(&mut self, undo: &mut Undo, square: Square, piece: Option<Piece>) {
        let previous = self.replace(square, piece);
        undo.cells.push((square, previous));
    }

    pub(crate) fn record_side_to_move(&mut self, undo: &mut Undo, color: Color) {
        if undo.side_to_move.is_none() {
            undo.side_to_move = Some(self.side_to_move);
        }
        self.side_to_move = color;
    }

    pub(crate) fn record_imitators(&mut self, undo: &mut Undo, squares: Vec<Square>) {
        let previous = std::mem::replace(&mut self.imitators, squares);
        if undo.imitators.is_none() {
            undo.imitators = Some(previous);
        }
    }

    /// Undo every change journaled in `undo`, newest first.
    pub fn revert(&mut self, undo: Undo) {
        for (square, previous) in undo.cells.into_iter().rev() {
            self.cells[square as usize] = previous;
        }
        if let Some(color) = undo.side_to_move {
            self.side_to_move = color;
        }
        if let Some(imitators) = undo.imitators {
            self.imitators = imitators;
        }
    }

    /// Canonical text form including origins, used to compare states.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (sq, piece) in self.pieces() {
            out.push_str(&piece.code());
            for spec in &piece.specs {
                out.push(':');
                out.push_str(spec);
            }
            out.push_str(&format!("{}@{} ", sq, piece.origin));
        }
        out.push_str(&format!("stm={}", self.side_to_move.letter()));
        if !self.imitators.is_empty() {
            out.push_str(" I");
            for sq in &self.imitators {
                out.push_str(&format!(" {}", sq));
            }
        }
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let cell = square_at(file, rank).and_then(|sq| self.at(sq));
                match cell {
                    Some(piece) => write!(f, "{:>4}", piece.code())?,
                    None => write!(f, "{:>4}", ".")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn parse_declaration(decl: &str, color: Color) -> Result<(Piece, Square), EntryError> {
    let invalid = || EntryError::InvalidPiece(decl.to_string());
    let mut parts: Vec<&str> = decl.split_whitespace().collect();
    let last = parts.pop().ok_or_else(invalid)?;
    if last.len() < 3 || !last.is_char_boundary(last.len() - 2) {
        return Err(invalid());
    }
    let (name, square) = last.split_at(last.len() - 2);
    let square: Square = square.parse().map_err(|_| invalid())?;
    let specs = parts.into_iter().map(str::to_string).collect();
    let piece = Piece::new(name, color, specs, Origin::initial("a", square));
    Ok((piece, square))
}
