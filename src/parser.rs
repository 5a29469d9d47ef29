//! Recursive-descent parser from tokens to the solution tree.
//!
//! # Example
//!
//! ```
//! let root = popeye_themes::parser::parse("1.Qb4-f4 g2-g4 2.Sc3-e4 d2-d4 #").unwrap();
//! assert_eq!(root.size(), 6);
//! ```

use shakmaty::Square;

use crate::board::{square_at, Color};
use crate::error::{AnalysisError, ParseError};
use crate::lexer::{tokenize, Lexeme, Token};
use crate::nodes::{
    link_continued_twins, unflatten, Antirebirth, Castling, Move, Node, NodeKind, PieceDecl,
    Rebirth, RemotePromotion, SideEffects, Twin, TwinCommand,
};

/// Move numbers above this are rejected rather than expanded into null plies.
const MAX_MOVE_NUMBER: u32 = 255;

const RESIDUAL_CHARS: usize = 40;

/// Tokenize, parse and assemble `text` into a rooted solution tree.
pub fn parse(text: &str) -> Result<Node, AnalysisError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(text, tokens);
    let (root, flat) = parser.solution()?;
    let mut root = unflatten(root, flat).map_err(|e| located(e, text))?;
    link_continued_twins(&mut root).map_err(|e| located(e, text))?;
    Ok(root)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Lexeme>,
    pos: usize,
}

/// Suffixes collected while reading a ply.
#[derive(Default)]
struct PlySuffix {
    promotion: Option<PieceDecl>,
    check_sign: Option<String>,
    effects: SideEffects,
    arrival_recoloring: Option<Color>,
}

/// A `=` read as a suffix is the stalemate sign.
fn with_suffix_sign(node: Node, sign: Option<String>) -> Node {
    match sign {
        Some(sign) => node.with_check_sign(&sign),
        None => node,
    }
}

fn residual(text: &str, position: usize) -> String {
    text.get(position..)
        .unwrap_or_default()
        .chars()
        .take(RESIDUAL_CHARS)
        .collect()
}

/// Attach the text at the error position to an error raised while
/// assembling the tree.
fn located(mut error: ParseError, text: &str) -> ParseError {
    error.residual = residual(text, error.position);
    error
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, tokens: Vec<Lexeme>) -> Self {
        Parser { text, tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|l| &l.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|l| l.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Byte offset of the next token, the text length at the end.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.text.len(), |l| l.offset)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.offset(), message)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            position,
            message: message.into(),
            residual: residual(self.text, position),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn square(&mut self) -> Result<Square, ParseError> {
        match self.peek() {
            Some(Token::Square(sq)) => {
                let sq = *sq;
                self.pos += 1;
                Ok(sq)
            }
            _ => Err(self.error("expected a square")),
        }
    }

    fn square_list(&mut self) -> Result<Vec<Square>, ParseError> {
        let mut squares = vec![self.square()?];
        loop {
            if self.peek() == Some(&Token::Comma) && matches!(self.peek_at(1), Some(Token::Square(_))) {
                self.pos += 1;
            }
            match self.peek() {
                Some(Token::Square(_)) => squares.push(self.square()?),
                _ => return Ok(squares),
            }
        }
    }

    fn comments(&mut self) -> Vec<String> {
        let mut comments = Vec::new();
        while let Some(Token::Comment(text)) = self.peek() {
            comments.push(text.clone());
            self.pos += 1;
        }
        comments
    }

    /// Solution := Comments? (MoveList | TwinList)?
    fn solution(&mut self) -> Result<(Node, Vec<Node>), ParseError> {
        let mut root = Node::root();
        root.comments = self.comments();
        let mut flat = Vec::new();
        if self.at_end() {
            return Ok((root, flat));
        }
        if self.starts_twin() {
            while !self.at_end() {
                if !self.starts_twin() {
                    return Err(self.error("expected a twin header"));
                }
                flat.push(self.twin_header()?);
                self.move_list(&mut flat)?;
            }
        } else {
            flat.push(Node::new(
                NodeKind::Twin(Twin {
                    id: "a".to_string(),
                    continued: false,
                    implicit: true,
                    commands: Vec::new(),
                    anticipator: None,
                }),
                1,
            ));
            self.move_list(&mut flat)?;
            if !self.at_end() {
                return Err(self.error("unexpected trailing input"));
            }
        }
        Ok((root, flat))
    }

    fn starts_twin(&self) -> bool {
        match self.peek() {
            Some(Token::TwinId(_)) => true,
            Some(Token::Plus) => matches!(self.peek_at(1), Some(Token::TwinId(_))),
            _ => false,
        }
    }

    fn twin_header(&mut self) -> Result<Node, ParseError> {
        let offset = self.offset();
        let continued = self.eat(&Token::Plus);
        let id = match self.advance() {
            Some(Token::TwinId(id)) => id,
            _ => return Err(self.error("expected a twin identifier")),
        };
        let mut commands = Vec::new();
        while let Some(command) = self.twin_command()? {
            commands.push(command);
        }
        let mut node = Node::new(
            NodeKind::Twin(Twin {
                id,
                continued,
                implicit: false,
                commands,
                anticipator: None,
            }),
            1,
        );
        node.offset = offset;
        node.comments = self.comments();
        Ok(node)
    }

    fn twin_command(&mut self) -> Result<Option<TwinCommand>, ParseError> {
        let command = match self.peek() {
            Some(Token::Rotate) => {
                self.pos += 1;
                match self.advance() {
                    Some(Token::Angle(angle)) => TwinCommand::Rotate(angle),
                    _ => return Err(self.error("expected 90, 180 or 270")),
                }
            }
            Some(Token::Mirror) => {
                self.pos += 1;
                let first = self.square()?;
                self.expect(Token::DoublePointedArrow, "<-->")?;
                TwinCommand::Mirror(first, self.square()?)
            }
            Some(Token::Shift) => {
                self.pos += 1;
                let first = self.square()?;
                self.expect(Token::LongDoubleArrow, "==>")?;
                TwinCommand::Shift(first, self.square()?)
            }
            Some(Token::PolishType) => {
                self.pos += 1;
                TwinCommand::PolishType
            }
            Some(Token::Imitator) => {
                self.pos += 1;
                TwinCommand::Imitator(self.square_list()?)
            }
            Some(Token::Dash) => {
                self.pos += 1;
                let piece = self.long_piece_decl()?;
                TwinCommand::Remove {
                    piece,
                    at: self.square()?,
                }
            }
            Some(Token::Plus) if matches!(self.peek_at(1), Some(Token::Color(_))) => {
                self.pos += 1;
                let piece = self.long_piece_decl()?;
                TwinCommand::Add {
                    piece,
                    at: self.square()?,
                }
            }
            Some(Token::Color(_)) => {
                let piece = self.long_piece_decl()?;
                if self.eat(&Token::LongDoubleArrow) {
                    TwinCommand::Substitute {
                        from: piece,
                        to: self.long_piece_decl()?,
                    }
                } else {
                    let from = self.square()?;
                    if self.eat(&Token::LongArrow) {
                        TwinCommand::Move {
                            piece,
                            from,
                            to: self.square()?,
                        }
                    } else if self.eat(&Token::DoublePointedArrow) {
                        self.long_piece_decl()?;
                        TwinCommand::Exchange {
                            from,
                            to: self.square()?,
                        }
                    } else {
                        TwinCommand::Add { piece, at: from }
                    }
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// LongPieceDecl := COLOR FAIRY? PIECE_NAME
    fn long_piece_decl(&mut self) -> Result<PieceDecl, ParseError> {
        let color = match self.advance() {
            Some(Token::Color(color)) => color,
            _ => return Err(self.error("expected a color")),
        };
        let mut decl = self.bare_piece_decl()?;
        decl.color = Some(color);
        Ok(decl)
    }

    /// PieceDecl := 'n'? FAIRY? PIECE_NAME
    fn piece_decl(&mut self) -> Result<PieceDecl, ParseError> {
        let neutral = self.eat(&Token::Color(Color::Neutral));
        let mut decl = self.bare_piece_decl()?;
        if neutral {
            decl.color = Some(Color::Neutral);
        }
        Ok(decl)
    }

    fn bare_piece_decl(&mut self) -> Result<PieceDecl, ParseError> {
        let mut specs = Vec::new();
        if let Some(Token::FairyProperties(props)) = self.peek() {
            specs.push(props.clone());
            self.pos += 1;
        }
        match self.advance() {
            Some(Token::PieceName(name)) => Ok(PieceDecl {
                name,
                color: None,
                specs,
            }),
            _ => Err(self.error("expected a piece name")),
        }
    }

    fn starts_piece_decl(&self) -> bool {
        match self.peek() {
            Some(Token::PieceName(_)) | Some(Token::FairyProperties(_)) => true,
            Some(Token::Color(Color::Neutral)) => matches!(
                self.peek_at(1),
                Some(Token::PieceName(_)) | Some(Token::FairyProperties(_))
            ),
            _ => false,
        }
    }

    fn starts_half_move(&self) -> bool {
        self.starts_piece_decl()
            || matches!(
                self.peek(),
                Some(Token::Square(_)) | Some(Token::KingsideCastling) | Some(Token::QueensideCastling)
            )
    }

    fn move_list(&mut self, flat: &mut Vec<Node>) -> Result<(), ParseError> {
        if !matches!(self.peek(), Some(Token::MoveNumber(_)) | Some(Token::But)) {
            return Err(self.error("expected a move"));
        }
        while matches!(self.peek(), Some(Token::MoveNumber(_)) | Some(Token::But)) {
            self.move_entry(flat)?;
        }
        Ok(())
    }

    fn move_number(&mut self) -> Result<usize, ParseError> {
        match self.peek() {
            Some(Token::MoveNumber(n)) if *n <= MAX_MOVE_NUMBER => {
                let depth = 2 * *n as usize;
                self.pos += 1;
                Ok(depth)
            }
            Some(Token::MoveNumber(_)) => Err(self.error("move number out of range")),
            _ => Err(self.error("expected a move number")),
        }
    }

    fn move_entry(&mut self, flat: &mut Vec<Node>) -> Result<(), ParseError> {
        if self.eat(&Token::But) {
            let depth = self.move_number()?;
            self.expect(Token::HalfEllipsis, "..")?;
            let mut node = self.half_move(depth + 1)?;
            node.refutation = true;
            flat.push(node);
            return Ok(());
        }

        let depth = self.move_number()?;
        if self.eat(&Token::HalfEllipsis) {
            if self.eat(&Token::Ellipsis) {
                flat.push(Node::null(depth, false, false));
            } else {
                flat.push(self.half_move(depth + 1)?);
            }
            return Ok(());
        }

        let mut first = self.half_move(depth)?;
        if self.eat(&Token::Threat) {
            first.child_is_threat = true;
            flat.push(first);
        } else if self.eat(&Token::Zugzwang) {
            flat.push(first);
        } else if self.starts_half_move() {
            flat.push(first);
            flat.push(self.half_move(depth + 1)?);
        } else {
            flat.push(first);
        }
        Ok(())
    }

    /// HalfMove := Ply CheckSign? (ANNOTATION | Comment)*
    fn half_move(&mut self, depth: usize) -> Result<Node, ParseError> {
        let offset = self.offset();
        let mut node = self.ply(depth)?;
        node.offset = offset;
        match self.peek() {
            Some(Token::Mate) => {
                self.pos += 1;
                node = node.with_check_sign("#");
            }
            Some(Token::Plus) if !matches!(self.peek_at(1), Some(Token::TwinId(_))) => {
                self.pos += 1;
                node = node.with_check_sign("+");
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some(Token::Annotation(annotation)) => {
                    let annotation = annotation.clone();
                    self.pos += 1;
                    node.set_annotation(&annotation);
                }
                Some(Token::Comment(_)) => node.comments.extend(self.comments()),
                _ => return Ok(node),
            }
        }
    }

    fn ply(&mut self, depth: usize) -> Result<Node, ParseError> {
        let castling = match self.peek() {
            Some(Token::KingsideCastling) => Some(true),
            Some(Token::QueensideCastling) => Some(false),
            _ => None,
        };
        if let Some(kingside) = castling {
            self.pos += 1;
            let suffix_at = self.offset();
            let suffix = self.ply_suffixes()?;
            if suffix.promotion.is_some() || suffix.arrival_recoloring.is_some() {
                return Err(self.error_at(suffix_at, "castling cannot promote or recolor"));
            }
            let node = Node::new(
                NodeKind::Castling(Castling {
                    kingside,
                    effects: suffix.effects,
                    annotation: String::new(),
                    check_sign: String::new(),
                }),
                depth,
            );
            return Ok(with_suffix_sign(node, suffix.check_sign));
        }

        let mut m = match self.peek() {
            Some(Token::Square(_)) => {
                let mut m = self.squares(PieceDecl::pawn())?;
                while self.eat(&Token::EnPassant) {
                    m.en_passant = true;
                    m.capture = square_at(m.arrival.file() as i32, m.departure.rank() as i32);
                }
                m
            }
            _ if self.starts_piece_decl() => {
                let departant = self.piece_decl()?;
                self.squares(departant)?
            }
            _ => return Err(self.error("expected a move")),
        };
        let suffix = self.ply_suffixes()?;
        m.promotion = suffix.promotion;
        m.effects = suffix.effects;
        if let Some(color) = suffix.arrival_recoloring {
            m.effects.recolorings.entry(color).or_default().push(m.arrival);
        }
        Ok(with_suffix_sign(Node::new(NodeKind::Move(m), depth), suffix.check_sign))
    }

    /// Squares := SQ '-' SQ | SQ '*' SQ | SQ '*' SQ '-' SQ
    fn squares(&mut self, departant: PieceDecl) -> Result<Move, ParseError> {
        let departure = self.square()?;
        match self.peek() {
            Some(Token::Dash) => {
                self.pos += 1;
                let arrival = self.square()?;
                Ok(Move::new(departant, departure, arrival, None))
            }
            Some(Token::Asterisk) => {
                self.pos += 1;
                let captured = self.square()?;
                if self.peek() == Some(&Token::Dash) && matches!(self.peek_at(1), Some(Token::Square(_))) {
                    self.pos += 1;
                    let arrival = self.square()?;
                    Ok(Move::new(departant, departure, arrival, Some(captured)))
                } else {
                    Ok(Move::new(departant, departure, captured, Some(captured)))
                }
            }
            _ => Err(self.error("expected '-' or '*'")),
        }
    }

    /// True when the tokens ahead spell a promotion piece rather than a bare color.
    fn color_starts_piece(&self) -> bool {
        matches!(
            self.peek_at(1),
            Some(Token::PieceName(_)) | Some(Token::FairyProperties(_))
        )
    }

    fn ply_suffixes(&mut self) -> Result<PlySuffix, ParseError> {
        let mut suffix = PlySuffix::default();
        loop {
            match self.peek() {
                Some(Token::Equals) => {
                    self.pos += 1;
                    match self.peek() {
                        Some(Token::Color(color)) if !self.color_starts_piece() => {
                            suffix.arrival_recoloring = Some(*color);
                            self.pos += 1;
                        }
                        Some(Token::Color(_)) => suffix.promotion = Some(self.long_piece_decl()?),
                        _ if self.starts_piece_decl() => suffix.promotion = Some(self.piece_decl()?),
                        _ => suffix.check_sign = Some("=".to_string()),
                    }
                }
                Some(Token::LeftBracket) => {
                    self.pos += 1;
                    self.bracket_suffix(&mut suffix)?;
                    self.expect(Token::RightBracket, "]")?;
                }
                Some(Token::ImitatorBracket) => {
                    self.pos += 1;
                    suffix.effects.imitators = self.square_list()?;
                    self.expect(Token::RightBracket, "]")?;
                }
                _ => return Ok(suffix),
            }
        }
    }

    fn optional_promotion(&mut self) -> Result<Option<PieceDecl>, ParseError> {
        if self.eat(&Token::Equals) {
            Ok(Some(self.piece_decl()?))
        } else {
            Ok(None)
        }
    }

    fn bracket_suffix(&mut self, suffix: &mut PlySuffix) -> Result<(), ParseError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                let unit = self.long_piece_decl()?;
                let at = self.square()?;
                let promotion = self.optional_promotion()?;
                suffix.effects.rebirths.push(Rebirth { unit, at, promotion });
            }
            Some(Token::Dash) => {
                self.pos += 1;
                suffix.effects.removals.push(self.square()?);
            }
            Some(Token::Color(_)) => {
                let unit = self.long_piece_decl()?;
                let from = self.square()?;
                self.expect(Token::Arrow, "->")?;
                let to = self.square()?;
                let promotion = self.optional_promotion()?;
                suffix.effects.antirebirths.push(Antirebirth {
                    unit,
                    from,
                    to,
                    promotion,
                });
            }
            Some(Token::Square(_)) => {
                let at = self.square()?;
                self.expect(Token::Equals, "=")?;
                match self.peek() {
                    Some(Token::Color(color)) if !self.color_starts_piece() => {
                        suffix.effects.recolorings.entry(*color).or_default().push(at);
                        self.pos += 1;
                    }
                    _ => {
                        let unit = self.piece_decl()?;
                        suffix.effects.remote_promotions.push(RemotePromotion { unit, at });
                    }
                }
            }
            _ => return Err(self.error("unexpected token in brackets")),
        }
        Ok(())
    }
}
