//! Tokenizer for Popeye-style solution text, built from `nom` combinators.
//!
//! Alternatives are tried in a fixed order: twin functions, comments, move
//! numbers, angles, squares, twin identifiers, then the remaining literals
//! longest first. Spaces, tabs and line breaks separate tokens and are
//! otherwise ignored.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{map, map_res, opt, recognize, value},
    sequence::{delimited, pair, terminated},
    IResult, Parser,
};
use shakmaty::Square;

use crate::board::{square_at, Color};
use crate::error::LexError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Mirror,
    Rotate,
    Shift,
    PolishType,
    Imitator,
    /// Text between braces, braces stripped.
    Comment(String),
    /// The `n` of `n.`.
    MoveNumber(u32),
    Angle(u16),
    Square(Square),
    TwinId(String),
    PieceName(String),
    FairyProperties(String),
    /// `<-->`
    DoublePointedArrow,
    Annotation(String),
    Zugzwang,
    Threat,
    /// `-->`
    LongArrow,
    QueensideCastling,
    KingsideCastling,
    Ellipsis,
    EnPassant,
    HalfEllipsis,
    /// `[I`
    ImitatorBracket,
    /// `==>`
    LongDoubleArrow,
    /// `->`
    Arrow,
    But,
    Mate,
    LeftBracket,
    RightBracket,
    Dash,
    Asterisk,
    Plus,
    Equals,
    Color(Color),
    Comma,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    /// Byte offset of the token in the source text.
    pub offset: usize,
}

/// Split `text` into tokens, failing on the first character no token accepts.
pub fn tokenize(text: &str) -> Result<Vec<Lexeme>, LexError> {
    let mut lexemes = Vec::new();
    let mut rest = text.trim_start_matches([' ', '\t', '\r', '\n']);
    while !rest.is_empty() {
        let offset = text.len() - rest.len();
        match token(rest) {
            Ok((remaining, token)) => {
                lexemes.push(Lexeme { token, offset });
                rest = remaining.trim_start_matches([' ', '\t', '\r', '\n']);
            }
            Err(_) => {
                return Err(LexError {
                    position: offset,
                    fragment: rest.chars().next().unwrap_or_default(),
                })
            }
        }
    }
    Ok(lexemes)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        twin_function,
        comment,
        move_number,
        angle,
        square,
        twin_id,
        piece_name,
        fairy_properties,
        arrows_and_keywords,
        punctuation,
    ))
    .parse(input)
}

fn twin_function(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Mirror, tag("mirror")),
        value(Token::Rotate, tag("rotate")),
        value(Token::Shift, tag("shift")),
        value(Token::PolishType, tag("PolishType")),
        value(Token::Imitator, tag("Imitator")),
    ))
    .parse(input)
}

fn comment(input: &str) -> IResult<&str, Token> {
    map(
        delimited(char('{'), take_till(|c| c == '{' || c == '}'), char('}')),
        |text: &str| Token::Comment(text.to_string()),
    )
    .parse(input)
}

fn move_number(input: &str) -> IResult<&str, Token> {
    map_res(terminated(digit1, char('.')), |digits: &str| {
        digits.parse::<u32>().map(Token::MoveNumber)
    })
    .parse(input)
}

fn angle(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Angle(90), tag("90")),
        value(Token::Angle(180), tag("180")),
        value(Token::Angle(270), tag("270")),
    ))
    .parse(input)
}

fn square(input: &str) -> IResult<&str, Token> {
    map_res(
        pair(one_of("abcdefgh"), one_of("12345678")),
        |(file, rank): (char, char)| {
            square_at(file as i32 - 'a' as i32, rank as i32 - '1' as i32)
                .map(Token::Square)
                .ok_or(())
        },
    )
    .parse(input)
}

fn twin_id(input: &str) -> IResult<&str, Token> {
    map(
        terminated(
            alt((
                recognize(pair(char('z'), digit1)),
                recognize(satisfy(|c: char| c.is_ascii_lowercase())),
            )),
            char(')'),
        ),
        |id: &str| Token::TwinId(id.to_string()),
    )
    .parse(input)
}

fn piece_name(input: &str) -> IResult<&str, Token> {
    let name_char = |c: char| c.is_ascii_digit() || c.is_ascii_uppercase();
    map(
        alt((
            recognize(pair(satisfy(name_char), satisfy(name_char))),
            recognize(satisfy(|c: char| c.is_ascii_uppercase())),
        )),
        |name: &str| Token::PieceName(name.to_string()),
    )
    .parse(input)
}

fn fairy_properties(input: &str) -> IResult<&str, Token> {
    map(take_while1(|c: char| "cjkprvfhmu".contains(c)), |s: &str| {
        Token::FairyProperties(s.to_string())
    })
    .parse(input)
}

fn arrows_and_keywords(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::DoublePointedArrow, tag("<-->")),
        map(recognize(pair(one_of("!?"), opt(one_of("!?")))), |s: &str| {
            Token::Annotation(s.to_string())
        }),
        value(Token::Zugzwang, tag("zugzwang.")),
        value(Token::Threat, tag("threat:")),
        value(Token::LongArrow, tag("-->")),
        value(Token::QueensideCastling, tag("0-0-0")),
        value(Token::KingsideCastling, tag("0-0")),
        value(Token::Ellipsis, tag("...")),
        value(Token::EnPassant, tag("ep.")),
        value(Token::HalfEllipsis, tag("..")),
        value(Token::ImitatorBracket, tag("[I")),
        value(Token::LongDoubleArrow, tag("==>")),
        value(Token::Arrow, tag("->")),
        value(Token::But, tag("but")),
    ))
    .parse(input)
}

fn punctuation(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Mate, char('#')),
        value(Token::LeftBracket, char('[')),
        value(Token::RightBracket, char(']')),
        value(Token::Dash, char('-')),
        value(Token::Asterisk, char('*')),
        value(Token::Plus, char('+')),
        value(Token::Equals, char('=')),
        value(Token::Color(Color::Neutral), char('n')),
        value(Token::Color(Color::White), char('w')),
        value(Token::Color(Color::Black), char('b')),
        value(Token::Comma, char(',')),
    ))
    .parse(input)
}
