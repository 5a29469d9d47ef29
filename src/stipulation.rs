//! Reading the side to move and the side completing a line from a
//! stipulation such as `h#2`, `ser-h=5` or `reci-h#3`.

use std::sync::LazyLock;

use regex::Regex;

use crate::board::Color;

static COMMON_STIPULATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<intro>[0-9]+->)?(?P<reci>reci-)?(?P<serial>p?h?ser-)?(?P<play>h|s|r|semi-r|hs|pg|)(?P<aim>([#=\+]?)|(==)) *(?P<length>[0-9\.]+)$",
    )
    .expect("stipulation pattern is valid")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stipulation {
    pub intro: Option<String>,
    pub reciprocal: bool,
    pub serial: Option<String>,
    /// `""` for direct play, `h`, `s`, `r`, `semi-r`, `hs` or `pg`.
    pub play: String,
    pub aim: String,
    pub length: String,
}

impl Stipulation {
    /// Parse the common stipulation forms. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Stipulation> {
        let caps = COMMON_STIPULATION.captures(text.trim())?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_lowercase());
        Some(Stipulation {
            intro: group("intro"),
            reciprocal: caps.name("reci").is_some(),
            serial: group("serial"),
            play: group("play").unwrap_or_default(),
            aim: group("aim").unwrap_or_default(),
            length: group("length").unwrap_or_default(),
        })
    }

    pub fn side_to_move(&self) -> Color {
        let serial_helpself = self.serial.as_deref() == Some("ser-") && self.play == "hs";
        if serial_helpself || self.play == "h" {
            Color::Black
        } else {
            Color::White
        }
    }

    /// The side whose ply ends a line of play.
    pub fn side_completing_line(&self) -> Color {
        match self.play.as_str() {
            "s" | "r" | "hs" => Color::Black,
            _ => Color::White,
        }
    }

    pub fn is_help_play(&self) -> bool {
        matches!(self.play.as_str(), "h" | "hs")
    }
}

/// Side to move at the start of the solution; white for unrecognized text.
pub fn side_to_move(text: &str) -> Color {
    Stipulation::parse(text).map_or(Color::White, |s| s.side_to_move())
}

pub fn side_completing_line(text: &str) -> Color {
    Stipulation::parse(text).map_or(Color::White, |s| s.side_completing_line())
}
