//! Problem entries as stored in a problem database export.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::EntryError;
use crate::stipulation;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algebraic {
    #[serde(default)]
    pub white: Vec<String>,
    #[serde(default)]
    pub black: Vec<String>,
    #[serde(default)]
    pub neutral: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub stipulation: String,
    pub algebraic: Algebraic,
    /// Twin id to twin description, e.g. `"b": "Move h4 g1"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub twins: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "intended-solutions",
        skip_serializing_if = "Option::is_none"
    )]
    pub intended_solutions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub solution: String,
}

impl ProblemEntry {
    /// Initial position with the side to move derived from the stipulation.
    pub fn board(&self) -> Result<Board, EntryError> {
        let mut board = Board::from_algebraic(
            &self.algebraic.white,
            &self.algebraic.black,
            &self.algebraic.neutral,
        )?;
        board.set_side_to_move(stipulation::side_to_move(&self.stipulation));
        Ok(board)
    }

    /// Identifier for log lines.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("?")
    }

    pub fn from_json(text: &str) -> Result<ProblemEntry, EntryError> {
        serde_json::from_str(text).map_err(|e| EntryError::Malformed(e.to_string()))
    }
}
