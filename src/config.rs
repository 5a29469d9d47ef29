use std::env;

use crate::nodes::{Node, NodeKind};

/// What to do with a fact that does not match the predicate catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Fail the entry.
    #[default]
    Strict,
    /// Log the fact at ERROR level and drop it.
    LogAndSkip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Solutions with more nodes than this are rejected before analysis.
    pub max_plies: usize,
    pub include_set_play: bool,
    pub include_tries: bool,
    pub validation: ValidationPolicy,
    /// Worker threads for batch analysis, `None` for one per CPU.
    pub num_threads: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_plies: 140,
            include_set_play: true,
            include_tries: true,
            validation: ValidationPolicy::Strict,
            num_threads: None,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by `POPEYE_MAX_PLIES`, `POPEYE_INCLUDE_SET_PLAY`,
    /// `POPEYE_INCLUDE_TRIES` and `POPEYE_THREADS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let defaults = AnalysisConfig::default();
        AnalysisConfig {
            max_plies: env_value("POPEYE_MAX_PLIES").unwrap_or(defaults.max_plies),
            include_set_play: env_value("POPEYE_INCLUDE_SET_PLAY")
                .unwrap_or(defaults.include_set_play),
            include_tries: env_value("POPEYE_INCLUDE_TRIES").unwrap_or(defaults.include_tries),
            validation: defaults.validation,
            num_threads: env_value("POPEYE_THREADS").or(defaults.num_threads),
        }
    }

    /// Whether `node` belongs to the play being analyzed. Excluding tries
    /// drops both the refutations and the try keys they refute.
    pub fn keeps(&self, node: &Node) -> bool {
        match node.kind {
            NodeKind::Null { is_set: true, .. } => self.include_set_play,
            NodeKind::Move(_) | NodeKind::Castling(_) if node.refutation || is_try(node) => {
                self.include_tries
            }
            _ => true,
        }
    }
}

/// A key marked `?` or followed by a `but` line.
fn is_try(node: &Node) -> bool {
    let annotation = match &node.kind {
        NodeKind::Move(m) => m.annotation.as_str(),
        NodeKind::Castling(c) => c.annotation.as_str(),
        _ => "",
    };
    node.depth == 2 && (annotation == "?" || node.children.iter().any(|child| child.refutation))
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
