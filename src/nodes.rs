//! Solution tree model.
//!
//! The parser emits a flat, depth-tagged list of nodes. [`unflatten`] turns
//! it into a tree, synthesizing null moves where a line skips a depth, and
//! [`link_continued_twins`] resolves `+b)` style twins against their
//! predecessor.
//!
//! Depth convention: the root is 0, twins are 1 and the ply numbered `n.` is
//! `2n` (`n...` is `2n + 1`).

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::iter::Peekable;

use sha2::{Digest, Sha256};
use shakmaty::Square;

use crate::board::Color;
use crate::error::ParseError;

/// A piece as written in the solution. `color` is `None` when the text
/// leaves it implicit (promotions, ordinary moves).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PieceDecl {
    pub name: String,
    pub color: Option<Color>,
    pub specs: Vec<String>,
}

impl PieceDecl {
    pub fn pawn() -> Self {
        PieceDecl {
            name: "P".to_string(),
            color: None,
            specs: Vec::new(),
        }
    }

    /// True when this declaration names the same kind of piece as `name` and `color`.
    pub fn matches(&self, name: &str, color: Color) -> bool {
        self.name.eq_ignore_ascii_case(name) && self.color.map_or(true, |c| c == color)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rebirth {
    pub unit: PieceDecl,
    pub at: Square,
    pub promotion: Option<PieceDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Antirebirth {
    pub unit: PieceDecl,
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemotePromotion {
    pub unit: PieceDecl,
    pub at: Square,
}

/// Bracketed consequences written after a move or a castling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SideEffects {
    pub rebirths: Vec<Rebirth>,
    pub antirebirths: Vec<Antirebirth>,
    pub remote_promotions: Vec<RemotePromotion>,
    pub recolorings: BTreeMap<Color, Vec<Square>>,
    pub removals: Vec<Square>,
    /// New imitator squares, `[I...]`.
    pub imitators: Vec<Square>,
}

impl SideEffects {
    /// True when a rebirth or antirebirth lands on `square`.
    pub fn reborn_at(&self, square: Square) -> bool {
        self.rebirths.iter().any(|r| r.at == square)
            || self.antirebirths.iter().any(|r| r.to == square)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub departant: PieceDecl,
    pub departure: Square,
    pub arrival: Square,
    pub capture: Option<Square>,
    pub en_passant: bool,
    pub promotion: Option<PieceDecl>,
    pub effects: SideEffects,
    pub annotation: String,
    pub check_sign: String,
}

impl Move {
    pub fn new(departant: PieceDecl, departure: Square, arrival: Square, capture: Option<Square>) -> Self {
        Move {
            departant,
            departure,
            arrival,
            capture,
            en_passant: false,
            promotion: None,
            effects: SideEffects::default(),
            annotation: String::new(),
            check_sign: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Castling {
    pub kingside: bool,
    pub effects: SideEffects,
    pub annotation: String,
    pub check_sign: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TwinCommand {
    Move { piece: PieceDecl, from: Square, to: Square },
    Exchange { from: Square, to: Square },
    Remove { piece: PieceDecl, at: Square },
    Add { piece: PieceDecl, at: Square },
    Substitute { from: PieceDecl, to: PieceDecl },
    Rotate(u16),
    Mirror(Square, Square),
    Shift(Square, Square),
    PolishType,
    Imitator(Vec<Square>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Twin {
    pub id: String,
    /// Written with a leading `+`: builds on the previous twin.
    pub continued: bool,
    /// Synthesized for solutions that have no twin headers.
    pub implicit: bool,
    pub commands: Vec<TwinCommand>,
    pub anticipator: Option<Box<Twin>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Twin(Twin),
    Move(Move),
    Castling(Castling),
    /// `is_threat`: stands for "any move" before a threat line.
    /// `is_set`: a set-play placeholder directly under a twin.
    Null { is_threat: bool, is_set: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub depth: usize,
    pub children: Vec<Node>,
    pub comments: Vec<String>,
    /// The next line is a threat (`threat:`).
    pub child_is_threat: bool,
    /// Introduced by `but`: refutation of a try.
    pub refutation: bool,
    /// Byte offset in the solution text, 0 for synthesized nodes.
    pub offset: usize,
}

impl Node {
    pub fn new(kind: NodeKind, depth: usize) -> Self {
        Node {
            kind,
            depth,
            children: Vec::new(),
            comments: Vec::new(),
            child_is_threat: false,
            refutation: false,
            offset: 0,
        }
    }

    pub fn root() -> Self {
        Node::new(NodeKind::Root, 0)
    }

    pub fn null(depth: usize, is_threat: bool, is_set: bool) -> Self {
        Node::new(NodeKind::Null { is_threat, is_set }, depth)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, NodeKind::Null { .. })
    }

    pub fn is_twin(&self) -> bool {
        matches!(self.kind, NodeKind::Twin(_))
    }

    pub fn as_move(&self) -> Option<&Move> {
        match &self.kind {
            NodeKind::Move(m) => Some(m),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, this node included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }

    fn set_check_sign(&mut self, sign: &str) {
        match &mut self.kind {
            NodeKind::Move(m) => m.check_sign = sign.to_string(),
            NodeKind::Castling(c) => c.check_sign = sign.to_string(),
            _ => {}
        }
    }

    pub(crate) fn set_annotation(&mut self, annotation: &str) {
        match &mut self.kind {
            NodeKind::Move(m) => m.annotation = annotation.to_string(),
            NodeKind::Castling(c) => c.annotation = annotation.to_string(),
            _ => {}
        }
    }

    pub(crate) fn with_check_sign(mut self, sign: &str) -> Self {
        self.set_check_sign(sign);
        self
    }

    /// Order-independent digest of everything below this node.
    ///
    /// Siblings whose continuations digest equal play out the same way and
    /// can be rendered together as `A/B`.
    pub fn continuation_digest(&self) -> u64 {
        let mut digests: Vec<u64> = self.children.iter().map(Node::subtree_digest).collect();
        digests.sort_unstable();
        let mut hasher = StableHasher::default();
        for digest in digests {
            hasher.write_u64(digest);
        }
        hasher.finish()
    }

    fn subtree_digest(&self) -> u64 {
        let mut hasher = StableHasher::default();
        self.kind.hash(&mut hasher);
        self.continuation_digest().hash(&mut hasher);
        hasher.finish()
    }

    /// Render the tree in solution notation, merging sibling moves that
    /// share a continuation.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, &[]);
        out
    }

    fn dump_into(&self, out: &mut String, alternatives: &[&Node]) {
        out.push_str(&self.label());
        for other in alternatives {
            out.truncate(out.trim_end().len());
            out.push('/');
            out.push_str(&other.label());
        }
        let groups = self.grouped_children();
        let single = groups.len() == 1;
        for group in groups {
            let (first, rest) = (group[0], &group[1..]);
            if self.depth < 2 {
                out.push_str(&first.full_prefix());
            } else if single {
                out.push_str(&first.short_prefix());
            } else {
                out.push('\n');
                out.push_str(&first.full_prefix());
            }
            first.dump_into(out, rest);
        }
    }

    fn grouped_children(&self) -> Vec<Vec<&Node>> {
        let mut groups: Vec<(u64, Vec<&Node>)> = Vec::new();
        for child in &self.children {
            let mergeable = matches!(child.kind, NodeKind::Move(_) | NodeKind::Castling(_));
            let digest = child.continuation_digest();
            match groups.iter_mut().find(|(d, g)| {
                mergeable && *d == digest && matches!(g[0].kind, NodeKind::Move(_) | NodeKind::Castling(_))
            }) {
                Some((_, group)) => group.push(child),
                None => groups.push((digest, vec![child])),
            }
        }
        groups.into_iter().map(|(_, group)| group).collect()
    }

    fn label(&self) -> String {
        match &self.kind {
            NodeKind::Root => String::new(),
            NodeKind::Twin(twin) if twin.implicit => String::new(),
            NodeKind::Twin(twin) => format!("{}{}) ", if twin.continued { "+" } else { "" }, twin.id),
            NodeKind::Null { is_threat, .. } => {
                if *is_threat {
                    "~ ".to_string()
                } else {
                    String::new()
                }
            }
            NodeKind::Castling(c) => {
                let body = if c.kingside { "0-0" } else { "0-0-0" };
                format!("{}{}{} ", body, spaced(&c.check_sign), spaced(&c.annotation))
            }
            NodeKind::Move(m) => {
                let name = if m.departant == PieceDecl::pawn() {
                    String::new()
                } else {
                    m.departant.name.clone()
                };
                let body = match m.capture {
                    Some(cap) if cap != m.arrival => {
                        format!("{}{}*{}-{}", name, m.departure, cap, m.arrival)
                    }
                    Some(_) => format!("{}{}*{}", name, m.departure, m.arrival),
                    None => format!("{}{}-{}", name, m.departure, m.arrival),
                };
                let promotion = m
                    .promotion
                    .as_ref()
                    .map(|p| format!("={}", p.name))
                    .unwrap_or_default();
                format!("{}{}{}{} ", body, promotion, spaced(&m.check_sign), spaced(&m.annotation))
            }
        }
    }

    fn full_prefix(&self) -> String {
        match &self.kind {
            NodeKind::Twin(twin) if twin.implicit => String::new(),
            NodeKind::Twin(_) => "\n\n".to_string(),
            NodeKind::Null { .. } => String::new(),
            _ => {
                let indent = if self.depth < 3 {
                    "\n".to_string()
                } else {
                    " ".repeat(self.depth - 2)
                };
                let dots = if self.depth % 2 == 1 { "..." } else { "." };
                format!("{}{}{}", indent, self.depth >> 1, dots)
            }
        }
    }

    fn short_prefix(&self) -> String {
        match &self.kind {
            NodeKind::Twin(_) | NodeKind::Null { .. } => String::new(),
            _ if self.depth % 2 == 1 => String::new(),
            _ => format!("{}.", self.depth >> 1),
        }
    }
}

/// SHA-256 behind the `Hasher` interface. Integers are fed little-endian
/// at fixed width so digests are the same on every platform and toolchain.
#[derive(Default)]
struct StableHasher(Sha256);

impl Hasher for StableHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn write_u16(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    fn write_u32(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    fn write_u64(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    fn write_usize(&mut self, n: usize) {
        self.write_u64(n as u64);
    }

    fn write_isize(&mut self, n: isize) {
        self.write(&(n as i64).to_le_bytes());
    }

    fn finish(&self) -> u64 {
        let digest = self.0.clone().finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(head)
    }
}

fn spaced(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" {}", text)
    }
}

/// Build the tree below `root` from depth-tagged `nodes`.
///
/// A node one level deeper than the current parent becomes its child; a
/// node more than one level deeper gets a synthesized null move in between
/// (a threat placeholder when the parent announced `threat:`, a set-play
/// placeholder when the parent is a twin). Nodes that cannot be attached
/// make the whole solution ambiguous.
pub fn unflatten(mut root: Node, nodes: Vec<Node>) -> Result<Node, ParseError> {
    let mut iter = nodes.into_iter().peekable();
    adopt(&mut root, &mut iter)?;
    if let Some(orphan) = iter.next() {
        return Err(ParseError {
            position: orphan.offset,
            message: format!("node at depth {} cannot be attached to the tree", orphan.depth),
            residual: String::new(),
        });
    }
    Ok(root)
}

fn adopt<I>(parent: &mut Node, nodes: &mut Peekable<I>) -> Result<(), ParseError>
where
    I: Iterator<Item = Node>,
{
    while let Some((depth, offset)) = nodes.peek().map(|n| (n.depth, n.offset)) {
        let mut child = if depth == parent.depth + 1 {
            match nodes.next() {
                Some(child) => child,
                None => break,
            }
        } else if depth > parent.depth + 1 {
            Node::null(parent.depth + 1, parent.child_is_threat, parent.is_twin())
        } else {
            break;
        };
        if matches!(parent.kind, NodeKind::Root) != child.is_twin() {
            return Err(ParseError {
                position: offset,
                message: format!("unexpected node at depth {}", depth),
                residual: String::new(),
            });
        }
        adopt(&mut child, nodes)?;
        parent.children.push(child);
    }
    Ok(())
}

/// Resolve every continued twin against its preceding sibling.
pub fn link_continued_twins(root: &mut Node) -> Result<(), ParseError> {
    let mut previous: Option<Twin> = None;
    for child in root.children.iter_mut() {
        if let NodeKind::Twin(twin) = &mut child.kind {
            if twin.continued {
                let Some(anticipator) = previous.take() else {
                    return Err(ParseError {
                        position: child.offset,
                        message: format!("continued twin {}) has no predecessor", twin.id),
                        residual: String::new(),
                    });
                };
                twin.anticipator = Some(Box::new(anticipator));
            }
            previous = Some(twin.clone());
        }
    }
    Ok(())
}
