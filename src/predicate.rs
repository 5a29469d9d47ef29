//! Predicate catalog and the facts analyzers emit against it.
//!
//! The catalog is a markdown document listing one predicate per bullet:
//!
//! ```text
//! * `TraceBack(PIECE piece, INTEGER length, BOOLEAN capture)`
//! * `Twins`
//! ```
//!
//! Facts are checked by name and arity, then every parameter against its
//! domain. A parameter equal to `*` passes any domain.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::error;

use crate::config::ValidationPolicy;
use crate::error::ValidationError;

const BUILTIN_CATALOG: &str = include_str!("../catalog/predicates.md");

pub const WILDCARD: &str = "*";

static DOMAINS: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    [
        ("BOOLEAN", r"^(true|false)$"),
        ("COLOR", r"^[wbn]$"),
        ("DATE", r"^[0-9]{4}(-[0-9]{2}(-[0-9]{2})?)?$"),
        ("INTEGER", r"^[0-9]+$"),
        ("PIECENAME", r"^[0-9A-Z][0-9A-Z]?$"),
        ("PIECE", r"^[wbn][0-9A-Z][0-9A-Z]?$"),
        ("STRING", r"^.*$"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("domain pattern is valid")))
    .collect()
});

static WITH_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\* `((?:[A-Z][a-z0-9]*)+)\((.*)\)`$").expect("catalog pattern is valid")
});

static WITHOUT_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\* `((?:[A-Z][a-z0-9]*)+)`$").expect("catalog pattern is valid"));

static BUILTIN: LazyLock<Result<PredicateCatalog, ValidationError>> =
    LazyLock::new(|| PredicateCatalog::parse(BUILTIN_CATALOG));

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub domain: String,
    regex: Regex,
}

impl Param {
    pub fn accepts(&self, value: &str) -> bool {
        value == WILDCARD || self.regex.is_match(value)
    }
}

#[derive(Clone, Debug)]
pub struct Predicate {
    pub name: String,
    pub params: Vec<Param>,
    pub doc: String,
}

#[derive(Clone, Debug, Default)]
pub struct PredicateCatalog {
    by_arity: HashMap<usize, HashMap<String, Predicate>>,
}

impl PredicateCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<&'static PredicateCatalog, ValidationError> {
        BUILTIN.as_ref().map_err(Clone::clone)
    }

    pub fn parse(markdown: &str) -> Result<PredicateCatalog, ValidationError> {
        let mut catalog = PredicateCatalog::default();
        let mut current: Option<Predicate> = None;
        for line in markdown.lines() {
            if let Some(predicate) = parse_predicate_line(line)? {
                if let Some(done) = current.replace(predicate) {
                    catalog.insert(done);
                }
                continue;
            }
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                if let Some(done) = current.take() {
                    catalog.insert(done);
                }
            } else if let Some(predicate) = current.as_mut() {
                if !predicate.doc.is_empty() {
                    predicate.doc.push(' ');
                }
                predicate.doc.push_str(text);
            }
        }
        if let Some(done) = current {
            catalog.insert(done);
        }
        Ok(catalog)
    }

    fn insert(&mut self, predicate: Predicate) {
        self.by_arity
            .entry(predicate.params.len())
            .or_default()
            .insert(predicate.name.clone(), predicate);
    }

    pub fn get(&self, name: &str, arity: usize) -> Result<&Predicate, ValidationError> {
        self.by_arity
            .get(&arity)
            .and_then(|predicates| predicates.get(name))
            .ok_or_else(|| ValidationError::UnknownPredicate {
                name: name.to_string(),
                arity,
            })
    }

    pub fn len(&self) -> usize {
        self.by_arity.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self, fact: &Fact) -> Result<(), ValidationError> {
        let predicate = self.get(&fact.name, fact.params.len())?;
        for (param, value) in predicate.params.iter().zip(&fact.params) {
            let value = value.to_string();
            if !param.accepts(&value) {
                return Err(ValidationError::InvalidParam {
                    predicate: predicate.name.clone(),
                    param: param.name.clone(),
                    domain: param.domain.clone(),
                    value,
                });
            }
        }
        Ok(())
    }
}

fn parse_predicate_line(line: &str) -> Result<Option<Predicate>, ValidationError> {
    let line = line.trim_end();
    if let Some(caps) = WITH_PARAMS.captures(line) {
        let params = caps[2]
            .split(',')
            .map(|param| parse_param(line, param.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Some(Predicate {
            name: caps[1].to_string(),
            params,
            doc: String::new(),
        }));
    }
    if let Some(caps) = WITHOUT_PARAMS.captures(line) {
        return Ok(Some(Predicate {
            name: caps[1].to_string(),
            params: Vec::new(),
            doc: String::new(),
        }));
    }
    if line.starts_with("* `") {
        return Err(ValidationError::MalformedCatalog {
            line: line.to_string(),
            reason: "not a predicate signature".to_string(),
        });
    }
    Ok(None)
}

fn parse_param(line: &str, text: &str) -> Result<Param, ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedCatalog {
        line: line.to_string(),
        reason,
    };
    let mut parts = text.split_whitespace();
    let (Some(domain), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed(format!("expected 'DOMAIN name', got '{}'", text)));
    };
    let regex = DOMAINS
        .get(domain)
        .cloned()
        .ok_or_else(|| malformed(format!("unknown domain {}", domain)))?;
    Ok(Param {
        name: name.to_string(),
        domain: domain.to_string(),
        regex,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactParam {
    Piece(String),
    Int(usize),
    Bool(bool),
    Text(String),
}

impl fmt::Display for FactParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactParam::Piece(code) | FactParam::Text(code) => f.write_str(code),
            FactParam::Int(n) => write!(f, "{}", n),
            FactParam::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fact {
    pub name: String,
    pub params: Vec<FactParam>,
}

impl Fact {
    pub fn new(name: &str, params: Vec<FactParam>) -> Self {
        Fact {
            name: name.to_string(),
            params,
        }
    }

    pub fn bare(name: &str) -> Self {
        Fact::new(name, Vec::new())
    }
}

/// `Name` or `Name(p1, p2)`.
impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, "({})", params.join(", "))?;
        }
        Ok(())
    }
}

/// Multiset of rendered facts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FactSet {
    counts: BTreeMap<String, usize>,
}

impl FactSet {
    pub fn insert(&mut self, fact: &Fact) {
        *self.counts.entry(fact.to_string()).or_insert(0) += 1;
    }

    /// How many times `fact` (in rendered form) was emitted.
    pub fn count(&self, fact: &str) -> usize {
        self.counts.get(fact).copied().unwrap_or(0)
    }

    pub fn contains(&self, fact: &str) -> bool {
        self.counts.contains_key(fact)
    }

    /// Number of distinct facts.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(fact, count)| (fact.as_str(), *count))
    }
}

impl fmt::Display for FactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (fact, count) in &self.counts {
            writeln!(f, "{}: {}", fact, count)?;
        }
        Ok(())
    }
}

/// Validates facts against a catalog before adding them to a [`FactSet`].
pub struct FactAccumulator<'c> {
    catalog: &'c PredicateCatalog,
    policy: ValidationPolicy,
    facts: FactSet,
}

impl<'c> FactAccumulator<'c> {
    pub fn new(catalog: &'c PredicateCatalog, policy: ValidationPolicy) -> Self {
        FactAccumulator {
            catalog,
            policy,
            facts: FactSet::default(),
        }
    }

    pub fn push(&mut self, fact: Fact) -> Result<(), ValidationError> {
        match self.catalog.validate(&fact) {
            Ok(()) => {
                self.facts.insert(&fact);
                Ok(())
            }
            Err(err) if self.policy == ValidationPolicy::LogAndSkip => {
                error!(fact = %fact, error = %err, "dropping fact that fails validation");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub fn facts(&self) -> &FactSet {
        &self.facts
    }

    pub fn into_facts(self) -> FactSet {
        self.facts
    }
}
