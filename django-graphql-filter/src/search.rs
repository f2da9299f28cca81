//! Full text search expressions.
//!
//! These are pure values describing what a PostgreSQL backend would
//! compute for `SearchVector`, `SearchQuery`, `SearchRank` and the
//! `pg_trgm` similarity functions. They are carried inside a
//! [`Predicate`](crate::predicate::Predicate) as annotations.
//!
//! Each expression also has a reference evaluation over JSON records,
//! so that filters using them can be exercised without a database.
//! The evaluation is deliberately simple: documents are lowercased
//! alphanumeric tokens, a query term matches when all of its tokens
//! are present, rank is the weighted fraction of query terms found,
//! and trigram similarity follows `pg_trgm`.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde_json::Value;

use crate::conf::LOOKUP_SEP;
use crate::ops::as_text;
use crate::predicate::Rhs;

/// A text search configuration, either named directly or read from a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchConfig {
    Literal(String),
    Field(String),
}

/// Weight label of a search vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum VectorWeight {
    A,
    B,
    C,
    D,
}

/// Rank weights used when the request gives none, in D, C, B, A order.
pub const DEFAULT_RANK_WEIGHTS: [f64; 4] = [0.1, 0.2, 0.4, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct SearchVector {
    pub fields: Vec<String>,
    pub config: Option<SearchConfig>,
    pub weight: Option<VectorWeight>,
}

impl SearchVector {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            config: None,
            weight: None,
        }
    }

    /// The tokens of `record` covered by this vector.
    pub fn document(&self, record: &Value) -> Vec<String> {
        let mut tokens = Vec::new();
        for field in &self.fields {
            let path: Vec<&str> = field.split(LOOKUP_SEP).collect();
            collect_text(record, &path, &mut |text| tokens.extend(tokenize(text)));
        }
        tokens
    }
}

fn collect_text(value: &Value, path: &[&str], sink: &mut dyn FnMut(&str)) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_text(item, path, sink);
            }
        }
        _ => match path.split_first() {
            Some((head, rest)) => {
                if let Some(v) = value.get(head) {
                    collect_text(v, rest, sink);
                }
            }
            None => {
                if let Some(text) = as_text(value) {
                    sink(&text);
                }
            }
        },
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// A text search query, as built by `SearchQuery` and its operators.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchQuery {
    Term {
        value: String,
        config: Option<SearchConfig>,
    },
    And(Vec<SearchQuery>),
    Or(Vec<SearchQuery>),
    Not(Box<SearchQuery>),
}

impl SearchQuery {
    pub fn term(value: impl Into<String>) -> Self {
        SearchQuery::Term {
            value: value.into(),
            config: None,
        }
    }

    /// Whether a document, as produced by [`SearchVector::document`], matches.
    pub fn matches(&self, document: &[String]) -> bool {
        match self {
            SearchQuery::Term { value, .. } => {
                let mut tokens = tokenize(value).peekable();
                tokens.peek().is_some() && tokens.all(|t| document.contains(&t))
            }
            SearchQuery::And(qs) => qs.iter().all(|q| q.matches(document)),
            SearchQuery::Or(qs) => qs.iter().any(|q| q.matches(document)),
            SearchQuery::Not(q) => !q.matches(document),
        }
    }

    /// The tokens of the positive terms of this query.
    pub fn terms(&self) -> Vec<String> {
        match self {
            SearchQuery::Term { value, .. } => tokenize(value).collect(),
            SearchQuery::And(qs) | SearchQuery::Or(qs) => qs.iter().flat_map(|q| q.terms()).collect(),
            SearchQuery::Not(_) => Vec::new(),
        }
    }
}

impl BitAnd for SearchQuery {
    type Output = SearchQuery;
    fn bitand(self, rhs: SearchQuery) -> SearchQuery {
        match self {
            SearchQuery::And(mut qs) => {
                qs.push(rhs);
                SearchQuery::And(qs)
            }
            lhs => SearchQuery::And(vec![lhs, rhs]),
        }
    }
}

impl BitOr for SearchQuery {
    type Output = SearchQuery;
    fn bitor(self, rhs: SearchQuery) -> SearchQuery {
        match self {
            SearchQuery::Or(mut qs) => {
                qs.push(rhs);
                SearchQuery::Or(qs)
            }
            lhs => SearchQuery::Or(vec![lhs, rhs]),
        }
    }
}

impl Not for SearchQuery {
    type Output = SearchQuery;
    fn not(self) -> SearchQuery {
        SearchQuery::Not(Box::new(self))
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchQuery::Term { value, .. } => write!(f, "'{}'", value),
            SearchQuery::And(qs) => join(f, qs, " & "),
            SearchQuery::Or(qs) => join(f, qs, " | "),
            SearchQuery::Not(q) => write!(f, "!{}", q),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, qs: &[SearchQuery], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, q) in qs.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", q)?;
    }
    write!(f, ")")
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRank {
    pub vector: SearchVector,
    pub query: SearchQuery,
    /// Weights in D, C, B, A order.
    pub weights: Option<[f64; 4]>,
    pub cover_density: bool,
    pub normalization: Option<i64>,
}

impl SearchRank {
    /// The rank of `record`.
    ///
    /// Cover density ranking is scored the same way as plain ranking.
    pub fn score(&self, record: &Value) -> f64 {
        let document = self.vector.document(record);
        if !self.query.matches(&document) {
            return 0.0;
        }
        let terms = self.query.terms();
        if terms.is_empty() {
            return 0.0;
        }
        let found = terms.iter().filter(|t| document.contains(t)).count();
        let weights = self.weights.unwrap_or(DEFAULT_RANK_WEIGHTS);
        let weight = match self.vector.weight.unwrap_or(VectorWeight::D) {
            VectorWeight::D => weights[0],
            VectorWeight::C => weights[1],
            VectorWeight::B => weights[2],
            VectorWeight::A => weights[3],
        };
        let mut rank = weight * found as f64 / terms.len() as f64;
        if self.normalization.map_or(false, |n| n & 1 != 0) {
            rank /= 1.0 + (document.len() as f64).ln();
        }
        rank
    }
}

/// Which `pg_trgm` function a trigram annotation computes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TrigramKind {
    Similarity,
    Distance,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trigram {
    pub kind: TrigramKind,
    pub field: String,
    pub value: String,
}

impl Trigram {
    pub fn score(&self, record: &Value) -> f64 {
        let path: Vec<&str> = self.field.split(LOOKUP_SEP).collect();
        let mut best: Option<f64> = None;
        collect_text(record, &path, &mut |text| {
            let s = similarity(text, &self.value);
            best = Some(best.map_or(s, |b: f64| b.max(s)));
        });
        let similarity = best.unwrap_or(0.0);
        match self.kind {
            TrigramKind::Similarity => similarity,
            TrigramKind::Distance => 1.0 - similarity,
        }
    }
}

fn trigrams(text: &str) -> BTreeSet<String> {
    let mut res = BTreeSet::new();
    for word in tokenize(text) {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for w in padded.windows(3) {
            res.insert(w.iter().collect());
        }
    }
    res
}

/// Trigram similarity of two strings, as `pg_trgm` computes it.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = trigrams(a);
    let b = trigrams(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// A value computed per record before it can be compared.
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation {
    Vector(SearchVector),
    Rank(SearchRank),
    Trigram(Trigram),
}

impl Annotation {
    /// The numeric value of this annotation for `record`, if it has one.
    pub fn score(&self, record: &Value) -> Option<f64> {
        match self {
            Annotation::Vector(_) => None,
            Annotation::Rank(r) => Some(r.score(record)),
            Annotation::Trigram(t) => Some(t.score(record)),
        }
    }
}

/// An annotation together with the value it is compared against.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotatedValue {
    pub annotation: Annotation,
    pub rhs: Rhs,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Vector(v) => write!(f, "SearchVector({})", v.fields.join(", ")),
            Annotation::Rank(r) => write!(
                f,
                "SearchRank(SearchVector({}), {})",
                r.vector.fields.join(", "),
                r.query
            ),
            Annotation::Trigram(t) => write!(
                f,
                "Trigram{}({}, '{}')",
                match t.kind {
                    TrigramKind::Similarity => "Similarity",
                    TrigramKind::Distance => "Distance",
                },
                t.field,
                t.value
            ),
        }
    }
}
