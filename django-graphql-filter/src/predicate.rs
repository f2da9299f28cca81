//! Boolean predicates over field comparisons.
//!
//! A [`Predicate`] is the pure result of composing a filter tree. It
//! can be rendered, compared, handed to a backend, or compiled into a
//! [`Matcher`] and checked against JSON records.
//!
//! Checking follows Django's conventions. A path is walked through
//! nested objects; when a list is met, the comparison passes if it
//! passes for any element, and an empty list defers to the operator's
//! [`empty_collection`](crate::ops::Operator::empty_collection). A
//! null or missing value defers to
//! [`null_option`](crate::ops::Operator::null_option). A related
//! record compared against a scalar is compared by its `id`.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde_json::Value;

use crate::conf::LOOKUP_SEP;
use crate::error::FilterError;
use crate::filters::Lookup;
use crate::ops::{self, Operator};
use crate::search::{Annotation, SearchQuery};

/// The left hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A field path on the record.
    Field(Vec<String>),
    /// A computed annotation, with the name it's bound to.
    Annotation { alias: String, expression: Annotation },
}

impl Operand {
    /// A field operand from a `__` separated path.
    pub fn field(path: &str) -> Self {
        Operand::Field(path.split(LOOKUP_SEP).map(str::to_string).collect())
    }
}

/// The right hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Rhs {
    Value(Value),
    Query(SearchQuery),
}

/// A single lookup applied to an operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub lhs: Operand,
    pub lookup: Lookup,
    pub rhs: Rhs,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lhs {
            Operand::Field(path) => write!(f, "{}", path.join(LOOKUP_SEP))?,
            Operand::Annotation { alias, expression } => write!(f, "{}={}", alias, expression)?,
        }
        write!(f, "{}{}=", LOOKUP_SEP, self.lookup)?;
        match &self.rhs {
            Rhs::Value(v) => write!(f, "{}", v),
            Rhs::Query(q) => write!(f, "{}", q),
        }
    }
}

/// A composable boolean expression.
///
/// The operators simplify as they go: `True` is the identity of `&`
/// and absorbs `|`, and nested conjunctions and disjunctions are
/// flattened.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    Compare(Comparison),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::True
    }
}

impl Predicate {
    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// Instantiate the operators of this predicate.
    pub fn compile(&self) -> Result<Matcher, FilterError> {
        Ok(match self {
            Predicate::True => Matcher::True,
            Predicate::Compare(c) => compile_comparison(c)?,
            Predicate::And(ps) => Matcher::And(ps.iter().map(Predicate::compile).collect::<Result<_, _>>()?),
            Predicate::Or(ps) => Matcher::Or(ps.iter().map(Predicate::compile).collect::<Result<_, _>>()?),
            Predicate::Not(p) => Matcher::Not(Box::new(p.compile()?)),
        })
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;
    fn bitand(self, rhs: Predicate) -> Predicate {
        match (self, rhs) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }
}

impl BitOr for Predicate {
    type Output = Predicate;
    fn bitor(self, rhs: Predicate) -> Predicate {
        match (self, rhs) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (Predicate::Or(mut a), Predicate::Or(b)) => {
                a.extend(b);
                Predicate::Or(a)
            }
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (p, Predicate::Or(mut b)) => {
                b.insert(0, p);
                Predicate::Or(b)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;
    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::Compare(c) => write!(f, "{}", c),
            Predicate::And(ps) => join(f, ps, " AND "),
            Predicate::Or(ps) => join(f, ps, " OR "),
            Predicate::Not(p) => write!(f, "NOT {}", p),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, ps: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in ps.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ")")
}

/// A compiled [`Predicate`], ready to test records.
pub enum Matcher {
    True,
    Field {
        path: Vec<String>,
        op: Box<dyn Operator>,
    },
    Score {
        annotation: Annotation,
        op: Box<dyn Operator>,
    },
    Search {
        annotation: Annotation,
        query: SearchQuery,
    },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
}

fn compile_comparison(c: &Comparison) -> Result<Matcher, FilterError> {
    match (&c.lhs, &c.rhs) {
        (Operand::Field(path), Rhs::Value(v)) => Ok(Matcher::Field {
            path: path.clone(),
            op: ops::instantiate(c.lookup, v)?,
        }),
        (Operand::Annotation { expression, .. }, Rhs::Query(q))
            if matches!(expression, Annotation::Vector(_)) && c.lookup.is_default() =>
        {
            Ok(Matcher::Search {
                annotation: expression.clone(),
                query: q.clone(),
            })
        }
        (Operand::Annotation { expression, .. }, Rhs::Value(v))
            if !matches!(expression, Annotation::Vector(_)) =>
        {
            Ok(Matcher::Score {
                annotation: expression.clone(),
                op: ops::instantiate(c.lookup, v)?,
            })
        }
        _ => Err(anyhow::anyhow!("cannot evaluate comparison {}", c).into()),
    }
}

impl Matcher {
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Matcher::True => true,
            Matcher::Field { path, op } => apply_path(record, path, op.as_ref()),
            Matcher::Score { annotation, op } => annotation
                .score(record)
                .map_or(false, |s| op.apply(&Value::from(s))),
            Matcher::Search { annotation, query } => match annotation {
                Annotation::Vector(v) => query.matches(&v.document(record)),
                _ => false,
            },
            Matcher::And(ms) => ms.iter().all(|m| m.matches(record)),
            Matcher::Or(ms) => ms.iter().any(|m| m.matches(record)),
            Matcher::Not(m) => !m.matches(record),
        }
    }
}

fn apply_path(value: &Value, path: &[String], op: &dyn Operator) -> bool {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                op.empty_collection()
            } else {
                items.iter().any(|item| apply_path(item, path, op))
            }
        }
        Value::Null => op.null_option(),
        Value::Object(map) => match path.split_first() {
            Some((head, rest)) => match map.get(head) {
                Some(v) => apply_path(v, rest, op),
                None => op.null_option(),
            },
            None => match map.get("id") {
                Some(id) => apply_path(id, path, op),
                None => false,
            },
        },
        scalar => path.is_empty() && op.apply(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cmp(path: &str, lookup: Lookup, rhs: Value) -> Predicate {
        Predicate::Compare(Comparison {
            lhs: Operand::field(path),
            lookup,
            rhs: Rhs::Value(rhs),
        })
    }

    #[test]
    fn identities() {
        let a = cmp("a", Lookup::Exact, json!(1));
        assert_eq!(Predicate::True & a.clone(), a);
        assert_eq!(a.clone() & Predicate::True, a);
        assert_eq!(Predicate::True | a.clone(), Predicate::True);
        assert_eq!(a.clone() | Predicate::True, Predicate::True);
    }

    #[test]
    fn flattening() {
        let a = cmp("a", Lookup::Exact, json!(1));
        let b = cmp("b", Lookup::Exact, json!(2));
        let c = cmp("c", Lookup::Exact, json!(3));
        assert_eq!(
            a.clone() & b.clone() & c.clone(),
            Predicate::And(vec![a.clone(), b.clone(), c.clone()])
        );
        assert_eq!(
            a.clone() | (b.clone() | c.clone()),
            Predicate::Or(vec![a.clone(), b.clone(), c.clone()])
        );
        assert_eq!(
            (a.clone() & !b.clone()).to_string(),
            "(a__exact=1 AND NOT b__exact=2)"
        );
    }

    #[test]
    fn nested_paths() {
        let record = json!({
            "name": "x",
            "user": {"id": 2, "email": "a@example.com"},
            "tags": [{"name": "red"}, {"name": "blue"}],
            "notes": [],
            "closed": null,
        });
        let check = |p: Predicate| p.compile().unwrap().matches(&record);
        assert!(check(cmp("user__email", Lookup::Contains, json!("example"))));
        assert!(check(cmp("user", Lookup::Exact, json!(2))));
        assert!(check(cmp("user", Lookup::In, json!([1, 2]))));
        assert!(check(cmp("tags__name", Lookup::Exact, json!("blue"))));
        assert!(!check(cmp("tags__name", Lookup::Exact, json!("green"))));
        assert!(check(cmp("notes", Lookup::IsNull, json!(true))));
        assert!(check(cmp("closed", Lookup::IsNull, json!(true))));
        assert!(check(cmp("missing", Lookup::IsNull, json!(true))));
        assert!(!check(cmp("name", Lookup::IsNull, json!(true))));
        assert!(!check(cmp("name__first", Lookup::Exact, json!("x"))));
        assert!(check(!cmp("name", Lookup::Exact, json!("y"))));
        assert!(check(Predicate::True));
        assert!(!check(!Predicate::True));
    }

    #[test]
    fn bad_operator() {
        assert!(cmp("a", Lookup::In, json!(1)).compile().is_err());
    }
}
