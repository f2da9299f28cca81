//! In-memory versions of the standard Django lookups.
//!
//! A composed [`Predicate`](crate::predicate::Predicate) is normally
//! handed to a real query backend, but it can also be checked against
//! JSON records directly. Each lookup has an [`Operator`] which is
//! instantiated from the lookup and its right hand side:
//!
//! [`Lookup`]      | [`Operator`]          | Applies to
//! ----------------|-----------------------|-----------------------
//! `exact`         | [`ExactImpl`]         | any scalar
//! `iexact`        | [`IExactImpl`]        | string representation
//! `contains`      | [`ContainsImpl`]      | string representation
//! `icontains`     | [`IContainsImpl`]     | string representation
//! `in`            | [`InImpl`]            | any scalar
//! `gt`            | [`GreaterImpl`]       | numbers, dates, strings
//! `gte`           | [`GreaterEqImpl`]     | numbers, dates, strings
//! `lt`            | [`LessImpl`]          | numbers, dates, strings
//! `lte`           | [`LessEqImpl`]        | numbers, dates, strings
//! `startswith`    | [`StartsWithImpl`]    | string representation
//! `istartswith`   | [`IStartsWithImpl`]   | string representation
//! `endswith`      | [`EndsWithImpl`]      | string representation
//! `iendswith`     | [`IEndsWithImpl`]     | string representation
//! `range`         | [`RangeImpl`]         | numbers, dates, strings
//! `isnull`        | [`IsNullImpl`]        |
//! `regex`         | [`RegexImpl`]         | string representation
//! `iregex`        | [`RegexImpl`]         | string representation

use core::cmp::Ordering;

use anyhow::anyhow;
use serde_json::Value;

use crate::error::FilterError;
use crate::filters::Lookup;

/// A comparison against a single scalar value.
///
/// Collections and missing values are handled by whoever walks the
/// record; they consult [`empty_collection`](Operator::empty_collection)
/// and [`null_option`](Operator::null_option) to decide what an
/// empty list or a null means for this operator.
pub trait Operator: Send + Sync {
    fn apply(&self, value: &Value) -> bool;
    fn empty_collection(&self) -> bool {
        false
    }
    fn null_option(&self) -> bool {
        false
    }
}

/// Create the [`Operator`] for `lookup` with right hand side `rhs`.
pub fn instantiate(lookup: Lookup, rhs: &Value) -> Result<Box<dyn Operator>, FilterError> {
    let op: Box<dyn Operator> = match lookup {
        Lookup::Exact => Box::new(ExactImpl {
            target: rhs.clone(),
        }),
        Lookup::IExact => Box::new(IExactImpl {
            target: text(rhs)?.to_lowercase(),
        }),
        Lookup::Contains => Box::new(ContainsImpl { target: text(rhs)? }),
        Lookup::IContains => Box::new(IContainsImpl {
            target: text(rhs)?.to_lowercase(),
        }),
        Lookup::In => Box::new(InImpl {
            targets: rhs
                .as_array()
                .cloned()
                .ok_or_else(|| anyhow!("expected a list for `in`, got {}", rhs))?,
        }),
        Lookup::Gt => Box::new(GreaterImpl {
            target: rhs.clone(),
        }),
        Lookup::Gte => Box::new(GreaterEqImpl {
            target: rhs.clone(),
        }),
        Lookup::Lt => Box::new(LessImpl {
            target: rhs.clone(),
        }),
        Lookup::Lte => Box::new(LessEqImpl {
            target: rhs.clone(),
        }),
        Lookup::StartsWith => Box::new(StartsWithImpl { target: text(rhs)? }),
        Lookup::IStartsWith => Box::new(IStartsWithImpl {
            target: text(rhs)?.to_lowercase(),
        }),
        Lookup::EndsWith => Box::new(EndsWithImpl { target: text(rhs)? }),
        Lookup::IEndsWith => Box::new(IEndsWithImpl {
            target: text(rhs)?.to_lowercase(),
        }),
        Lookup::Range => match rhs.as_array().map(Vec::as_slice) {
            Some([low, high]) => Box::new(RangeImpl {
                low: low.clone(),
                high: high.clone(),
            }),
            _ => return Err(anyhow!("expected a pair for `range`, got {}", rhs).into()),
        },
        Lookup::IsNull => Box::new(IsNullImpl {
            target: rhs
                .as_bool()
                .ok_or_else(|| anyhow!("expected a boolean for `isnull`, got {}", rhs))?,
        }),
        Lookup::Regex => Box::new(RegexImpl {
            re: regex::Regex::new(&text(rhs)?).map_err(anyhow::Error::from)?,
        }),
        Lookup::IRegex => Box::new(RegexImpl {
            re: regex::RegexBuilder::new(&text(rhs)?)
                .case_insensitive(true)
                .build()
                .map_err(anyhow::Error::from)?,
        }),
    };
    Ok(op)
}

fn text(rhs: &Value) -> Result<String, FilterError> {
    as_text(rhs).ok_or_else(|| anyhow!("expected a scalar, got {}", rhs).into())
}

/// The string representation of a scalar, as Django would compare it.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Order two scalars.
///
/// Numbers compare numerically. Strings compare as datetimes when
/// both parse as RFC 3339, as dates when both parse as ISO dates, and
/// lexically otherwise. Mismatched kinds are unordered.
pub fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => {
            if let (Ok(a), Ok(b)) = (
                chrono::DateTime::parse_from_rfc3339(a),
                chrono::DateTime::parse_from_rfc3339(b),
            ) {
                Some(a.cmp(&b))
            } else if let (Ok(a), Ok(b)) = (
                chrono::NaiveDate::parse_from_str(a, "%Y-%m-%d"),
                chrono::NaiveDate::parse_from_str(b, "%Y-%m-%d"),
            ) {
                Some(a.cmp(&b))
            } else {
                Some(a.cmp(b))
            }
        }
        _ => None,
    }
}

fn equal(lhs: &Value, rhs: &Value) -> bool {
    compare_values(lhs, rhs) == Some(Ordering::Equal) || lhs == rhs
}

/// Match when the value is equal to the target.
pub struct ExactImpl {
    target: Value,
}

impl Operator for ExactImpl {
    fn apply(&self, value: &Value) -> bool {
        equal(value, &self.target)
    }
    fn null_option(&self) -> bool {
        self.target.is_null()
    }
}

/// Match when the string representation of the value is exactly the target, case insensitively.
pub struct IExactImpl {
    target: String,
}

impl Operator for IExactImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.to_lowercase() == self.target)
    }
}

/// Match when the string representation of the value contains the target.
pub struct ContainsImpl {
    target: String,
}

impl Operator for ContainsImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.contains(&self.target))
    }
}

/// Match when the string representation of the value contains the target case insensitively.
pub struct IContainsImpl {
    target: String,
}

impl Operator for IContainsImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.to_lowercase().contains(&self.target))
    }
}

/// Match when the value is equal to one of the targets.
pub struct InImpl {
    targets: Vec<Value>,
}

impl Operator for InImpl {
    fn apply(&self, value: &Value) -> bool {
        self.targets.iter().any(|t| equal(value, t))
    }
}

/// Match when value is greater than the target.
pub struct GreaterImpl {
    target: Value,
}

impl Operator for GreaterImpl {
    fn apply(&self, value: &Value) -> bool {
        compare_values(value, &self.target) == Some(Ordering::Greater)
    }
}

/// Match when the value is greater than or equal to the target.
pub struct GreaterEqImpl {
    target: Value,
}

impl Operator for GreaterEqImpl {
    fn apply(&self, value: &Value) -> bool {
        matches!(
            compare_values(value, &self.target),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

/// Match when value is less than the target.
pub struct LessImpl {
    target: Value,
}

impl Operator for LessImpl {
    fn apply(&self, value: &Value) -> bool {
        compare_values(value, &self.target) == Some(Ordering::Less)
    }
}

/// Match when the value is less than or equal to the target.
pub struct LessEqImpl {
    target: Value,
}

impl Operator for LessEqImpl {
    fn apply(&self, value: &Value) -> bool {
        matches!(
            compare_values(value, &self.target),
            Some(Ordering::Less | Ordering::Equal)
        )
    }
}

/// Match when the string representation of the value starts with the target.
pub struct StartsWithImpl {
    target: String,
}

impl Operator for StartsWithImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.starts_with(&self.target))
    }
}

/// Match when the string representation of the value starts with the target case insensitively.
pub struct IStartsWithImpl {
    target: String,
}

impl Operator for IStartsWithImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.to_lowercase().starts_with(&self.target))
    }
}

/// Match when the string representation of the value ends with the target.
pub struct EndsWithImpl {
    target: String,
}

impl Operator for EndsWithImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.ends_with(&self.target))
    }
}

/// Match when the string representation of the value ends with the target case insensitively.
pub struct IEndsWithImpl {
    target: String,
}

impl Operator for IEndsWithImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| v.to_lowercase().ends_with(&self.target))
    }
}

/// Match when the value lies between the two targets, inclusively.
pub struct RangeImpl {
    low: Value,
    high: Value,
}

impl Operator for RangeImpl {
    fn apply(&self, value: &Value) -> bool {
        matches!(
            compare_values(value, &self.low),
            Some(Ordering::Greater | Ordering::Equal)
        ) && matches!(
            compare_values(value, &self.high),
            Some(Ordering::Less | Ordering::Equal)
        )
    }
}

/// Match when there is no value, because the field is null or an empty collection.
pub struct IsNullImpl {
    target: bool,
}

impl Operator for IsNullImpl {
    fn apply(&self, _value: &Value) -> bool {
        !self.target
    }
    fn empty_collection(&self) -> bool {
        self.target
    }
    fn null_option(&self) -> bool {
        self.target
    }
}

/// Match when the string representation of the value matches a regular expression.
pub struct RegexImpl {
    re: regex::Regex,
}

impl Operator for RegexImpl {
    fn apply(&self, value: &Value) -> bool {
        as_text(value).map_or(false, |v| self.re.is_match(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(lookup: Lookup, rhs: Value) -> Box<dyn Operator> {
        instantiate(lookup, &rhs).unwrap()
    }

    #[test]
    fn exact() {
        let o = op(Lookup::Exact, json!(3));
        assert!(o.apply(&json!(3)));
        assert!(o.apply(&json!(3.0)));
        assert!(!o.apply(&json!(4)));
        assert!(!o.null_option());
        assert!(op(Lookup::Exact, Value::Null).null_option());
    }

    #[test]
    fn strings() {
        assert!(op(Lookup::IExact, json!("HeLLo")).apply(&json!("hello")));
        assert!(op(Lookup::Contains, json!("ell")).apply(&json!("hello")));
        assert!(!op(Lookup::Contains, json!("ELL")).apply(&json!("hello")));
        assert!(op(Lookup::IContains, json!("ELL")).apply(&json!("hello")));
        assert!(op(Lookup::StartsWith, json!("he")).apply(&json!("hello")));
        assert!(op(Lookup::IStartsWith, json!("HE")).apply(&json!("hello")));
        assert!(op(Lookup::EndsWith, json!("lo")).apply(&json!("hello")));
        assert!(op(Lookup::IEndsWith, json!("LO")).apply(&json!("hello")));
        assert!(op(Lookup::Contains, json!("2")).apply(&json!(123)));
    }

    #[test]
    fn ordering() {
        assert!(op(Lookup::Gt, json!(2)).apply(&json!(3)));
        assert!(!op(Lookup::Gt, json!(3)).apply(&json!(3)));
        assert!(op(Lookup::Gte, json!(3)).apply(&json!(3)));
        assert!(op(Lookup::Lt, json!(3.5)).apply(&json!(3)));
        assert!(op(Lookup::Lte, json!(3)).apply(&json!(3)));
        assert!(!op(Lookup::Lt, json!("a")).apply(&json!(3)));
    }

    #[test]
    fn dates() {
        let o = op(Lookup::Gt, json!("2022-01-01T00:00:00+01:00"));
        assert!(o.apply(&json!("2021-12-31T23:30:00Z")));
        assert!(!o.apply(&json!("2021-12-31T22:30:00Z")));
        let o = op(Lookup::Range, json!(["2022-01-01", "2022-01-31"]));
        assert!(o.apply(&json!("2022-01-31")));
        assert!(!o.apply(&json!("2022-02-01")));
    }

    #[test]
    fn membership() {
        let o = op(Lookup::In, json!([1, 2, 5]));
        assert!(o.apply(&json!(2)));
        assert!(!o.apply(&json!(3)));
        assert!(instantiate(Lookup::In, &json!(1)).is_err());
        assert!(instantiate(Lookup::Range, &json!([1])).is_err());
    }

    #[test]
    fn isnull() {
        let o = op(Lookup::IsNull, json!(true));
        assert!(!o.apply(&json!(1)));
        assert!(o.null_option());
        assert!(o.empty_collection());
        let o = op(Lookup::IsNull, json!(false));
        assert!(o.apply(&json!(1)));
        assert!(!o.null_option());
    }

    #[test]
    fn regex() {
        assert!(op(Lookup::Regex, json!("^a.c$")).apply(&json!("abc")));
        assert!(!op(Lookup::Regex, json!("^A.c$")).apply(&json!("abc")));
        assert!(op(Lookup::IRegex, json!("^A.c$")).apply(&json!("abc")));
        assert!(matches!(
            instantiate(Lookup::Regex, &json!("(")),
            Err(FilterError::Instantiation(_))
        ));
    }
}
