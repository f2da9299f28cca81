//! Declared filters.
//!
//! A [`Filter`] binds a field path to a [`Lookup`]. Ordinary filters
//! compare the field itself; annotated filters compare a value that
//! has to be computed first (a search rank, a trigram similarity),
//! which the submitted data supplies as an
//! [`AnnotatedValue`](crate::search::AnnotatedValue).

use std::str::FromStr;

use log::trace;
use serde_json::Value;

use crate::conf::LOOKUP_SEP;
use crate::data::FilterValue;
use crate::error::{ConfigError, FilterError};
use crate::model::FieldKind;
use crate::predicate::{Comparison, Operand, Predicate, Rhs};
use crate::proxy::QuerySource;

/// The standard Django lookups.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Range,
    IsNull,
    Regex,
    IRegex,
}

impl Lookup {
    /// Parse a Django lookup name.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        Lookup::from_str(name).map_err(|_| ConfigError::UnknownLookup(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn is_default(&self) -> bool {
        *self == Lookup::Exact
    }
}

/// What a filter compares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// The model field named by the filter's field path.
    Field,
    /// A computed annotation, produced by the annotated lookup with
    /// this postfix.
    Annotated(String),
}

/// One declared filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub field_name: String,
    pub lookup: Lookup,
    pub kind: FilterKind,
    pub label: Option<String>,
    pub exclude: bool,
    pub required: bool,
    pub form_kind: Option<FieldKind>,
    pub choices: Option<Vec<String>>,
}

impl Filter {
    pub fn new(field_name: impl Into<String>, lookup: Lookup) -> Self {
        Self {
            field_name: field_name.into(),
            lookup,
            kind: FilterKind::Field,
            label: None,
            exclude: false,
            required: false,
            form_kind: None,
            choices: None,
        }
    }

    /// A filter on an annotation computed by the lookup with `postfix`.
    pub fn annotated(field_name: impl Into<String>, lookup: Lookup, postfix: &str) -> Self {
        Self {
            kind: FilterKind::Annotated(postfix.to_string()),
            ..Self::new(field_name, lookup)
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Exclude matching records instead of including them.
    pub fn exclude(mut self) -> Self {
        self.exclude = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Validate submitted values as `kind`, instead of as the model field.
    pub fn form_kind(mut self, kind: FieldKind) -> Self {
        self.form_kind = Some(kind);
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_annotated(&self) -> bool {
        matches!(self.kind, FilterKind::Annotated(_))
    }

    /// The canonical key for this filter: its field path, with the
    /// lookup appended unless it is the default.
    pub fn default_key(&self) -> String {
        if self.lookup.is_default() {
            self.field_name.clone()
        } else {
            format!("{}{}{}", self.field_name, LOOKUP_SEP, self.lookup)
        }
    }

    /// The comparison this filter makes against `value`.
    ///
    /// `seq` distinguishes annotations created for the same filter
    /// within one request. Empty values produce no comparison.
    pub fn comparison(&self, value: &FilterValue, seq: usize) -> Result<Option<Comparison>, FilterError> {
        match (value, &self.kind) {
            (FilterValue::Plain(v), _) if is_empty(v) => Ok(None),
            (FilterValue::Plain(v), FilterKind::Field) => Ok(Some(Comparison {
                lhs: Operand::field(&self.field_name),
                lookup: self.lookup,
                rhs: Rhs::Value(v.clone()),
            })),
            (FilterValue::Annotated(a), FilterKind::Annotated(_)) => Ok(Some(Comparison {
                lhs: Operand::Annotation {
                    // the field name already ends with the postfix
                    alias: format!("{}_{}", self.field_name.replace(LOOKUP_SEP, "_"), seq),
                    expression: a.annotation.clone(),
                },
                lookup: self.lookup,
                rhs: a.rhs.clone(),
            })),
            (FilterValue::Plain(_), FilterKind::Annotated(postfix)) => Err(anyhow::anyhow!(
                "filter on `{}` needs a `{}` value",
                self.field_name,
                postfix
            )
            .into()),
            (FilterValue::Annotated(_), FilterKind::Field) => Err(anyhow::anyhow!(
                "filter on `{}` does not take a computed value",
                self.field_name
            )
            .into()),
        }
    }

    /// Apply this filter to `qs`.
    pub fn filter(
        &self,
        qs: &mut dyn QuerySource,
        value: &FilterValue,
        seq: usize,
    ) -> Result<(), FilterError> {
        if let Some(comparison) = self.comparison(value, seq)? {
            trace!("{} {}", if self.exclude { "exclude" } else { "include" }, comparison);
            let predicate = Predicate::Compare(comparison);
            if self.exclude {
                qs.exclude(predicate);
            } else {
                qs.include(predicate);
            }
        }
        Ok(())
    }
}

/// The values Django treats as "not supplied".
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::QueryCaptureProxy;
    use serde_json::json;

    #[test]
    fn lookup_names() {
        assert_eq!(Lookup::parse("iexact").unwrap(), Lookup::IExact);
        assert_eq!(Lookup::parse("startswith").unwrap(), Lookup::StartsWith);
        assert_eq!(Lookup::IsNull.as_str(), "isnull");
        assert_eq!(Lookup::IEndsWith.to_string(), "iendswith");
        assert!(matches!(
            Lookup::parse("near"),
            Err(ConfigError::UnknownLookup(name)) if name == "near"
        ));
    }

    #[test]
    fn default_key() {
        assert_eq!(Filter::new("user__email", Lookup::Exact).default_key(), "user__email");
        assert_eq!(
            Filter::new("user__email", Lookup::Contains).default_key(),
            "user__email__contains"
        );
    }

    #[test]
    fn empty_is_noop() {
        let f = Filter::new("name", Lookup::Exact);
        let source = ();
        for v in [json!(null), json!(""), json!([]), json!({})] {
            let mut proxy = QueryCaptureProxy::new(&source);
            f.filter(&mut proxy, &FilterValue::Plain(v), 0).unwrap();
            assert_eq!(proxy.into_predicate(), Predicate::True);
        }
    }

    #[test]
    fn exclude_flag() {
        let f = Filter::new("name", Lookup::Contains).exclude();
        let source = ();
        let mut proxy = QueryCaptureProxy::new(&source);
        f.filter(&mut proxy, &FilterValue::Plain(json!("x")), 0).unwrap();
        let expected = !Predicate::Compare(Comparison {
            lhs: Operand::field("name"),
            lookup: Lookup::Contains,
            rhs: Rhs::Value(json!("x")),
        });
        assert_eq!(proxy.into_predicate(), expected);
    }

    #[test]
    fn annotated_needs_annotated_value() {
        let f = Filter::annotated("search_rank", Lookup::Gt, "search_rank");
        assert!(f.comparison(&FilterValue::Plain(json!(0.5)), 0).is_err());
    }
}
