//! Validation of normalised filter trees.
//!
//! Every node of a [`FilterData`] tree gets its own [`TreeForm`],
//! which cleans the node's values against the form fields of their
//! filters. Errors are reported as an [`ErrorTree`] with the same
//! shape as the data, so a bad value nested in the second `or`
//! branch is reported under `or.1`.
//!
//! Cleaning follows Django's form fields:
//!
//! Kind                     | Accepted                      | Cleaned to
//! -------------------------|-------------------------------|-----------
//! `String`, `Text`         | any scalar                    | string
//! `Email`                  | `user@domain.tld`             | string
//! `Integer`                | integral number or string     | integer
//! `Float`, `Decimal`       | number or numeric string      | float
//! `Boolean`                | bool, `"true"`, `"false"`     | bool
//! `Date`                   | `YYYY-MM-DD`                  | string
//! `DateTime`               | RFC 3339, or naive as UTC     | RFC 3339 string in UTC
//! `Time`                   | `HH:MM[:SS[.f]]`              | `HH:MM:SS[.f]` string
//! `ForeignKey`             | integer or string id          | integer or string
//!
//! `in` takes a list (or a comma separated string) of these, and
//! `range` exactly two, either of which may be null.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::conf::{Combinator, Settings};
use crate::data::{FilterData, FilterValue};
use crate::filters::{is_empty, Filter};
use crate::filterset::{FilterSet, FormField, ValueShape};
use crate::model::FieldKind;

/// The key errors that aren't about a single field are stored under.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Validation errors, shaped like the tree they were found in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorTree {
    pub fields: BTreeMap<String, Vec<String>>,
    pub and: BTreeMap<usize, ErrorTree>,
    pub or: BTreeMap<usize, ErrorTree>,
    pub not: Option<Box<ErrorTree>>,
}

impl ErrorTree {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.and.is_empty() && self.or.is_empty() && self.not.is_none()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message)
    }

    /// Render as JSON, using the configured combinator keys.
    pub fn to_json(&self, settings: &Settings) -> Value {
        let mut map = Map::new();
        for (field, messages) in &self.fields {
            map.insert(
                field.clone(),
                Value::Array(messages.iter().cloned().map(Value::String).collect()),
            );
        }
        for (combinator, children) in [(Combinator::And, &self.and), (Combinator::Or, &self.or)] {
            if !children.is_empty() {
                let children = children
                    .iter()
                    .map(|(i, tree)| (i.to_string(), tree.to_json(settings)))
                    .collect();
                map.insert(
                    settings.combinator_key(combinator).to_string(),
                    Value::Object(children),
                );
            }
        }
        if let Some(not) = &self.not {
            map.insert(
                settings.combinator_key(Combinator::Not).to_string(),
                not.to_json(settings),
            );
        }
        Value::Object(map)
    }

    /// Every message with the dotted path of where it was found.
    pub fn flatten(&self, settings: &Settings) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.flatten_into("", settings, &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, settings: &Settings, out: &mut Vec<(String, String)>) {
        let path = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            }
        };
        for (field, messages) in &self.fields {
            for message in messages {
                out.push((path(field), message.clone()));
            }
        }
        for (combinator, children) in [(Combinator::And, &self.and), (Combinator::Or, &self.or)] {
            for (i, tree) in children {
                let key = format!("{}.{}", settings.combinator_key(combinator), i);
                tree.flatten_into(&path(&key), settings, out);
            }
        }
        if let Some(not) = &self.not {
            not.flatten_into(&path(settings.combinator_key(Combinator::Not)), settings, out);
        }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flat = self.flatten(&Settings::default());
        for (i, (path, message)) in flat.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", path, message)?;
        }
        Ok(())
    }
}

/// The validated form of one filter tree node.
#[derive(Debug)]
pub struct TreeForm<'f> {
    filterset: &'f FilterSet,
    cleaned_data: BTreeMap<String, FilterValue>,
    errors: BTreeMap<String, Vec<String>>,
    and_forms: Vec<TreeForm<'f>>,
    or_forms: Vec<TreeForm<'f>>,
    not_form: Option<Box<TreeForm<'f>>>,
}

impl<'f> TreeForm<'f> {
    /// Validate `data` against `filterset`.
    ///
    /// Required filters are only enforced on the root node; a branch
    /// of an `or` doesn't have to repeat them.
    pub fn new(filterset: &'f FilterSet, data: &FilterData) -> Self {
        Self::build(filterset, data, true)
    }

    fn build(filterset: &'f FilterSet, data: &FilterData, root: bool) -> Self {
        let mut form = TreeForm {
            filterset,
            cleaned_data: BTreeMap::new(),
            errors: BTreeMap::new(),
            and_forms: data.and.iter().map(|d| Self::build(filterset, d, false)).collect(),
            or_forms: data.or.iter().map(|d| Self::build(filterset, d, false)).collect(),
            not_form: data
                .not
                .as_ref()
                .map(|d| Box::new(Self::build(filterset, d, false))),
        };
        for (key, value) in &data.values {
            match form.clean(key, value) {
                Ok(cleaned) => {
                    form.cleaned_data.insert(key.clone(), cleaned);
                }
                Err(messages) => {
                    form.errors.insert(key.clone(), messages);
                }
            }
        }
        if root {
            // a submitted key may be a field path rather than the declared name
            let submitted: Vec<&Filter> = data
                .values
                .keys()
                .filter_map(|k| filterset.find_filter(k).ok())
                .collect();
            for (key, filter) in filterset.filters() {
                if filter.required && !submitted.contains(&filter) {
                    form.errors
                        .entry(key.to_string())
                        .or_default()
                        .push("This field is required.".to_string());
                }
            }
        }
        form
    }

    fn clean(&self, key: &str, value: &FilterValue) -> Result<FilterValue, Vec<String>> {
        let filter = self
            .filterset
            .find_filter(key)
            .map_err(|_| vec!["No filter matches this key.".to_string()])?;
        match (value, filter.is_annotated()) {
            (FilterValue::Annotated(_), true) => Ok(value.clone()),
            (FilterValue::Plain(v), false) => {
                let field = self
                    .filterset
                    .form_field(filter)
                    .map_err(|e| vec![e.to_string()])?;
                clean_value(&field, v).map(FilterValue::Plain)
            }
            (FilterValue::Plain(_), true) => {
                Err(vec!["This filter takes a search input object.".to_string()])
            }
            (FilterValue::Annotated(_), false) => {
                Err(vec!["This filter takes a plain value.".to_string()])
            }
        }
    }

    pub fn filterset(&self) -> &'f FilterSet {
        self.filterset
    }

    /// Whether this node and everything below it validated.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
            && self.and_forms.iter().all(TreeForm::is_valid)
            && self.or_forms.iter().all(TreeForm::is_valid)
            && self.not_form.as_ref().map_or(true, |f| f.is_valid())
    }

    pub fn errors(&self) -> ErrorTree {
        let collect = |forms: &[TreeForm<'f>]| {
            forms
                .iter()
                .enumerate()
                .map(|(i, f)| (i, f.errors()))
                .filter(|(_, e)| !e.is_empty())
                .collect()
        };
        ErrorTree {
            fields: self.errors.clone(),
            and: collect(&self.and_forms),
            or: collect(&self.or_forms),
            not: self
                .not_form
                .as_ref()
                .map(|f| f.errors())
                .filter(|e| !e.is_empty())
                .map(Box::new),
        }
    }

    pub fn cleaned_data(&self) -> &BTreeMap<String, FilterValue> {
        &self.cleaned_data
    }

    pub fn and_forms(&self) -> &[TreeForm<'f>] {
        &self.and_forms
    }

    pub fn or_forms(&self) -> &[TreeForm<'f>] {
        &self.or_forms
    }

    pub fn not_form(&self) -> Option<&TreeForm<'f>> {
        self.not_form.as_deref()
    }
}

/// Clean a submitted value for `field`.
pub fn clean_value(field: &FormField, value: &Value) -> Result<Value, Vec<String>> {
    if is_empty(value) {
        return Ok(value.clone());
    }
    let scalar = |v: &Value| clean_scalar(field, v);
    match field.shape {
        ValueShape::Single => scalar(value).map_err(|e| vec![e]),
        ValueShape::List => {
            let items: Vec<Value> = match value {
                Value::Array(items) => items.clone(),
                Value::String(s) => s.split(',').map(|p| Value::String(p.trim().to_string())).collect(),
                _ => return Err(vec!["Enter a list of values.".to_string()]),
            };
            let mut errors = Vec::new();
            let cleaned: Vec<Value> = items
                .iter()
                .filter_map(|v| scalar(v).map_err(|e| errors.push(e)).ok())
                .collect();
            if errors.is_empty() {
                Ok(Value::Array(cleaned))
            } else {
                Err(errors)
            }
        }
        ValueShape::Range => match value.as_array().map(Vec::as_slice) {
            Some([lower, upper]) => {
                let bound = |v: &Value| {
                    if v.is_null() {
                        Ok(Value::Null)
                    } else {
                        scalar(v)
                    }
                };
                match (bound(lower), bound(upper)) {
                    (Ok(l), Ok(u)) => Ok(Value::Array(vec![l, u])),
                    (l, u) => Err(l.err().into_iter().chain(u.err()).collect()),
                }
            }
            _ => Err(vec!["Enter a range as a lower and an upper value.".to_string()]),
        },
    }
}

fn clean_scalar(field: &FormField, value: &Value) -> Result<Value, String> {
    let cleaned = match field.kind {
        FieldKind::String | FieldKind::Text => text(value).map(Value::String),
        FieldKind::Email => text(value).and_then(|s| {
            if is_email(&s) {
                Ok(Value::String(s))
            } else {
                Err("Enter a valid email address.".to_string())
            }
        }),
        FieldKind::Integer => integer(value)
            .map(Value::from)
            .ok_or_else(|| "Enter a whole number.".to_string()),
        FieldKind::Float | FieldKind::Decimal => float(value)
            .map(Value::from)
            .ok_or_else(|| "Enter a number.".to_string()),
        FieldKind::Boolean => boolean(value)
            .map(Value::Bool)
            .ok_or_else(|| "Enter a valid boolean.".to_string()),
        FieldKind::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| "Enter a valid date.".to_string()),
        FieldKind::DateTime => value
            .as_str()
            .and_then(datetime)
            .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .ok_or_else(|| "Enter a valid date/time.".to_string()),
        FieldKind::Time => value
            .as_str()
            .and_then(|s| {
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
            })
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .ok_or_else(|| "Enter a valid time.".to_string()),
        FieldKind::ForeignKey => match value {
            Value::Number(_) => integer(value)
                .map(Value::from)
                .ok_or_else(|| "Enter a valid id.".to_string()),
            Value::String(s) => Ok(s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.clone()))),
            _ => Err("Enter a valid id.".to_string()),
        },
    }?;
    if let Some(choices) = &field.choices {
        let text = match &cleaned {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !choices.contains(&text) {
            return Err(format!(
                "Select a valid choice. {} is not one of the available choices.",
                text
            ));
        }
    }
    Ok(cleaned)
}

fn text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err("Enter a valid value.".to_string()),
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[-!#$%&'*+/=?^_`{}|~0-9a-z]+(?:\.[-!#$%&'*+/=?^_`{}|~0-9a-z]+)*@(?:localhost|(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9-]{1,62}[a-z0-9])$",
    )
    .expect("valid email regex")
});

/// Django's `EmailValidator`, without quoted local parts or literal
/// address domains.
fn is_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotated::AnnotatedLookupRegistry;
    use crate::conf::Features;
    use crate::filters::{Filter, Lookup};
    use crate::filterset::FilterSetBuilder;
    use crate::model::{ModelField, ModelMeta};
    use serde_json::json;

    fn filterset() -> FilterSet {
        let user = ModelMeta::new("User").with_field("email", ModelField::new(FieldKind::Email));
        let model = ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("priority", ModelField::new(FieldKind::Integer))
            .with_field("status", ModelField::new(FieldKind::String).with_choices(["open", "closed"]))
            .with_field("created_at", ModelField::new(FieldKind::DateTime))
            .with_field("due", ModelField::new(FieldKind::Date))
            .with_field("user", ModelField::foreign_key(user));
        FilterSetBuilder::new(model)
            .fields("name", &["exact"])
            .fields("priority", &["exact", "in", "range", "isnull"])
            .fields("status", &["exact"])
            .fields("created_at", &["gt"])
            .fields("due", &["lte"])
            .fields("user", &["exact"])
            .fields("user__email", &["exact"])
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap()
    }

    fn data(pairs: &[(&str, Value)]) -> FilterData {
        FilterData {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), FilterValue::Plain(v.clone())))
                .collect(),
            ..Default::default()
        }
    }

    fn cleaned(form: &TreeForm, key: &str) -> Value {
        match &form.cleaned_data()[key] {
            FilterValue::Plain(v) => v.clone(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cleans_values() {
        let fs = filterset();
        let d = data(&[
            ("priority", json!("3")),
            ("priority__in", json!("1, 2")),
            ("priority__range", json!([1, null])),
            ("priority__isnull", json!("false")),
            ("created_at__gt", json!("2022-01-01T02:00:00+02:00")),
            ("due__lte", json!("2022-03-04")),
            ("user", json!("7")),
            ("status", json!("open")),
        ]);
        let form = TreeForm::new(&fs, &d);
        assert!(form.is_valid(), "{}", form.errors());
        assert_eq!(cleaned(&form, "priority"), json!(3));
        assert_eq!(cleaned(&form, "priority__in"), json!([1, 2]));
        assert_eq!(cleaned(&form, "priority__range"), json!([1, null]));
        assert_eq!(cleaned(&form, "priority__isnull"), json!(false));
        assert_eq!(cleaned(&form, "created_at__gt"), json!("2022-01-01T00:00:00Z"));
        assert_eq!(cleaned(&form, "user"), json!(7));
    }

    #[test]
    fn reports_errors() {
        let fs = filterset();
        let d = data(&[
            ("priority", json!("high")),
            ("status", json!("pending")),
            ("user__email", json!("nobody")),
            ("due__lte", json!("03/04/2022")),
            ("colour", json!("red")),
        ]);
        let form = TreeForm::new(&fs, &d);
        assert!(!form.is_valid());
        let errors = form.errors();
        let fields: Vec<_> = errors.fields.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["colour", "due__lte", "priority", "status", "user__email"]);
        assert_eq!(errors.fields["priority"], vec!["Enter a whole number."]);
        assert_eq!(
            errors.fields["status"],
            vec!["Select a valid choice. pending is not one of the available choices."]
        );
    }

    #[test]
    fn nested_errors() {
        let fs = filterset();
        let mut d = data(&[("name", json!("x"))]);
        d.or = vec![data(&[("name", json!("y"))]), data(&[("priority", json!("z"))])];
        d.not = Some(Box::new(data(&[("due__lte", json!("soon"))])));
        let form = TreeForm::new(&fs, &d);
        assert!(!form.is_valid());
        assert!(form.or_forms()[0].is_valid());
        let errors = form.errors();
        let settings = Settings::default();
        let paths: Vec<_> = errors.flatten(&settings).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["or.1.priority", "not.due__lte"]);
        assert_eq!(
            errors.to_json(&settings),
            json!({
                "or": {"1": {"priority": ["Enter a whole number."]}},
                "not": {"due__lte": ["Enter a valid date."]},
            })
        );
    }

    #[test]
    fn required_on_root_only() {
        let model = ModelMeta::new("Task").with_field("name", ModelField::new(FieldKind::String));
        let fs = FilterSetBuilder::new(model)
            .declare("name", Filter::new("name", Lookup::Exact).required())
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap();
        let mut d = data(&[("name", json!("x"))]);
        d.or = vec![FilterData::default()];
        assert!(TreeForm::new(&fs, &d).is_valid());
        let form = TreeForm::new(&fs, &FilterData::default());
        assert_eq!(form.errors().fields["name"], vec!["This field is required."]);
    }

    #[test]
    fn required_by_declared_name() {
        let model = ModelMeta::new("Task").with_field("name", ModelField::new(FieldKind::String));
        let fs = FilterSetBuilder::new(model)
            .declare("named", Filter::new("name", Lookup::IStartsWith).required())
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap();
        let form = TreeForm::new(&fs, &data(&[("name__istartswith", json!("a"))]));
        assert!(form.is_valid(), "{}", form.errors());
        let form = TreeForm::new(&fs, &data(&[("named", json!("a"))]));
        assert!(form.is_valid(), "{}", form.errors());
        let form = TreeForm::new(&fs, &FilterData::default());
        assert_eq!(form.errors().fields["named"], vec!["This field is required."]);
    }

    #[test]
    fn emails() {
        for good in ["a@example.com", "first.last+tag@mail.example.co.uk", "root@localhost"] {
            assert!(is_email(good), "{}", good);
        }
        for bad in ["", "plain", "a@", "@example.com", "a b@example.com", "a..b@example.com", "a@example", "a@-x.com", "a@example.c"] {
            assert!(!is_email(bad), "{}", bad);
        }
    }

    #[test]
    fn empty_values_pass() {
        let field = FormField {
            kind: FieldKind::Integer,
            shape: ValueShape::Single,
            required: false,
            choices: None,
        };
        assert_eq!(clean_value(&field, &json!("")), Ok(json!("")));
        assert_eq!(clean_value(&field, &json!(2.0)), Ok(json!(2)));
    }
}
