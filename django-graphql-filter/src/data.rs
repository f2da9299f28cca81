//! Normalisation of submitted filter trees.
//!
//! A client submits a tree shaped like the generated input type:
//!
//! ```json
//! {
//!   "name": {"contains": "report"},
//!   "user": {"email": {"exact": "a@b.c"}},
//!   "or": [{"done": {"exact": true}}, {"search_rank": {...}}],
//!   "not": {"created_at": {"gt": "2022-01-01T00:00:00Z"}}
//! }
//! ```
//!
//! [`TreeDataNormalizer`] flattens each node's field subtrees into
//! filter keys (`name__contains`, `user__email`, ...), keeping the
//! combinators as nested [`FilterData`]. The default lookup is never
//! spelled out in a key, so `name: {exact: "x"}` yields `name`.
//!
//! Subtrees ending in an annotated lookup postfix are handed to the
//! lookup's spec as a whole, which may turn them into several keys.

use std::collections::BTreeMap;

use log::debug;
use serde_json::Value;

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::{Combinator, Settings, DEFAULT_LOOKUP_EXPR, LOOKUP_SEP};
use crate::error::FilterError;
use crate::filterset::FilterSet;
use crate::form::ErrorTree;
use crate::search::AnnotatedValue;

/// A submitted value for one filter key.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Plain(Value),
    Annotated(AnnotatedValue),
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        FilterValue::Plain(v)
    }
}

/// One node of a normalised filter tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterData {
    pub values: BTreeMap<String, FilterValue>,
    pub and: Vec<FilterData>,
    pub or: Vec<FilterData>,
    pub not: Option<Box<FilterData>>,
}

impl FilterData {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.and.is_empty() && self.or.is_empty() && self.not.is_none()
    }

    /// Number of nodes in this tree.
    pub fn nodes(&self) -> usize {
        1 + self.and.iter().map(FilterData::nodes).sum::<usize>()
            + self.or.iter().map(FilterData::nodes).sum::<usize>()
            + self.not.as_ref().map_or(0, |n| n.nodes())
    }
}

/// Join `key` onto `prefix`, dropping a trailing default lookup.
pub fn join_key(prefix: &str, key: &str) -> String {
    let full = if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", prefix, LOOKUP_SEP, key)
    };
    match full.strip_suffix(DEFAULT_LOOKUP_EXPR) {
        Some(rest) if rest.ends_with(LOOKUP_SEP) => rest[..rest.len() - LOOKUP_SEP.len()].to_string(),
        _ => full,
    }
}

pub struct TreeDataNormalizer<'a> {
    filterset: &'a FilterSet,
    settings: &'a Settings,
    lookups: &'a AnnotatedLookupRegistry,
}

impl<'a> TreeDataNormalizer<'a> {
    pub fn new(
        filterset: &'a FilterSet,
        settings: &'a Settings,
        lookups: &'a AnnotatedLookupRegistry,
    ) -> Self {
        Self {
            filterset,
            settings,
            lookups,
        }
    }

    /// Flatten a submitted tree.
    ///
    /// A null tree is an empty tree. Problems found here, such as a
    /// combinator that isn't a list or a malformed search input, are
    /// collected for the whole tree and returned together.
    pub fn normalize(&self, tree: &Value) -> Result<FilterData, FilterError> {
        let mut errors = ErrorTree::default();
        let data = self.node(tree, &mut errors);
        if errors.is_empty() {
            debug!("normalised filter tree with {} nodes", data.nodes());
            Ok(data)
        } else {
            Err(FilterError::Validation(errors))
        }
    }

    fn node(&self, tree: &Value, errors: &mut ErrorTree) -> FilterData {
        let mut data = FilterData::default();
        let obj = match tree {
            Value::Null => return data,
            Value::Object(obj) => obj,
            other => {
                errors.add_non_field(format!("expected an object, got {}", other));
                return data;
            }
        };
        for (key, value) in obj {
            if value.is_null() {
                continue;
            }
            match self.settings.combinator(key) {
                Some(combinator @ (Combinator::And | Combinator::Or)) => {
                    let items = match value.as_array() {
                        Some(items) => items,
                        None => {
                            errors.add(key, "expected a list");
                            continue;
                        }
                    };
                    for (i, item) in items.iter().enumerate() {
                        let mut child_errors = ErrorTree::default();
                        let child = self.node(item, &mut child_errors);
                        let (children, child_trees) = match combinator {
                            Combinator::And => (&mut data.and, &mut errors.and),
                            _ => (&mut data.or, &mut errors.or),
                        };
                        children.push(child);
                        if !child_errors.is_empty() {
                            child_trees.insert(i, child_errors);
                        }
                    }
                }
                Some(Combinator::Not) => {
                    let mut child_errors = ErrorTree::default();
                    data.not = Some(Box::new(self.node(value, &mut child_errors)));
                    if !child_errors.is_empty() {
                        errors.not = Some(Box::new(child_errors));
                    }
                }
                None => self.field("", key, value, &mut data.values, errors),
            }
        }
        data
    }

    fn field(
        &self,
        prefix: &str,
        key: &str,
        value: &Value,
        values: &mut BTreeMap<String, FilterValue>,
        errors: &mut ErrorTree,
    ) {
        let full = join_key(prefix, key);
        if let Some(spec) = self.lookups.match_key(&full) {
            match spec.create_data(&full, value, self.filterset, self.settings) {
                Ok(items) => values.extend(items),
                Err(messages) => {
                    for message in messages {
                        errors.add(&full, message);
                    }
                }
            }
        } else if let Value::Object(obj) = value {
            for (k, v) in obj {
                if !v.is_null() {
                    self.field(&full, k, v, values, errors);
                }
            }
        } else {
            values.insert(full, FilterValue::Plain(value.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{Features, SettingsOverrides};
    use crate::filterset::FilterSetBuilder;
    use crate::model::{FieldKind, ModelField, ModelMeta};
    use serde_json::json;

    fn filterset() -> FilterSet {
        let user = ModelMeta::new("User").with_field("email", ModelField::new(FieldKind::Email));
        let model = ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("user", ModelField::foreign_key(user));
        FilterSetBuilder::new(model)
            .fields("name", &["exact", "contains", "full_text_search"])
            .fields("user__email", &["exact", "in"])
            .build(&Features::postgresql(true), &AnnotatedLookupRegistry::default())
            .unwrap()
    }

    fn normalize(settings: &Settings, tree: Value) -> Result<FilterData, FilterError> {
        let fs = filterset();
        let lookups = AnnotatedLookupRegistry::default();
        TreeDataNormalizer::new(&fs, settings, &lookups).normalize(&tree)
    }

    fn plain(pairs: &[(&str, Value)]) -> BTreeMap<String, FilterValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FilterValue::Plain(v.clone())))
            .collect()
    }

    #[test]
    fn keys() {
        assert_eq!(join_key("", "name"), "name");
        assert_eq!(join_key("name", "exact"), "name");
        assert_eq!(join_key("name", "contains"), "name__contains");
        assert_eq!(join_key("user__email", "exact"), "user__email");
        assert_eq!(join_key("user__exact_name", "in"), "user__exact_name__in");
        assert_eq!(join_key("", "inexact"), "inexact");
    }

    #[test]
    fn flattens() {
        let data = normalize(
            &Settings::default(),
            json!({
                "name": {"exact": "a", "contains": "b"},
                "user": {"email": {"in": ["x@y.z"], "exact": null}},
                "or": [{"name": {"exact": "c"}}, {}],
                "and": [],
                "not": {"name": {"contains": "d"}},
            }),
        )
        .unwrap();
        assert_eq!(
            data.values,
            plain(&[
                ("name", json!("a")),
                ("name__contains", json!("b")),
                ("user__email__in", json!(["x@y.z"])),
            ])
        );
        assert!(data.and.is_empty());
        assert_eq!(data.or.len(), 2);
        assert_eq!(data.or[0].values, plain(&[("name", json!("c"))]));
        assert!(data.or[1].is_empty());
        assert_eq!(
            data.not.unwrap().values,
            plain(&[("name__contains", json!("d"))])
        );
    }

    #[test]
    fn null_tree() {
        assert!(normalize(&Settings::default(), Value::Null).unwrap().is_empty());
    }

    #[test]
    fn custom_keys() {
        let settings = Settings::default().with_overrides(&SettingsOverrides {
            or_key: Some("any".to_string()),
            ..Default::default()
        });
        let data = normalize(&settings, json!({"any": [{"name": {"exact": "c"}}]})).unwrap();
        assert_eq!(data.or.len(), 1);
        let data = normalize(&settings, json!({"or": [{"name": {"exact": "c"}}]})).unwrap();
        assert!(data.or.is_empty());
        assert!(data.values.contains_key("or"));
    }

    #[test]
    fn annotated_keys() {
        let data = normalize(
            &Settings::default(),
            json!({
                "search_rank": {
                    "vector": {"fields": ["name"]},
                    "query": {"value": "report"},
                    "lookups": {"gte": 0.5, "exact": 1.0},
                },
            }),
        )
        .unwrap();
        let keys: Vec<_> = data.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["search_rank", "search_rank__gte"]);
        assert!(matches!(data.values["search_rank"], FilterValue::Annotated(_)));
    }

    #[test]
    fn errors_are_positioned() {
        let err = normalize(
            &Settings::default(),
            json!({
                "or": [
                    {"name": {"exact": "ok"}},
                    {"search_query": {"vector": {"fields": ["user"]}, "query": {"value": "x"}}},
                ],
                "and": {"name": {"exact": "not a list"}},
            }),
        )
        .unwrap_err();
        let tree = match err {
            FilterError::Validation(tree) => tree,
            other => panic!("unexpected error {:?}", other),
        };
        let flat = tree.flatten(&Settings::default());
        let paths: Vec<_> = flat.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["and", "or.1.search_query"]);
    }
}
