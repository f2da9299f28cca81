//! Filterable connections.
//!
//! An [`AdvancedConnectionField`] ties a filter set to the node type
//! of a relay-style connection. It produces the filter argument for
//! the schema and resolves requests against rows:
//!
//! Argument | Meaning
//! ---------|---------
//! `filter` | the filter tree (named by [`Settings::filter_key`])
//! `first`  | page size; all remaining rows when absent
//! `offset` | rows to skip
//! `after`  | cursor of the last row already seen
//!
//! Cursors are row positions within the filtered result, as decimal
//! strings.

use core::cmp::min;
use std::sync::Arc;

use log::{trace, warn};
use serde_json::{json, Map, Value};

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::Settings;
use crate::engine::PredicateEngine;
use crate::error::{ConfigError, FilterError};
use crate::filterset::FilterSet;
use crate::predicate::Predicate;
use crate::proxy::QuerySource;
use crate::schema::{Argument, FilterArgumentsFactory, TypeRegistry};

/// A connection field with tree filtering.
#[derive(Clone, Debug)]
pub struct AdvancedConnectionField {
    node_type: String,
    filterset: Arc<FilterSet>,
    provided_filterset: bool,
    prefix: Option<String>,
}

impl AdvancedConnectionField {
    /// A connection over `node_type` with the filter set generated
    /// for its own fields.
    pub fn new(node_type: impl Into<String>, filterset: Arc<FilterSet>) -> Self {
        Self {
            node_type: node_type.into(),
            filterset,
            provided_filterset: false,
            prefix: None,
        }
    }

    /// A connection over `node_type` using a separately defined
    /// filter set.
    ///
    /// The same filter set may be used for several connections, so
    /// its types should be given an explicit [`prefix`](Self::prefix).
    pub fn with_filterset(node_type: impl Into<String>, filterset: Arc<FilterSet>) -> Self {
        Self {
            provided_filterset: true,
            ..Self::new(node_type, filterset)
        }
    }

    /// Set the prefix of the generated input type names.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn filterset(&self) -> &Arc<FilterSet> {
        &self.filterset
    }

    /// The prefix of the generated input type names.
    ///
    /// Without an explicit prefix, this is the node type name with
    /// `Type` removed, followed by the filter set name when a filter
    /// set was provided.
    pub fn filter_input_type_prefix(&self) -> String {
        if let Some(prefix) = &self.prefix {
            return prefix.clone();
        }
        let node_type_name = self.node_type.replace("Type", "");
        if self.provided_filterset {
            format!("{}{}", node_type_name, self.filterset.name())
        } else {
            node_type_name
        }
    }

    /// The filter argument, registering its types in `registry`.
    pub fn filtering_args(
        &self,
        registry: &TypeRegistry,
        settings: &Settings,
        lookups: &AnnotatedLookupRegistry,
    ) -> Result<Vec<Argument>, ConfigError> {
        if self.provided_filterset && self.prefix.is_none() {
            warn!(
                "{} on {} has no input type prefix, \
                 which can result in different types with the same name in the schema",
                self.filterset.name(),
                self.node_type
            );
        }
        FilterArgumentsFactory::new(
            &self.filterset,
            self.filter_input_type_prefix(),
            registry,
            settings,
            lookups,
        )
        .arguments()
    }

    pub fn resolver<'a>(
        &'a self,
        settings: &'a Settings,
        lookups: &'a AnnotatedLookupRegistry,
    ) -> ConnectionResolver<'a> {
        ConnectionResolver {
            engine: PredicateEngine::new(&self.filterset, settings, lookups),
        }
    }
}

/// An in-memory [`QuerySource`] over JSON rows.
#[derive(Clone, Debug)]
pub struct MemoryQuerySet<'r> {
    rows: &'r [Value],
    predicate: Predicate,
}

impl<'r> MemoryQuerySet<'r> {
    pub fn new(rows: &'r [Value]) -> Self {
        Self {
            rows,
            predicate: Predicate::True,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// The rows matching everything included and nothing excluded.
    pub fn evaluate(&self) -> Result<Vec<&'r Value>, FilterError> {
        let matcher = self.predicate.compile()?;
        Ok(self.rows.iter().filter(|row| matcher.matches(row)).collect())
    }
}

impl<'r> QuerySource for MemoryQuerySet<'r> {
    fn include(&mut self, predicate: Predicate) {
        let q = std::mem::take(&mut self.predicate);
        self.predicate = q & predicate;
    }

    fn exclude(&mut self, predicate: Predicate) {
        let q = std::mem::take(&mut self.predicate);
        self.predicate = q & !predicate;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub cursor: String,
    pub node: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// One page of a filtered connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub total_count: usize,
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
}

impl Connection {
    pub fn to_json(&self) -> Value {
        json!({
            "totalCount": self.total_count,
            "edges": self
                .edges
                .iter()
                .map(|e| json!({"cursor": e.cursor, "node": e.node}))
                .collect::<Vec<_>>(),
            "pageInfo": {
                "hasNextPage": self.page_info.has_next_page,
                "hasPreviousPage": self.page_info.has_previous_page,
                "startCursor": self.page_info.start_cursor,
                "endCursor": self.page_info.end_cursor,
            },
        })
    }
}

/// Resolves connection requests for one [`AdvancedConnectionField`].
pub struct ConnectionResolver<'a> {
    engine: PredicateEngine<'a>,
}

impl<'a> ConnectionResolver<'a> {
    pub fn resolve(&self, rows: &[Value], args: &Map<String, Value>) -> Result<Connection, FilterError> {
        let tree = args
            .get(&self.engine.settings().filter_key)
            .unwrap_or(&Value::Null);
        let mut qs = MemoryQuerySet::new(rows);
        self.engine.filter_queryset(&mut qs, tree)?;
        let matched = qs.evaluate()?;
        trace!("{} of {} rows matched", matched.len(), rows.len());

        let first = count_arg(args, "first")?;
        let offset = count_arg(args, "offset")?.unwrap_or(0);
        let after = match args.get("after") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse::<usize>().map_err(|_| FilterError::BadArgument {
                name: "after".to_string(),
                reason: format!("`{}` is not a cursor", s),
            })?),
            Some(other) => {
                return Err(FilterError::BadArgument {
                    name: "after".to_string(),
                    reason: format!("expected a cursor string, got {}", other),
                })
            }
        };

        let total_count = matched.len();
        let start = min(total_count, after.map_or(offset, |a| offset.max(a.saturating_add(1))));
        let end = min(total_count, first.map_or(total_count, |f| start.saturating_add(f)));
        let edges: Vec<Edge> = matched[start..end]
            .iter()
            .enumerate()
            .map(|(i, row)| Edge {
                cursor: (start + i).to_string(),
                node: (*row).clone(),
            })
            .collect();
        let page_info = PageInfo {
            has_next_page: end < total_count,
            has_previous_page: start > 0,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };
        Ok(Connection {
            total_count,
            edges,
            page_info,
        })
    }
}

fn count_arg(args: &Map<String, Value>, name: &str) -> Result<Option<usize>, FilterError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| FilterError::BadArgument {
                name: name.to_string(),
                reason: format!("expected a non-negative integer, got {}", v),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Features;
    use crate::filterset::FilterSetBuilder;
    use crate::model::{FieldKind, ModelField, ModelMeta};

    fn filterset() -> Arc<FilterSet> {
        let model = ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("priority", ModelField::new(FieldKind::Integer));
        Arc::new(
            FilterSetBuilder::new(model)
                .name("TaskFilter")
                .fields("name", &["exact", "icontains"])
                .fields("priority", &["gte"])
                .build(&Features::none(), &AnnotatedLookupRegistry::default())
                .unwrap(),
        )
    }

    fn rows() -> Vec<Value> {
        (1..=6)
            .map(|i| json!({"id": i, "name": format!("task {}", i), "priority": i % 3}))
            .collect()
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn prefixes() {
        let fs = filterset();
        assert_eq!(AdvancedConnectionField::new("TaskType", fs.clone()).filter_input_type_prefix(), "Task");
        assert_eq!(
            AdvancedConnectionField::with_filterset("TaskType", fs.clone()).filter_input_type_prefix(),
            "TaskTaskFilter"
        );
        assert_eq!(
            AdvancedConnectionField::with_filterset("TaskType", fs)
                .prefix("Mine")
                .filter_input_type_prefix(),
            "Mine"
        );
    }

    #[test_log::test]
    fn filtering_args() {
        let field = AdvancedConnectionField::with_filterset("TaskType", filterset());
        let registry = TypeRegistry::new();
        let args = field
            .filtering_args(&registry, &Settings::default(), &AnnotatedLookupRegistry::default())
            .unwrap();
        assert_eq!(args[0].to_string(), "filter: TaskTaskFilterFilterInputType");
        assert!(registry.contains("TaskTaskFilterNameFilterInputType"));
    }

    #[test]
    fn resolves_pages() {
        let field = AdvancedConnectionField::new("TaskType", filterset());
        let settings = Settings::default();
        let lookups = AnnotatedLookupRegistry::default();
        let resolver = field.resolver(&settings, &lookups);
        let rows = rows();

        let conn = resolver
            .resolve(&rows, &args(json!({"filter": {"priority": {"gte": 1}}, "first": 2})))
            .unwrap();
        assert_eq!(conn.total_count, 4);
        let ids: Vec<_> = conn.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);
        assert!(conn.page_info.has_next_page);
        assert!(!conn.page_info.has_previous_page);
        assert_eq!(conn.page_info.end_cursor.as_deref(), Some("1"));

        let conn = resolver
            .resolve(
                &rows,
                &args(json!({"filter": {"priority": {"gte": 1}}, "first": 2, "after": "1"})),
            )
            .unwrap();
        let ids: Vec<_> = conn.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(5)]);
        assert!(!conn.page_info.has_next_page);
        assert!(conn.page_info.has_previous_page);

        let conn = resolver.resolve(&rows, &args(json!({"offset": 5}))).unwrap();
        assert_eq!(conn.total_count, 6);
        assert_eq!(conn.edges.len(), 1);
        assert_eq!(conn.to_json()["edges"][0]["cursor"], json!("5"));
    }

    #[test]
    fn bad_arguments() {
        let field = AdvancedConnectionField::new("TaskType", filterset());
        let settings = Settings::default();
        let lookups = AnnotatedLookupRegistry::default();
        let resolver = field.resolver(&settings, &lookups);
        let res = resolver.resolve(&rows(), &args(json!({"first": -1})));
        assert!(matches!(res, Err(FilterError::BadArgument { name, .. }) if name == "first"));
        let res = resolver.resolve(&rows(), &args(json!({"filter": {"priority": {"gte": "x"}}})));
        assert!(matches!(res, Err(FilterError::Validation(_))));
    }

    #[test]
    fn huge_cursors_saturate() {
        let field = AdvancedConnectionField::new("TaskType", filterset());
        let settings = Settings::default();
        let lookups = AnnotatedLookupRegistry::default();
        let resolver = field.resolver(&settings, &lookups);
        let rows = rows();

        let conn = resolver
            .resolve(&rows, &args(json!({"after": usize::MAX.to_string()})))
            .unwrap();
        assert_eq!(conn.total_count, 6);
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);
        assert_eq!(conn.page_info.end_cursor, None);

        let conn = resolver
            .resolve(&rows, &args(json!({"after": "2", "first": u64::MAX})))
            .unwrap();
        let ids: Vec<_> = conn.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(5), json!(6)]);
    }
}
