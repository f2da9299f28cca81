#![cfg(test)]

use std::sync::Arc;

use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
use django_graphql_filter::*;
use serde_json::{json, Map, Value};

fn filterset(features: &Features) -> Arc<FilterSet> {
    let model = ModelMeta::new("Task")
        .with_field("name", ModelField::new(FieldKind::String))
        .with_field("notes", ModelField::new(FieldKind::Text));
    Arc::new(
        FilterSetBuilder::new(model)
            .fields("name", &["exact", "full_text_search"])
            .fields("notes", &["full_text_search"])
            .build(features, &AnnotatedLookupRegistry::default())
            .unwrap(),
    )
}

fn rows() -> Vec<Value> {
    [
        ("weekly report", "sent to the board"),
        ("monthly report", "late again"),
        ("weekly standup", "short"),
        ("quarterly review", "board meeting"),
        ("report archive", ""),
    ]
    .iter()
    .enumerate()
    .map(|(i, (name, notes))| json!({"id": i + 1, "name": name, "notes": notes}))
    .collect()
}

fn resolve(filter: Value) -> Result<Vec<i64>, FilterError> {
    let field = AdvancedConnectionField::new("TaskType", filterset(&Features::postgresql(true)));
    let settings = Settings::new(Features::postgresql(true));
    let lookups = AnnotatedLookupRegistry::default();
    let mut args = Map::new();
    args.insert("filter".to_string(), filter);
    let conn = field.resolver(&settings, &lookups).resolve(&rows(), &args)?;
    Ok(conn
        .edges
        .iter()
        .map(|e| e.node["id"].as_i64().unwrap())
        .collect())
}

#[test]
fn expansion_follows_features() {
    let fs = filterset(&Features::none());
    assert!(fs.get("search_query").is_none());
    assert_eq!(fs.warnings().len(), 1);
    assert!(fs.warnings()[0].contains("PostgreSQL"));

    let fs = filterset(&Features::postgresql(false));
    assert!(fs.get("search_query").is_some());
    assert!(fs.get("search_rank__gte").is_some());
    assert!(fs.get("name__trigram__gte").is_none());
    assert!(fs.warnings().iter().any(|w| w.contains("trigram")));

    let fs = filterset(&Features::postgresql(true));
    assert!(fs.get("name__trigram__gte").is_some());
    assert!(fs.get("notes__trigram__lt").is_some());
    assert!(fs.warnings().is_empty());
    assert_eq!(fs.get_full_text_search_fields(), &["name".to_string(), "notes".to_string()]);
}

#[test]
fn search_query() {
    let ids = resolve(json!({
        "search_query": {"vector": {"fields": ["name"]}, "query": {"value": "weekly"}},
    }))
    .unwrap();
    assert_eq!(ids, vec![1, 3]);

    let ids = resolve(json!({
        "search_query": {
            "vector": {"fields": ["name", "notes"]},
            "query": {"value": "report", "not": {"value": "board"}},
        },
    }))
    .unwrap();
    assert_eq!(ids, vec![2, 5]);

    let ids = resolve(json!({
        "search_query": {
            "vector": {"fields": ["name"]},
            "query": {"or": [{"value": "standup"}, {"value": "review"}]},
        },
    }))
    .unwrap();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn search_rank() {
    let ids = resolve(json!({
        "search_rank": {
            "vector": {"fields": ["name"]},
            "query": {"value": "report"},
            "lookups": {"gt": 0.0},
        },
    }))
    .unwrap();
    assert_eq!(ids, vec![1, 2, 5]);
}

#[test]
fn trigram() {
    let ids = resolve(json!({
        "name": {"trigram": {"value": "weekly report", "lookups": {"gte": 0.99}}},
    }))
    .unwrap();
    assert_eq!(ids, vec![1]);

    let ids = resolve(json!({
        "name": {"trigram": {"kind": "DISTANCE", "value": "weekly report", "lookups": {"lte": 0.01}}},
    }))
    .unwrap();
    assert_eq!(ids, vec![1]);
}

#[test]
fn search_combines_with_tree() {
    let ids = resolve(json!({
        "or": [
            {"search_query": {"vector": {"fields": ["name"]}, "query": {"value": "weekly"}}},
            {"name": "report archive"},
        ],
        "not": {"name": {"trigram": {"value": "weekly standup", "lookups": {"gte": 0.99}}}},
    }))
    .unwrap();
    assert_eq!(ids, vec![1, 5]);
}

#[test]
fn bad_search_input() {
    match resolve(json!({
        "search_query": {"vector": {"fields": ["id"]}, "query": {"value": "x"}},
    })) {
        Err(FilterError::Validation(errors)) => {
            let flat = errors.flatten(&Settings::default());
            assert_eq!(flat.len(), 1);
            assert_eq!(flat[0].0, "search_query");
            assert!(flat[0].1.contains("full text search fields"));
        }
        other => panic!("expected a validation error, got {:?}", other),
    }

    match resolve(json!({"search_query": {"vector": {"fields": ["name"]}, "query": {}}})) {
        Err(FilterError::Validation(errors)) => {
            assert!(errors.fields.contains_key("search_query"));
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
}
