#![cfg(test)]

use std::sync::Arc;

use django_graphql_filter::conf::SettingsOverrides;
use django_graphql_filter::connection::MemoryQuerySet;
use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
use django_graphql_filter::predicate::Predicate;
use django_graphql_filter::*;
use serde_json::{json, Map, Value};

fn filterset() -> Arc<FilterSet> {
    let model = ModelMeta::new("Item")
        .with_field("id", ModelField::new(FieldKind::Integer))
        .with_field("name", ModelField::new(FieldKind::String));
    Arc::new(
        FilterSetBuilder::new(model)
            .fields("id", &["exact", "in"])
            .fields("name", &["exact", "icontains"])
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap(),
    )
}

fn rows() -> Vec<Value> {
    (1..=5)
        .map(|i| json!({"id": i, "name": format!("item {}", i)}))
        .collect()
}

fn a() -> Value {
    json!({"id": {"in": [1, 2, 3]}})
}

fn b() -> Value {
    json!({"id": {"in": [2, 3, 4]}})
}

fn c() -> Value {
    json!({"id": {"exact": 5}})
}

fn ids_with(settings: &Settings, filter: Value) -> Vec<i64> {
    let field = AdvancedConnectionField::new("ItemType", filterset());
    let lookups = AnnotatedLookupRegistry::default();
    let mut args = Map::new();
    args.insert(settings.filter_key.clone(), filter);
    let conn = field
        .resolver(settings, &lookups)
        .resolve(&rows(), &args)
        .unwrap();
    conn.edges
        .iter()
        .map(|e| e.node["id"].as_i64().unwrap())
        .collect()
}

fn ids(filter: Value) -> Vec<i64> {
    ids_with(&Settings::default(), filter)
}

#[test]
fn and_or_not() {
    assert_eq!(ids(json!({"and": [a(), b()]})), vec![2, 3]);
    assert_eq!(ids(json!({"or": [a(), c()]})), vec![1, 2, 3, 5]);
    assert_eq!(ids(json!({"not": a()})), vec![4, 5]);
    assert_eq!(ids(json!({"and": [a(), b()], "not": c()})), vec![2, 3]);
    assert_eq!(
        ids(json!({"or": [a(), b()], "not": {"or": [c(), {"id": {"exact": 1}}]}})),
        vec![2, 3, 4]
    );
}

#[test]
fn fields_and_combinators_conjoin() {
    assert_eq!(
        ids(json!({"id": {"in": [1, 2, 3, 4]}, "or": [a(), c()], "not": {"id": 1}})),
        vec![2, 3]
    );
}

#[test]
fn empty_parts_are_identity() {
    let all = vec![1, 2, 3, 4, 5];
    assert_eq!(ids(json!({})), all);
    assert_eq!(ids(Value::Null), all);
    assert_eq!(ids(json!({"or": []})), all);
    assert_eq!(ids(json!({"and": [], "or": [], "not": {}})), all);
    assert_eq!(ids(json!({"or": [], "and": [a()]})), vec![1, 2, 3]);
    assert_eq!(ids(json!({"or": [{}, {}]})), all);
}

#[test]
fn empty_or_alternative_is_skipped() {
    assert_eq!(ids(json!({"id": {"in": [1, 2, 3]}, "or": [{}, c()]})), Vec::<i64>::new());
    assert_eq!(ids(json!({"or": [{}, c()]})), vec![5]);
    assert_eq!(ids(json!({"or": [a(), {}, c()]})), vec![1, 2, 3, 5]);
    assert_eq!(ids(json!({"name": {"icontains": "item"}, "or": [{}, {"id": 3}]})), vec![3]);
}

#[test]
fn default_lookup() {
    assert_eq!(ids(json!({"id": 4})), ids(json!({"id": {"exact": 4}})));
    assert_eq!(ids(json!({"name": {"icontains": "ITEM 2"}})), vec![2]);
}

#[test]
fn renamed_combinators() {
    let settings = Settings::default().with_overrides(&SettingsOverrides {
        filter_key: Some("where".to_string()),
        and_key: Some("all".to_string()),
        not_key: Some("exclude".to_string()),
        ..Default::default()
    });
    assert_eq!(
        ids_with(&settings, json!({"all": [a(), b()], "exclude": {"id": 3}})),
        vec![2]
    );
}

#[derive(Default)]
struct Counter {
    included: Vec<Predicate>,
    excluded: usize,
}

impl QuerySource for Counter {
    fn include(&mut self, predicate: Predicate) {
        self.included.push(predicate);
    }
    fn exclude(&mut self, _predicate: Predicate) {
        self.excluded += 1;
    }
}

#[test]
fn validation_errors_are_positioned() {
    let fs = filterset();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();
    let engine = PredicateEngine::new(&fs, &settings, &lookups);
    let mut source = Counter::default();

    let res = engine.filter_queryset(
        &mut source,
        &json!({"or": [a(), {"id": {"in": ["x"]}}], "not": {"name": {"missing": 1}}}),
    );
    let errors = match res {
        Err(FilterError::Validation(errors)) => errors,
        other => panic!("expected a validation error, got {:?}", other),
    };
    let paths: Vec<String> = errors
        .flatten(&settings)
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(paths, vec!["or.1.id__in", "not.name__missing"]);
    assert_eq!(
        errors.to_json(&settings)["not"]["name__missing"],
        json!(["No filter matches this key."])
    );
    assert!(source.included.is_empty());
    assert_eq!(source.excluded, 0);
}

#[test]
fn include_is_called_once() {
    let fs = filterset();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();
    let engine = PredicateEngine::new(&fs, &settings, &lookups);
    let mut source = Counter::default();
    let predicate = engine
        .filter_queryset(&mut source, &json!({"and": [a(), b()], "or": [c(), a()]}))
        .unwrap();
    assert_eq!(source.included, vec![predicate]);
    assert_eq!(source.excluded, 0);
}

#[test]
fn memory_queryset() {
    let fs = filterset();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();
    let engine = PredicateEngine::new(&fs, &settings, &lookups);
    let rows = rows();
    let mut qs = MemoryQuerySet::new(&rows);
    engine
        .filter_queryset(&mut qs, &json!({"or": [b(), c()]}))
        .unwrap();
    let matched: Vec<_> = qs.evaluate().unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(matched, vec![json!(2), json!(3), json!(4), json!(5)]);
}
