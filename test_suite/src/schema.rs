#![cfg(test)]

use std::collections::BTreeSet;
use std::sync::Arc;

use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
use django_graphql_filter::schema::TypeDefinition;
use django_graphql_filter::*;

fn filterset(features: &Features) -> Arc<FilterSet> {
    let user = ModelMeta::new("User").with_field("email", ModelField::new(FieldKind::Email));
    let model = ModelMeta::new("Task")
        .with_field("name", ModelField::new(FieldKind::String))
        .with_field("user", ModelField::foreign_key(user));
    Arc::new(
        FilterSetBuilder::new(model)
            .name("TaskFilter")
            .fields("name", &["exact", "icontains", "full_text_search"])
            .fields("user__email", &["exact", "in"])
            .build(features, &AnnotatedLookupRegistry::default())
            .unwrap(),
    )
}

fn assert_unique(registry: &TypeRegistry) {
    let names = registry.names();
    let set: BTreeSet<_> = names.iter().collect();
    assert_eq!(set.len(), names.len());
}

#[test_log::test]
fn prefixed_types_are_distinct() {
    let fs = filterset(&Features::postgresql(true));
    let registry = TypeRegistry::new();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();

    for prefix in ["Mine", "Theirs"] {
        let args = AdvancedConnectionField::with_filterset("TaskType", fs.clone())
            .prefix(prefix)
            .filtering_args(&registry, &settings, &lookups)
            .unwrap();
        assert_eq!(args[0].to_string(), format!("filter: {}FilterInputType", prefix));
    }

    for name in [
        "MineFilterInputType",
        "MineNameFilterInputType",
        "MineUserFilterInputType",
        "MineUserEmailFilterInputType",
        "TheirsFilterInputType",
        "TheirsUserEmailFilterInputType",
        "SearchQueryFilterInputType",
        "SearchRankFilterInputType",
        "TrigramFilterInputType",
    ] {
        assert!(registry.contains(name), "{} was not registered", name);
    }
    assert_unique(&registry);

    let before = registry.len();
    AdvancedConnectionField::with_filterset("TaskType", fs)
        .prefix("Mine")
        .filtering_args(&registry, &settings, &lookups)
        .unwrap();
    assert_eq!(registry.len(), before);
}

#[test]
fn search_fields_follow_features() {
    let registry = TypeRegistry::new();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();
    AdvancedConnectionField::new("TaskType", filterset(&Features::none()))
        .filtering_args(&registry, &settings, &lookups)
        .unwrap();
    let root = registry.get("TaskFilterInputType").unwrap();
    let root = root.as_input().unwrap();
    let fields: Vec<_> = root.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["name", "user", "and", "or", "not"]);
    assert!(!registry.contains("SearchQueryFilterInputType"));

    let registry = TypeRegistry::new();
    AdvancedConnectionField::new("TaskType", filterset(&Features::postgresql(false)))
        .filtering_args(&registry, &settings, &lookups)
        .unwrap();
    let root = registry.get("TaskFilterInputType").unwrap();
    let root = root.as_input().unwrap();
    assert!(root.field("search_query").is_some());
    assert!(root.field("search_rank").is_some());
    assert!(!registry.contains("TrigramFilterInputType"));
}

#[test]
fn concurrent_registration() {
    let fs = filterset(&Features::postgresql(true));
    let registry = TypeRegistry::new();
    let settings = Settings::default();
    let lookups = AnnotatedLookupRegistry::default();
    let field = AdvancedConnectionField::new("TaskType", fs);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                field
                    .filtering_args(&registry, &settings, &lookups)
                    .unwrap();
            });
        }
    });

    assert_unique(&registry);
    let root = registry.get("TaskFilterInputType").unwrap();
    assert!(Arc::ptr_eq(&root, &registry.get("TaskFilterInputType").unwrap()));
    assert!(matches!(*root, TypeDefinition::Input(_)));
}

#[test]
fn renamed_keys_in_schema() {
    let settings = Settings::from_json(
        Features::none(),
        &serde_json::json!({"FILTER_KEY": "where", "OR_KEY": "any"}),
    )
    .unwrap();
    let registry = TypeRegistry::new();
    let args = AdvancedConnectionField::new("TaskType", filterset(&Features::none()))
        .filtering_args(&registry, &settings, &AnnotatedLookupRegistry::default())
        .unwrap();
    assert_eq!(args[0].name, "where");
    let sdl = registry.to_sdl();
    assert!(sdl.contains("  any: [TaskFilterInputType]\n"));
    assert!(!sdl.contains("  or: "));
}
