#![cfg(test)]
#![allow(dead_code)]

use django_graphql_filter::error::ConfigError;
use django_graphql_filter::model::{FieldKind, Resource};
use django_graphql_filter::{AnnotatedLookupRegistry, Features, FilterSetBuilder};

#[derive(Resource)]
#[django(model = "Account")]
struct User {
    email: String,
    #[django(rename = "years")]
    age: Option<i32>,
    #[django(exclude)]
    password: String,
}

#[derive(Resource)]
struct Task {
    id: i64,
    name: String,
    #[django(choices("low", "high"))]
    priority: String,
    done: bool,
    created: chrono::DateTime<chrono::Utc>,
    #[django(relation)]
    user: Option<User>,
    #[django(relation)]
    watchers: Vec<User>,
    tags: Vec<String>,
}

#[test]
fn model_names() {
    assert_eq!(Task::model().name(), "Task");
    assert_eq!(User::model().name(), "Account");
}

#[test]
fn scalar_fields() {
    let meta = Task::model();
    let names: Vec<_> = meta.fields().map(|(n, _)| n.to_string()).collect();
    assert_eq!(
        names,
        vec!["id", "name", "priority", "done", "created", "user", "watchers", "tags"]
    );
    assert_eq!(meta.resolve("id").unwrap().kind, FieldKind::Integer);
    assert_eq!(meta.resolve("done").unwrap().kind, FieldKind::Boolean);
    assert_eq!(meta.resolve("created").unwrap().kind, FieldKind::DateTime);
    assert_eq!(
        meta.resolve("priority").unwrap().choices,
        Some(vec!["low".to_string(), "high".to_string()])
    );
    let tags = meta.resolve("tags").unwrap();
    assert_eq!(tags.kind, FieldKind::String);
    assert!(tags.many);
}

#[test]
fn relations() {
    let meta = Task::model();
    let user = meta.resolve("user").unwrap();
    assert_eq!(user.kind, FieldKind::ForeignKey);
    assert!(user.nullable);
    assert!(!user.many);
    assert!(meta.resolve("watchers").unwrap().many);

    let years = meta.resolve("user__years").unwrap();
    assert_eq!(years.kind, FieldKind::Integer);
    assert!(years.nullable);
    assert!(meta.resolve("user__age").is_err());
    assert!(meta.resolve("watchers__email").is_ok());
    assert!(meta.resolve("user__password").is_err());
}

#[test]
fn filterset_for_resource() {
    let fs = FilterSetBuilder::for_resource::<Task>()
        .fields("name", &["exact", "icontains"])
        .fields("user__email", &["exact"])
        .build(&Features::none(), &AnnotatedLookupRegistry::default())
        .unwrap();
    assert_eq!(fs.name(), "TaskFilterSet");
    assert!(fs.get("user__email").is_some());

    let res = FilterSetBuilder::for_resource::<Task>()
        .fields("user__password", &["exact"])
        .build(&Features::none(), &AnnotatedLookupRegistry::default());
    assert!(matches!(
        res,
        Err(ConfigError::NoField { field, .. }) if field == "user__password"
    ));
}
