#![cfg(test)]

use std::sync::Arc;

use django_graphql_filter::conf::SettingsOverrides;
use django_graphql_filter::mock::Endpoint;
use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
use django_graphql_filter::*;
use serde_json::{json, Value};

fn field() -> AdvancedConnectionField {
    let model = ModelMeta::new("Task")
        .with_field("name", ModelField::new(FieldKind::String))
        .with_field("priority", ModelField::new(FieldKind::Integer));
    let fs = FilterSetBuilder::new(model)
        .fields("name", &["exact", "icontains"])
        .fields("priority", &["exact", "gte", "in"])
        .build(&Features::none(), &AnnotatedLookupRegistry::default())
        .unwrap();
    AdvancedConnectionField::new("TaskType", Arc::new(fs))
}

fn rows() -> Vec<Value> {
    (1..=5)
        .map(|i| json!({"id": i, "name": format!("task {}", i), "priority": i}))
        .collect()
}

async fn post(server: &wiremock::MockServer, body: Value) -> (u16, Value) {
    let res = reqwest::Client::new()
        .post(format!("{}/tasks/", server.uri()))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = res.status().as_u16();
    (status, res.json().await.expect("body is not json"))
}

fn ids(body: &Value) -> Vec<i64> {
    body["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["node"]["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_vec() {
    let server = wiremock::MockServer::start().await;

    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/tasks/"))
        .respond_with(Endpoint::new(rows(), field()))
        .mount(&server)
        .await;

    let (status, body) = post(
        &server,
        json!({
            "filter": {"or": [{"priority": {"in": [1, 2]}}, {"name": "task 5"}]},
            "first": 2,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["totalCount"], json!(3));
    assert_eq!(ids(&body), vec![1, 2]);
    assert_eq!(body["pageInfo"]["hasNextPage"], json!(true));
    assert_eq!(body["pageInfo"]["endCursor"], json!("1"));

    let (status, body) = post(
        &server,
        json!({
            "filter": {"or": [{"priority": {"in": [1, 2]}}, {"name": "task 5"}]},
            "after": "1",
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(ids(&body), vec![5]);
    assert_eq!(body["pageInfo"]["hasPreviousPage"], json!(true));
}

#[tokio::test]
async fn test_arc() {
    let server = wiremock::MockServer::start().await;
    let rows: Arc<Vec<Value>> = Arc::new(rows());

    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/tasks/"))
        .respond_with(Endpoint::new(rows.clone(), field()))
        .mount(&server)
        .await;

    let (status, body) = post(&server, json!({"filter": {"not": {"priority": {"gte": 3}}}})).await;
    assert_eq!(status, 200);
    assert_eq!(ids(&body), vec![1, 2]);

    let (status, body) = post(&server, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["totalCount"], json!(rows.len()));
}

#[test_log::test(tokio::test)]
async fn test_validation_errors() {
    let server = wiremock::MockServer::start().await;

    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/tasks/"))
        .respond_with(Endpoint::new(rows(), field()))
        .mount(&server)
        .await;

    let (status, body) = post(
        &server,
        json!({"filter": {"and": [{"name": "task 1"}, {"priority": {"gte": "high"}}]}}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({"errors": {"and": {"1": {"priority__gte": ["Enter a whole number."]}}}})
    );

    let (status, body) = post(&server, json!({"first": "ten"})).await;
    assert_eq!(status, 400);
    assert!(body["errors"]["__all__"][0]
        .as_str()
        .unwrap()
        .contains("first"));

    let (status, _) = post(&server, json!([1, 2])).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_renamed_keys() {
    let server = wiremock::MockServer::start().await;
    let settings = Settings::default().with_overrides(&SettingsOverrides {
        filter_key: Some("where".to_string()),
        or_key: Some("any".to_string()),
        ..Default::default()
    });

    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/tasks/"))
        .respond_with(Endpoint::new(rows(), field()).settings(settings))
        .mount(&server)
        .await;

    let (status, body) = post(
        &server,
        json!({"where": {"any": [{"priority": 2}, {"priority": 4}]}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(ids(&body), vec![2, 4]);

    let (status, body) = post(&server, json!({"where": {"any": [{}, {"priority": "x"}]}})).await;
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({"errors": {"any": {"1": {"priority": ["Enter a whole number."]}}}})
    );
}
