#![cfg(feature = "wiremock")]
//! A mock filterable connection endpoint.
//!
//! [`Endpoint`] implements [`wiremock::Respond`], serving one
//! [`AdvancedConnectionField`] over rows supplied by a [`RowSource`].
//! Requests are JSON objects holding the connection arguments:
//!
//! ```json
//! {"filter": {"name": {"icontains": "report"}, "or": [...]}, "first": 10}
//! ```
//!
//! A successful request gets `200` and the connection as JSON
//! (`totalCount`, `edges`, `pageInfo`). A request that fails
//! validation gets `400` and `{"errors": ...}`, with the errors
//! shaped like the submitted tree.
//!
//! Example:
//! ```rust,no_run
//! use std::sync::Arc;
//! use django_graphql_filter::annotated::AnnotatedLookupRegistry;
//! use django_graphql_filter::conf::Features;
//! use django_graphql_filter::connection::AdvancedConnectionField;
//! use django_graphql_filter::filterset::FilterSetBuilder;
//! use django_graphql_filter::mock::Endpoint;
//! use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
//! use serde_json::json;
//!
//! # async fn serve() {
//! let model = ModelMeta::new("Task").with_field("name", ModelField::new(FieldKind::String));
//! let filterset = FilterSetBuilder::new(model)
//!     .fields("name", &["exact", "icontains"])
//!     .build(&Features::none(), &AnnotatedLookupRegistry::default())
//!     .unwrap();
//! let field = AdvancedConnectionField::new("TaskType", Arc::new(filterset));
//! let rows = vec![json!({"id": 1, "name": "weekly report"})];
//!
//! let server = wiremock::MockServer::start().await;
//! wiremock::Mock::given(wiremock::matchers::method("POST"))
//!     .and(wiremock::matchers::path("/tasks/"))
//!     .respond_with(Endpoint::new(rows, field))
//!     .mount(&server)
//!     .await;
//! # }
//! ```

use core::ops::Deref;
use std::sync::Arc;

use log::{debug, trace};
use serde_json::{json, Map, Value};
use thiserror::Error;
use wiremock::{Request, Respond, ResponseTemplate};

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::Settings;
use crate::connection::AdvancedConnectionField;
use crate::error::FilterError;
use crate::form::{ErrorTree, NON_FIELD_ERRORS};

#[derive(Debug, Error)]
pub enum MockError {
    #[error("request body is not JSON: {0}")]
    BadBody(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
}

/// Something that can provide the rows to serve.
pub trait RowSource
where
    <Self::Rows as Deref>::Target: AsRef<[Value]>,
{
    type Rows: Deref;
    fn get(&self) -> Self::Rows;
}

impl RowSource for Vec<Value> {
    type Rows = Self;
    fn get(&self) -> Self::Rows {
        self.clone()
    }
}

impl RowSource for Arc<Vec<Value>> {
    type Rows = Self;
    fn get(&self) -> Self::Rows {
        self.clone()
    }
}

pub struct Endpoint<T> {
    row_source: T,
    field: AdvancedConnectionField,
    settings: Settings,
    lookups: Arc<AnnotatedLookupRegistry>,
}

impl<T> Endpoint<T> {
    pub fn new(row_source: T, field: AdvancedConnectionField) -> Self {
        Self {
            row_source,
            field,
            settings: Settings::default(),
            lookups: Arc::new(AnnotatedLookupRegistry::default()),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn lookups(mut self, lookups: Arc<AnnotatedLookupRegistry>) -> Self {
        self.lookups = lookups;
        self
    }

    fn parse_body(body: &[u8]) -> Result<Map<String, Value>, MockError> {
        if body.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_slice(body)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            _ => Err(MockError::NotAnObject),
        }
    }

    fn error_response(&self, errors: &ErrorTree) -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(json!({ "errors": errors.to_json(&self.settings) }))
    }
}

impl<T> Respond for Endpoint<T>
where
    T: Send + Sync + RowSource,
    <T::Rows as Deref>::Target: AsRef<[Value]>,
{
    fn respond(&self, request: &Request) -> ResponseTemplate {
        trace!("Request URL: {}", request.url);
        let args = match Self::parse_body(&request.body) {
            Ok(args) => args,
            Err(e) => {
                debug!("Failed to respond to {}: {}", request.url, e);
                let mut errors = ErrorTree::default();
                errors.add(NON_FIELD_ERRORS, e.to_string());
                return self.error_response(&errors);
            }
        };
        let data = self.row_source.get();
        let rows: &[Value] = (*data).as_ref();
        match self
            .field
            .resolver(&self.settings, &self.lookups)
            .resolve(rows, &args)
        {
            Ok(connection) => ResponseTemplate::new(200).set_body_json(connection.to_json()),
            Err(FilterError::Validation(errors)) => {
                debug!("Rejected filter for {}: {}", request.url, errors);
                self.error_response(&errors)
            }
            Err(e @ FilterError::BadArgument { .. }) => {
                debug!("Failed to respond to {}: {}", request.url, e);
                let mut errors = ErrorTree::default();
                errors.add(NON_FIELD_ERRORS, e.to_string());
                self.error_response(&errors)
            }
            Err(e) => {
                debug!("Failed to respond to {}: {}", request.url, e);
                ResponseTemplate::new(500).set_body_string(e.to_string())
            }
        }
    }
}
