//! Tree-shaped filtering for GraphQL connections.
//!
//! A [`FilterSet`] declares which lookups may be applied to which
//! fields of a model. From it this crate generates a nested GraphQL
//! input type, where each field path becomes a tree of input objects
//! and every level can be combined with `and`, `or` and `not`:
//!
//! ```graphql
//! {
//!   tasks(filter: {
//!     name: {icontains: "report"}
//!     or: [{user: {email: {exact: "a@b.c"}}}, {done: {exact: true}}]
//!     not: {priority: {gte: 3}}
//!   }) { edges { node { id } } }
//! }
//! ```
//!
//! Submitted trees are flattened into Django-style filter keys,
//! validated node by node, and composed into a single [`Predicate`].
//! PostgreSQL full text search and trigram similarity are available
//! as annotated lookups when the database supports them.
//!
//! The main entry points are:
//!
//! Type | Role
//! -----|-----
//! [`FilterSetBuilder`] | declares filters over a [`ModelMeta`]
//! [`FilterArgumentsFactory`] | generates the filter input types
//! [`PredicateEngine`] | validates a tree and builds its predicate
//! [`AdvancedConnectionField`] | ties both to a relay-style connection
//!
//! Models are usually described by deriving [`Resource`](macro@Resource).

pub mod annotated;
pub mod conf;
pub mod connection;
pub mod data;
pub mod engine;
pub mod error;
pub mod filters;
pub mod filterset;
pub mod form;
#[cfg(feature = "wiremock")]
pub mod mock;
pub mod model;
pub mod ops;
pub mod predicate;
pub mod proxy;
pub mod schema;
pub mod search;
pub mod tree;

pub use crate::annotated::{AnnotatedLookupRegistry, AnnotatedLookupSpec};
pub use crate::conf::{Features, Settings};
pub use crate::connection::{AdvancedConnectionField, Connection, ConnectionResolver};
pub use crate::engine::PredicateEngine;
pub use crate::error::{ConfigError, FilterError};
pub use crate::filters::{Filter, Lookup};
pub use crate::filterset::{FilterSet, FilterSetBuilder};
pub use crate::form::ErrorTree;
pub use crate::model::{ModelField, ModelMeta};
pub use crate::predicate::Predicate;
pub use crate::proxy::QuerySource;
pub use crate::schema::{FilterArgumentsFactory, TypeRegistry};

pub use django_graphql_filter_derive::Resource;
