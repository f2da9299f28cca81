use thiserror::Error;

use crate::form::ErrorTree;

/// Errors in the static filter configuration.
///
/// These are detected while building a [`FilterSet`](crate::filterset::FilterSet)
/// or generating its schema, and are never deferred to request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The model has no field at the given path.
    #[error("no such field '{field}' on model '{model}'")]
    NoField { model: String, field: String },
    /// A lookup name that isn't one of the known lookups.
    #[error("no such lookup '{0}'")]
    UnknownLookup(String),
    /// A filter key that resolves to no declared filter.
    #[error("no filter matches key '{0}'")]
    NoFilter(String),
    /// A tree node that is a lookup and a field container at the same time.
    #[error("node '{0}' is both a lookup and a field container")]
    AmbiguousNode(String),
    /// Two filters claim the same (field path, lookup) terminal.
    #[error("filters '{0}' and '{1}' have the same field path and lookup")]
    DuplicateTerminal(String, String),
}

/// Errors produced while filtering.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The submitted filter tree failed validation.
    #[error("invalid filter: {0}")]
    Validation(ErrorTree),
    /// A validated key matched no filter during composition.
    #[error("no filter matches key '{0}'")]
    NoFilter(String),
    /// A connection argument couldn't be interpreted.
    #[error("bad value for argument '{name}': {reason}")]
    BadArgument { name: String, reason: String },
    /// Failed to instantiate an operator for a comparison.
    #[error(transparent)]
    Instantiation(#[from] anyhow::Error),
    /// The filter configuration is broken.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
