//! Annotated lookups.
//!
//! Some lookups don't compare a field, but a value computed from the
//! record first: a full text search match, a search rank, a trigram
//! similarity. Each kind is described by an [`AnnotatedLookupSpec`]
//! and collected in an [`AnnotatedLookupRegistry`].
//!
//! The registry is used in three places:
//!
//! - when a [`FilterSet`] is built, to synthesise one filter per
//!   available sub-lookup (`search_rank`, `search_rank__gt`, ...),
//!   provided the database supports the computation;
//! - when the schema is generated, to substitute the spec's fixed
//!   input type for the synthesised filters;
//! - when submitted data is normalised, to turn the submitted input
//!   object into an annotation and a comparison value per sub-lookup.

mod specs;

use std::fmt;

use log::debug;
use serde_json::Value;
use thiserror::Error;

pub use specs::{SearchQuerySpec, SearchRankSpec, TrigramSpec};

use crate::conf::{Features, Settings, LOOKUP_SEP};
use crate::data::FilterValue;
use crate::filters::{Filter, Lookup};
use crate::filterset::FilterSet;
use crate::schema::{TypeRef, TypeRegistry};

/// A database capability an annotated lookup needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    PostgreSql,
    TrigramExtension,
}

impl Requirement {
    pub fn is_met(&self, features: &Features) -> bool {
        match self {
            Requirement::PostgreSql => features.is_postgresql,
            Requirement::TrigramExtension => {
                features.is_postgresql && features.has_trigram_extension
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::PostgreSql => write!(f, "a PostgreSQL database"),
            Requirement::TrigramExtension => write!(f, "the `pg_trgm` extension"),
        }
    }
}

/// An annotated lookup can't be offered on this database.
#[derive(Debug, Error)]
#[error("`{postfix}` filters need {requirement}, none were created")]
pub struct FeatureUnavailable {
    pub postfix: &'static str,
    pub requirement: Requirement,
}

/// One kind of annotated lookup.
pub trait AnnotatedLookupSpec: Send + Sync {
    /// The key segment identifying this lookup, e.g. `search_rank`.
    fn postfix(&self) -> &'static str;

    /// Comparisons that can be made against the computed value.
    fn available_lookups(&self) -> &'static [Lookup];

    /// Whether filters are synthesised once per full text search
    /// field, rather than once per filter set.
    fn per_field(&self) -> bool {
        false
    }

    fn requirement(&self) -> Requirement {
        Requirement::PostgreSql
    }

    fn check_supported(&self, features: &Features) -> Result<(), FeatureUnavailable> {
        let requirement = self.requirement();
        if requirement.is_met(features) {
            Ok(())
        } else {
            Err(FeatureUnavailable {
                postfix: self.postfix(),
                requirement,
            })
        }
    }

    /// Description of the input field in the schema.
    fn description(&self) -> &'static str;

    /// Register the input type clients submit for this lookup.
    fn input_type(&self, registry: &TypeRegistry, settings: &Settings) -> TypeRef;

    /// Turn a submitted input object under `key` into flat data.
    ///
    /// One entry is produced per requested comparison. Problems with
    /// the submitted value are returned as messages.
    fn create_data(
        &self,
        key: &str,
        value: &Value,
        filterset: &FilterSet,
        settings: &Settings,
    ) -> Result<Vec<(String, FilterValue)>, Vec<String>>;
}

/// Filters synthesised for a filter set, with any diagnostics.
#[derive(Debug, Default)]
pub struct Expansion {
    pub filters: Vec<(String, Filter)>,
    pub warnings: Vec<String>,
}

/// The available annotated lookups.
pub struct AnnotatedLookupRegistry {
    specs: Vec<Box<dyn AnnotatedLookupSpec>>,
}

impl Default for AnnotatedLookupRegistry {
    fn default() -> Self {
        Self::empty()
            .register(SearchQuerySpec)
            .register(SearchRankSpec)
            .register(TrigramSpec)
    }
}

impl fmt::Debug for AnnotatedLookupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.postfixes()).finish()
    }
}

impl AnnotatedLookupRegistry {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Add a spec, replacing any spec with the same postfix.
    pub fn register<S: AnnotatedLookupSpec + 'static>(mut self, spec: S) -> Self {
        self.specs.retain(|s| s.postfix() != spec.postfix());
        self.specs.push(Box::new(spec));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn AnnotatedLookupSpec> {
        self.specs.iter().map(|s| s.as_ref())
    }

    pub fn postfixes(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.postfix()).collect()
    }

    pub fn find(&self, postfix: &str) -> Option<&dyn AnnotatedLookupSpec> {
        self.iter().find(|s| s.postfix() == postfix)
    }

    /// The spec a data key refers to, by its last segment.
    pub fn match_key(&self, key: &str) -> Option<&dyn AnnotatedLookupSpec> {
        key.rsplit(LOOKUP_SEP).next().and_then(|last| self.find(last))
    }

    /// Synthesise the annotated filters for `full_text_search_fields`.
    ///
    /// Nothing is created without full text search fields. Without
    /// PostgreSQL a single warning is produced; otherwise each spec
    /// whose requirement isn't met is skipped with a warning. Keys
    /// already present in `existing` are left alone.
    pub fn expand(
        &self,
        existing: &[(String, Filter)],
        full_text_search_fields: &[String],
        features: &Features,
    ) -> Expansion {
        let mut expansion = Expansion::default();
        if full_text_search_fields.is_empty() {
            return expansion;
        }
        if !features.is_postgresql {
            expansion.warnings.push(
                "full text search is only available with PostgreSQL, no search filters were created"
                    .to_string(),
            );
            return expansion;
        }
        for spec in self.iter() {
            if let Err(e) = spec.check_supported(features) {
                expansion.warnings.push(e.to_string());
                continue;
            }
            let fields: Vec<Option<&str>> = if spec.per_field() {
                full_text_search_fields.iter().map(|f| Some(f.as_str())).collect()
            } else {
                vec![None]
            };
            for field in fields {
                let created = {
                    let seen = existing.iter().chain(expansion.filters.iter());
                    create_special_filters(seen, spec, field)
                };
                expansion.filters.extend(created);
            }
        }
        debug!("synthesised {} annotated filters", expansion.filters.len());
        expansion
    }
}

/// The filters for one spec, optionally scoped to `field`, skipping
/// keys already in `existing`.
pub fn create_special_filters<'a, I>(
    existing: I,
    spec: &dyn AnnotatedLookupSpec,
    field: Option<&str>,
) -> Vec<(String, Filter)>
where
    I: IntoIterator<Item = &'a (String, Filter)>,
{
    let existing: Vec<&str> = existing.into_iter().map(|(k, _)| k.as_str()).collect();
    let field_name = match field {
        Some(field) => format!("{}{}{}", field, LOOKUP_SEP, spec.postfix()),
        None => spec.postfix().to_string(),
    };
    spec.available_lookups()
        .iter()
        .map(|lookup| Filter::annotated(field_name.clone(), *lookup, spec.postfix()))
        .map(|filter| (filter.default_key(), filter))
        .filter(|(key, _)| !existing.contains(&key.as_str()))
        .collect()
}
