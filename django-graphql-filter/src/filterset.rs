//! Filter sets.
//!
//! A [`FilterSet`] is the complete, ordered collection of filters
//! exposed for one model. It is assembled once by a
//! [`FilterSetBuilder`] from three sources, in this order:
//!
//! - generated filters, one per lookup listed for each model field,
//!   keyed `field` for the default lookup and `field__lookup`
//!   otherwise;
//! - explicitly declared filters, which replace generated filters of
//!   the same name;
//! - filters synthesised by the annotated lookups for the fields
//!   marked `full_text_search`, when the database supports them.
//!
//! Example:
//! ```rust
//! use django_graphql_filter::annotated::AnnotatedLookupRegistry;
//! use django_graphql_filter::conf::Features;
//! use django_graphql_filter::filters::{Filter, Lookup};
//! use django_graphql_filter::filterset::FilterSetBuilder;
//! use django_graphql_filter::model::{FieldKind, ModelField, ModelMeta};
//!
//! let model = ModelMeta::new("Task")
//!     .with_field("name", ModelField::new(FieldKind::String))
//!     .with_field("description", ModelField::new(FieldKind::Text));
//! let filterset = FilterSetBuilder::new(model)
//!     .fields("name", &["exact", "contains", "full_text_search"])
//!     .declare("about", Filter::new("description", Lookup::IContains))
//!     .build(&Features::none(), &AnnotatedLookupRegistry::default())
//!     .unwrap();
//! let keys: Vec<_> = filterset.filters().map(|(k, _)| k).collect();
//! assert_eq!(keys, vec!["name", "name__contains", "about"]);
//! assert_eq!(filterset.warnings().len(), 1);
//! ```

use log::{debug, warn};

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::{Features, DEFAULT_LOOKUP_EXPR, FULL_TEXT_SEARCH, LOOKUP_SEP};
use crate::error::ConfigError;
use crate::filters::{Filter, Lookup};
use crate::model::{FieldKind, ModelMeta, Resource};

/// How many values a form field takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueShape {
    Single,
    /// Any number of values, for `in`.
    List,
    /// A lower and upper bound, for `range`.
    Range,
}

/// The input a filter accepts, as seen by validation and the schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormField {
    pub kind: FieldKind,
    pub shape: ValueShape,
    pub required: bool,
    pub choices: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct FilterSet {
    name: String,
    model: ModelMeta,
    filters: Vec<(String, Filter)>,
    declared: Vec<String>,
    fields: Vec<(String, Vec<Lookup>)>,
    full_text_search_fields: Vec<String>,
    warnings: Vec<String>,
}

impl FilterSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &ModelMeta {
        &self.model
    }

    /// All filters, in order, with their keys.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.filters.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The filter with exactly this key.
    pub fn get(&self, key: &str) -> Option<&Filter> {
        self.filters.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn is_declared(&self, key: &str) -> bool {
        self.declared.iter().any(|k| k == key)
    }

    /// Fields with their ordinary lookups.
    pub fn get_fields(&self) -> &[(String, Vec<Lookup>)] {
        &self.fields
    }

    /// Fields marked for full text search.
    pub fn get_full_text_search_fields(&self) -> &[String] {
        &self.full_text_search_fields
    }

    /// Diagnostics recorded while building, e.g. for unsupported
    /// annotated lookups.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Find the filter a submitted data key refers to.
    ///
    /// Keys don't always match filter names: the default lookup may
    /// be spelled out, and declared filters can have arbitrary names.
    /// So after an exact match, try the key with a trailing default
    /// lookup removed, then any filter whose field path and lookup
    /// match the key's parts, and finally the whole key as a field
    /// path with the default lookup.
    pub fn find_filter(&self, key: &str) -> Result<&Filter, ConfigError> {
        if let Some(filter) = self.get(key) {
            return Ok(filter);
        }
        if let Some((field_name, lookup)) = key.rsplit_once(LOOKUP_SEP) {
            if lookup == DEFAULT_LOOKUP_EXPR {
                if let Some(filter) = self.get(field_name) {
                    return Ok(filter);
                }
            }
            if let Some(filter) = self
                .filters
                .iter()
                .map(|(_, f)| f)
                .find(|f| f.field_name == field_name && f.lookup.as_str() == lookup)
            {
                return Ok(filter);
            }
        }
        self.filters
            .iter()
            .map(|(_, f)| f)
            .find(|f| f.field_name == key && f.lookup.is_default())
            .ok_or_else(|| ConfigError::NoFilter(key.to_string()))
    }

    /// The form field for the filter stored under `key`.
    ///
    /// Filters with their own declared kind use it. Otherwise `isnull`
    /// is always boolean, and every other lookup takes the kind of the
    /// model field it filters.
    pub fn form_field(&self, filter: &Filter) -> Result<FormField, ConfigError> {
        let shape = match filter.lookup {
            Lookup::In => ValueShape::List,
            Lookup::Range => ValueShape::Range,
            _ => ValueShape::Single,
        };
        let (kind, choices) = if let Some(kind) = filter.form_kind {
            (kind, filter.choices.clone())
        } else if filter.lookup == Lookup::IsNull {
            (FieldKind::Boolean, None)
        } else if filter.is_annotated() {
            (FieldKind::Float, None)
        } else {
            let field = self.model.resolve(&filter.field_name)?;
            (
                field.kind,
                filter.choices.clone().or_else(|| field.choices.clone()),
            )
        };
        Ok(FormField {
            kind,
            shape,
            required: filter.required,
            choices,
        })
    }
}

/// Assembles a [`FilterSet`].
pub struct FilterSetBuilder {
    model: ModelMeta,
    name: Option<String>,
    fields: Vec<(String, Vec<String>)>,
    declared: Vec<(String, Filter)>,
}

impl FilterSetBuilder {
    pub fn new(model: ModelMeta) -> Self {
        Self {
            model,
            name: None,
            fields: Vec::new(),
            declared: Vec::new(),
        }
    }

    pub fn for_resource<R: Resource>() -> Self {
        Self::new(R::model())
    }

    /// Name the filter set; the default is `<Model>FilterSet`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Generate filters for `field`, one per lookup.
    ///
    /// The pseudo-lookup `full_text_search` marks the field for the
    /// annotated search lookups instead.
    pub fn fields(mut self, field: &str, lookups: &[&str]) -> Self {
        let lookups = lookups.iter().map(|l| l.to_string());
        if let Some((_, existing)) = self.fields.iter_mut().find(|(f, _)| f == field) {
            existing.extend(lookups);
        } else {
            self.fields.push((field.to_string(), lookups.collect()));
        }
        self
    }

    /// Add an explicit filter under `name`.
    pub fn declare(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.declared.push((name.into(), filter));
        self
    }

    pub fn build(
        self,
        features: &Features,
        lookups: &AnnotatedLookupRegistry,
    ) -> Result<FilterSet, ConfigError> {
        let name = self
            .name
            .unwrap_or_else(|| format!("{}FilterSet", self.model.name()));
        let mut filters: Vec<(String, Filter)> = Vec::new();
        let mut fields = Vec::new();
        let mut full_text_search_fields: Vec<String> = Vec::new();

        for (field, names) in &self.fields {
            self.model.resolve(field)?;
            let mut parsed = Vec::new();
            for lookup in names {
                if lookup == FULL_TEXT_SEARCH {
                    if !full_text_search_fields.contains(field) {
                        full_text_search_fields.push(field.clone());
                    }
                    continue;
                }
                let lookup = Lookup::parse(lookup)?;
                if parsed.contains(&lookup) {
                    continue;
                }
                parsed.push(lookup);
                let filter = Filter::new(field.clone(), lookup);
                insert(&mut filters, filter.default_key(), filter);
            }
            if !parsed.is_empty() {
                fields.push((field.clone(), parsed));
            }
        }

        let mut declared = Vec::new();
        for (key, filter) in self.declared {
            if !filter.is_annotated() && filter.form_kind.is_none() {
                self.model.resolve(&filter.field_name)?;
            }
            declared.push(key.clone());
            insert(&mut filters, key, filter);
        }

        let expansion = lookups.expand(&filters, &full_text_search_fields, features);
        for warning in &expansion.warnings {
            warn!("{}: {}", name, warning);
        }
        filters.extend(expansion.filters);

        debug!("built {} with {} filters", name, filters.len());
        Ok(FilterSet {
            name,
            model: self.model,
            filters,
            declared,
            fields,
            full_text_search_fields,
            warnings: expansion.warnings,
        })
    }
}

fn insert(filters: &mut Vec<(String, Filter)>, key: String, filter: Filter) {
    if let Some(slot) = filters.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = filter;
    } else {
        filters.push((key, filter));
    }
}
