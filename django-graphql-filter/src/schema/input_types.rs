//! Fixed input types for the annotated lookups.
//!
//! Each function registers its type (and the types it refers to) on
//! first use and returns a reference to it.

use serde_json::json;

use crate::conf::{Combinator, Settings};
use crate::schema::{
    EnumType, InputField, InputObjectType, ScalarType, TypeDefinition, TypeRef, TypeRegistry,
};
use crate::search::DEFAULT_RANK_WEIGHTS;

fn input(
    registry: &TypeRegistry,
    name: &str,
    description: &str,
    fields: impl FnOnce() -> Vec<InputField>,
) -> TypeRef {
    registry.get_or_insert_with(name, || {
        TypeDefinition::Input(InputObjectType {
            name: name.to_string(),
            description: Some(description.to_string()),
            fields: fields(),
        })
    });
    TypeRef::named(name)
}

fn enumeration(registry: &TypeRegistry, name: &str, description: &str, values: &[&str]) -> TypeRef {
    registry.get_or_insert_with(name, || {
        TypeDefinition::Enum(EnumType {
            name: name.to_string(),
            description: Some(description.to_string()),
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    });
    TypeRef::named(name)
}

fn scalar(s: ScalarType) -> TypeRef {
    TypeRef::Scalar(s)
}

fn required(ty: TypeRef) -> TypeRef {
    TypeRef::non_null(ty)
}

pub fn search_config_input_type(registry: &TypeRegistry) -> TypeRef {
    input(
        registry,
        "SearchConfigInputType",
        "Input type for the `SearchVector` or `SearchQuery` object config.",
        || {
            vec![
                InputField::new(
                    "value",
                    required(scalar(ScalarType::String)),
                    "`SearchVector` or `SearchQuery` object config value",
                ),
                InputField::new(
                    "is_field",
                    scalar(ScalarType::Boolean),
                    "Whether the value names a field rather than a configuration",
                )
                .with_default(json!(false)),
            ]
        },
    )
}

pub fn search_vector_weight(registry: &TypeRegistry) -> TypeRef {
    enumeration(
        registry,
        "SearchVectorWeight",
        "Weight of the `SearchVector` object.",
        &["A", "B", "C", "D"],
    )
}

pub fn search_vector_input_type(registry: &TypeRegistry) -> TypeRef {
    input(
        registry,
        "SearchVectorInputType",
        "Input type for creating the `SearchVector` object.",
        || {
            vec![
                InputField::new(
                    "fields",
                    required(TypeRef::list(required(scalar(ScalarType::String)))),
                    "Field names of vector",
                ),
                InputField::new("config", search_config_input_type(registry), "Vector config"),
                InputField::new("weight", search_vector_weight(registry), "Vector weight"),
            ]
        },
    )
}

/// The search query input, which nests itself under the combinator keys.
pub fn search_query_input_type(registry: &TypeRegistry, settings: &Settings) -> TypeRef {
    let name = "SearchQueryInputType";
    let this = TypeRef::named(name);
    input(
        registry,
        name,
        "Input type for creating the `SearchQuery` object.",
        || {
            vec![
                InputField::new("value", scalar(ScalarType::String), "Query value"),
                InputField::new("config", search_config_input_type(registry), "Query config"),
                InputField::new(
                    settings.combinator_key(Combinator::And),
                    TypeRef::list(required(this.clone())),
                    "`And` field",
                ),
                InputField::new(
                    settings.combinator_key(Combinator::Or),
                    TypeRef::list(required(this.clone())),
                    "`Or` field",
                ),
                InputField::new(settings.combinator_key(Combinator::Not), this, "`Not` field"),
            ]
        },
    )
}

pub fn search_query_filter_input_type(registry: &TypeRegistry, settings: &Settings) -> TypeRef {
    input(
        registry,
        "SearchQueryFilterInputType",
        "Input type for the full text search using the `SearchVector` and `SearchQuery` object.",
        || {
            vec![
                InputField::new("vector", required(search_vector_input_type(registry)), "Search vector"),
                InputField::new(
                    "query",
                    required(search_query_input_type(registry, settings)),
                    "Search query",
                ),
            ]
        },
    )
}

pub fn float_lookups_input_type(registry: &TypeRegistry) -> TypeRef {
    input(registry, "FloatLookupsInputType", "Input type for float lookups.", || {
        [
            ("exact", "Is exact"),
            ("gt", "Is greater than"),
            ("gte", "Is greater than or equal to"),
            ("lt", "Is less than"),
            ("lte", "Is less than or equal to"),
        ]
        .iter()
        .map(|(name, description)| InputField::new(*name, scalar(ScalarType::Float), *description))
        .collect()
    })
}

pub fn search_rank_weights_input_type(registry: &TypeRegistry) -> TypeRef {
    input(
        registry,
        "SearchRankWeightsInputType",
        "`SearchRank` object weights.",
        || {
            ["D", "C", "B", "A"]
                .iter()
                .zip(DEFAULT_RANK_WEIGHTS.iter())
                .map(|(letter, weight)| {
                    InputField::new(
                        *letter,
                        scalar(ScalarType::Float),
                        format!("{} letter", letter),
                    )
                    .with_default(json!(weight))
                })
                .collect()
        },
    )
}

pub fn search_rank_filter_input_type(registry: &TypeRegistry, settings: &Settings) -> TypeRef {
    input(
        registry,
        "SearchRankFilterInputType",
        "Input type for the full text search using the `SearchRank` object.",
        || {
            vec![
                InputField::new("vector", required(search_vector_input_type(registry)), "Search vector"),
                InputField::new(
                    "query",
                    required(search_query_input_type(registry, settings)),
                    "Search query",
                ),
                InputField::new(
                    "lookups",
                    required(float_lookups_input_type(registry)),
                    "Available lookups",
                ),
                InputField::new(
                    "weights",
                    search_rank_weights_input_type(registry),
                    "Search rank weights",
                ),
                InputField::new(
                    "cover_density",
                    scalar(ScalarType::Boolean),
                    "Whether to include coverage density ranking",
                )
                .with_default(json!(false)),
                InputField::new(
                    "normalization",
                    scalar(ScalarType::Int),
                    "Search rank normalization",
                ),
            ]
        },
    )
}

pub fn trigram_search_kind(registry: &TypeRegistry) -> TypeRef {
    enumeration(
        registry,
        "TrigramSearchKind",
        "Type of the search using trigrams.",
        &["SIMILARITY", "DISTANCE"],
    )
}

pub fn trigram_filter_input_type(registry: &TypeRegistry) -> TypeRef {
    input(
        registry,
        "TrigramFilterInputType",
        "Input type for the full text search using similarity or distance of trigram.",
        || {
            vec![
                InputField::new(
                    "kind",
                    trigram_search_kind(registry),
                    "Type of the search using trigrams",
                )
                .with_default(json!("SIMILARITY")),
                InputField::new(
                    "lookups",
                    required(float_lookups_input_type(registry)),
                    "Available lookups",
                ),
                InputField::new("value", required(scalar(ScalarType::String)), "Search value"),
            ]
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_once() {
        let registry = TypeRegistry::new();
        let settings = Settings::default();
        search_rank_filter_input_type(&registry, &settings);
        search_query_filter_input_type(&registry, &settings);
        let names = registry.names();
        for name in [
            "SearchConfigInputType",
            "SearchVectorWeight",
            "SearchVectorInputType",
            "SearchQueryInputType",
            "FloatLookupsInputType",
            "SearchRankWeightsInputType",
            "SearchRankFilterInputType",
            "SearchQueryFilterInputType",
        ] {
            assert_eq!(names.iter().filter(|n| *n == name).count(), 1, "{}", name);
        }
    }

    #[test]
    fn search_query_refers_to_itself() {
        let registry = TypeRegistry::new();
        search_query_input_type(&registry, &Settings::default());
        let query = registry.get("SearchQueryInputType").unwrap();
        let query = query.as_input().unwrap();
        assert_eq!(query.field("and").unwrap().ty.to_string(), "[SearchQueryInputType!]");
        assert_eq!(query.field("not").unwrap().ty.to_string(), "SearchQueryInputType");
    }

    #[test]
    fn rank_weight_defaults() {
        let registry = TypeRegistry::new();
        search_rank_weights_input_type(&registry);
        let weights = registry.get("SearchRankWeightsInputType").unwrap();
        let weights = weights.as_input().unwrap();
        assert_eq!(weights.field("A").unwrap().default_value, Some(json!(1.0)));
        assert_eq!(weights.field("D").unwrap().default_value, Some(json!(0.1)));
    }
}
