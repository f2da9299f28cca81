use serde_json::{Map, Value};

use crate::annotated::{AnnotatedLookupSpec, Requirement};
use crate::conf::{Settings, LOOKUP_SEP};
use crate::data::FilterValue;
use crate::filters::Lookup;
use crate::filterset::FilterSet;
use crate::predicate::Rhs;
use crate::schema::input_types;
use crate::schema::{TypeRef, TypeRegistry};
use crate::search::{
    Annotation, AnnotatedValue, SearchConfig, SearchQuery, SearchRank, SearchVector, Trigram,
    TrigramKind, VectorWeight, DEFAULT_RANK_WEIGHTS,
};

const FLOAT_LOOKUPS: &[Lookup] = &[Lookup::Exact, Lookup::Gt, Lookup::Gte, Lookup::Lt, Lookup::Lte];

/// Full text search with `SearchVector` and `SearchQuery`.
pub struct SearchQuerySpec;

impl AnnotatedLookupSpec for SearchQuerySpec {
    fn postfix(&self) -> &'static str {
        "search_query"
    }

    fn available_lookups(&self) -> &'static [Lookup] {
        &[Lookup::Exact]
    }

    fn description(&self) -> &'static str {
        "Field for the full text search using the `SearchVector` and `SearchQuery` object"
    }

    fn input_type(&self, registry: &TypeRegistry, settings: &Settings) -> TypeRef {
        input_types::search_query_filter_input_type(registry, settings)
    }

    fn create_data(
        &self,
        key: &str,
        value: &Value,
        filterset: &FilterSet,
        settings: &Settings,
    ) -> Result<Vec<(String, FilterValue)>, Vec<String>> {
        let obj = object(value).map_err(one)?;
        let vector = parse_vector(required(obj, "vector").map_err(one)?, filterset).map_err(one)?;
        let query = parse_query(required(obj, "query").map_err(one)?, settings).map_err(one)?;
        Ok(vec![(
            key.to_string(),
            FilterValue::Annotated(AnnotatedValue {
                annotation: Annotation::Vector(vector),
                rhs: Rhs::Query(query),
            }),
        )])
    }
}

/// Full text search filtering on `SearchRank`.
pub struct SearchRankSpec;

impl AnnotatedLookupSpec for SearchRankSpec {
    fn postfix(&self) -> &'static str {
        "search_rank"
    }

    fn available_lookups(&self) -> &'static [Lookup] {
        FLOAT_LOOKUPS
    }

    fn description(&self) -> &'static str {
        "Field for the full text search using the `SearchRank` object"
    }

    fn input_type(&self, registry: &TypeRegistry, settings: &Settings) -> TypeRef {
        input_types::search_rank_filter_input_type(registry, settings)
    }

    fn create_data(
        &self,
        key: &str,
        value: &Value,
        filterset: &FilterSet,
        settings: &Settings,
    ) -> Result<Vec<(String, FilterValue)>, Vec<String>> {
        let obj = object(value).map_err(one)?;
        let mut errors = Vec::new();
        let vector = required(obj, "vector")
            .and_then(|v| parse_vector(v, filterset))
            .map_err(|e| errors.push(e))
            .ok();
        let query = required(obj, "query")
            .and_then(|v| parse_query(v, settings))
            .map_err(|e| errors.push(e))
            .ok();
        let lookups = required(obj, "lookups")
            .and_then(parse_float_lookups)
            .map_err(|e| errors.push(e))
            .ok();
        let weights = match present(obj, "weights") {
            Some(w) => parse_weights(w).map(Some).map_err(|e| errors.push(e)).ok().flatten(),
            None => None,
        };
        let cover_density = match present(obj, "cover_density") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                errors.push(format!("`cover_density` must be a boolean, got {}", other));
                false
            }
            None => false,
        };
        let normalization = match present(obj, "normalization") {
            Some(v) => match v.as_i64() {
                Some(n) => Some(n),
                None => {
                    errors.push(format!("`normalization` must be an integer, got {}", v));
                    None
                }
            },
            None => None,
        };
        let (vector, query, lookups) = match (vector, query, lookups) {
            (Some(v), Some(q), Some(l)) if errors.is_empty() => (v, q, l),
            _ => return Err(errors),
        };
        Ok(lookups
            .into_iter()
            .map(|(lookup, rhs)| {
                (
                    lookup_key(key, lookup),
                    FilterValue::Annotated(AnnotatedValue {
                        annotation: Annotation::Rank(SearchRank {
                            vector: vector.clone(),
                            query: query.clone(),
                            weights,
                            cover_density,
                            normalization,
                        }),
                        rhs: Rhs::Value(Value::from(rhs)),
                    }),
                )
            })
            .collect())
    }
}

/// Similarity or distance of trigrams, per field.
pub struct TrigramSpec;

impl AnnotatedLookupSpec for TrigramSpec {
    fn postfix(&self) -> &'static str {
        "trigram"
    }

    fn available_lookups(&self) -> &'static [Lookup] {
        FLOAT_LOOKUPS
    }

    fn per_field(&self) -> bool {
        true
    }

    fn requirement(&self) -> Requirement {
        Requirement::TrigramExtension
    }

    fn description(&self) -> &'static str {
        "Field for the full text search using similarity or distance of trigram"
    }

    fn input_type(&self, registry: &TypeRegistry, _settings: &Settings) -> TypeRef {
        input_types::trigram_filter_input_type(registry)
    }

    fn create_data(
        &self,
        key: &str,
        value: &Value,
        _filterset: &FilterSet,
        _settings: &Settings,
    ) -> Result<Vec<(String, FilterValue)>, Vec<String>> {
        let obj = object(value).map_err(one)?;
        let mut errors = Vec::new();
        let kind = match present(obj, "kind") {
            Some(Value::String(s)) => s.parse::<TrigramKind>().unwrap_or_else(|_| {
                errors.push(format!("unknown trigram search kind `{}`", s));
                TrigramKind::Similarity
            }),
            Some(other) => {
                errors.push(format!("`kind` must be a string, got {}", other));
                TrigramKind::Similarity
            }
            None => TrigramKind::Similarity,
        };
        let lookups = required(obj, "lookups")
            .and_then(parse_float_lookups)
            .map_err(|e| errors.push(e))
            .ok();
        let text = required(obj, "value")
            .and_then(|v| string(v, "value"))
            .map_err(|e| errors.push(e))
            .ok();
        let (lookups, text) = match (lookups, text) {
            (Some(l), Some(t)) if errors.is_empty() => (l, t),
            _ => return Err(errors),
        };
        let field = key
            .rsplit_once(LOOKUP_SEP)
            .map(|(field, _)| field)
            .unwrap_or_default()
            .to_string();
        Ok(lookups
            .into_iter()
            .map(|(lookup, rhs)| {
                (
                    lookup_key(key, lookup),
                    FilterValue::Annotated(AnnotatedValue {
                        annotation: Annotation::Trigram(Trigram {
                            kind,
                            field: field.clone(),
                            value: text.clone(),
                        }),
                        rhs: Rhs::Value(Value::from(rhs)),
                    }),
                )
            })
            .collect())
    }
}

fn one(e: String) -> Vec<String> {
    vec![e]
}

fn lookup_key(key: &str, lookup: Lookup) -> String {
    if lookup.is_default() {
        key.to_string()
    } else {
        format!("{}{}{}", key, LOOKUP_SEP, lookup)
    }
}

fn object(value: &Value) -> Result<&Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", value))
}

/// A member that is present and not null.
fn present<'v>(obj: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn required<'v>(obj: &'v Map<String, Value>, name: &str) -> Result<&'v Value, String> {
    present(obj, name).ok_or_else(|| format!("`{}` is required", name))
}

fn string(value: &Value, name: &str) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("`{}` must be a string, got {}", name, value))
}

fn parse_config(value: &Value) -> Result<SearchConfig, String> {
    let obj = object(value)?;
    let name = string(required(obj, "value")?, "value")?;
    match present(obj, "is_field") {
        Some(Value::Bool(true)) => Ok(SearchConfig::Field(name)),
        Some(Value::Bool(false)) | None => Ok(SearchConfig::Literal(name)),
        Some(other) => Err(format!("`is_field` must be a boolean, got {}", other)),
    }
}

fn parse_vector(value: &Value, filterset: &FilterSet) -> Result<SearchVector, String> {
    let obj = object(value)?;
    let fields = required(obj, "fields")?
        .as_array()
        .ok_or_else(|| "`fields` must be a list".to_string())?
        .iter()
        .map(|f| string(f, "fields"))
        .collect::<Result<Vec<_>, _>>()?;
    let allowed = filterset.get_full_text_search_fields();
    for field in &fields {
        if !allowed.contains(field) {
            return Err(format!(
                "The `{}` field is not included in full text search fields",
                field
            ));
        }
    }
    let config = present(obj, "config").map(parse_config).transpose()?;
    let weight = present(obj, "weight")
        .map(|w| {
            string(w, "weight")?
                .parse::<VectorWeight>()
                .map_err(|_| format!("unknown search vector weight {}", w))
        })
        .transpose()?;
    Ok(SearchVector {
        fields,
        config,
        weight,
    })
}

/// Build a query from a search query input.
///
/// The `and` members are AND-ed, the `or` members OR-ed and the `not`
/// member negated, and the results are AND-ed onto the `value` term.
fn parse_query(value: &Value, settings: &Settings) -> Result<SearchQuery, String> {
    let obj = object(value)?;
    let term = present(obj, "value");
    let and = present(obj, &settings.and_key);
    let or = present(obj, &settings.or_key);
    let not = present(obj, &settings.not_key);
    if term.is_none() && and.is_none() && or.is_none() && not.is_none() {
        return Err(format!(
            "The search query must contain at least one of `value`, `{}`, `{}`, `{}`",
            settings.and_key, settings.or_key, settings.not_key
        ));
    }
    let mut query = match term {
        Some(v) => Some(SearchQuery::Term {
            value: string(v, "value")?,
            config: present(obj, "config").map(parse_config).transpose()?,
        }),
        None => None,
    };
    let mut push = |q: SearchQuery| {
        query = Some(match query.take() {
            Some(existing) => existing & q,
            None => q,
        });
    };
    if let Some(and) = and {
        if let Some(q) = fold(list(and, &settings.and_key)?, settings, |a, b| a & b)? {
            push(q);
        }
    }
    if let Some(or) = or {
        if let Some(q) = fold(list(or, &settings.or_key)?, settings, |a, b| a | b)? {
            push(q);
        }
    }
    if let Some(not) = not {
        push(!parse_query(not, settings)?);
    }
    query.ok_or_else(|| "The search query is empty".to_string())
}

fn list<'v>(value: &'v Value, name: &str) -> Result<&'v [Value], String> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| format!("`{}` must be a list", name))
}

fn fold(
    items: &[Value],
    settings: &Settings,
    combine: fn(SearchQuery, SearchQuery) -> SearchQuery,
) -> Result<Option<SearchQuery>, String> {
    let mut res: Option<SearchQuery> = None;
    for item in items {
        let q = parse_query(item, settings)?;
        res = Some(match res {
            Some(existing) => combine(existing, q),
            None => q,
        });
    }
    Ok(res)
}

fn parse_float_lookups(value: &Value) -> Result<Vec<(Lookup, f64)>, String> {
    let obj = object(value)?;
    let mut res = Vec::new();
    for (name, v) in obj {
        if v.is_null() {
            continue;
        }
        let lookup = Lookup::parse(name)
            .ok()
            .filter(|l| FLOAT_LOOKUPS.contains(l))
            .ok_or_else(|| format!("unsupported lookup `{}`", name))?;
        let v = v
            .as_f64()
            .ok_or_else(|| format!("`{}` must be a number, got {}", name, v))?;
        res.push((lookup, v));
    }
    Ok(res)
}

/// Rank weights, returned in D, C, B, A order.
fn parse_weights(value: &Value) -> Result<[f64; 4], String> {
    let obj = object(value)?;
    let mut weights = DEFAULT_RANK_WEIGHTS;
    for (i, name) in ["D", "C", "B", "A"].iter().enumerate() {
        if let Some(v) = present(obj, name) {
            weights[i] = v
                .as_f64()
                .ok_or_else(|| format!("weight `{}` must be a number, got {}", name, v))?;
        }
    }
    Ok(weights)
}
