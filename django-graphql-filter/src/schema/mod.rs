//! Filter input schema generation.
//!
//! The forest built from a [`FilterSet`] is walked to produce a tree
//! of GraphQL input object types. Each root field and each branching
//! node below it gets its own type, named after the path leading to
//! it, and each lookup becomes a typed field of its parent:
//!
//! ```text
//! input TaskFilterInputType {
//!   name: TaskNameFilterInputType
//!   user: TaskUserFilterInputType
//!   and: [TaskFilterInputType]
//!   or: [TaskFilterInputType]
//!   not: TaskFilterInputType
//! }
//! input TaskUserEmailFilterInputType {
//!   exact: String
//!   contains: String
//! }
//! ```
//!
//! Only the top-level type carries the combinator fields, and they
//! always refer back to the top-level type. Self references are
//! expressed by name, so a type never needs to contain itself.
//!
//! Generated types are stored in a [`TypeRegistry`], keyed by name.
//! A type is built once; later requests for the same name get the
//! stored definition back, whoever asked first.

pub mod input_types;

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::{self, Write};
use std::sync::Arc;

use convert_case::{Case, Casing};
use log::debug;
use parking_lot::RwLock;
use serde_json::Value;

use crate::annotated::AnnotatedLookupRegistry;
use crate::conf::{Combinator, Settings};
use crate::error::ConfigError;
use crate::filters::Filter;
use crate::filterset::{FilterSet, ValueShape};
use crate::model::FieldKind;
use crate::tree::{filterset_to_trees, Node};

/// The built-in GraphQL scalars, plus the ones graphene-django adds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    #[strum(serialize = "ID")]
    Id,
    Date,
    DateTime,
    Time,
    Decimal,
}

impl ScalarType {
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String | FieldKind::Text | FieldKind::Email => ScalarType::String,
            FieldKind::Integer => ScalarType::Int,
            FieldKind::Float => ScalarType::Float,
            FieldKind::Decimal => ScalarType::Decimal,
            FieldKind::Boolean => ScalarType::Boolean,
            FieldKind::Date => ScalarType::Date,
            FieldKind::DateTime => ScalarType::DateTime,
            FieldKind::Time => ScalarType::Time,
            FieldKind::ForeignKey => ScalarType::Id,
        }
    }
}

/// A reference to a type, as it appears on a field or argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarType),
    /// A registered type, looked up by name.
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(of: TypeRef) -> Self {
        TypeRef::List(Box::new(of))
    }

    pub fn non_null(of: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(of))
    }

    /// The scalar or named type underneath any wrappers.
    pub fn base(&self) -> &TypeRef {
        match self {
            TypeRef::List(t) | TypeRef::NonNull(t) => t.base(),
            t => t,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self.base() {
            TypeRef::Named(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Scalar(s) => write!(f, "{}", s),
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::List(t) => write!(f, "[{}]", t),
            TypeRef::NonNull(t) => write!(f, "{}!", t),
        }
    }
}

/// The role a field plays in a filter input tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaNode {
    /// A lookup, backed by the filter with this key.
    LeafLookup(String),
    /// A field or subfield holding further fields or lookups.
    FieldContainer,
    Combinator(Combinator),
    /// The fixed input of the annotated lookup with this postfix.
    Special(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputField {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub default_value: Option<Value>,
    pub node: Option<SchemaNode>,
}

impl InputField {
    pub fn new(name: impl Into<String>, ty: TypeRef, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            description: Some(description.into()),
            default_value: None,
            node: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_node(mut self, node: SchemaNode) -> Self {
        self.node = Some(node);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<InputField>,
}

impl InputObjectType {
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeDefinition {
    Input(InputObjectType),
    Enum(EnumType),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Input(t) => &t.name,
            TypeDefinition::Enum(t) => &t.name,
        }
    }

    pub fn as_input(&self) -> Option<&InputObjectType> {
        match self {
            TypeDefinition::Input(t) => Some(t),
            TypeDefinition::Enum(_) => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            TypeDefinition::Enum(t) => Some(t),
            TypeDefinition::Input(_) => None,
        }
    }
}

#[derive(Default)]
struct Types {
    map: HashMap<String, Arc<TypeDefinition>>,
    order: Vec<String>,
}

/// Name-keyed store of generated types.
///
/// Builders run outside the lock, since building a type usually
/// registers the types it refers to. If two threads race to build
/// the same name, the first to finish is stored and both get it.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<Types>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDefinition>> {
        self.types.read().map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().map.contains_key(name)
    }

    /// Fetch `name`, building and storing it with `build` if missing.
    pub fn try_get_or_insert_with<E, F>(
        &self,
        name: &str,
        build: F,
    ) -> Result<Arc<TypeDefinition>, E>
    where
        F: FnOnce() -> Result<TypeDefinition, E>,
    {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let built = Arc::new(build()?);
        let mut types = self.types.write();
        if let Some(existing) = types.map.get(name) {
            return Ok(existing.clone());
        }
        debug!("registered type {}", name);
        types.map.insert(name.to_string(), built.clone());
        types.order.push(name.to_string());
        Ok(built)
    }

    pub fn get_or_insert_with<F>(&self, name: &str, build: F) -> Arc<TypeDefinition>
    where
        F: FnOnce() -> TypeDefinition,
    {
        match self.try_get_or_insert_with::<Infallible, _>(name, || Ok(build())) {
            Ok(t) => t,
            Err(e) => match e {},
        }
    }

    pub fn len(&self) -> usize {
        self.types.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered type names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.types.read().order.clone()
    }

    /// Render every registered type as GraphQL SDL.
    pub fn to_sdl(&self) -> String {
        let types = self.types.read();
        let is_enum = |name: &str| {
            types
                .map
                .get(name)
                .map_or(false, |t| matches!(**t, TypeDefinition::Enum(_)))
        };
        let mut out = String::new();
        for name in &types.order {
            let def = match types.map.get(name) {
                Some(def) => def,
                None => continue,
            };
            if !out.is_empty() {
                out.push('\n');
            }
            match def.as_ref() {
                TypeDefinition::Input(t) => {
                    write_block_description(&mut out, t.description.as_deref(), "");
                    let _ = writeln!(out, "input {} {{", t.name);
                    for field in &t.fields {
                        write_block_description(&mut out, field.description.as_deref(), "  ");
                        let _ = write!(out, "  {}: {}", field.name, field.ty);
                        if let Some(default) = &field.default_value {
                            let bare = field.ty.name().map_or(false, |n| is_enum(n));
                            let _ = write!(out, " = {}", literal(default, bare));
                        }
                        out.push('\n');
                    }
                    out.push_str("}\n");
                }
                TypeDefinition::Enum(t) => {
                    write_block_description(&mut out, t.description.as_deref(), "");
                    let _ = writeln!(out, "enum {} {{", t.name);
                    for value in &t.values {
                        let _ = writeln!(out, "  {}", value);
                    }
                    out.push_str("}\n");
                }
            }
        }
        out
    }
}

fn write_block_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(d) = description {
        let _ = writeln!(out, "{}\"\"\"{}\"\"\"", indent, d);
    }
}

/// A GraphQL literal for `value`; strings are left unquoted for enums.
fn literal(value: &Value, bare_strings: bool) -> String {
    match value {
        Value::String(s) if bare_strings => s.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|v| literal(v, bare_strings))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", k, literal(v, bare_strings)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}

/// A field argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    pub ty: TypeRef,
    pub description: String,
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

pub(crate) fn pascal(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// Builds the filter argument for one filter set.
pub struct FilterArgumentsFactory<'a> {
    filterset: &'a FilterSet,
    prefix: String,
    registry: &'a TypeRegistry,
    settings: &'a Settings,
    lookups: &'a AnnotatedLookupRegistry,
}

impl<'a> FilterArgumentsFactory<'a> {
    pub fn new(
        filterset: &'a FilterSet,
        prefix: impl Into<String>,
        registry: &'a TypeRegistry,
        settings: &'a Settings,
        lookups: &'a AnnotatedLookupRegistry,
    ) -> Self {
        Self {
            filterset,
            prefix: prefix.into(),
            registry,
            settings,
            lookups,
        }
    }

    pub fn filter_input_type_name(&self) -> String {
        format!("{}FilterInputType", self.prefix)
    }

    /// The arguments to add to a connection field.
    pub fn arguments(&self) -> Result<Vec<Argument>, ConfigError> {
        Ok(vec![Argument {
            name: self.settings.filter_key.clone(),
            ty: self.filter_input_type()?,
            description: "Advanced filter field".to_string(),
        }])
    }

    /// Register the top-level input type, if needed, and refer to it.
    pub fn filter_input_type(&self) -> Result<TypeRef, ConfigError> {
        let name = self.filter_input_type_name();
        self.registry.try_get_or_insert_with::<ConfigError, _>(&name, || {
            let roots = filterset_to_trees(self.filterset)?;
            self.create_filter_input_type(&roots)
        })?;
        Ok(TypeRef::named(name))
    }

    /// The top-level input type for `roots`.
    pub fn create_filter_input_type(&self, roots: &[Node]) -> Result<TypeDefinition, ConfigError> {
        let name = self.filter_input_type_name();
        let mut fields = Vec::with_capacity(roots.len() + 3);
        for root in roots {
            fields.push(self.create_filter_input_subfield(
                root,
                &self.prefix,
                format!("`{}` field", pascal(&root.name)),
            )?);
        }
        let this = TypeRef::named(name.clone());
        for (combinator, ty) in [
            (Combinator::And, TypeRef::list(this.clone())),
            (Combinator::Or, TypeRef::list(this.clone())),
            (Combinator::Not, this),
        ] {
            fields.push(
                InputField::new(
                    self.settings.combinator_key(combinator),
                    ty,
                    format!("`{}` field", combinator),
                )
                .with_node(SchemaNode::Combinator(combinator)),
            );
        }
        debug!("built {} with {} fields", name, fields.len());
        Ok(TypeDefinition::Input(InputObjectType {
            name,
            description: None,
            fields,
        }))
    }

    /// The field for `node`, registering its type.
    ///
    /// Nodes named after an annotated lookup take that lookup's input
    /// type. Otherwise terminal children become lookup fields and
    /// the rest become further subfields.
    pub fn create_filter_input_subfield(
        &self,
        node: &Node,
        prefix: &str,
        description: String,
    ) -> Result<InputField, ConfigError> {
        if let Some(spec) = self.lookups.find(&node.name) {
            return Ok(InputField::new(
                node.name.clone(),
                spec.input_type(self.registry, self.settings),
                spec.description(),
            )
            .with_node(SchemaNode::Special(spec.postfix().to_string())));
        }
        let name = format!("{}{}FilterInputType", prefix, pascal(&node.name));
        self.registry.try_get_or_insert_with::<ConfigError, _>(&name, || {
            let child_prefix = format!("{}{}", prefix, pascal(&node.name));
            let mut fields = Vec::with_capacity(node.children.len());
            for child in &node.children {
                let field = match (&child.filter_key, child.children.is_empty()) {
                    (Some(key), true) => self.get_field(&child.name, key)?,
                    (None, false) => self.create_filter_input_subfield(
                        child,
                        &child_prefix,
                        format!("`{}` subfield", pascal(&child.name)),
                    )?,
                    _ => return Err(ConfigError::AmbiguousNode(child.name.clone())),
                };
                fields.push(field);
            }
            Ok(TypeDefinition::Input(InputObjectType {
                name: name.clone(),
                description: None,
                fields,
            }))
        })?;
        Ok(InputField::new(node.name.clone(), TypeRef::named(name), description)
            .with_node(SchemaNode::FieldContainer))
    }

    /// The lookup field `name` for the filter stored under `key`.
    pub fn get_field(&self, name: &str, key: &str) -> Result<InputField, ConfigError> {
        let filter: &Filter = self
            .filterset
            .get(key)
            .ok_or_else(|| ConfigError::NoFilter(key.to_string()))?;
        let form_field = self.filterset.form_field(filter)?;
        let scalar = TypeRef::Scalar(if form_field.choices.is_some() {
            ScalarType::String
        } else {
            ScalarType::for_kind(form_field.kind)
        });
        let mut ty = match form_field.shape {
            ValueShape::Single => scalar,
            ValueShape::List | ValueShape::Range => TypeRef::list(scalar),
        };
        if form_field.required {
            ty = TypeRef::non_null(ty);
        }
        let description = filter
            .label
            .clone()
            .unwrap_or_else(|| format!("`{}` lookup", pascal(filter.lookup.as_str())));
        Ok(InputField::new(name, ty, description).with_node(SchemaNode::LeafLookup(key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Features;
    use crate::filters::Lookup;
    use crate::filterset::FilterSetBuilder;
    use crate::model::{ModelField, ModelMeta};

    fn user() -> ModelMeta {
        ModelMeta::new("User")
            .with_field("id", ModelField::new(FieldKind::Integer))
            .with_field("email", ModelField::new(FieldKind::Email))
            .with_field("first_name", ModelField::new(FieldKind::String))
    }

    fn filterset(features: Features) -> FilterSet {
        let model = ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("done", ModelField::new(FieldKind::Boolean))
            .with_field("created_at", ModelField::new(FieldKind::DateTime))
            .with_field("user", ModelField::foreign_key(user()));
        FilterSetBuilder::new(model)
            .fields("name", &["exact", "contains", "in"])
            .fields("done", &["exact"])
            .fields("created_at", &["gt", "range"])
            .fields("user", &["exact"])
            .fields("user__email", &["exact", "icontains", "isnull"])
            .fields("user__first_name", &["full_text_search"])
            .declare(
                "named",
                Filter::new("name", Lookup::IStartsWith).label("Name starts with").required(),
            )
            .build(&features, &AnnotatedLookupRegistry::default())
            .unwrap()
    }

    fn input(registry: &TypeRegistry, name: &str) -> InputObjectType {
        registry
            .get(name)
            .and_then(|t| t.as_input().cloned())
            .unwrap_or_else(|| panic!("no input type {}", name))
    }

    fn field_type(t: &InputObjectType, name: &str) -> String {
        t.field(name).unwrap().ty.to_string()
    }

    #[test]
    fn argument() {
        let fs = filterset(Features::none());
        let registry = TypeRegistry::new();
        let lookups = AnnotatedLookupRegistry::default();
        let settings = Settings::default().with_overrides(&crate::conf::SettingsOverrides {
            filter_key: Some("where".to_string()),
            ..Default::default()
        });
        let factory = FilterArgumentsFactory::new(&fs, "Task", &registry, &settings, &lookups);
        let args = factory.arguments().unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].to_string(), "where: TaskFilterInputType");
        assert_eq!(args[0].description, "Advanced filter field");
    }

    #[test]
    fn tree_of_types() {
        let fs = filterset(Features::none());
        let registry = TypeRegistry::new();
        let lookups = AnnotatedLookupRegistry::default();
        let settings = Settings::default();
        FilterArgumentsFactory::new(&fs, "Task", &registry, &settings, &lookups)
            .arguments()
            .unwrap();

        let top = input(&registry, "TaskFilterInputType");
        let names: Vec<_> = top.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "done", "created_at", "user", "and", "or", "not"]);
        assert_eq!(field_type(&top, "user"), "TaskUserFilterInputType");
        assert_eq!(top.field("created_at").unwrap().description.as_deref(), Some("`CreatedAt` field"));
        assert_eq!(field_type(&top, "and"), "[TaskFilterInputType]");
        assert_eq!(field_type(&top, "or"), "[TaskFilterInputType]");
        assert_eq!(field_type(&top, "not"), "TaskFilterInputType");
        assert_eq!(top.field("not").unwrap().description.as_deref(), Some("`Not` field"));

        let name = input(&registry, "TaskNameFilterInputType");
        assert_eq!(field_type(&name, "exact"), "String");
        assert_eq!(field_type(&name, "in"), "[String]");
        assert_eq!(field_type(&name, "istartswith"), "String!");
        assert_eq!(name.field("istartswith").unwrap().description.as_deref(), Some("Name starts with"));
        assert_eq!(name.field("contains").unwrap().description.as_deref(), Some("`Contains` lookup"));

        let created = input(&registry, "TaskCreatedAtFilterInputType");
        assert_eq!(field_type(&created, "gt"), "DateTime");
        assert_eq!(field_type(&created, "range"), "[DateTime]");

        let user = input(&registry, "TaskUserFilterInputType");
        assert_eq!(field_type(&user, "exact"), "ID");
        assert_eq!(field_type(&user, "email"), "TaskUserEmailFilterInputType");
        assert_eq!(user.field("email").unwrap().description.as_deref(), Some("`Email` subfield"));

        let email = input(&registry, "TaskUserEmailFilterInputType");
        assert_eq!(field_type(&email, "isnull"), "Boolean");
        assert_eq!(
            email.field("icontains").unwrap().node,
            Some(SchemaNode::LeafLookup("user__email__icontains".to_string()))
        );
    }

    #[test]
    fn special_lookups() {
        let fs = filterset(Features::postgresql(true));
        let registry = TypeRegistry::new();
        let lookups = AnnotatedLookupRegistry::default();
        let settings = Settings::default();
        FilterArgumentsFactory::new(&fs, "Task", &registry, &settings, &lookups)
            .arguments()
            .unwrap();

        let top = input(&registry, "TaskFilterInputType");
        assert_eq!(field_type(&top, "search_query"), "SearchQueryFilterInputType");
        assert_eq!(field_type(&top, "search_rank"), "SearchRankFilterInputType");
        let first_name = input(&registry, "TaskUserFirstNameFilterInputType");
        assert_eq!(field_type(&first_name, "trigram"), "TrigramFilterInputType");
        assert_eq!(
            first_name.field("trigram").unwrap().node,
            Some(SchemaNode::Special("trigram".to_string()))
        );
        assert!(registry.contains("SearchQueryInputType"));
        assert!(registry.get("TrigramSearchKind").unwrap().as_enum().is_some());
    }

    #[test]
    fn cached_by_name() {
        let fs = filterset(Features::none());
        let registry = TypeRegistry::new();
        let lookups = AnnotatedLookupRegistry::default();
        let settings = Settings::default();
        let factory = FilterArgumentsFactory::new(&fs, "Task", &registry, &settings, &lookups);
        factory.arguments().unwrap();
        let first = registry.get("TaskUserEmailFilterInputType").unwrap();
        let count = registry.len();
        factory.arguments().unwrap();
        assert_eq!(registry.len(), count);
        assert!(Arc::ptr_eq(&first, &registry.get("TaskUserEmailFilterInputType").unwrap()));
    }

    #[test]
    fn first_writer_wins() {
        let registry = TypeRegistry::new();
        let make = |description: &str| {
            TypeDefinition::Enum(EnumType {
                name: "Kind".to_string(),
                description: Some(description.to_string()),
                values: vec!["A".to_string()],
            })
        };
        let first = registry.get_or_insert_with("Kind", || make("first"));
        let second = registry.get_or_insert_with("Kind", || make("second"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.as_enum().unwrap().description.as_deref(), Some("first"));
        let failed: Result<_, ConfigError> =
            registry.try_get_or_insert_with("Other", || Err(ConfigError::NoFilter("x".to_string())));
        assert!(failed.is_err());
        assert!(!registry.contains("Other"));
    }

    #[test]
    fn ambiguous_node() {
        let model = ModelMeta::new("Task").with_field("name", ModelField::new(FieldKind::String));
        let fs = FilterSetBuilder::new(model)
            .declare("odd", Filter::new("name__exact", Lookup::Exact).form_kind(FieldKind::String))
            .fields("name", &["exact"])
            .build(&Features::none(), &AnnotatedLookupRegistry::default())
            .unwrap();
        let registry = TypeRegistry::new();
        let lookups = AnnotatedLookupRegistry::default();
        let settings = Settings::default();
        let res = FilterArgumentsFactory::new(&fs, "Task", &registry, &settings, &lookups).arguments();
        assert!(matches!(res, Err(ConfigError::AmbiguousNode(n)) if n == "exact"));
    }

    #[test]
    fn sdl() {
        let registry = TypeRegistry::new();
        input_types::trigram_filter_input_type(&registry);
        let sdl = registry.to_sdl();
        assert!(sdl.contains("enum TrigramSearchKind {\n  SIMILARITY\n  DISTANCE\n}"));
        assert!(sdl.contains("  kind: TrigramSearchKind = SIMILARITY\n"));
        assert!(sdl.contains("  value: String!\n"));
        assert!(sdl.contains("input FloatLookupsInputType {"));
    }
}
