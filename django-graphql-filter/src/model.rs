//! Model introspection.
//!
//! A [`ModelMeta`] describes the fields of one filterable resource:
//! their native kind, whether they may be null, whether they are
//! collections, the permitted choices and, for relations, the model
//! on the far side. Filter sets consult it to validate declarations
//! and to type the generated schema and form fields.
//!
//! You will normally not build these by hand, but derive
//! [`Resource`](macro@crate::Resource) for a plain struct:
//!
//! ```rust
//! use django_graphql_filter::model::{FieldKind, Resource};
//!
//! #[derive(Resource)]
//! struct User {
//!     email: String,
//!     age: Option<i32>,
//! }
//!
//! #[derive(Resource)]
//! struct Task {
//!     name: String,
//!     #[django(relation)]
//!     user: User,
//! }
//!
//! let meta = Task::model();
//! assert_eq!(meta.resolve("user__email").unwrap().kind, FieldKind::String);
//! assert!(meta.resolve("user__age").unwrap().nullable);
//! ```

use std::sync::Arc;

use crate::conf::LOOKUP_SEP;
use crate::error::ConfigError;

pub use django_graphql_filter_derive::Resource;

/// The native kind of a model field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum FieldKind {
    String,
    Text,
    Email,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    ForeignKey,
}

/// One field of a model.
#[derive(Clone, Debug)]
pub struct ModelField {
    pub kind: FieldKind,
    pub nullable: bool,
    pub many: bool,
    pub choices: Option<Vec<String>>,
    pub related: Option<Arc<ModelMeta>>,
}

impl ModelField {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
            many: false,
            choices: None,
            related: None,
        }
    }

    /// A relation to another model, compared by its `id`.
    pub fn foreign_key(related: ModelMeta) -> Self {
        Self {
            related: Some(Arc::new(related)),
            ..Self::new(FieldKind::ForeignKey)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_relation(&self) -> bool {
        self.related.is_some()
    }
}

/// The described fields of a model, in declaration order.
#[derive(Clone, Debug)]
pub struct ModelMeta {
    name: String,
    fields: Vec<(String, ModelField)>,
}

impl ModelMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field, replacing any earlier field of the same name.
    pub fn with_field(mut self, name: impl Into<String>, field: ModelField) -> Self {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = field;
        } else {
            self.fields.push((name, field));
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ModelField)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Find the field at the end of a `__` separated path, following
    /// relations on the way.
    pub fn resolve(&self, path: &str) -> Result<&ModelField, ConfigError> {
        let no_field = || ConfigError::NoField {
            model: self.name.clone(),
            field: path.to_string(),
        };
        let mut meta = self;
        let mut segments = path.split(LOOKUP_SEP).peekable();
        while let Some(segment) = segments.next() {
            let field = meta.field(segment).ok_or_else(no_field)?;
            if segments.peek().is_none() {
                return Ok(field);
            }
            meta = field.related.as_deref().ok_or_else(no_field)?;
        }
        Err(no_field())
    }
}

/// A type that describes a filterable model.
pub trait Resource {
    fn model() -> ModelMeta;
}

/// A Rust type that maps onto a scalar model field.
pub trait ScalarField {
    fn model_field() -> ModelField;
}

/// A Rust type that maps onto a relation model field.
pub trait Related {
    fn related_field() -> ModelField;
}

macro_rules! scalar_field {
    ($kind:expr, $($t:ty),*) => {
        $(
            impl ScalarField for $t {
                fn model_field() -> ModelField {
                    ModelField::new($kind)
                }
            }
        )*
    };
}

scalar_field!(FieldKind::String, String);
scalar_field!(FieldKind::Integer, i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);
scalar_field!(FieldKind::Float, f32, f64);
scalar_field!(FieldKind::Boolean, bool);
scalar_field!(FieldKind::Date, chrono::NaiveDate);
scalar_field!(FieldKind::DateTime, chrono::NaiveDateTime);
scalar_field!(FieldKind::Time, chrono::NaiveTime);

impl<Tz: chrono::TimeZone> ScalarField for chrono::DateTime<Tz> {
    fn model_field() -> ModelField {
        ModelField::new(FieldKind::DateTime)
    }
}

impl<T: ScalarField> ScalarField for Option<T> {
    fn model_field() -> ModelField {
        T::model_field().nullable()
    }
}

impl<T: ScalarField> ScalarField for Vec<T> {
    fn model_field() -> ModelField {
        T::model_field().many()
    }
}

impl<T: Related> Related for Option<T> {
    fn related_field() -> ModelField {
        T::related_field().nullable()
    }
}

impl<T: Related> Related for Vec<T> {
    fn related_field() -> ModelField {
        T::related_field().many()
    }
}

impl<T: Related> Related for Box<T> {
    fn related_field() -> ModelField {
        T::related_field()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ModelMeta {
        let user = ModelMeta::new("User")
            .with_field("id", ModelField::new(FieldKind::Integer))
            .with_field("email", ModelField::new(FieldKind::Email))
            .with_field("first_name", ModelField::new(FieldKind::String));
        ModelMeta::new("Task")
            .with_field("name", ModelField::new(FieldKind::String))
            .with_field("user", ModelField::foreign_key(user))
            .with_field(
                "priority",
                ModelField::new(FieldKind::String).with_choices(["low", "high"]),
            )
    }

    #[test]
    fn resolve_direct() {
        let meta = task();
        assert_eq!(meta.resolve("name").unwrap().kind, FieldKind::String);
        assert_eq!(meta.resolve("user").unwrap().kind, FieldKind::ForeignKey);
        assert_eq!(
            meta.resolve("priority").unwrap().choices.as_deref(),
            Some(&["low".to_string(), "high".to_string()][..])
        );
    }

    #[test]
    fn resolve_through_relation() {
        let meta = task();
        assert_eq!(meta.resolve("user__email").unwrap().kind, FieldKind::Email);
        assert!(matches!(
            meta.resolve("user__missing"),
            Err(ConfigError::NoField { field, .. }) if field == "user__missing"
        ));
        assert!(meta.resolve("name__first_name").is_err());
    }

    #[test]
    fn wrappers() {
        let f = <Option<Vec<i32>> as ScalarField>::model_field();
        assert_eq!(f.kind, FieldKind::Integer);
        assert!(f.nullable);
        assert!(f.many);
        let f = <chrono::DateTime<chrono::Utc> as ScalarField>::model_field();
        assert_eq!(f.kind, FieldKind::DateTime);
    }

    #[test]
    fn replace_field() {
        let meta = task().with_field("name", ModelField::new(FieldKind::Text));
        assert_eq!(meta.fields().count(), 3);
        assert_eq!(meta.resolve("name").unwrap().kind, FieldKind::Text);
    }
}
