//! Library settings.
//!
//! Settings come in two flavours. The fixed [`Features`] describe the
//! database the composed predicates will eventually run against, and
//! are probed once when the process starts. The remaining keys name
//! the argument and combinator fields of the generated schema, and
//! can be overridden by the user:
//!
//! Key          | Default
//! -------------|---------
//! `FILTER_KEY` | `filter`
//! `AND_KEY`    | `and`
//! `OR_KEY`     | `or`
//! `NOT_KEY`    | `not`
//!
//! There is no global settings object. A [`Settings`] value is passed
//! to everything that needs it, and changing the configuration means
//! building a new value with [`Settings::with_overrides`].

use log::debug;
use thiserror::Error;

/// Separator between the parts of a filter key, e.g. `user__email__contains`.
pub const LOOKUP_SEP: &str = "__";

/// The lookup applied when a filter key names no lookup.
pub const DEFAULT_LOOKUP_EXPR: &str = "exact";

/// Pseudo-lookup marking a field as a full text search field.
pub const FULL_TEXT_SEARCH: &str = "full_text_search";

/// Errors produced when reading user settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings object contained a key this library doesn't know.
    #[error("invalid setting: `{0}`")]
    InvalidSetting(String),
    /// A setting was present, but its value wasn't a string.
    #[error("setting `{0}` must be a string")]
    NotAString(String),
    /// The settings were not a JSON object.
    #[error("settings must be an object")]
    NotAnObject,
}

/// Capabilities of the backing database.
///
/// These decide whether annotated full text search lookups can be
/// offered at all. They are not user configurable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Features {
    pub is_postgresql: bool,
    pub has_trigram_extension: bool,
}

impl Features {
    /// A database with none of the optional capabilities.
    pub fn none() -> Self {
        Self::default()
    }

    /// A PostgreSQL database, optionally with `pg_trgm` installed.
    pub fn postgresql(has_trigram_extension: bool) -> Self {
        Self {
            is_postgresql: true,
            has_trigram_extension,
        }
    }

    /// Resolve the capabilities from a live database description.
    pub fn probe<P: FeatureProbe + ?Sized>(probe: &P) -> Self {
        let is_postgresql = probe.vendor() == "postgresql";
        let has_trigram_extension = is_postgresql && probe.has_extension("pg_trgm");
        debug!(
            "probed database features: postgresql={} pg_trgm={}",
            is_postgresql, has_trigram_extension
        );
        Self {
            is_postgresql,
            has_trigram_extension,
        }
    }
}

/// Something that can describe the database in use.
pub trait FeatureProbe {
    /// The vendor name, e.g. `postgresql` or `sqlite`.
    fn vendor(&self) -> &str;
    /// Whether the named extension is available.
    fn has_extension(&self, name: &str) -> bool;
}

/// User supplied values for the configurable keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub filter_key: Option<String>,
    pub and_key: Option<String>,
    pub or_key: Option<String>,
    pub not_key: Option<String>,
}

impl SettingsOverrides {
    /// Read overrides from a JSON object such as `{"FILTER_KEY": "where"}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SettingsError> {
        let map = value.as_object().ok_or(SettingsError::NotAnObject)?;
        let mut res = Self::default();
        for (key, value) in map {
            let slot = match key.as_str() {
                "FILTER_KEY" => &mut res.filter_key,
                "AND_KEY" => &mut res.and_key,
                "OR_KEY" => &mut res.or_key,
                "NOT_KEY" => &mut res.not_key,
                _ => return Err(SettingsError::InvalidSetting(key.clone())),
            };
            let value = value
                .as_str()
                .ok_or_else(|| SettingsError::NotAString(key.clone()))?;
            *slot = Some(value.to_string());
        }
        Ok(res)
    }
}

/// One of the three boolean combinators of a filter tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Combinator {
    And,
    Or,
    Not,
}

/// Resolved library settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub filter_key: String,
    pub and_key: String,
    pub or_key: String,
    pub not_key: String,
    pub features: Features,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Features::default())
    }
}

impl Settings {
    /// Default keys for a database with the given capabilities.
    pub fn new(features: Features) -> Self {
        Self {
            filter_key: "filter".to_string(),
            and_key: "and".to_string(),
            or_key: "or".to_string(),
            not_key: "not".to_string(),
            features,
        }
    }

    /// Produce new settings with the given overrides applied.
    pub fn with_overrides(&self, overrides: &SettingsOverrides) -> Self {
        let pick = |over: &Option<String>, current: &String| {
            over.clone().unwrap_or_else(|| current.clone())
        };
        Self {
            filter_key: pick(&overrides.filter_key, &self.filter_key),
            and_key: pick(&overrides.and_key, &self.and_key),
            or_key: pick(&overrides.or_key, &self.or_key),
            not_key: pick(&overrides.not_key, &self.not_key),
            features: self.features,
        }
    }

    /// Settings from a JSON user settings object.
    pub fn from_json(features: Features, value: &serde_json::Value) -> Result<Self, SettingsError> {
        Ok(Self::new(features).with_overrides(&SettingsOverrides::from_json(value)?))
    }

    /// Which combinator, if any, a submitted key names.
    pub fn combinator(&self, key: &str) -> Option<Combinator> {
        if key == self.and_key {
            Some(Combinator::And)
        } else if key == self.or_key {
            Some(Combinator::Or)
        } else if key == self.not_key {
            Some(Combinator::Not)
        } else {
            None
        }
    }

    /// The configured field name of a combinator.
    pub fn combinator_key(&self, combinator: Combinator) -> &str {
        match combinator {
            Combinator::And => &self.and_key,
            Combinator::Or => &self.or_key,
            Combinator::Not => &self.not_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db {
        vendor: &'static str,
        extensions: Vec<&'static str>,
    }

    impl FeatureProbe for Db {
        fn vendor(&self) -> &str {
            self.vendor
        }
        fn has_extension(&self, name: &str) -> bool {
            self.extensions.contains(&name)
        }
    }

    #[test]
    fn initial() {
        let settings = Settings::default();
        assert_eq!(settings.filter_key, "filter");
        assert_eq!(settings.and_key, "and");
        assert_eq!(settings.or_key, "or");
        assert_eq!(settings.not_key, "not");
        assert!(!settings.features.is_postgresql);
    }

    #[test]
    fn overridden() {
        let settings = Settings::default();
        let overridden = settings
            .with_overrides(&SettingsOverrides::from_json(&serde_json::json!({"FILTER_KEY": "where"})).unwrap());
        assert_eq!(overridden.filter_key, "where");
        assert_eq!(overridden.and_key, "and");
        assert_eq!(settings.filter_key, "filter");
    }

    #[test]
    fn invalid_setting() {
        let err = Settings::from_json(Features::none(), &serde_json::json!({"ORDER_KEY": "x"}));
        assert!(matches!(err, Err(SettingsError::InvalidSetting(k)) if k == "ORDER_KEY"));
        let err = Settings::from_json(Features::none(), &serde_json::json!({"AND_KEY": 1}));
        assert!(matches!(err, Err(SettingsError::NotAString(_))));
    }

    #[test]
    fn probe() {
        let pg = Db {
            vendor: "postgresql",
            extensions: vec!["pg_trgm"],
        };
        assert_eq!(Features::probe(&pg), Features::postgresql(true));
        let pg = Db {
            vendor: "postgresql",
            extensions: vec![],
        };
        assert_eq!(Features::probe(&pg), Features::postgresql(false));
        let lite = Db {
            vendor: "sqlite",
            extensions: vec!["pg_trgm"],
        };
        assert_eq!(Features::probe(&lite), Features::none());
    }

    #[test]
    fn combinators() {
        let settings = Settings::default().with_overrides(&SettingsOverrides {
            or_key: Some("any".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.combinator("any"), Some(Combinator::Or));
        assert_eq!(settings.combinator("or"), None);
        assert_eq!(settings.combinator("not"), Some(Combinator::Not));
        assert_eq!(settings.combinator_key(Combinator::And), "and");
    }
}
