//! Engine configuration.
//!
//! Every field has a default, so `{}` is a valid configuration document.

use crate::engine::integrity::PersonDeleteMode;
use crate::engine::view::ViewLayout;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Applied when a person delete names no mode.
    pub default_delete_mode: PersonDeleteMode,
    /// Upper clamp on requested view depth.
    pub max_view_generations: u32,
    pub row_height: f64,
    pub column_width: f64,
    pub include_spouses: bool,
    /// Cache generation resolution per `(root, version)`.
    pub cache_generations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let layout = ViewLayout::default();
        Self {
            default_delete_mode: PersonDeleteMode::Restrict,
            max_view_generations: 10,
            row_height: layout.row_height,
            column_width: layout.column_width,
            include_spouses: layout.include_spouses,
            cache_generations: true,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("row_height", self.row_height),
            ("column_width", self.column_width),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a positive finite number",
                });
            }
        }
        Ok(())
    }

    /// Clamps a requested view depth to `max_view_generations`.
    pub fn clamp_generations(&self, requested: u32) -> u32 {
        requested.min(self.max_view_generations)
    }

    pub fn view_layout(&self) -> ViewLayout {
        ViewLayout {
            row_height: self.row_height,
            column_width: self.column_width,
            include_spouses: self.include_spouses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Malformed(String),
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed engine config: {message}"),
            Self::InvalidValue { field, reason } => write!(f, "config `{field}` {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};
    use crate::engine::integrity::PersonDeleteMode;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_view_generations, 10);
        assert_eq!(config.row_height, 180.0);
        assert_eq!(config.column_width, 220.0);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = EngineConfig::from_json(
            r#"{"default_delete_mode": "cascade", "max_view_generations": 3}"#,
        )
        .unwrap();
        assert_eq!(config.default_delete_mode, PersonDeleteMode::Cascade);
        assert_eq!(config.clamp_generations(8), 3);
        assert_eq!(config.clamp_generations(2), 2);
        assert!(config.include_spouses);
    }

    #[test]
    fn non_positive_layout_is_rejected() {
        let err = EngineConfig::from_json(r#"{"row_height": 0}"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                field: "row_height",
                reason: "must be a positive finite number"
            }
        );
        assert!(matches!(
            EngineConfig::from_json("[1, 2]"),
            Err(ConfigError::Malformed(_))
        ));
    }
}
