//! Typed project configuration.
//!
//! The file is named `config.yaml` by convention but holds a JSON object.
//! All field problems are collected and reported together.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::enums::Plane;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_IMAGES_TR_FOLDER: &str = "data/imagesTr/";
pub const DEFAULT_LABELS_TR_FOLDER: &str = "data/labelsTr/";
pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config must be a JSON object")]
    NotAnObject,

    #[error("Invalid config: {}", FieldErrors(.0))]
    Invalid(Vec<FieldError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub problem: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

struct FieldErrors<'a>(&'a [FieldError]);

impl fmt::Display for FieldErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub images_tr_folder: PathBuf,
    pub labels_tr_folder: PathBuf,
    pub output_folder: Option<PathBuf>,
    pub plane: Plane,
    pub overlay_alpha: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_tr_folder: PathBuf::from(DEFAULT_IMAGES_TR_FOLDER),
            labels_tr_folder: PathBuf::from(DEFAULT_LABELS_TR_FOLDER),
            output_folder: None,
            plane: Plane::default(),
            overlay_alpha: DEFAULT_OVERLAY_ALPHA,
        }
    }
}

/// Untyped view of the document; every field is checked afterwards.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "imagesTr_folder")]
    images_tr_folder: Option<Value>,
    #[serde(rename = "labelsTr_folder")]
    labels_tr_folder: Option<Value>,
    output_folder: Option<Value>,
    plane: Option<Value>,
    overlay_alpha: Option<Value>,
}

impl Config {
    /// Validate a parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let raw: RawConfig = serde_json::from_value(value)?;
        let mut errors = Vec::new();

        let images_tr_folder = required_path(raw.images_tr_folder, "imagesTr_folder", &mut errors);
        let labels_tr_folder = required_path(raw.labels_tr_folder, "labelsTr_folder", &mut errors);
        let output_folder = optional_path(raw.output_folder, "output_folder", &mut errors);

        let plane = match raw.plane {
            None | Some(Value::Null) => Plane::default(),
            Some(Value::String(s)) => s.parse().unwrap_or_else(|e| {
                errors.push(FieldError {
                    field: "plane",
                    problem: format!("{e}"),
                });
                Plane::default()
            }),
            Some(other) => {
                errors.push(type_error("plane", "a string", &other));
                Plane::default()
            }
        };

        let overlay_alpha = match raw.overlay_alpha {
            None | Some(Value::Null) => DEFAULT_OVERLAY_ALPHA,
            Some(Value::Number(n)) => match n.as_f64() {
                Some(alpha) if (0.0..=1.0).contains(&alpha) => alpha as f32,
                _ => {
                    errors.push(FieldError {
                        field: "overlay_alpha",
                        problem: format!("must be between 0 and 1, got {n}"),
                    });
                    DEFAULT_OVERLAY_ALPHA
                }
            },
            Some(other) => {
                errors.push(type_error("overlay_alpha", "a number", &other));
                DEFAULT_OVERLAY_ALPHA
            }
        };

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        Ok(Self {
            images_tr_folder: images_tr_folder.unwrap_or_default(),
            labels_tr_folder: labels_tr_folder.unwrap_or_default(),
            output_folder,
            plane,
            overlay_alpha,
        })
    }
}

fn type_error(field: &'static str, expected: &str, found: &Value) -> FieldError {
    FieldError {
        field,
        problem: format!("expected {expected}, got {found}"),
    }
}

fn required_path(
    value: Option<Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<PathBuf> {
    match value {
        None | Some(Value::Null) => {
            errors.push(FieldError {
                field,
                problem: "missing".to_string(),
            });
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError {
                field,
                problem: "must not be empty".to_string(),
            });
            None
        }
        Some(Value::String(s)) => Some(PathBuf::from(s)),
        Some(other) => {
            errors.push(type_error(field, "a string", &other));
            None
        }
    }
}

fn optional_path(
    value: Option<Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<PathBuf> {
    match value {
        None | Some(Value::Null) => None,
        value => required_path(value, field, errors),
    }
}

/// Read and validate the configuration at `path`.
pub fn read_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    let config = Config::from_value(value)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_config() {
        let config = Config::from_value(json!({
            "imagesTr_folder": "data/imagesTr/",
            "labelsTr_folder": "data/labelsTr/",
            "unrelated": 1
        }))
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn reads_optional_fields() {
        let config = Config::from_value(json!({
            "imagesTr_folder": "img",
            "labelsTr_folder": "lbl",
            "output_folder": "out",
            "plane": "s",
            "overlay_alpha": 0.25
        }))
        .unwrap();
        assert_eq!(config.output_folder, Some(PathBuf::from("out")));
        assert_eq!(config.plane, Plane::Sagittal);
        assert_eq!(config.overlay_alpha, 0.25);
    }

    #[test]
    fn reports_every_invalid_field() {
        let err = Config::from_value(json!({
            "labelsTr_folder": 3,
            "plane": "x",
            "overlay_alpha": 2.0
        }))
        .unwrap_err();
        let ConfigError::Invalid(errors) = err else {
            panic!("expected field errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["imagesTr_folder", "labelsTr_folder", "plane", "overlay_alpha"]
        );
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(matches!(
            Config::from_value(json!([1, 2])),
            Err(ConfigError::NotAnObject)
        ));
    }
}
