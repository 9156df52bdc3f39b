//! User-configurable algorithm options
//!
//! Algorithms declare [`OptionSpec`]s; each node holds an [`OptionValues`]
//! map seeded from the declared defaults and edited by the host. Every
//! edit is validated against the declared bounds before it is stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A concrete option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Choice(String),
}

/// Allowed shape and bounds of an option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionKind {
    /// Inclusive floating point range
    Number { min: f64, max: f64 },
    /// Inclusive integer range
    Integer { min: i64, max: i64 },
    Boolean,
    /// One of a fixed set of labels
    Choice { choices: Vec<String> },
}

/// Declaration of one named option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub name: String,
    pub label: String,
    pub kind: OptionKind,
    pub default: OptionValue,
}

impl OptionSpec {
    pub fn number(name: impl Into<String>, label: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: OptionKind::Number { min, max },
            default: OptionValue::Number(default),
        }
    }

    pub fn integer(name: impl Into<String>, label: impl Into<String>, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: OptionKind::Integer { min, max },
            default: OptionValue::Integer(default),
        }
    }

    pub fn boolean(name: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: OptionKind::Boolean,
            default: OptionValue::Boolean(default),
        }
    }

    pub fn choice<S: Into<String>>(
        name: impl Into<String>,
        label: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: OptionKind::Choice {
                choices: choices.into_iter().map(Into::into).collect(),
            },
            default: OptionValue::Choice(default.into()),
        }
    }

    /// Check a value against this declaration
    pub fn validate(&self, value: &OptionValue) -> Result<()> {
        match (&self.kind, value) {
            (OptionKind::Number { min, max }, OptionValue::Number(v)) => {
                if !v.is_finite() || v < min || v > max {
                    return Err(PipelineError::invalid_option(
                        &self.name,
                        format!("{} not in [{}, {}]", v, min, max),
                    ));
                }
            }
            (OptionKind::Integer { min, max }, OptionValue::Integer(v)) => {
                if v < min || v > max {
                    return Err(PipelineError::invalid_option(
                        &self.name,
                        format!("{} not in [{}, {}]", v, min, max),
                    ));
                }
            }
            (OptionKind::Boolean, OptionValue::Boolean(_)) => {}
            (OptionKind::Choice { choices }, OptionValue::Choice(v)) => {
                if !choices.iter().any(|c| c == v) {
                    return Err(PipelineError::invalid_option(
                        &self.name,
                        format!("'{}' is not one of {:?}", v, choices),
                    ));
                }
            }
            (kind, value) => {
                return Err(PipelineError::invalid_option(
                    &self.name,
                    format!("{:?} does not fit {:?}", value, kind),
                ));
            }
        }
        Ok(())
    }
}

/// Current option values of one node, keyed by option name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValues {
    values: BTreeMap<String, OptionValue>,
}

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the declared defaults
    pub fn from_specs(specs: &[OptionSpec]) -> Self {
        Self {
            values: specs
                .iter()
                .map(|s| (s.name.clone(), s.default.clone()))
                .collect(),
        }
    }

    /// Set a value after validating it against `specs`
    pub fn set_checked(&mut self, specs: &[OptionSpec], name: &str, value: OptionValue) -> Result<()> {
        let spec = specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PipelineError::invalid_option(name, "not declared by algorithm"))?;
        spec.validate(&value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            OptionValue::Number(v) => Some(*v),
            OptionValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            OptionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            OptionValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            OptionValue::Choice(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
