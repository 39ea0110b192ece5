use std::fmt;
use std::fs;
use std::path::Path;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::SpinnakerError;

const INPUT_METADATA_SCHEMA: &str = include_str!("../schemas/input_metadata.json");
const METADATA_SCHEMA: &str = include_str!("../schemas/metadata_schema.json");

/// A compiled JSON Schema document.
pub struct Schema {
    name: String,
    document: Value,
    validator: Validator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationPartition<T> {
    pub valid: Vec<T>,
    pub invalid: Vec<T>,
}

impl<T> Default for ValidationPartition<T> {
    fn default() -> Self {
        Self {
            valid: Vec::new(),
            invalid: Vec::new(),
        }
    }
}

impl Schema {
    pub fn from_value(name: impl Into<String>, document: Value) -> Result<Self, SpinnakerError> {
        let name = name.into();
        let validator = jsonschema::validator_for(&document).map_err(|err| {
            SpinnakerError::SchemaLoad {
                name: name.clone(),
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            name,
            document,
            validator,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, SpinnakerError> {
        let name = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|err| SpinnakerError::SchemaLoad {
            name: name.clone(),
            message: err.to_string(),
        })?;
        Self::parse(&name, &content)
    }

    /// The flattened per-row schema bundled with the binary.
    pub fn input_default() -> Result<Self, SpinnakerError> {
        Self::parse("input_metadata.json", INPUT_METADATA_SCHEMA)
    }

    /// The hierarchical bundle schema bundled with the binary.
    pub fn metadata_default() -> Result<Self, SpinnakerError> {
        Self::parse("metadata_schema.json", METADATA_SCHEMA)
    }

    fn parse(name: &str, content: &str) -> Result<Self, SpinnakerError> {
        let document: Value =
            serde_json::from_str(content).map_err(|err| SpinnakerError::SchemaLoad {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        Self::from_value(name, document)
    }

    /// Top-level property names, sorted.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names = self
            .document
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect()
    }

    /// Logs the violations and a dump of the object on failure.
    pub fn validate<T: Serialize>(&self, object: &T) -> bool {
        let instance = match serde_json::to_value(object) {
            Ok(value) => value,
            Err(err) => {
                error!(schema = %self.name, "object is not representable as JSON: {err}");
                return false;
            }
        };
        let violations = self.violations(&instance);
        if violations.is_empty() {
            return true;
        }
        for violation in &violations {
            error!(schema = %self.name, "schema validation failed: {violation}");
        }
        error!(
            "validation failed for {}",
            serde_json::to_string_pretty(&instance).unwrap_or_default()
        );
        false
    }

    pub fn validate_all<T: Serialize>(
        &self,
        objects: impl IntoIterator<Item = T>,
    ) -> ValidationPartition<T> {
        let mut partition = ValidationPartition::default();
        for object in objects {
            if self.validate(&object) {
                partition.valid.push(object);
            } else {
                partition.invalid.push(object);
            }
        }
        partition
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).finish()
    }
}
