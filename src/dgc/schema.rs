//! JSON-schema validation of business rules
//!
//! Schemas are loaded through a [`ResourceLoader`], compiled once per path
//! (Draft 2020-12) and reused across validations.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use jsonschema::Draft;
use serde_json::Value;
use thiserror::Error;

use super::rule::BusinessRule;

/// Default schema resource for rule archives
pub const CCL_JSON_SCHEMA: &str = "dgc/ccl-configuration.json";

/// Source of schema documents addressed by relative path
pub trait ResourceLoader: Send + Sync {
    fn load(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Loads resources from files below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryResourceLoader {
    root: PathBuf,
}

impl DirectoryResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLoader for DirectoryResourceLoader {
    fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("resource path escapes root: {}", path),
            ));
        }
        fs::read(self.root.join(relative))
    }
}

/// Serves resources from memory
#[derive(Debug, Clone, Default)]
pub struct StaticResourceLoader {
    resources: HashMap<String, Vec<u8>>,
}

impl StaticResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(path.into(), contents.into());
        self
    }
}

impl ResourceLoader for StaticResourceLoader {
    fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        self.resources.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no resource at {}", path))
        })
    }
}

/// One schema violation in the validated document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the instance
    pub instance_path: String,
    pub message: String,
}

/// Reasons a rule fails validation
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("schema resource '{path}' could not be loaded: {message}")]
    SchemaUnavailable { path: String, message: String },

    #[error("schema '{path}' is not a valid schema: {message}")]
    SchemaInvalid { path: String, message: String },

    #[error("rule could not be serialized: {0}")]
    Serialization(String),

    #[error("document violates schema '{path}' ({} violation(s))", .violations.len())]
    Violations {
        path: String,
        violations: Vec<Violation>,
    },
}

/// Validates documents against schemas loaded by path
pub struct SchemaValidator {
    loader: Arc<dyn ResourceLoader>,
    cache: Mutex<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl SchemaValidator {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a rule's JSON form against the schema at `schema_path`
    pub fn validate(&self, rule: &BusinessRule, schema_path: &str) -> Result<(), ValidationError> {
        let instance =
            serde_json::to_value(rule).map_err(|e| ValidationError::Serialization(e.to_string()))?;
        self.validate_value(&instance, schema_path)
    }

    /// Validate an arbitrary JSON document
    pub fn validate_value(&self, instance: &Value, schema_path: &str) -> Result<(), ValidationError> {
        let validator = self.compiled(schema_path)?;
        let violations: Vec<Violation> = validator
            .iter_errors(instance)
            .map(|err| Violation {
                instance_path: err.instance_path().to_string(),
                message: err.to_string(),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Violations {
                path: schema_path.to_string(),
                violations,
            })
        }
    }

    fn compiled(&self, schema_path: &str) -> Result<Arc<jsonschema::Validator>, ValidationError> {
        // A poisoned cache only ever holds fully compiled validators
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(validator) = cache.get(schema_path) {
            return Ok(Arc::clone(validator));
        }

        let bytes = self
            .loader
            .load(schema_path)
            .map_err(|e| ValidationError::SchemaUnavailable {
                path: schema_path.to_string(),
                message: e.to_string(),
            })?;
        let schema: Value =
            serde_json::from_slice(&bytes).map_err(|e| ValidationError::SchemaInvalid {
                path: schema_path.to_string(),
                message: e.to_string(),
            })?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|e| ValidationError::SchemaInvalid {
                path: schema_path.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(schema = schema_path, "schema compiled");
        let validator = Arc::new(validator);
        cache.insert(schema_path.to_string(), Arc::clone(&validator));
        Ok(validator)
    }
}
