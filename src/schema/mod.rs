//! # Schema Registry
//!
//! Persistent store of JSON Schemas under the shared filesystem's
//! `templates/` directory, with an in-memory cache of compiled Draft-07
//! validators. Compilation happens on first use of an id and is invalidated
//! when the schema is replaced; entities written under an older shape are
//! never rewritten.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::{Draft, Validator};
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;

use crate::error::{DbError, DbResult};
use crate::naming::validate_name;

/// Schema subsystem errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// No schema stored under the id
    #[error("schema not found")]
    NotFound,

    /// Schema body must be a JSON object
    #[error("schema must be a JSON object")]
    NotAnObject,

    /// Schema does not compile as Draft-07
    #[error("schema does not compile: {0}")]
    Compile(String),

    /// Document failed validation; carries the first error message
    #[error("{0}")]
    Invalid(String),

    /// Filesystem failure
    #[error("schema storage I/O error")]
    Io(#[from] std::io::Error),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Disk-backed registry with a compiled-validator cache.
///
/// Cloning shares the cache; both the main worker (REST schema endpoints)
/// and a colocated proc worker hold the same instance.
#[derive(Clone)]
pub struct SchemaRegistry {
    templates_dir: PathBuf,
    compiled: Arc<DashMap<String, Arc<Validator>>>,
}

impl SchemaRegistry {
    /// Open (and create if needed) the `templates/` directory under the
    /// shared filesystem root.
    pub fn open(shared_fs_root: &Path) -> SchemaResult<Self> {
        let templates_dir = shared_fs_root.join("templates");
        fs::create_dir_all(&templates_dir)?;
        Ok(Self {
            templates_dir,
            compiled: Arc::new(DashMap::new()),
        })
    }

    fn schema_path(&self, schema_id: &str) -> PathBuf {
        self.templates_dir.join(format!("{schema_id}.json"))
    }

    /// Store a schema and drop any cached validator for the id.
    pub fn put(&self, schema_id: &str, schema: &Value) -> DbResult<()> {
        validate_name("schema_id", schema_id)?;
        if !schema.is_object() {
            return Err(DbError::bad_input("schema must be a JSON object"));
        }

        let bytes = serde_json::to_vec_pretty(schema)
            .map_err(|_| DbError::internal("schema storage error"))?;
        let target = self.schema_path(schema_id);
        let tmp = target.with_file_name(format!(
            "{schema_id}.json.tmp-{:08x}",
            rand::thread_rng().next_u32()
        ));
        fs::write(&tmp, &bytes).map_err(|_| DbError::internal("schema storage error"))?;
        fs::rename(&tmp, &target).map_err(|_| {
            let _ = fs::remove_file(&tmp);
            DbError::internal("schema storage error")
        })?;

        self.compiled.remove(schema_id);
        Ok(())
    }

    /// Fetch the raw schema JSON.
    pub fn get(&self, schema_id: &str) -> DbResult<Value> {
        validate_name("schema_id", schema_id)?;
        let bytes = match fs::read(self.schema_path(schema_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DbError::not_found("schema not found"))
            }
            Err(_) => return Err(DbError::internal("schema storage error")),
        };
        serde_json::from_slice(&bytes).map_err(|_| DbError::internal("schema storage error"))
    }

    /// List stored schema ids from the directory, sorted.
    pub fn list(&self) -> DbResult<Vec<String>> {
        let mut ids = Vec::new();
        let entries =
            fs::read_dir(&self.templates_dir).map_err(|_| DbError::internal("schema storage error"))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                if !id.contains(".tmp-") {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Validate a document against a stored schema.
    ///
    /// An empty `schema_id` is unconditionally valid. An unknown id is
    /// [`SchemaError::NotFound`]; the write pipeline reports it as an
    /// argument error.
    pub fn validate(&self, schema_id: &str, document: &Value) -> SchemaResult<()> {
        if schema_id.is_empty() {
            return Ok(());
        }
        validate_name("schema_id", schema_id).map_err(|e| SchemaError::Invalid(e.to_string()))?;

        let validator = self.compiled_validator(schema_id)?;
        let result = match validator.iter_errors(document).next() {
            None => Ok(()),
            Some(first) => Err(SchemaError::Invalid(first.to_string())),
        };
        result
    }

    fn compiled_validator(&self, schema_id: &str) -> SchemaResult<Arc<Validator>> {
        if let Some(cached) = self.compiled.get(schema_id) {
            return Ok(Arc::clone(cached.value()));
        }

        let bytes = match fs::read(self.schema_path(schema_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SchemaError::NotFound)
            }
            Err(e) => return Err(SchemaError::Io(e)),
        };
        let schema: Value =
            serde_json::from_slice(&bytes).map_err(|e| SchemaError::Compile(e.to_string()))?;

        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&schema)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        let validator = Arc::new(validator);
        self.compiled
            .insert(schema_id.to_string(), Arc::clone(&validator));
        Ok(validator)
    }
}
