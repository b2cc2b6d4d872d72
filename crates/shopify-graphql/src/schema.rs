//! Introspection schema loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Deserialize;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::operation::{Operation, OperationKind};

/// Process-wide schema loaded from [`Schema::default_path`].
static SHARED: OnceLock<Arc<Schema>> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

/// Read-only view of the remote API schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: HashMap<String, SchemaType>,
}

/// A named type and, for object types, its field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaType {
    /// Introspection kind (`OBJECT`, `SCALAR`, ...).
    pub kind: String,
    /// Field names; empty for types without fields.
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntrospectionDocument {
    Wrapped { data: IntrospectionData },
    Bare(IntrospectionData),
}

#[derive(Debug, Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: Option<NamedRef>,
    #[serde(default)]
    mutation_type: Option<NamedRef>,
    #[serde(default)]
    subscription_type: Option<NamedRef>,
    #[serde(default)]
    types: Vec<IntrospectionType>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IntrospectionType {
    kind: String,
    name: String,
    #[serde(default)]
    fields: Option<Vec<NamedRef>>,
}

impl Schema {
    /// Location of the bundled schema, next to the crate manifest.
    ///
    /// The bundled file is a fixture; replace it with a full introspection dump.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("schema.json")
    }

    /// Load an introspection result from `path`.
    ///
    /// Returns [`GatewayError::Configuration`] only when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GatewayError::schema_missing(path));
        }

        let raw = std::fs::read_to_string(path).map_err(|err| GatewayError::InvalidSchema {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let schema = Self::from_json(&raw).map_err(|err| GatewayError::InvalidSchema {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        info!(
            path = %path.display(),
            types = schema.types.len(),
            "Loaded GraphQL schema"
        );
        Ok(schema)
    }

    /// Decode an introspection result (`{"data": {"__schema": ..}}` or `{"__schema": ..}`).
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let document: IntrospectionDocument = serde_json::from_str(raw)?;
        let schema = match document {
            IntrospectionDocument::Wrapped { data } | IntrospectionDocument::Bare(data) => {
                data.schema
            }
        };

        let types = schema
            .types
            .into_iter()
            .map(|ty| {
                let fields = ty
                    .fields
                    .unwrap_or_default()
                    .into_iter()
                    .map(|field| field.name)
                    .collect();
                (
                    ty.name,
                    SchemaType {
                        kind: ty.kind,
                        fields,
                    },
                )
            })
            .collect();

        Ok(Self {
            query_type: schema.query_type.map(|r| r.name),
            mutation_type: schema.mutation_type.map(|r| r.name),
            subscription_type: schema.subscription_type.map(|r| r.name),
            types,
        })
    }

    /// Schema loaded once per process from [`Schema::default_path`].
    ///
    /// Concurrent first callers are serialized so the file is read once.
    pub fn shared() -> GatewayResult<Arc<Self>> {
        if let Some(schema) = SHARED.get() {
            return Ok(Arc::clone(schema));
        }

        let _guard = SHARED_INIT.lock().map_err(|_| GatewayError::Configuration {
            message: "schema initialization lock poisoned".to_string(),
        })?;
        if let Some(schema) = SHARED.get() {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(Self::load(Self::default_path())?);
        let _ = SHARED.set(Arc::clone(&schema));
        Ok(schema)
    }

    /// Root type name for an operation kind.
    #[must_use]
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => self.query_type.as_deref(),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Look up a named type.
    #[must_use]
    pub fn get_type(&self, name: &str) -> Option<&SchemaType> {
        self.types.get(name)
    }

    /// Returns `true` if `type_name` declares `field`.
    #[must_use]
    pub fn has_field(&self, type_name: &str, field: &str) -> bool {
        self.get_type(type_name)
            .is_some_and(|ty| ty.fields.iter().any(|name| name == field))
    }

    /// Number of named types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Check an operation's root selections against the schema.
    pub fn validate(&self, operation: &Operation) -> GatewayResult<()> {
        let invalid = |message: String| GatewayError::Validation {
            message,
            location: operation.source().cloned(),
        };

        let root = self.root_type(operation.kind()).ok_or_else(|| {
            invalid(format!(
                "schema does not support {} operations",
                operation.kind()
            ))
        })?;

        for field in operation.root_fields() {
            if field.starts_with("__") {
                continue;
            }
            if !self.has_field(root, field) {
                return Err(invalid(format!(
                    "Field '{field}' doesn't exist on type '{root}'"
                )));
            }
        }
        Ok(())
    }
}
