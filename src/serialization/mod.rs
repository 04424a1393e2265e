//! # DAG Serialization
//!
//! Transport form of DAG definitions exchanged between the scheduler and workers.
//!
//! Every non-primitive value is wrapped as `{"__type": <tag>, "__var": <payload>}`. Only an
//! allow-list of task and DAG fields travels; absent optionals are omitted, sets are sorted
//! and output escapes non-ASCII characters, so serializing the same definition twice yields
//! byte-identical JSON. Payloads are checked against a Draft 7 JSON Schema on the way in.
//!
//! Deserialized DAGs are structurally equivalent to their source: callables degrade to their
//! names and operator types the receiver does not know become base tasks.

pub mod comparison;
pub mod dag;
pub mod encoding;
pub mod formatter;
pub mod operator;
pub mod schema;
pub mod serializer;

pub use comparison::{first_difference, normalize_for_comparison};
pub use dag::{deserialize_dag, serialize_dag};
pub use formatter::{to_ascii_string, AsciiFormatter};
pub use operator::{deserialize_task, serialize_task, OperatorKind, OperatorRegistry};
pub use schema::{validate, SERIALIZED_DAG_SCHEMA};
pub use serializer::DagSerializer;

use crate::error::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Serialized DAG failed schema validation: {}", .errors.join("; "))]
    SchemaValidation { errors: Vec<String> },

    #[error("Malformed serialized DAG: {0}")]
    Malformed(String),

    #[error("Invalid schema document: {0}")]
    InvalidSchemaDocument(String),

    #[error("Deserialized DAG is invalid: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerializationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

pub type SerializationResult<T> = Result<T, SerializationError>;
