//! Schema validation of serialized DAG payloads (JSON Schema draft-07).

use super::{SerializationError, SerializationResult};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::OnceLock;

/// The schema every serialized DAG must satisfy
pub const SERIALIZED_DAG_SCHEMA: &str = include_str!("../../schema/serialized_dag.json");

static COMPILED: OnceLock<Result<JSONSchema, String>> = OnceLock::new();

fn compiled() -> SerializationResult<&'static JSONSchema> {
    COMPILED
        .get_or_init(|| {
            let schema: Value =
                serde_json::from_str(SERIALIZED_DAG_SCHEMA).map_err(|e| e.to_string())?;
            JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&schema)
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|reason| SerializationError::InvalidSchemaDocument(reason.clone()))
}

/// Check `payload` against the serialized DAG schema, collecting every violation
pub fn validate(payload: &Value) -> SerializationResult<()> {
    let schema = compiled()?;
    if let Err(errors) = schema.validate(payload) {
        let errors: Vec<String> = errors
            .map(|e| {
                format!(
                    "Property '{}': {}",
                    e.instance_path,
                    e.to_string().replace('\n', " ")
                )
            })
            .collect();
        return Err(SerializationError::SchemaValidation { errors });
    }
    Ok(())
}
