use super::dag::{deserialize_dag, serialize_dag};
use super::formatter::to_ascii_string;
use super::operator::OperatorRegistry;
use super::schema;
use super::SerializationResult;
use crate::config::SerializationConfig;
use crate::models::Dag;
use serde_json::Value;
use tracing::{debug, instrument};

/// Converts DAGs to and from their schema-checked transport form
#[derive(Debug, Clone)]
pub struct DagSerializer {
    validate_on_serialize: bool,
    operators: OperatorRegistry,
}

impl DagSerializer {
    pub fn new(config: &SerializationConfig) -> Self {
        Self {
            validate_on_serialize: config.validate_on_serialize,
            operators: OperatorRegistry::default(),
        }
    }

    /// Replace the operator types this process can reconstruct
    pub fn with_operator_registry(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    #[instrument(skip(self, dag), fields(dag_id = %dag.dag_id))]
    pub fn serialize(&self, dag: &Dag) -> SerializationResult<Value> {
        let payload = serialize_dag(dag)?;
        if self.validate_on_serialize {
            schema::validate(&payload)?;
        }
        debug!(task_count = dag.task_count(), "Serialized DAG");
        Ok(payload)
    }

    /// Deterministic ASCII JSON text for `dag`
    pub fn to_json(&self, dag: &Dag) -> SerializationResult<String> {
        Ok(to_ascii_string(&self.serialize(dag)?)?)
    }

    /// Payloads are always schema-checked before they are decoded
    #[instrument(skip(self, payload))]
    pub fn deserialize(&self, payload: &Value) -> SerializationResult<Dag> {
        schema::validate(payload)?;
        let dag = deserialize_dag(payload, &self.operators)?;
        debug!(dag_id = %dag.dag_id, task_count = dag.task_count(), "Deserialized DAG");
        Ok(dag)
    }

    pub fn from_json(&self, json: &str) -> SerializationResult<Dag> {
        let payload: Value = serde_json::from_str(json)?;
        self.deserialize(&payload)
    }
}

impl Default for DagSerializer {
    fn default() -> Self {
        Self::new(&SerializationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::SerializationError;
    use serde_json::json;

    #[test]
    fn test_schema_failure_blocks_deserialization() {
        let payload = json!({"__type": "dag", "__var": {"dag_id": "no_tasks"}});
        let err = DagSerializer::default().deserialize(&payload).unwrap_err();
        match err {
            SerializationError::SchemaValidation { errors } => assert!(!errors.is_empty()),
            other => panic!("expected schema validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json_text() {
        let err = DagSerializer::default().from_json("{not json").unwrap_err();
        assert!(matches!(err, SerializationError::Json(_)));
    }
}
