//! DAG registry: id-based lookup replacing live task -> DAG back references.

use super::Dag;
use crate::error::ConfigurationError;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-safe registry of loaded DAG definitions
#[derive(Debug, Default)]
pub struct DagRegistry {
    dags: DashMap<String, Arc<Dag>>,
}

impl DagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a DAG after validating the whole graph
    pub fn register(&self, dag: Dag) -> Result<Arc<Dag>, ConfigurationError> {
        dag.validate()?;
        let dag = Arc::new(dag);
        let replaced = self.dags.insert(dag.dag_id.clone(), Arc::clone(&dag)).is_some();
        info!(
            dag_id = %dag.dag_id,
            task_count = dag.task_count(),
            replaced = replaced,
            "📚 DAG registered"
        );
        Ok(dag)
    }

    pub fn get(&self, dag_id: &str) -> Option<Arc<Dag>> {
        let dag = self.dags.get(dag_id).map(|entry| Arc::clone(entry.value()));
        if dag.is_none() {
            debug!(dag_id = %dag_id, "DAG not found in registry");
        }
        dag
    }

    pub fn remove(&self, dag_id: &str) -> Option<Arc<Dag>> {
        self.dags.remove(dag_id).map(|(_, dag)| dag)
    }

    pub fn contains(&self, dag_id: &str) -> bool {
        self.dags.contains_key(dag_id)
    }

    pub fn dag_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.dags.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.dags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dags.is_empty()
    }
}
