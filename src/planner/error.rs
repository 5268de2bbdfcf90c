use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{capability::Capability, catalog::RoutingHandle, logical::{StepId, WorkflowError}, types::{ClusterName, ConnectorName, QueryId, TableName}};

/// Per-query planning state. Failure is not a phase of its own: a failed run reports the
/// last phase it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlanningPhase {
    Unplanned,
    PathsBuilt,
    ConnectorsChosen,
    WorkflowAssembled,
}

impl Display for PlanningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlanningPhase::Unplanned => "unplanned",
            PlanningPhase::PathsBuilt => "paths built",
            PlanningPhase::ConnectorsChosen => "connectors chosen",
            PlanningPhase::WorkflowAssembled => "workflow assembled",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningErrorKind {
    #[error("no connector can execute step {step} on table {table} (needs one of {})", .required.iter().join(", "))]
    NoCapableConnector {
        table: TableName,
        step: StepId,
        required: Vec<Capability>,
    },
    #[error("tables {} share no connector{}", .tables.iter().join(", "), .step.map(|s| format!(" at step {}", s)).unwrap_or_default())]
    NoCommonConnector {
        tables: Vec<TableName>,
        step: Option<StepId>,
    },
    #[error("connector name {connector} is registered with different definitions ({})", .handles.iter().join(", "))]
    AmbiguousChoice {
        connector: ConnectorName,
        handles: Vec<RoutingHandle>,
    },
    #[error("no connector on cluster {cluster} declares {required} for table {table}")]
    NoWritableConnector {
        table: TableName,
        cluster: ClusterName,
        required: Capability,
    },
    #[error("no planning procedure for {statement}")]
    UnsupportedStatement { statement: String },
    #[error("table {table} is unknown to the metadata store")]
    UnknownTable { table: TableName },
    #[error("malformed statement: {error}")]
    MalformedStatement { error: WorkflowError },
}

impl PlanningErrorKind {
    pub fn reason_code(&self) -> &'static str {
        match self {
            PlanningErrorKind::NoCapableConnector { .. } => "NO_CAPABLE_CONNECTOR",
            PlanningErrorKind::NoCommonConnector { .. } => "NO_COMMON_CONNECTOR",
            PlanningErrorKind::AmbiguousChoice { .. } => "AMBIGUOUS_CHOICE",
            PlanningErrorKind::NoWritableConnector { .. } => "NO_WRITABLE_CONNECTOR",
            PlanningErrorKind::UnsupportedStatement { .. } => "UNSUPPORTED_STATEMENT",
            PlanningErrorKind::UnknownTable { .. } => "UNKNOWN_TABLE",
            PlanningErrorKind::MalformedStatement { .. } => "MALFORMED_STATEMENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{}] query {query_id} failed after phase '{phase}': {kind}", .kind.reason_code())]
pub struct PlanningError {
    pub query_id: QueryId,
    pub phase: PlanningPhase,
    pub kind: PlanningErrorKind,
}

impl PlanningError {
    pub fn new(query_id: QueryId, phase: PlanningPhase, kind: PlanningErrorKind) -> Self {
        Self { query_id, phase, kind }
    }

    pub fn reason_code(&self) -> &'static str {
        self.kind.reason_code()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_rendering() {
        let error = PlanningError::new(
            QueryId::new("q1"),
            PlanningPhase::Unplanned,
            PlanningErrorKind::UnknownTable { table: TableName::new("demo", "missing") },
        );
        assert_eq!(error.reason_code(), "UNKNOWN_TABLE");
        assert_eq!(
            error.to_string(),
            "[UNKNOWN_TABLE] query q1 failed after phase 'unplanned': table demo.missing is unknown to the metadata store"
        );
    }

    #[test]
    fn test_no_common_connector_mentions_step() {
        let kind = PlanningErrorKind::NoCommonConnector {
            tables: vec![TableName::new("demo", "a"), TableName::new("demo", "b")],
            step: None,
        };
        assert_eq!(kind.to_string(), "tables demo.a, demo.b share no connector");
        let kind = PlanningErrorKind::NoCommonConnector {
            tables: vec![TableName::new("demo", "a")],
            step: Some(StepId::from(petgraph::graph::NodeIndex::new(3))),
        };
        assert_eq!(kind.to_string(), "tables demo.a share no connector at step #3");
    }
}
