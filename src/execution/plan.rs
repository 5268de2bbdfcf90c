/*
    The planner's output. An ExecutionWorkflow is a self-contained description of what to
    send to which connector and how partial results are combined, so a dispatcher can fan
    it out and fan results back in without asking the planner anything. It owns copies of
    the connector metadata and of the logical workflow it was planned from.

    Three shapes exist:
    - Single: one connector runs the whole logical workflow.
    - Multi: every branch (scan up to its first join) runs on its own connector and merge
      stages combine branch results, either on one of the branch connectors or on the
      coordinator that drives the dispatch.
    - Storage: a write routed to the connector owning the target table.
 */

use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{capability::Capability, catalog::{ConnectorMetadata, RoutingHandle}, logical::{LogicalWorkflow, StepId}, statement::Selector, types::{ClusterName, ColumnName, ConnectorName, QueryId, TableName}};

/// A run of steps starting at a scan that every connector in `connectors` can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPath {
    pub table: TableName,
    pub initial: StepId,
    pub last: StepId,
    /// Covered steps from `initial` to `last`.
    pub steps: Vec<StepId>,
    /// Never empty. Discovery order, not preference.
    pub connectors: Vec<ConnectorMetadata>,
    /// Where the walk stopped: a join, or the first step nobody in `connectors` can run.
    /// `None` once the terminal step is covered.
    pub next: Option<StepId>,
}

impl ExecutionPath {
    pub fn reaches_terminal(&self) -> bool {
        self.next.is_none()
    }

    pub fn connector_names(&self) -> Vec<&ConnectorName> {
        self.connectors.iter().map(|c| &c.name).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleConnectorWorkflow {
    pub query_id: QueryId,
    pub connector: ConnectorMetadata,
    pub initial_steps: Vec<StepId>,
    pub terminal: StepId,
    pub steps: Vec<StepId>,
    pub logical: LogicalWorkflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAssignment {
    pub path: ExecutionPath,
    pub connector: ConnectorMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageInput {
    /// Index into the workflow's paths.
    Path(usize),
    /// Index of an earlier stage.
    Stage(usize),
}

impl Display for StageInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageInput::Path(index) => write!(f, "path {}", index),
            StageInput::Stage(index) => write!(f, "stage {}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeExecutor {
    Connector {
        connector: ConnectorMetadata,
        join: Capability,
    },
    /// The dispatcher joins the partial results itself.
    Coordinator,
}

impl MergeExecutor {
    pub fn connector(&self) -> Option<&ConnectorMetadata> {
        match self {
            MergeExecutor::Connector { connector, .. } => Some(connector),
            MergeExecutor::Coordinator => None,
        }
    }
}

impl Display for MergeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeExecutor::Connector { connector, join } => write!(f, "{} [{}]", connector, join),
            MergeExecutor::Coordinator => write!(f, "COORDINATOR"),
        }
    }
}

/// One join of a multi-path workflow together with the steps after it, up to the next
/// join or the terminal step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStage {
    pub join: StepId,
    pub steps: Vec<StepId>,
    pub inputs: Vec<StageInput>,
    pub tables: Vec<TableName>,
    pub executor: MergeExecutor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiConnectorWorkflow {
    pub query_id: QueryId,
    pub paths: Vec<PathAssignment>,
    /// Upstream stages come first; the last stage produces the final result.
    pub stages: Vec<MergeStage>,
    pub logical: LogicalWorkflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAssignment {
    pub column: ColumnName,
    pub value: Selector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageWorkflow {
    pub query_id: QueryId,
    pub cluster: ClusterName,
    pub table: TableName,
    pub connector: ConnectorMetadata,
    pub operation: Capability,
    /// Statement order.
    pub assignments: Vec<ColumnAssignment>,
}

/// What the dispatcher sends to one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchUnit {
    pub connector: ConnectorName,
    pub handle: RoutingHandle,
    pub steps: Vec<StepId>,
}

impl DispatchUnit {
    fn new(connector: &ConnectorMetadata, steps: Vec<StepId>) -> Self {
        Self {
            connector: connector.name.clone(),
            handle: connector.handle.clone(),
            steps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionWorkflow {
    Single(SingleConnectorWorkflow),
    Multi(MultiConnectorWorkflow),
    Storage(StorageWorkflow),
}

impl ExecutionWorkflow {
    pub fn query_id(&self) -> &QueryId {
        match self {
            ExecutionWorkflow::Single(workflow) => &workflow.query_id,
            ExecutionWorkflow::Multi(workflow) => &workflow.query_id,
            ExecutionWorkflow::Storage(workflow) => &workflow.query_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionWorkflow::Single(_) => "single",
            ExecutionWorkflow::Multi(_) => "multi",
            ExecutionWorkflow::Storage(_) => "storage",
        }
    }

    /// Connector handles with the steps each one runs, in dispatch order. Stages merged by
    /// the coordinator have no unit.
    pub fn dispatch_units(&self) -> Vec<DispatchUnit> {
        match self {
            ExecutionWorkflow::Single(workflow) => vec![DispatchUnit::new(&workflow.connector, workflow.steps.clone())],
            ExecutionWorkflow::Multi(workflow) => workflow.paths
                .iter()
                .map(|p| DispatchUnit::new(&p.connector, p.path.steps.clone()))
                .chain(workflow.stages.iter().filter_map(|s| {
                    s.executor.connector().map(|c| DispatchUnit::new(c, s.steps.clone()))
                }))
                .collect(),
            ExecutionWorkflow::Storage(workflow) => vec![DispatchUnit::new(&workflow.connector, Vec::new())],
        }
    }

    /// Distinct connector names involved, sorted.
    pub fn connector_names(&self) -> Vec<ConnectorName> {
        self.dispatch_units()
            .into_iter()
            .map(|u| u.connector)
            .sorted()
            .dedup()
            .collect()
    }

    pub fn as_single(&self) -> Option<&SingleConnectorWorkflow> {
        match self {
            ExecutionWorkflow::Single(workflow) => Some(workflow),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&MultiConnectorWorkflow> {
        match self {
            ExecutionWorkflow::Multi(workflow) => Some(workflow),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageWorkflow> {
        match self {
            ExecutionWorkflow::Storage(workflow) => Some(workflow),
            _ => None,
        }
    }
}

fn write_steps(f: &mut std::fmt::Formatter<'_>, logical: &LogicalWorkflow, steps: &[StepId], indent: &str) -> std::fmt::Result {
    for id in steps {
        match logical.step(*id) {
            Some(step) => writeln!(f, "{}{} {}", indent, id, step)?,
            None => writeln!(f, "{}{} ?", indent, id)?,
        }
    }
    Ok(())
}

impl Display for ExecutionWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionWorkflow::Single(workflow) => {
                writeln!(f, "SINGLE query={} connector={}", workflow.query_id, workflow.connector)?;
                write_steps(f, &workflow.logical, &workflow.steps, "  ")
            }
            ExecutionWorkflow::Multi(workflow) => {
                writeln!(f, "MULTI query={}", workflow.query_id)?;
                for (index, assignment) in workflow.paths.iter().enumerate() {
                    writeln!(f, "  PATH {} {} connector={}", index, assignment.path.table, assignment.connector)?;
                    write_steps(f, &workflow.logical, &assignment.path.steps, "    ")?;
                }
                for (index, stage) in workflow.stages.iter().enumerate() {
                    writeln!(
                        f,
                        "  STAGE {} <- [{}] executor={}",
                        index,
                        stage.inputs.iter().join(", "),
                        stage.executor
                    )?;
                    write_steps(f, &workflow.logical, &stage.steps, "    ")?;
                }
                Ok(())
            }
            ExecutionWorkflow::Storage(workflow) => {
                writeln!(
                    f,
                    "STORAGE query={} {} INTO {} ON {} connector={}",
                    workflow.query_id, workflow.operation, workflow.table, workflow.cluster, workflow.connector
                )?;
                for assignment in &workflow.assignments {
                    writeln!(f, "  {} = {}", assignment.column.name, assignment.value)?;
                }
                Ok(())
            }
        }
    }
}
