/*
    Logical workflows: the connector-agnostic plan of a read statement.

    A workflow is a small directed graph of steps. Every branch starts at a scan of one
    table, runs through filters and projections and meets other branches at join steps
    until a single terminal step is left. Steps are only ever linked to steps created
    before them, so ascending StepIds are a topological order and the graph can't have
    cycles. The graph is built once through LogicalWorkflowBuilder and never changes
    afterwards, which makes it cheap to share between planning runs. A workflow read back
    from its serialized form goes through the same checks before it is handed out.
 */

use std::{fmt::Display, ops::Index};

use itertools::Itertools;
use petgraph::{graph::{DiGraph, NodeIndex}, Direction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{capability::{Capability, ColumnClass}, statement::{Operator, Relation}, types::{ClusterName, ColumnName, ColumnType, TableName}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(u32);

impl StepId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    fn node(&self) -> NodeIndex {
        NodeIndex::new(self.index())
    }
}

impl From<NodeIndex> for StepId {
    fn from(value: NodeIndex) -> Self {
        StepId(value.index() as u32)
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("step {0} does not belong to this workflow")]
    UnknownStep(StepId),
    #[error("step {0} already has a downstream step")]
    AlreadyLinked(StepId),
    #[error("operator {operator} can't filter a {class:?} column")]
    InvalidFilter { class: ColumnClass, operator: Operator },
    #[error("{0} is not a join capability")]
    NotAJoinCapability(Capability),
    #[error("join step needs at least one join capability")]
    NoJoinAlternatives,
    #[error("join needs two different upstream steps, got {0} twice")]
    SameUpstream(StepId),
    #[error("workflow has no steps")]
    Empty,
    #[error("workflow has several terminal steps: {}", .0.iter().join(", "))]
    MultipleTerminals(Vec<StepId>),
    #[error("{columns} columns but {values} values")]
    ArityMismatch { columns: usize, values: usize },
    #[error("step {from} links back to {to}")]
    BackwardLink { from: StepId, to: StepId },
    #[error("step {step} has {found} upstream steps, expected {expected}")]
    UpstreamCount { step: StepId, expected: usize, found: usize },
    #[error("{0} is not a filter capability")]
    NotAFilterCapability(Capability),
    #[error("initial steps {} are not the scans of the workflow", .0.iter().join(", "))]
    InitialStepsMismatch(Vec<StepId>),
    #[error("declared terminal {declared} but the workflow ends at {actual}")]
    TerminalMismatch { declared: StepId, actual: StepId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub source: ColumnName,
    pub alias: String,
    pub column_type: ColumnType,
}

impl OutputColumn {
    pub fn new(source: ColumnName, column_type: ColumnType) -> Self {
        let alias = source.name.clone();
        Self { source, alias, column_type }
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        Self { alias: alias.into(), ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowSpec {
    Rows(u32),
    Seconds(u64),
}

impl Display for WindowSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowSpec::Rows(rows) => write!(f, "{} ROWS", rows),
            WindowSpec::Seconds(seconds) => write!(f, "{} SECONDS", seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalStep {
    Scan {
        table: TableName,
        cluster: ClusterName,
        columns: Vec<ColumnName>,
    },
    Filter {
        relation: Relation,
        operation: Capability,
    },
    Projection {
        columns: Vec<OutputColumn>,
        window: Option<WindowSpec>,
    },
    Join {
        relation: Relation,
        /// Acceptable join capabilities, least demanding first.
        alternatives: Vec<Capability>,
    },
}

impl LogicalStep {
    /// Capabilities that can execute this step. A connector qualifies if it declares any one.
    pub fn alternatives(&self) -> &[Capability] {
        match self {
            LogicalStep::Scan { .. } => &[Capability::Scan],
            LogicalStep::Filter { operation, .. } => std::slice::from_ref(operation),
            LogicalStep::Projection { window: None, .. } => &[Capability::Project],
            LogicalStep::Projection { window: Some(_), .. } => &[Capability::SelectWindow],
            LogicalStep::Join { alternatives, .. } => alternatives,
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, LogicalStep::Join { .. })
    }

    pub fn scanned_table(&self) -> Option<&TableName> {
        match self {
            LogicalStep::Scan { table, .. } => Some(table),
            _ => None,
        }
    }
}

impl Display for LogicalStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalStep::Scan { table, cluster, columns } => write!(
                f,
                "SCAN {} ON {} [{}]",
                table,
                cluster,
                columns.iter().map(|c| c.name.as_str()).join(", ")
            ),
            LogicalStep::Filter { relation, operation } => write!(f, "FILTER {} ({})", relation, operation),
            LogicalStep::Projection { columns, window } => {
                write!(
                    f,
                    "PROJECT {}",
                    columns.iter().map(|c| format!("{} AS {}", c.source, c.alias)).join(", ")
                )?;
                if let Some(window) = window {
                    write!(f, " WINDOW {}", window)?;
                }
                Ok(())
            }
            LogicalStep::Join { relation, alternatives } => write!(
                f,
                "JOIN ON {} ({})",
                relation,
                alternatives.iter().join(" | ")
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflow")]
pub struct LogicalWorkflow {
    graph: DiGraph<LogicalStep, ()>,
    initial_steps: Vec<StepId>,
    terminal: StepId,
}

// Serialized layout of LogicalWorkflow, unchecked
#[derive(Deserialize)]
struct RawWorkflow {
    graph: DiGraph<LogicalStep, ()>,
    initial_steps: Vec<StepId>,
    terminal: StepId,
}

impl TryFrom<RawWorkflow> for LogicalWorkflow {
    type Error = WorkflowError;

    fn try_from(raw: RawWorkflow) -> Result<Self, Self::Error> {
        let graph = raw.graph;
        for edge in graph.raw_edges() {
            let (from, to) = (StepId::from(edge.source()), StepId::from(edge.target()));
            if to.index() >= graph.node_count() {
                return Err(WorkflowError::UnknownStep(to));
            }
            if to <= from {
                return Err(WorkflowError::BackwardLink { from, to });
            }
        }

        let mut scans = Vec::new();
        for index in graph.node_indices() {
            let id = StepId::from(index);
            let step = &graph[index];
            if graph.neighbors_directed(index, Direction::Outgoing).count() > 1 {
                return Err(WorkflowError::AlreadyLinked(id));
            }
            let expected = match step {
                LogicalStep::Scan { .. } => 0,
                LogicalStep::Join { .. } => 2,
                _ => 1,
            };
            let found = graph.neighbors_directed(index, Direction::Incoming).count();
            if found != expected {
                return Err(WorkflowError::UpstreamCount { step: id, expected, found });
            }
            match step {
                LogicalStep::Scan { .. } => scans.push(id),
                LogicalStep::Filter { operation, .. } if !operation.is_filter() => {
                    return Err(WorkflowError::NotAFilterCapability(*operation));
                }
                LogicalStep::Join { alternatives, .. } => check_join_alternatives(alternatives)?,
                _ => {}
            }
        }

        let terminal = single_terminal(&graph)?;
        if raw.initial_steps != scans {
            return Err(WorkflowError::InitialStepsMismatch(raw.initial_steps));
        }
        if raw.terminal != terminal {
            return Err(WorkflowError::TerminalMismatch { declared: raw.terminal, actual: terminal });
        }
        Ok(LogicalWorkflow { graph, initial_steps: scans, terminal })
    }
}

fn check_join_alternatives(alternatives: &[Capability]) -> Result<(), WorkflowError> {
    if alternatives.is_empty() {
        return Err(WorkflowError::NoJoinAlternatives);
    }
    match alternatives.iter().find(|c| !c.is_join()) {
        Some(capability) => Err(WorkflowError::NotAJoinCapability(*capability)),
        None => Ok(()),
    }
}

fn single_terminal(graph: &DiGraph<LogicalStep, ()>) -> Result<StepId, WorkflowError> {
    let terminals = graph
        .externals(Direction::Outgoing)
        .map(StepId::from)
        .sorted()
        .collect::<Vec<_>>();
    if terminals.len() > 1 {
        return Err(WorkflowError::MultipleTerminals(terminals));
    }
    terminals.first().copied().ok_or(WorkflowError::Empty)
}

impl LogicalWorkflow {
    pub fn builder() -> LogicalWorkflowBuilder {
        LogicalWorkflowBuilder::new()
    }

    pub fn initial_steps(&self) -> &[StepId] {
        &self.initial_steps
    }

    pub fn terminal(&self) -> StepId {
        self.terminal
    }

    pub fn step(&self, id: StepId) -> Option<&LogicalStep> {
        self.graph.node_weight(id.node())
    }

    pub fn next(&self, id: StepId) -> Option<StepId> {
        self.graph
            .neighbors_directed(id.node(), Direction::Outgoing)
            .next()
            .map(StepId::from)
    }

    /// Upstream steps in id order. Only joins have more than one.
    pub fn upstream(&self, id: StepId) -> Vec<StepId> {
        self.graph
            .neighbors_directed(id.node(), Direction::Incoming)
            .map(StepId::from)
            .sorted()
            .collect()
    }

    /// All steps, upstream before downstream.
    pub fn steps_in_order(&self) -> impl Iterator<Item = (StepId, &LogicalStep)> + '_ {
        self.graph
            .node_indices()
            .map(move |index| (StepId::from(index), &self.graph[index]))
    }

    pub fn joins(&self) -> Vec<StepId> {
        self.steps_in_order()
            .filter(|(_, step)| step.is_join())
            .map(|(id, _)| id)
            .collect()
    }

    /// Tables read by the workflow, sorted and deduplicated.
    pub fn tables(&self) -> Vec<&TableName> {
        self.initial_steps
            .iter()
            .filter_map(|id| self.step(*id).and_then(LogicalStep::scanned_table))
            .sorted()
            .dedup()
            .collect()
    }

    pub fn clusters(&self) -> Vec<&ClusterName> {
        self.initial_steps
            .iter()
            .filter_map(|id| match self.step(*id) {
                Some(LogicalStep::Scan { cluster, .. }) => Some(cluster),
                _ => None,
            })
            .sorted()
            .dedup()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Index<StepId> for LogicalWorkflow {
    type Output = LogicalStep;

    // Panics on a StepId minted by another workflow, like indexing a petgraph graph does
    fn index(&self, index: StepId) -> &Self::Output {
        &self.graph[index.node()]
    }
}

impl Display for LogicalWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, step) in self.steps_in_order() {
            match self.next(id) {
                Some(next) => writeln!(f, "{} {} -> {}", id, step, next)?,
                None => writeln!(f, "{} {}", id, step)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogicalWorkflowBuilder {
    graph: DiGraph<LogicalStep, ()>,
    scans: Vec<StepId>,
}

impl LogicalWorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, table: TableName, cluster: ClusterName, columns: Vec<ColumnName>) -> StepId {
        let id = StepId::from(self.graph.add_node(LogicalStep::Scan { table, cluster, columns }));
        self.scans.push(id);
        id
    }

    pub fn filter(&mut self, upstream: StepId, class: ColumnClass, relation: Relation) -> Result<StepId, WorkflowError> {
        let operation = Capability::filter(class, relation.operator)
            .ok_or(WorkflowError::InvalidFilter { class, operator: relation.operator })?;
        self.append(&[upstream], LogicalStep::Filter { relation, operation })
    }

    pub fn project(&mut self, upstream: StepId, columns: Vec<OutputColumn>) -> Result<StepId, WorkflowError> {
        self.append(&[upstream], LogicalStep::Projection { columns, window: None })
    }

    pub fn window(&mut self, upstream: StepId, columns: Vec<OutputColumn>, window: WindowSpec) -> Result<StepId, WorkflowError> {
        self.append(&[upstream], LogicalStep::Projection { columns, window: Some(window) })
    }

    pub fn join(&mut self, left: StepId, right: StepId, relation: Relation) -> Result<StepId, WorkflowError> {
        self.join_with(left, right, relation, Capability::JOIN_VARIANTS.to_vec())
    }

    pub fn join_with(
        &mut self,
        left: StepId,
        right: StepId,
        relation: Relation,
        alternatives: Vec<Capability>,
    ) -> Result<StepId, WorkflowError> {
        if left == right {
            return Err(WorkflowError::SameUpstream(left));
        }
        check_join_alternatives(&alternatives)?;
        self.append(&[left, right], LogicalStep::Join { relation, alternatives })
    }

    fn append(&mut self, upstream: &[StepId], step: LogicalStep) -> Result<StepId, WorkflowError> {
        // Validate everything before touching the graph so a failed call leaves no dangling node
        for id in upstream {
            if self.graph.node_weight(id.node()).is_none() {
                return Err(WorkflowError::UnknownStep(*id));
            }
            if self.graph.neighbors_directed(id.node(), Direction::Outgoing).next().is_some() {
                return Err(WorkflowError::AlreadyLinked(*id));
            }
        }
        let node = self.graph.add_node(step);
        for id in upstream {
            self.graph.add_edge(id.node(), node, ());
        }
        Ok(StepId::from(node))
    }

    pub fn build(self) -> Result<LogicalWorkflow, WorkflowError> {
        let terminal = single_terminal(&self.graph)?;
        Ok(LogicalWorkflow {
            graph: self.graph,
            initial_steps: self.scans,
            terminal,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table1() -> TableName {
        TableName::new("demo", "table1")
    }

    fn table2() -> TableName {
        TableName::new("demo", "table2")
    }

    fn scan(builder: &mut LogicalWorkflowBuilder, table: TableName) -> StepId {
        let columns = vec![table.column("id"), table.column("user")];
        builder.scan(table, ClusterName::new("cluster"), columns)
    }

    #[test]
    fn test_build_linear_chain() {
        let mut builder = LogicalWorkflow::builder();
        let scan = scan(&mut builder, table1());
        let filter = builder.filter(
            scan,
            ColumnClass::PartitionKey,
            Relation::new(table1().column("id"), Operator::Eq, 42),
        ).unwrap();
        let project = builder.project(filter, vec![
            OutputColumn::new(table1().column("id"), ColumnType::Int),
            OutputColumn::new(table1().column("user"), ColumnType::Text),
        ]).unwrap();
        let workflow = builder.build().unwrap();

        assert_eq!(workflow.initial_steps(), &[scan]);
        assert_eq!(workflow.terminal(), project);
        assert_eq!(workflow.next(scan), Some(filter));
        assert_eq!(workflow.next(filter), Some(project));
        assert_eq!(workflow.next(project), None);
        assert_eq!(workflow.upstream(filter), vec![scan]);
        assert_eq!(workflow[filter].alternatives(), &[Capability::FilterPkEq]);
        assert_eq!(workflow.tables(), vec![&table1()]);
        assert_eq!(workflow.len(), 3);
    }

    #[test]
    fn test_join_defaults_to_both_join_variants() {
        let mut builder = LogicalWorkflow::builder();
        let left = scan(&mut builder, table1());
        let right = scan(&mut builder, table2());
        let join = builder.join(
            left,
            right,
            Relation::new(table1().column("id"), Operator::Eq, table2().column("id")),
        ).unwrap();
        let workflow = builder.build().unwrap();

        assert_eq!(workflow.terminal(), join);
        assert_eq!(workflow.upstream(join), vec![left, right]);
        assert_eq!(workflow[join].alternatives(), &Capability::JOIN_VARIANTS);
        assert_eq!(workflow.joins(), vec![join]);
        assert_eq!(workflow.tables(), vec![&table1(), &table2()]);
        assert_eq!(workflow.clusters(), vec![&ClusterName::new("cluster")]);
    }

    #[test]
    fn test_steps_in_order_is_topological() {
        let mut builder = LogicalWorkflow::builder();
        let left = scan(&mut builder, table1());
        let right = scan(&mut builder, table2());
        let project = builder.project(right, vec![]).unwrap();
        let join = builder.join(left, project, Relation::new(table1().column("id"), Operator::Eq, 1)).unwrap();
        let workflow = builder.build().unwrap();

        let order = workflow.steps_in_order().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(order, vec![left, right, project, join]);
        for (id, _) in workflow.steps_in_order() {
            assert!(workflow.upstream(id).iter().all(|up| *up < id));
        }
    }

    #[test]
    fn test_already_linked_step_is_rejected() {
        let mut builder = LogicalWorkflow::builder();
        let scan = scan(&mut builder, table1());
        builder.project(scan, vec![]).unwrap();
        assert_eq!(builder.project(scan, vec![]), Err(WorkflowError::AlreadyLinked(scan)));
        // the failed call must not leave a second terminal behind
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_join_validation() {
        let mut builder = LogicalWorkflow::builder();
        let left = scan(&mut builder, table1());
        let right = scan(&mut builder, table2());
        let relation = Relation::new(table1().column("id"), Operator::Eq, table2().column("id"));

        assert_eq!(builder.join(left, left, relation.clone()), Err(WorkflowError::SameUpstream(left)));
        assert_eq!(
            builder.join_with(left, right, relation.clone(), vec![]),
            Err(WorkflowError::NoJoinAlternatives)
        );
        assert_eq!(
            builder.join_with(left, right, relation.clone(), vec![Capability::Project]),
            Err(WorkflowError::NotAJoinCapability(Capability::Project))
        );
        assert_eq!(
            builder.project(StepId(17), vec![]),
            Err(WorkflowError::UnknownStep(StepId(17)))
        );
    }

    #[test]
    fn test_invalid_filter() {
        let mut builder = LogicalWorkflow::builder();
        let scan = scan(&mut builder, table1());
        let result = builder.filter(
            scan,
            ColumnClass::NonIndexed,
            Relation::new(table1().column("user"), Operator::Match, "ali*"),
        );
        assert_eq!(
            result,
            Err(WorkflowError::InvalidFilter { class: ColumnClass::NonIndexed, operator: Operator::Match })
        );
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(LogicalWorkflow::builder().build().unwrap_err(), WorkflowError::Empty);

        let mut builder = LogicalWorkflow::builder();
        let left = scan(&mut builder, table1());
        let right = scan(&mut builder, table2());
        assert_eq!(builder.build().unwrap_err(), WorkflowError::MultipleTerminals(vec![left, right]));
    }

    #[test]
    fn test_window_requires_select_window() {
        let mut builder = LogicalWorkflow::builder();
        let scan = scan(&mut builder, table1());
        let window = builder.window(
            scan,
            vec![OutputColumn::new(table1().column("id"), ColumnType::Int).with_alias("key")],
            WindowSpec::Seconds(5),
        ).unwrap();
        let workflow = builder.build().unwrap();
        assert_eq!(workflow[window].alternatives(), &[Capability::SelectWindow]);
        assert_eq!(workflow[window].to_string(), "PROJECT demo.table1.id AS key WINDOW 5 SECONDS");
    }

    fn linear_workflow() -> LogicalWorkflow {
        let mut builder = LogicalWorkflow::builder();
        let scan = scan(&mut builder, table1());
        builder.filter(scan, ColumnClass::PartitionKey, Relation::new(table1().column("id"), Operator::Eq, 42)).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_json_round_trip_keeps_the_graph() {
        let workflow = linear_workflow();
        let json = serde_json::to_value(&workflow).unwrap();
        let restored: LogicalWorkflow = serde_json::from_value(json).unwrap();

        assert_eq!(restored.initial_steps(), workflow.initial_steps());
        assert_eq!(restored.terminal(), workflow.terminal());
        let steps = |w: &LogicalWorkflow| w.steps_in_order().map(|(id, step)| (id, step.clone())).collect::<Vec<_>>();
        assert_eq!(steps(&restored), steps(&workflow));
    }

    #[test]
    fn test_cyclic_json_is_rejected() {
        let mut json = serde_json::to_value(linear_workflow()).unwrap();
        json["graph"]["edges"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!([1, 0, null]));

        let error = serde_json::from_value::<LogicalWorkflow>(json).unwrap_err();
        assert!(error.to_string().contains("step #1 links back to #0"), "{}", error);
    }

    #[test]
    fn test_tampered_entry_points_are_rejected() {
        let mut json = serde_json::to_value(linear_workflow()).unwrap();
        json["terminal"] = serde_json::json!(0);
        let error = serde_json::from_value::<LogicalWorkflow>(json).unwrap_err();
        assert!(error.to_string().contains("declared terminal #0 but the workflow ends at #1"), "{}", error);

        let mut json = serde_json::to_value(linear_workflow()).unwrap();
        json["initial_steps"] = serde_json::json!([1]);
        let error = serde_json::from_value::<LogicalWorkflow>(json).unwrap_err();
        assert!(error.to_string().contains("are not the scans"), "{}", error);
    }

    #[test]
    fn test_json_step_with_wrong_upstream_is_rejected() {
        let mut json = serde_json::to_value(linear_workflow()).unwrap();
        json["graph"]["edges"] = serde_json::json!([]);
        let error = serde_json::from_value::<LogicalWorkflow>(json).unwrap_err();
        assert!(error.to_string().contains("step #1 has 0 upstream steps, expected 1"), "{}", error);
    }
}
