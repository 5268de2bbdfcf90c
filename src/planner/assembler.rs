use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::{capability::Capability, catalog::{ConnectorMetadata, MetadataSource}, config::{MergeFallback, PlannerConfig}, execution::{ColumnAssignment, ExecutionPath, ExecutionWorkflow, MergeExecutor, MergeStage, MultiConnectorWorkflow, PathAssignment, SingleConnectorWorkflow, StageInput, StorageWorkflow}, logical::{LogicalStep, LogicalWorkflow, StepId}, statement::{InsertStatement, StatementKind, ValidatedStatement}, types::{ConnectorName, QueryId, TableName}};

use super::{chooser::{choose_for_table, find_more_suitable_connector}, matcher::{connectors_capable_of, intersect, narrow, CandidateMap}, path::{define_execution_path, walk_from}, Planner, PlanningError, PlanningErrorKind, PlanningPhase};

/*
    Turns validated statements into execution workflows against a snapshot of the
    connector registry.

    Reads: one execution path per scan. If every branch can be carried through every join
    by a common connector the whole workflow goes to one connector. Otherwise each branch
    runs on its own connector and every join becomes a merge stage. A join whose inputs
    and following steps one connector can run keeps them all on that connector. Any other
    stage is executed by one of the branch connectors when it accepts foreign partial
    results and can run the rest of the stage, else by the coordinator (or rejected,
    depending on config).

    Writes skip all of that and go to the connector of the table's cluster that declares
    the insert capability.
 */

pub struct FederatedPlanner<S: MetadataSource> {
    source: S,
    config: PlannerConfig,
}

impl<S: MetadataSource> FederatedPlanner<S> {
    /// Planner configured from the environment.
    pub fn new(source: S) -> Self {
        Self::with_config(source, PlannerConfig::new())
    }

    pub fn with_config(source: S, config: PlannerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn build_execution_workflow(&self, query_id: &QueryId, workflow: &LogicalWorkflow) -> Result<ExecutionWorkflow, PlanningError> {
        let mut run = PlanningRun::start(query_id);

        let clusters = workflow.clusters().into_iter().cloned().collect::<Vec<_>>();
        let snapshot = self.source.snapshot(&clusters, &[]).map_err(|kind| run.fail(kind))?;
        let candidates = connectors_capable_of(&snapshot, workflow);

        let mut paths = Vec::with_capacity(workflow.initial_steps().len());
        for initial in workflow.initial_steps() {
            let table_candidates = workflow
                .step(*initial)
                .and_then(LogicalStep::scanned_table)
                .and_then(|table| candidates.get(table))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let path = define_execution_path(workflow, *initial, table_candidates).map_err(|kind| run.fail(kind))?;
            debug!(
                query_id = %query_id,
                table = %path.table,
                initial = %path.initial,
                last = %path.last,
                connectors = %path.connector_names().iter().join(", "),
                "execution path built"
            );
            paths.push(path);
        }
        if let Some(kind) = coverage_break(workflow, &paths) {
            return Err(run.fail(kind));
        }
        run.advance(PlanningPhase::PathsBuilt);

        let native = native_joins(workflow, &paths);
        if let Some(fused) = fully_fused(workflow, &paths, &native) {
            let connector = find_more_suitable_connector(&fused.candidates()).map_err(|kind| run.fail(kind))?;
            run.advance(PlanningPhase::ConnectorsChosen);
            let single = SingleConnectorWorkflow {
                query_id: query_id.clone(),
                connector,
                initial_steps: workflow.initial_steps().to_vec(),
                terminal: workflow.terminal(),
                steps: workflow.steps_in_order().map(|(id, _)| id).collect(),
                logical: workflow.clone(),
            };
            return Ok(run.finish(ExecutionWorkflow::Single(single)));
        }

        let native = choose_native_connectors(&native).map_err(|kind| run.fail(kind))?;
        let assignments = paths
            .into_iter()
            .map(|path| {
                // branches of a join one connector runs natively go to that connector
                let inherited = path.next
                    .and_then(|join| native.get(&join))
                    .and_then(|chosen| path.connectors.iter().find(|c| c.name == chosen.name))
                    .cloned();
                let connector = match inherited {
                    Some(connector) => connector,
                    None => choose_for_table(&path.table, &path.connectors)?,
                };
                Ok(PathAssignment { path, connector })
            })
            .collect::<Result<Vec<_>, PlanningErrorKind>>()
            .map_err(|kind| run.fail(kind))?;
        let stages = self.merge_stages(query_id, workflow, &assignments, &native).map_err(|kind| run.fail(kind))?;
        run.advance(PlanningPhase::ConnectorsChosen);

        if stages.len() > self.config.max_join_stages {
            return Err(run.fail(PlanningErrorKind::UnsupportedStatement {
                statement: format!(
                    "workflow with {} merge stages (at most {} allowed)",
                    stages.len(),
                    self.config.max_join_stages
                ),
            }));
        }

        let multi = MultiConnectorWorkflow {
            query_id: query_id.clone(),
            paths: assignments,
            stages,
            logical: workflow.clone(),
        };
        Ok(run.finish(ExecutionWorkflow::Multi(multi)))
    }

    pub fn build_storage_workflow(&self, query_id: &QueryId, insert: &InsertStatement) -> Result<ExecutionWorkflow, PlanningError> {
        let mut run = PlanningRun::start(query_id);
        let table = &insert.table;
        insert
            .validate()
            .map_err(|error| run.fail(PlanningErrorKind::MalformedStatement { error }))?;

        let snapshot = self.source
            .snapshot(&[], std::slice::from_ref(table))
            .map_err(|kind| run.fail(kind))?;
        let cluster = snapshot
            .cluster_of(table)
            .cloned()
            .ok_or_else(|| run.fail(PlanningErrorKind::UnknownTable { table: table.clone() }))?;

        let required = insert.required_capability();
        let writable = snapshot
            .connectors_for_cluster(&cluster)
            .iter()
            .filter(|c| c.supports(required))
            .cloned()
            .collect::<Vec<_>>();
        if writable.is_empty() {
            return Err(run.fail(PlanningErrorKind::NoWritableConnector {
                table: table.clone(),
                cluster,
                required,
            }));
        }
        run.advance(PlanningPhase::PathsBuilt);

        let connector = choose_for_table(table, &writable).map_err(|kind| run.fail(kind))?;
        run.advance(PlanningPhase::ConnectorsChosen);

        let storage = StorageWorkflow {
            query_id: query_id.clone(),
            cluster,
            table: table.clone(),
            connector,
            operation: required,
            assignments: insert
                .assignments()
                .map(|(column, value)| ColumnAssignment { column: column.clone(), value: value.clone() })
                .collect(),
        };
        Ok(run.finish(ExecutionWorkflow::Storage(storage)))
    }

    fn merge_stages(
        &self,
        query_id: &QueryId,
        workflow: &LogicalWorkflow,
        assignments: &[PathAssignment],
        native: &BTreeMap<StepId, ConnectorMetadata>,
    ) -> Result<Vec<MergeStage>, PlanningErrorKind> {
        let mut arrivals: BTreeMap<StepId, Vec<StageInput>> = BTreeMap::new();
        for (index, assignment) in assignments.iter().enumerate() {
            if let Some(join) = assignment.path.next {
                arrivals.entry(join).or_default().push(StageInput::Path(index));
            }
        }

        let mut stages: Vec<MergeStage> = Vec::new();
        for join in workflow.joins() {
            let inputs = arrivals.remove(&join).unwrap_or_default();
            let mut steps = vec![join];
            let mut next = workflow.next(join);
            while let Some(id) = next {
                if workflow[id].is_join() {
                    break;
                }
                steps.push(id);
                next = workflow.next(id);
            }
            let tables = inputs
                .iter()
                .flat_map(|input| match input {
                    StageInput::Path(index) => vec![assignments[*index].path.table.clone()],
                    StageInput::Stage(index) => stages[*index].tables.clone(),
                })
                .sorted()
                .dedup()
                .collect::<Vec<_>>();

            let local = native
                .get(&join)
                .and_then(|connector| connector.supports_step(&workflow[join]).map(|capability| (connector, capability)));
            let stage = StageDraft { join, steps: &steps, inputs: &inputs, tables: &tables };
            let executor = if let Some((connector, capability)) = local {
                debug!(query_id = %query_id, join = %join, connector = %connector.name, join_capability = %capability, "join runs on one connector");
                MergeExecutor::Connector { connector: connector.clone(), join: capability }
            } else if let Some(connector) = merge_executor(workflow, assignments, &stages, &stage) {
                debug!(query_id = %query_id, join = %join, connector = %connector.name, "merge stage assigned");
                MergeExecutor::Connector {
                    connector,
                    join: Capability::SelectInnerJoinPartialResults,
                }
            } else {
                match self.config.merge_fallback {
                    MergeFallback::Coordinator => {
                        warn!(
                            query_id = %query_id,
                            join = %join,
                            tables = %tables.iter().join(", "),
                            "no connector can merge, falling back to the coordinator"
                        );
                        MergeExecutor::Coordinator
                    }
                    MergeFallback::Reject => {
                        return Err(PlanningErrorKind::NoCommonConnector { tables, step: Some(join) });
                    }
                }
            };

            if let Some(downstream) = next {
                arrivals.entry(downstream).or_default().push(StageInput::Stage(stages.len()));
            }
            stages.push(MergeStage { join, steps, inputs, tables, executor });
        }
        Ok(stages)
    }
}

impl<S: MetadataSource> Planner for FederatedPlanner<S> {
    fn plan(&self, statement: &ValidatedStatement) -> Result<ExecutionWorkflow, PlanningError> {
        match &statement.kind {
            StatementKind::Select(workflow) => self.build_execution_workflow(&statement.query_id, workflow),
            StatementKind::Insert(insert) => self.build_storage_workflow(&statement.query_id, insert),
            StatementKind::Command(command) => Err(PlanningRun::start(&statement.query_id).fail(
                PlanningErrorKind::UnsupportedStatement { statement: command.to_string() },
            )),
        }
    }
}

struct PlanningRun<'q> {
    query_id: &'q QueryId,
    phase: PlanningPhase,
}

impl<'q> PlanningRun<'q> {
    fn start(query_id: &'q QueryId) -> Self {
        debug!(query_id = %query_id, phase = %PlanningPhase::Unplanned, "planning started");
        Self { query_id, phase: PlanningPhase::Unplanned }
    }

    fn advance(&mut self, phase: PlanningPhase) {
        debug!(query_id = %self.query_id, from = %self.phase, phase = %phase, "planning phase reached");
        self.phase = phase;
    }

    fn fail(&self, kind: PlanningErrorKind) -> PlanningError {
        debug!(
            query_id = %self.query_id,
            phase = %self.phase,
            reason = kind.reason_code(),
            error = %kind,
            "planning failed"
        );
        PlanningError::new(self.query_id.clone(), self.phase, kind)
    }

    fn finish(mut self, workflow: ExecutionWorkflow) -> ExecutionWorkflow {
        self.advance(PlanningPhase::WorkflowAssembled);
        info!(
            query_id = %self.query_id,
            kind = workflow.kind(),
            connectors = %workflow.connector_names().iter().join(", "),
            "execution workflow assembled"
        );
        debug!(query_id = %self.query_id, "\n{}", workflow);
        workflow
    }
}

/// First branch that stopped at a step which is not a join. Nothing downstream of it
/// could ever run, whatever happens at the joins.
fn coverage_break(workflow: &LogicalWorkflow, paths: &[ExecutionPath]) -> Option<PlanningErrorKind> {
    paths.iter().find_map(|path| {
        let next = path.next?;
        let step = &workflow[next];
        (!step.is_join()).then(|| PlanningErrorKind::NoCapableConnector {
            table: path.table.clone(),
            step: next,
            required: step.alternatives().to_vec(),
        })
    })
}

#[derive(Debug, Clone)]
struct NativeJoin {
    connectors: Vec<ConnectorMetadata>,
    tables: Vec<TableName>,
    // join the fragment feeds next, None once it reaches the terminal
    downstream: Option<StepId>,
}

impl NativeJoin {
    fn candidates(&self) -> CandidateMap {
        self.tables
            .iter()
            .map(|table| (table.clone(), self.connectors.clone()))
            .collect()
    }
}

/// Joins that one connector can run together with both of their inputs and every step up
/// to the next join, in topological order. Each entry holds the connectors able to do so.
fn native_joins(workflow: &LogicalWorkflow, paths: &[ExecutionPath]) -> BTreeMap<StepId, NativeJoin> {
    let mut arrivals: BTreeMap<StepId, Vec<(Vec<ConnectorMetadata>, Vec<TableName>)>> = BTreeMap::new();
    for path in paths {
        if let Some(join) = path.next {
            arrivals.entry(join).or_default().push((path.connectors.clone(), vec![path.table.clone()]));
        }
    }

    let mut native = BTreeMap::new();
    for join in workflow.joins() {
        let inputs = arrivals.remove(&join).unwrap_or_default();
        let Ok([(left, left_tables), (right, right_tables)]) = <[_; 2]>::try_from(inputs) else {
            continue;
        };
        let running = narrow(&intersect(&left, &right), &workflow[join]);
        if running.is_empty() {
            continue;
        }
        let walk = walk_from(workflow, workflow.next(join), running);
        if walk.stopped_at.is_some_and(|id| !workflow[id].is_join()) {
            continue;
        }
        let fragment = NativeJoin {
            connectors: walk.connectors,
            tables: left_tables.into_iter().chain(right_tables).sorted().dedup().collect(),
            downstream: walk.stopped_at,
        };
        if let Some(next) = fragment.downstream {
            arrivals.entry(next).or_default().push((fragment.connectors.clone(), fragment.tables.clone()));
        }
        native.insert(join, fragment);
    }
    native
}

/// The fragment covering the whole workflow, if every branch can stay on one connector.
fn fully_fused(workflow: &LogicalWorkflow, paths: &[ExecutionPath], native: &BTreeMap<StepId, NativeJoin>) -> Option<NativeJoin> {
    let joins = workflow.joins();
    if joins.is_empty() {
        let [path] = paths else { return None };
        return path.next.is_none().then(|| NativeJoin {
            connectors: path.connectors.clone(),
            tables: vec![path.table.clone()],
            downstream: None,
        });
    }
    if !joins.iter().all(|join| native.contains_key(join)) {
        return None;
    }
    native.values().find(|fragment| fragment.downstream.is_none()).cloned()
}

/// One connector per native join. Walking from the terminal side, a join feeding another
/// native join keeps the connector already chosen there, so the whole subtree stays on it.
fn choose_native_connectors(native: &BTreeMap<StepId, NativeJoin>) -> Result<BTreeMap<StepId, ConnectorMetadata>, PlanningErrorKind> {
    let mut chosen: BTreeMap<StepId, ConnectorMetadata> = BTreeMap::new();
    for (join, fragment) in native.iter().rev() {
        let inherited = fragment.downstream
            .and_then(|next| chosen.get(&next))
            .and_then(|downstream| fragment.connectors.iter().find(|c| c.name == downstream.name))
            .cloned();
        let connector = match inherited {
            Some(connector) => connector,
            None => find_more_suitable_connector(&fragment.candidates())?,
        };
        chosen.insert(*join, connector);
    }
    Ok(chosen)
}

struct StageDraft<'a> {
    join: StepId,
    steps: &'a [StepId],
    inputs: &'a [StageInput],
    tables: &'a [TableName],
}

/// Branch connector that merges the stage: it must accept partial results produced
/// elsewhere and run every step after the join. Prefers the connector that already served
/// the most input steps, then the smallest name.
fn merge_executor(
    workflow: &LogicalWorkflow,
    assignments: &[PathAssignment],
    stages: &[MergeStage],
    stage: &StageDraft<'_>,
) -> Option<ConnectorMetadata> {
    if !workflow[stage.join].alternatives().contains(&Capability::SelectInnerJoinPartialResults) {
        return None;
    }

    let mut served: BTreeMap<&ConnectorName, (&ConnectorMetadata, usize)> = BTreeMap::new();
    for input in stage.inputs {
        let (connector, weight) = match input {
            StageInput::Path(index) => (Some(&assignments[*index].connector), assignments[*index].path.steps.len()),
            StageInput::Stage(index) => (stages[*index].executor.connector(), stages[*index].steps.len()),
        };
        if let Some(connector) = connector {
            served.entry(&connector.name).or_insert((connector, 0)).1 += weight;
        }
    }

    served
        .into_values()
        .filter(|(connector, _)| {
            connector.supports(Capability::SelectInnerJoinPartialResults)
                && stage.steps
                    .iter()
                    .skip(1)
                    .all(|id| connector.supports_step(&workflow[*id]).is_some())
        })
        .max_by(|(a, a_weight), (b, b_weight)| a_weight.cmp(b_weight).then_with(|| b.name.cmp(&a.name)))
        .map(|(connector, _)| {
            debug!(join = %stage.join, tables = %stage.tables.iter().join(", "), connector = %connector.name, "merge executor chosen");
            connector.clone()
        })
}
