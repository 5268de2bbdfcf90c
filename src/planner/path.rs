use crate::{catalog::ConnectorMetadata, execution::ExecutionPath, logical::{LogicalWorkflow, StepId}};

use super::{matcher::narrow, PlanningErrorKind};

/// Result of walking downstream while a candidate set keeps covering the steps.
pub(super) struct Walk {
    pub steps: Vec<StepId>,
    pub connectors: Vec<ConnectorMetadata>,
    pub stopped_at: Option<StepId>,
}

/// Walks from `start` narrowing `running` step by step. Stops before a join, before the
/// first step that would leave no connector, or after the terminal step. `running` must be
/// non-empty and stays so.
pub(super) fn walk_from(workflow: &LogicalWorkflow, start: Option<StepId>, mut running: Vec<ConnectorMetadata>) -> Walk {
    let mut steps = Vec::new();
    let mut next = start;
    while let Some(id) = next {
        let step = &workflow[id];
        if step.is_join() {
            break;
        }
        let narrowed = narrow(&running, step);
        if narrowed.is_empty() {
            break;
        }
        running = narrowed;
        steps.push(id);
        next = workflow.next(id);
    }
    Walk { steps, connectors: running, stopped_at: next }
}

/// Builds the longest path from `initial` that some of `candidates` can execute entirely.
/// Fails if no candidate can even execute the initial step.
pub fn define_execution_path(
    workflow: &LogicalWorkflow,
    initial: StepId,
    candidates: &[ConnectorMetadata],
) -> Result<ExecutionPath, PlanningErrorKind> {
    let Some((step, table)) = workflow
        .step(initial)
        .and_then(|step| step.scanned_table().map(|table| (step, table)))
    else {
        return Err(PlanningErrorKind::UnsupportedStatement {
            statement: format!("execution path starting at {}, which is not a scan", initial),
        });
    };
    let running = narrow(candidates, step);
    if running.is_empty() {
        return Err(PlanningErrorKind::NoCapableConnector {
            table: table.clone(),
            step: initial,
            required: step.alternatives().to_vec(),
        });
    }

    let walk = walk_from(workflow, workflow.next(initial), running);
    let mut steps = Vec::with_capacity(walk.steps.len() + 1);
    steps.push(initial);
    steps.extend(walk.steps);
    Ok(ExecutionPath {
        table: table.clone(),
        initial,
        last: *steps.last().unwrap_or(&initial),
        steps,
        connectors: walk.connectors,
        next: walk.stopped_at,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{capability::{Capability, CapabilitySet, ColumnClass}, catalog::RoutingHandle, logical::OutputColumn, statement::{Operator, Relation}, types::{ClusterName, ColumnType, TableName}};

    fn connector(name: &str, capabilities: &[Capability]) -> ConnectorMetadata {
        ConnectorMetadata::new(
            name,
            capabilities.iter().copied().collect::<CapabilitySet>(),
            RoutingHandle::new(format!("akka://{}", name)),
        )
    }

    // Scan(table1) -> Filter(id = 42) -> Project(id, user)
    fn filtered_projection() -> (LogicalWorkflow, [StepId; 3]) {
        let table = TableName::new("demo", "table1");
        let mut builder = LogicalWorkflow::builder();
        let scan = builder.scan(table.clone(), ClusterName::new("cluster"), vec![table.column("id"), table.column("user")]);
        let filter = builder.filter(scan, ColumnClass::PartitionKey, Relation::new(table.column("id"), Operator::Eq, 42)).unwrap();
        let project = builder.project(filter, vec![
            OutputColumn::new(table.column("id"), ColumnType::Int),
            OutputColumn::new(table.column("user"), ColumnType::Text),
        ]).unwrap();
        (builder.build().unwrap(), [scan, filter, project])
    }

    #[test]
    fn test_path_covers_whole_chain() {
        let (workflow, [scan, filter, project]) = filtered_projection();
        let c1 = connector("C1", &[Capability::Scan, Capability::Project, Capability::FilterPkEq]);
        let path = define_execution_path(&workflow, scan, &[c1.clone()]).unwrap();

        assert_eq!(path.steps, vec![scan, filter, project]);
        assert_eq!(path.last, project);
        assert!(path.reaches_terminal());
        assert_eq!(path.connectors, vec![c1]);
    }

    #[test]
    fn test_path_stops_before_uncovered_step() {
        let (workflow, [scan, filter, _]) = filtered_projection();
        let c2 = connector("C2", &[Capability::Scan, Capability::Project]);
        let path = define_execution_path(&workflow, scan, &[c2]).unwrap();

        assert_eq!(path.steps, vec![scan]);
        assert_eq!(path.last, scan);
        assert_eq!(path.next, Some(filter));
        assert_eq!(path.connector_names().len(), 1);
    }

    #[test]
    fn test_path_keeps_only_connectors_covering_every_step() {
        let (workflow, [scan, _, project]) = filtered_projection();
        let partial = connector("partial", &[Capability::Scan, Capability::Project]);
        let full = connector("full", &[Capability::Scan, Capability::Project, Capability::FilterPkEq]);
        let other = connector("other", &[Capability::Scan, Capability::FilterPkEq, Capability::Project]);
        let path = define_execution_path(&workflow, scan, &[partial, full, other]).unwrap();

        assert_eq!(path.last, project);
        let names = path.connectors.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["full", "other"]);
    }

    #[test]
    fn test_path_never_has_empty_connector_set() {
        let (workflow, [scan, _, _]) = filtered_projection();
        let writer = connector("writer", &[Capability::Insert]);

        for candidates in [vec![], vec![writer]] {
            match define_execution_path(&workflow, scan, &candidates) {
                Err(PlanningErrorKind::NoCapableConnector { step, required, .. }) => {
                    assert_eq!(step, scan);
                    assert_eq!(required, vec![Capability::Scan]);
                }
                other => panic!("expected NoCapableConnector, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_path_stops_at_join() {
        let t1 = TableName::new("demo", "t1");
        let t2 = TableName::new("demo", "t2");
        let mut builder = LogicalWorkflow::builder();
        let s1 = builder.scan(t1.clone(), ClusterName::new("cluster"), vec![]);
        let s2 = builder.scan(t2.clone(), ClusterName::new("cluster"), vec![]);
        let join = builder.join(s1, s2, Relation::new(t1.column("id"), Operator::Eq, t2.column("id"))).unwrap();
        let workflow = builder.build().unwrap();

        let everything = connector("all", &Capability::ALL);
        let path = define_execution_path(&workflow, s1, &[everything]).unwrap();
        assert_eq!(path.steps, vec![s1]);
        assert_eq!(path.next, Some(join));
    }

    #[test]
    fn test_path_must_start_at_scan() {
        let (workflow, [_, filter, _]) = filtered_projection();
        let result = define_execution_path(&workflow, filter, &[]);
        assert!(matches!(result, Err(PlanningErrorKind::UnsupportedStatement { .. })));
    }
}
