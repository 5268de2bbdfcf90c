use std::collections::BTreeMap;

use crate::{catalog::{ConnectorMetadata, RegistrySnapshot}, logical::{LogicalStep, LogicalWorkflow}, types::TableName};

/// Connectors per table, each list in registry discovery order.
pub type CandidateMap = BTreeMap<TableName, Vec<ConnectorMetadata>>;

/// For every table scanned by the workflow, the connectors attached to the scan's cluster
/// that can execute the scan. A table nobody can scan maps to an empty list.
pub fn connectors_capable_of(snapshot: &RegistrySnapshot, workflow: &LogicalWorkflow) -> CandidateMap {
    let mut candidates = CandidateMap::new();
    for id in workflow.initial_steps() {
        let Some(step) = workflow.step(*id) else { continue };
        if let LogicalStep::Scan { table, cluster, .. } = step {
            let capable = narrow(snapshot.connectors_for_cluster(cluster), step);
            candidates.entry(table.clone()).or_insert(capable);
        }
    }
    candidates
}

/// Keeps the connectors able to execute `step`, preserving their order.
pub fn narrow(connectors: &[ConnectorMetadata], step: &LogicalStep) -> Vec<ConnectorMetadata> {
    connectors
        .iter()
        .filter(|c| c.supports_step(step).is_some())
        .cloned()
        .collect()
}

/// Connectors present in both lists, compared by name, in the order of `left`.
pub fn intersect(left: &[ConnectorMetadata], right: &[ConnectorMetadata]) -> Vec<ConnectorMetadata> {
    left.iter()
        .filter(|l| right.iter().any(|r| r.name == l.name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{capability::{Capability, CapabilitySet}, catalog::{InMemoryCatalog, MetadataSource, RoutingHandle}, statement::{Operator, Relation}, types::ClusterName};

    fn connector(name: &str, capabilities: &[Capability], cluster: &str) -> ConnectorMetadata {
        let mut metadata = ConnectorMetadata::new(
            name,
            capabilities.iter().copied().collect::<CapabilitySet>(),
            RoutingHandle::new(format!("akka://{}", name)),
        );
        metadata.clusters.push(ClusterName::new(cluster));
        metadata
    }

    #[test]
    fn test_candidates_keep_discovery_order() {
        let catalog = InMemoryCatalog::new();
        catalog.register_connector(connector("zeta", &[Capability::Scan], "c1"));
        catalog.register_connector(connector("writer", &[Capability::Insert], "c1"));
        catalog.register_connector(connector("alpha", &[Capability::Scan, Capability::Project], "c1"));

        let t1 = TableName::new("demo", "t1");
        let t2 = TableName::new("demo", "t2");
        let mut builder = LogicalWorkflow::builder();
        let s1 = builder.scan(t1.clone(), ClusterName::new("c1"), vec![]);
        let s2 = builder.scan(t2.clone(), ClusterName::new("empty"), vec![]);
        builder.join(s1, s2, Relation::new(t1.column("id"), Operator::Eq, t2.column("id"))).unwrap();
        let workflow = builder.build().unwrap();

        let snapshot = catalog.snapshot(&[ClusterName::new("c1"), ClusterName::new("empty")], &[]).unwrap();
        let candidates = connectors_capable_of(&snapshot, &workflow);

        let names = candidates[&t1].iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(candidates[&t2].is_empty());
    }

    #[test]
    fn test_intersect_by_name() {
        let left = vec![connector("b", &[Capability::Scan], "c"), connector("a", &[Capability::Scan], "c")];
        let right = vec![connector("a", &[Capability::Project], "c"), connector("c", &[Capability::Scan], "c")];
        let both = intersect(&left, &right);
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].name.as_str(), "a");
        assert!(both[0].supports(Capability::Scan));
    }
}
