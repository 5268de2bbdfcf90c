use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{planner::PlanningErrorKind, types::{ClusterName, ConnectorName, TableName}};

use super::{ConnectorMetadata, ConnectorRegistry, TableMetadataProvider};

/// Frozen copy of the registry taken at the start of a planning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    clusters: BTreeMap<ClusterName, Vec<ConnectorMetadata>>,
    #[serde(with = "table_pairs")]
    tables: BTreeMap<TableName, ClusterName>,
}

// Table names are structs, which JSON can't use as object keys. Stored as [table, cluster] pairs.
mod table_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::{ClusterName, TableName};

    pub fn serialize<S: Serializer>(tables: &BTreeMap<TableName, ClusterName>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(tables.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<TableName, ClusterName>, D::Error> {
        let pairs = Vec::<(TableName, ClusterName)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl RegistrySnapshot {
    /// Copies the cluster of every table and every connector attached to any named or
    /// implied cluster. Each cluster is asked for once. Capabilities are refreshed through
    /// `capabilities_of`, and connectors the registry no longer knows are dropped.
    pub fn capture<R, M>(
        registry: &R,
        metadata: &M,
        clusters: &[ClusterName],
        tables: &[TableName],
    ) -> Result<Self, PlanningErrorKind>
    where
        R: ConnectorRegistry + ?Sized,
        M: TableMetadataProvider + ?Sized,
    {
        let mut table_clusters = BTreeMap::new();
        for table in tables {
            let cluster = metadata
                .cluster_of(table)
                .ok_or_else(|| PlanningErrorKind::UnknownTable { table: table.clone() })?;
            table_clusters.insert(table.clone(), cluster);
        }

        let wanted = clusters
            .iter()
            .chain(table_clusters.values())
            .cloned()
            .collect::<BTreeSet<_>>();

        let mut connectors = BTreeMap::new();
        for cluster in wanted {
            let attached = registry
                .connectors_for_cluster(&cluster)
                .into_iter()
                .filter_map(|mut connector| {
                    let capabilities = registry.capabilities_of(&connector.name)?;
                    connector.capabilities = capabilities;
                    Some(connector)
                })
                .collect::<Vec<_>>();
            debug!(cluster = %cluster, connectors = attached.len(), "captured cluster");
            connectors.insert(cluster, attached);
        }

        Ok(Self {
            clusters: connectors,
            tables: table_clusters,
        })
    }

    /// Attached connectors in discovery order. Unknown clusters have none.
    pub fn connectors_for_cluster(&self, cluster: &ClusterName) -> &[ConnectorMetadata] {
        self.clusters.get(cluster).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cluster_of(&self, table: &TableName) -> Option<&ClusterName> {
        self.tables.get(table)
    }

    pub fn connector(&self, name: &ConnectorName) -> Option<&ConnectorMetadata> {
        self.clusters.values().flatten().find(|c| &c.name == name)
    }
}

#[cfg(test)]
mod test {
    use mockall::predicate::eq;

    use super::*;
    use crate::{capability::{Capability, CapabilitySet}, catalog::{MockConnectorRegistry, MockTableMetadataProvider, RoutingHandle}};

    fn connector(name: &str, capabilities: &[Capability]) -> ConnectorMetadata {
        ConnectorMetadata::new(
            name,
            capabilities.iter().copied().collect::<CapabilitySet>(),
            RoutingHandle::new(format!("akka://{}", name)),
        )
    }

    #[test]
    fn test_capture_queries_each_cluster_once() {
        let users = TableName::new("demo", "users");
        let cluster = ClusterName::new("cluster");

        let mut metadata = MockTableMetadataProvider::new();
        metadata.expect_cluster_of()
            .with(eq(users.clone()))
            .times(1)
            .return_const(Some(cluster.clone()));

        let mut registry = MockConnectorRegistry::new();
        registry.expect_connectors_for_cluster()
            .with(eq(cluster.clone()))
            .times(1)
            .return_const(vec![connector("cassandraConnector", &[Capability::Insert])]);
        registry.expect_capabilities_of()
            .returning(|_| Some(CapabilitySet::from([Capability::Insert, Capability::Scan])));

        // the cluster is named explicitly and implied by the table
        let snapshot = RegistrySnapshot::capture(&registry, &metadata, &[cluster.clone()], &[users.clone()]).unwrap();

        assert_eq!(snapshot.cluster_of(&users), Some(&cluster));
        let attached = snapshot.connectors_for_cluster(&cluster);
        assert_eq!(attached.len(), 1);
        assert!(attached[0].supports(Capability::Scan));
    }

    #[test]
    fn test_capture_drops_forgotten_connectors() {
        let cluster = ClusterName::new("cluster");

        let metadata = MockTableMetadataProvider::new();
        let mut registry = MockConnectorRegistry::new();
        registry.expect_connectors_for_cluster()
            .return_const(vec![
                connector("gone", &[Capability::Scan]),
                connector("kept", &[Capability::Scan]),
            ]);
        registry.expect_capabilities_of()
            .returning(|name| {
                if name.as_str() == "gone" {
                    None
                } else {
                    Some(CapabilitySet::from([Capability::Scan]))
                }
            });

        let snapshot = RegistrySnapshot::capture(&registry, &metadata, &[cluster.clone()], &[]).unwrap();
        let names = snapshot.connectors_for_cluster(&cluster)
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["kept"]);
        assert!(snapshot.connector(&ConnectorName::new("gone")).is_none());
    }

    #[test]
    fn test_capture_unknown_table() {
        let table = TableName::new("demo", "missing");
        let mut metadata = MockTableMetadataProvider::new();
        metadata.expect_cluster_of().return_const(None::<ClusterName>);
        let registry = MockConnectorRegistry::new();

        let result = RegistrySnapshot::capture(&registry, &metadata, &[], &[table.clone()]);
        assert_eq!(result, Err(PlanningErrorKind::UnknownTable { table }));
    }

    #[test]
    fn test_snapshot_survives_json() {
        let events = TableName::new("demo", "user-events");
        let cluster = ClusterName::new("cluster");

        let mut metadata = MockTableMetadataProvider::new();
        metadata.expect_cluster_of().return_const(Some(cluster.clone()));
        let mut registry = MockConnectorRegistry::new();
        registry.expect_connectors_for_cluster()
            .return_const(vec![connector("C1", &[Capability::Scan])]);
        registry.expect_capabilities_of()
            .returning(|_| Some(CapabilitySet::from([Capability::Scan])));

        let snapshot = RegistrySnapshot::capture(&registry, &metadata, &[], &[events.clone()]).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.cluster_of(&events), Some(&cluster));
    }

    #[test]
    fn test_unknown_cluster_has_no_connectors() {
        let snapshot = RegistrySnapshot::default();
        assert!(snapshot.connectors_for_cluster(&ClusterName::new("nowhere")).is_empty());
    }
}
