use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::debug;

use crate::{capability::CapabilitySet, planner::PlanningErrorKind, types::{ClusterName, ConnectorName, TableName}};

use super::{ConnectorMetadata, ConnectorRegistry, MetadataSource, RegistrySnapshot, TableMetadataProvider};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("connector {0} is not registered")]
    UnknownConnector(ConnectorName),
}

/// Registry and table metadata kept in memory. Clones share the same state, so one
/// handle can be given to a planner while another keeps attaching connectors.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

#[derive(Debug, Default)]
struct CatalogState {
    connectors: AHashMap<ConnectorName, ConnectorMetadata>,
    // attach order is discovery order
    attachments: AHashMap<ClusterName, Vec<ConnectorName>>,
    tables: AHashMap<TableName, ClusterName>,
}

impl CatalogState {
    fn attach(&mut self, cluster: &ClusterName, connector: &ConnectorName) -> Result<(), CatalogError> {
        let metadata = self.connectors
            .get_mut(connector)
            .ok_or_else(|| CatalogError::UnknownConnector(connector.clone()))?;
        if !metadata.is_attached_to(cluster) {
            metadata.clusters.push(cluster.clone());
        }
        self.list_attachment(cluster, connector);
        Ok(())
    }

    fn list_attachment(&mut self, cluster: &ClusterName, connector: &ConnectorName) {
        let attached = self.attachments.entry(cluster.clone()).or_default();
        if !attached.contains(connector) {
            attached.push(connector.clone());
        }
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or updates a connector. Clusters listed in the metadata are attached;
    /// existing attachments are kept.
    pub fn register_connector(&self, metadata: ConnectorMetadata) {
        let mut state = self.state.write();
        let mut metadata = metadata;
        let listed = std::mem::take(&mut metadata.clusters);
        if let Some(previous) = state.connectors.get(&metadata.name) {
            metadata.clusters = previous.clusters.clone();
        }
        for cluster in listed {
            if !metadata.is_attached_to(&cluster) {
                metadata.clusters.push(cluster);
            }
        }
        for cluster in &metadata.clusters {
            state.list_attachment(cluster, &metadata.name);
        }
        debug!(connector = %metadata.name, clusters = metadata.clusters.len(), "connector registered");
        state.connectors.insert(metadata.name.clone(), metadata);
    }

    pub fn attach_connector(&self, cluster: &ClusterName, connector: &ConnectorName) -> Result<(), CatalogError> {
        self.state.write().attach(cluster, connector)?;
        debug!(cluster = %cluster, connector = %connector, "connector attached");
        Ok(())
    }

    pub fn detach_connector(&self, cluster: &ClusterName, connector: &ConnectorName) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let metadata = state.connectors
            .get_mut(connector)
            .ok_or_else(|| CatalogError::UnknownConnector(connector.clone()))?;
        metadata.clusters.retain(|c| c != cluster);
        if let Some(attached) = state.attachments.get_mut(cluster) {
            attached.retain(|c| c != connector);
        }
        debug!(cluster = %cluster, connector = %connector, "connector detached");
        Ok(())
    }

    /// Forgets a connector. It disappears from every cluster it was attached to.
    pub fn remove_connector(&self, connector: &ConnectorName) -> Option<ConnectorMetadata> {
        let mut state = self.state.write();
        let removed = state.connectors.remove(connector)?;
        for cluster in &removed.clusters {
            if let Some(attached) = state.attachments.get_mut(cluster) {
                attached.retain(|c| c != connector);
            }
        }
        Some(removed)
    }

    pub fn register_table(&self, table: TableName, cluster: ClusterName) {
        debug!(table = %table, cluster = %cluster, "table registered");
        self.state.write().tables.insert(table, cluster);
    }

    /// Read-only view holding the lock until dropped.
    pub fn view(&self) -> CatalogView<'_> {
        CatalogView { state: self.state.read() }
    }
}

pub struct CatalogView<'a> {
    state: RwLockReadGuard<'a, CatalogState>,
}

impl ConnectorRegistry for CatalogView<'_> {
    fn connectors_for_cluster(&self, cluster: &ClusterName) -> Vec<ConnectorMetadata> {
        self.state.attachments
            .get(cluster)
            .map(|names| names.iter().filter_map(|n| self.state.connectors.get(n)).cloned().collect())
            .unwrap_or_default()
    }

    fn capabilities_of(&self, connector: &ConnectorName) -> Option<CapabilitySet> {
        self.state.connectors.get(connector).map(|c| c.capabilities)
    }
}

impl TableMetadataProvider for CatalogView<'_> {
    fn cluster_of(&self, table: &TableName) -> Option<ClusterName> {
        self.state.tables.get(table).cloned()
    }
}

impl MetadataSource for InMemoryCatalog {
    // One read guard for the whole capture, so concurrent attaches can't tear the snapshot
    fn snapshot(&self, clusters: &[ClusterName], tables: &[TableName]) -> Result<RegistrySnapshot, PlanningErrorKind> {
        let view = self.view();
        RegistrySnapshot::capture(&view, &view, clusters, tables)
    }
}
