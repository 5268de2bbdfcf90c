mod connector;
mod memory;
mod snapshot;

use crate::{capability::CapabilitySet, planner::PlanningErrorKind, types::{ClusterName, ConnectorName, TableName}};

pub use self::{connector::{ConnectorMetadata, RoutingHandle}, memory::{CatalogError, CatalogView, InMemoryCatalog}, snapshot::RegistrySnapshot};

/*
    The planner never owns connector or table metadata. It reads it through the two
    traits below, which the surrounding system implements on top of whatever store it
    uses. Both may change while a query is being planned (connectors attach and detach
    at any time), so a planning run first copies what it needs into a RegistrySnapshot
    and never asks the live registry again.
 */

#[cfg_attr(test, mockall::automock)]
pub trait ConnectorRegistry {
    /// Connectors attached to the cluster, in discovery order.
    fn connectors_for_cluster(&self, cluster: &ClusterName) -> Vec<ConnectorMetadata>;
    /// Current capabilities, `None` once the registry has forgotten the connector.
    fn capabilities_of(&self, connector: &ConnectorName) -> Option<CapabilitySet>;
}

#[cfg_attr(test, mockall::automock)]
pub trait TableMetadataProvider {
    fn cluster_of(&self, table: &TableName) -> Option<ClusterName>;
}

/// Anything a planner can take a consistent registry snapshot from.
pub trait MetadataSource {
    fn snapshot(&self, clusters: &[ClusterName], tables: &[TableName]) -> Result<RegistrySnapshot, PlanningErrorKind>;
}

impl<T: ConnectorRegistry + TableMetadataProvider> MetadataSource for T {
    fn snapshot(&self, clusters: &[ClusterName], tables: &[TableName]) -> Result<RegistrySnapshot, PlanningErrorKind> {
        RegistrySnapshot::capture(self, self, clusters, tables)
    }
}
