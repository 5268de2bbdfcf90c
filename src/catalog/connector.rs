use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{capability::{Capability, CapabilitySet}, logical::LogicalStep, types::{ClusterName, ConnectorName}};

/// Opaque address the dispatcher uses to reach a connector process. Never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingHandle(String);

impl RoutingHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl Display for RoutingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorMetadata {
    pub name: ConnectorName,
    pub capabilities: CapabilitySet,
    pub clusters: Vec<ClusterName>,
    pub handle: RoutingHandle,
}

impl ConnectorMetadata {
    pub fn new(name: impl Into<ConnectorName>, capabilities: impl Into<CapabilitySet>, handle: RoutingHandle) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into(),
            clusters: Vec::new(),
            handle,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.declares(capability)
    }

    /// Capability this connector would use for the step, if any.
    pub fn supports_step(&self, step: &LogicalStep) -> Option<Capability> {
        self.capabilities.first_declared(step.alternatives())
    }

    pub fn is_attached_to(&self, cluster: &ClusterName) -> bool {
        self.clusters.contains(cluster)
    }
}

impl Display for ConnectorMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.handle)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{statement::{Operator, Relation}, types::TableName};

    #[test]
    fn test_supports_step_prefers_first_alternative() {
        let table = TableName::new("demo", "table1");
        let join = LogicalStep::Join {
            relation: Relation::new(table.column("id"), Operator::Eq, table.column("id")),
            alternatives: Capability::JOIN_VARIANTS.to_vec(),
        };
        let both = ConnectorMetadata::new(
            "both",
            [Capability::SelectInnerJoin, Capability::SelectInnerJoinPartialResults],
            RoutingHandle::new("akka://both"),
        );
        let partial = ConnectorMetadata::new(
            "partial",
            [Capability::SelectInnerJoinPartialResults],
            RoutingHandle::new("akka://partial"),
        );
        let none = ConnectorMetadata::new("none", [Capability::Scan], RoutingHandle::new("akka://none"));

        assert_eq!(both.supports_step(&join), Some(Capability::SelectInnerJoin));
        assert_eq!(partial.supports_step(&join), Some(Capability::SelectInnerJoinPartialResults));
        assert_eq!(none.supports_step(&join), None);
        assert!(none.supports(Capability::Scan));
    }
}
