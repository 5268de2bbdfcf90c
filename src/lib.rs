pub mod types;
pub mod parser;
pub mod config;
pub mod capability;
pub mod statement;
pub mod logical;
pub mod catalog;
pub mod execution;
pub mod planner;

pub use crate::{capability::{Capability, CapabilitySet}, catalog::{ConnectorMetadata, InMemoryCatalog, MetadataSource, RegistrySnapshot}, config::PlannerConfig, execution::ExecutionWorkflow, logical::{LogicalWorkflow, LogicalWorkflowBuilder, StepId}, planner::{FederatedPlanner, Planner, PlanningError, PlanningErrorKind}, statement::ValidatedStatement};
