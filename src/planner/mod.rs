/*
    Connector-aware planning. The pipeline per read statement:
    matcher (who can scan each table) -> path (how far each branch gets on those
    connectors) -> chooser (one deterministic connector per candidate set) -> assembler
    (single, multi or storage workflow). Planning is a pure function of the statement and
    a registry snapshot; nothing here does I/O or keeps state between queries.
 */
mod assembler;
mod chooser;
mod error;
mod matcher;
mod path;

use crate::{execution::ExecutionWorkflow, statement::ValidatedStatement};

pub use self::{assembler::FederatedPlanner, chooser::{choose_for_table, find_more_suitable_connector}, error::{PlanningError, PlanningErrorKind, PlanningPhase}, matcher::{connectors_capable_of, CandidateMap}, path::define_execution_path};

pub trait Planner {
    fn plan(&self, statement: &ValidatedStatement) -> Result<ExecutionWorkflow, PlanningError>;
}
