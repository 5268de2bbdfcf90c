/*
    Executable workflows handed to the dispatch layer. Nothing in here runs a query:
    sending work to connector processes and collecting partial results happens outside
    this crate, driven entirely by the workflow description.
 */

pub mod plan;

pub use self::plan::{ColumnAssignment, DispatchUnit, ExecutionPath, ExecutionWorkflow, MergeExecutor, MergeStage, MultiConnectorWorkflow, PathAssignment, SingleConnectorWorkflow, StageInput, StorageWorkflow};
