/*
    Typed form of a statement after the front-end has parsed and validated it. Validation
    (catalog, table and column existence, type compatibility) has already happened, so the
    planner trusts names and types found here. Reads arrive as a fully linked logical
    workflow, writes as a target table with ordered columns and values.
 */

use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{capability::Capability, logical::{LogicalWorkflow, WorkflowError}, types::{CatalogName, ColumnName, QueryId, TableName}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Distinct,
    Gt,
    Lt,
    Ge,
    Le,
    Match,
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Operator::Eq => "=",
            Operator::Distinct => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Match => "MATCH",
        };
        write!(f, "{}", symbol)
    }
}

// f64 payloads rule out Eq here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    Column(ColumnName),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Function { name: String, args: Vec<Selector> },
}

impl Selector {
    pub fn is_constant(&self) -> bool {
        matches!(self, Selector::Integer(_))
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, Selector::Float(_))
    }

    pub fn column(&self) -> Option<&ColumnName> {
        match self {
            Selector::Column(column) => Some(column),
            _ => None,
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Column(column) => write!(f, "{}", column),
            Selector::Integer(value) => write!(f, "{}", value),
            Selector::Float(value) => write!(f, "{}", value),
            Selector::Boolean(value) => write!(f, "{}", value),
            Selector::String(value) => write!(f, "'{}'", value),
            Selector::Function { name, args } => write!(f, "{}({})", name, args.iter().join(", ")),
        }
    }
}

impl From<ColumnName> for Selector {
    fn from(value: ColumnName) -> Self {
        Selector::Column(value)
    }
}

impl From<i64> for Selector {
    fn from(value: i64) -> Self {
        Selector::Integer(value)
    }
}

impl From<i32> for Selector {
    fn from(value: i32) -> Self {
        Selector::Integer(i64::from(value))
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub left: Selector,
    pub operator: Operator,
    pub right: Selector,
}

impl Relation {
    pub fn new(left: impl Into<Selector>, operator: Operator, right: impl Into<Selector>) -> Self {
        Self {
            left: left.into(),
            operator,
            right: right.into(),
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    pub values: Vec<Selector>,
    pub if_not_exists: bool,
}

impl InsertStatement {
    pub fn new(
        table: TableName,
        columns: Vec<ColumnName>,
        values: Vec<Selector>,
        if_not_exists: bool,
    ) -> Result<Self, WorkflowError> {
        let insert = Self { table, columns, values, if_not_exists };
        insert.validate()?;
        Ok(insert)
    }

    /// The fields are public, so a statement built or deserialized by hand is checked
    /// again before it is planned.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.columns.len() != self.values.len() {
            return Err(WorkflowError::ArityMismatch {
                columns: self.columns.len(),
                values: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn required_capability(&self) -> Capability {
        if self.if_not_exists {
            Capability::InsertIfNotExists
        } else {
            Capability::Insert
        }
    }

    /// Column/value pairs in statement order.
    pub fn assignments(&self) -> impl Iterator<Item = (&ColumnName, &Selector)> {
        self.columns.iter().zip(self.values.iter())
    }
}

/// Administrative statements. They are answered by the metadata layer and have no
/// logical workflow to plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    ListConnectors,
    ListClusters,
    DescribeTable(TableName),
    CreateCatalog(CatalogName),
    DropCatalog(CatalogName),
}

impl Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::ListConnectors => write!(f, "LIST CONNECTORS"),
            CommandKind::ListClusters => write!(f, "LIST CLUSTERS"),
            CommandKind::DescribeTable(table) => write!(f, "DESCRIBE TABLE {}", table),
            CommandKind::CreateCatalog(catalog) => write!(f, "CREATE CATALOG {}", catalog),
            CommandKind::DropCatalog(catalog) => write!(f, "DROP CATALOG {}", catalog),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    Select(LogicalWorkflow),
    Insert(InsertStatement),
    Command(CommandKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedStatement {
    pub query_id: QueryId,
    pub catalog: CatalogName,
    pub kind: StatementKind,
}

impl ValidatedStatement {
    pub fn new(query_id: impl Into<QueryId>, catalog: impl Into<CatalogName>, kind: StatementKind) -> Self {
        Self {
            query_id: query_id.into(),
            catalog: catalog.into(),
            kind,
        }
    }

    pub fn select(query_id: impl Into<QueryId>, catalog: impl Into<CatalogName>, workflow: LogicalWorkflow) -> Self {
        Self::new(query_id, catalog, StatementKind::Select(workflow))
    }

    pub fn insert(query_id: impl Into<QueryId>, catalog: impl Into<CatalogName>, insert: InsertStatement) -> Self {
        Self::new(query_id, catalog, StatementKind::Insert(insert))
    }
}
