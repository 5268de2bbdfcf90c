use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::parser::{self, NameParseError};

// Plain string identifiers. They are compared, ordered and hashed by their textual value,
// which is what makes connector choice reproducible.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier!(
    /// Correlates a planned workflow with the result collection done by the dispatcher.
    QueryId
);
string_identifier!(CatalogName);
string_identifier!(ClusterName);
string_identifier!(ConnectorName);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub catalog: CatalogName,
    pub name: String,
}

impl TableName {
    pub fn new(catalog: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog: CatalogName::new(catalog),
            name: name.into(),
        }
    }

    pub fn column(&self, name: impl Into<String>) -> ColumnName {
        ColumnName::new(self.clone(), name)
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.catalog, self.name)
    }
}

impl FromStr for TableName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_table_name(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnName {
    pub table: TableName,
    pub name: String,
}

impl ColumnName {
    pub fn new(table: TableName, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
        }
    }
}

impl Display for ColumnName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

impl FromStr for ColumnName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_column_name(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    BigInt,
    Float,
    Double,
    Boolean,
    Text,
    Varchar,
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Int => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
            ColumnType::Varchar => "VARCHAR",
        };
        write!(f, "{}", name)
    }
}
