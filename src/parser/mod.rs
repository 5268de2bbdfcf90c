/*
    Small nom parsers for the textual forms the planner accepts from its surroundings:
    qualified names as they appear in statements and metadata ("catalog.table",
    "catalog.table.column") and capability tags as connectors advertise them
    ("PROJECT, FILTER_PK_EQ"). The statement grammar itself is owned by the front-end.
 */

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0};
use nom::combinator::{all_consuming, map, map_opt, recognize};
use nom::multi::{many0_count, separated_list0};
use nom::sequence::{delimited, pair, tuple};
use thiserror::Error;

use crate::{capability::{Capability, CapabilitySet}, types::{ColumnName, TableName}};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameParseError {
    #[error("'{0}' is not a qualified table name (expected catalog.table)")]
    InvalidTableName(String),
    #[error("'{0}' is not a qualified column name (expected catalog.table.column)")]
    InvalidColumnName(String),
    #[error("'{0}' is not a known capability")]
    InvalidCapability(String),
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_"))))
    ))(input)
}

fn table_name(input: &str) -> IResult<&str, TableName> {
    map(
        tuple((identifier, char('.'), identifier)),
        |(catalog, _, table)| TableName::new(catalog, table)
    )(input)
}

fn column_name(input: &str) -> IResult<&str, ColumnName> {
    map(
        tuple((table_name, char('.'), identifier)),
        |(table, _, column)| ColumnName::new(table, column)
    )(input)
}

fn capability(input: &str) -> IResult<&str, Capability> {
    map_opt(identifier, Capability::from_tag)(input)
}

fn capability_list(input: &str) -> IResult<&str, Vec<Capability>> {
    separated_list0(delimited(multispace0, char(','), multispace0), capability)(input)
}

fn trimmed<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    all_consuming(delimited(multispace0, parser, multispace0))
}

pub fn parse_table_name(input: &str) -> Result<TableName, NameParseError> {
    trimmed(table_name)(input)
        .map(|(_, table)| table)
        .map_err(|_| NameParseError::InvalidTableName(input.to_string()))
}

pub fn parse_column_name(input: &str) -> Result<ColumnName, NameParseError> {
    trimmed(column_name)(input)
        .map(|(_, column)| column)
        .map_err(|_| NameParseError::InvalidColumnName(input.to_string()))
}

pub fn parse_capability(input: &str) -> Result<Capability, NameParseError> {
    trimmed(capability)(input)
        .map(|(_, capability)| capability)
        .map_err(|_| NameParseError::InvalidCapability(input.trim().to_string()))
}

pub fn parse_capability_set(input: &str) -> Result<CapabilitySet, NameParseError> {
    match trimmed(capability_list)(input) {
        Ok((_, capabilities)) => Ok(capabilities.into_iter().collect()),
        Err(_) => {
            // Report the first tag that is not a capability rather than the whole list
            let offending = input
                .split(',')
                .map(str::trim)
                .find(|t| Capability::from_tag(t).is_none())
                .unwrap_or(input);
            Err(NameParseError::InvalidCapability(offending.to_string()))
        }
    }
}
