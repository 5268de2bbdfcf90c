use std::collections::BTreeSet;

use itertools::Itertools;

use crate::{catalog::ConnectorMetadata, types::{ConnectorName, TableName}};

use super::{matcher::CandidateMap, PlanningErrorKind};

/// Picks the connector that can serve every table.
///
/// The per-table candidate lists are intersected by connector name and the smallest name
/// wins, so the answer never depends on discovery or hash order. Two different connector
/// definitions sharing the winning name can't be told apart and are reported as ambiguous.
pub fn find_more_suitable_connector(candidates: &CandidateMap) -> Result<ConnectorMetadata, PlanningErrorKind> {
    let no_common = || PlanningErrorKind::NoCommonConnector {
        tables: candidates.keys().cloned().collect(),
        step: None,
    };

    let mut lists = candidates.values();
    let first = lists.next().ok_or_else(no_common)?;
    let mut common = first.iter().map(|c| &c.name).collect::<BTreeSet<&ConnectorName>>();
    for list in lists {
        let names = list.iter().map(|c| &c.name).collect::<BTreeSet<_>>();
        common.retain(|name| names.contains(name));
    }

    let winner = *common.iter().next().ok_or_else(no_common)?;
    let definitions = candidates
        .values()
        .flatten()
        .filter(|c| &c.name == winner)
        .unique()
        .collect::<Vec<_>>();
    match definitions.as_slice() {
        [chosen] => Ok((*chosen).clone()),
        _ => Err(PlanningErrorKind::AmbiguousChoice {
            connector: winner.clone(),
            handles: definitions.iter().map(|c| c.handle.clone()).sorted().dedup().collect(),
        }),
    }
}

/// Chooser for a single table's candidates.
pub fn choose_for_table(table: &TableName, connectors: &[ConnectorMetadata]) -> Result<ConnectorMetadata, PlanningErrorKind> {
    let candidates = CandidateMap::from([(table.clone(), connectors.to_vec())]);
    find_more_suitable_connector(&candidates)
}
