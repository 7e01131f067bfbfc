//! Desired-side conflict resolution
//!
//! Several sources may ask for the same record. Multi-target records are
//! merged; single-target records get exactly one winner. The outcome never
//! depends on the order the sources returned their endpoints in.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::endpoint::{Endpoint, EndpointKey};

/// Rule picking the winner among conflicting single-target endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Endpoint from the lexicographically first `resource` label wins
    #[default]
    LowestResource,
    /// Endpoint from the lexicographically last `resource` label wins
    HighestResource,
}

impl FromStr for TieBreak {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lowest-resource" => Ok(Self::LowestResource),
            "highest-resource" => Ok(Self::HighestResource),
            other => Err(crate::Error::config(format!("Unknown tie-break rule: {other}"))),
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowestResource => f.write_str("lowest-resource"),
            Self::HighestResource => f.write_str("highest-resource"),
        }
    }
}

/// Two or more desired endpoints disagreeing about a single-target record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub key: EndpointKey,
    pub winner: Endpoint,
    pub losers: Vec<Endpoint>,
}

impl Conflict {
    /// `resource` labels of the discarded endpoints
    pub fn loser_resources(&self) -> Vec<&str> {
        self.losers
            .iter()
            .map(|ep| ep.resource().unwrap_or_default())
            .collect()
    }
}

/// Total order over endpoints sharing a key: resource label first, content
/// after, then every remaining field. Candidates comparing equal are
/// identical.
fn candidate_order(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.resource()
        .unwrap_or_default()
        .cmp(b.resource().unwrap_or_default())
        .then_with(|| a.targets.cmp(&b.targets))
        .then_with(|| a.record_ttl.cmp(&b.record_ttl))
        .then_with(|| sorted_properties(a).cmp(&sorted_properties(b)))
        .then_with(|| a.labels.cmp(&b.labels))
        .then_with(|| a.provider_specific.cmp(&b.provider_specific))
}

fn sorted_properties(ep: &Endpoint) -> Vec<(&str, &str)> {
    let mut props: Vec<(&str, &str)> = ep
        .provider_specific
        .iter()
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    props.sort();
    props
}

/// Reduce all desired endpoints of one key to a single endpoint.
///
/// `group` must be non-empty, already normalized and share `key`.
pub(crate) fn resolve(
    key: &EndpointKey,
    mut group: Vec<Endpoint>,
    tie_break: TieBreak,
) -> Option<(Endpoint, Option<Conflict>)> {
    group.sort_by(candidate_order);
    if tie_break == TieBreak::HighestResource {
        group.reverse();
    }
    let mut rest = group.into_iter();
    let mut winner = rest.next()?;
    let others: Vec<Endpoint> = rest.collect();

    if key.record_type.is_multi_target() {
        for other in &others {
            winner.targets.extend(other.targets.iter().cloned());
        }
        return Some((winner.normalized(), None));
    }

    let losers: Vec<Endpoint> = others
        .into_iter()
        .filter(|other| other.targets != winner.targets)
        .collect();
    if losers.is_empty() {
        return Some((winner, None));
    }
    let conflict = Conflict {
        key: key.clone(),
        winner: winner.clone(),
        losers,
    };
    Some((winner, Some(conflict)))
}
