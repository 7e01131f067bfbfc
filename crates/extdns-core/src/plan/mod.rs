// # Plan
//
// Pure computation of the changes that move the provider's current record set
// toward the desired one.
//
// ## Steps
//
// 1. Scope: drop endpoints outside the domain filter, the zone-id filter or
//    the managed record types, on both sides.
// 2. Validate and index desired endpoints by identity key, resolving
//    duplicates (see [`conflict`]).
// 3. Diff against current records. Only records the ownership mode considers
//    ours are ever updated or deleted; a record owned by someone else blocks
//    the key entirely.
// 4. Apply the policy gate and sort the result by key.
//
// The same inputs always produce the same output, whatever their order.

pub mod conflict;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::changes::Changes;
use crate::endpoint::{
    DomainFilter, Endpoint, EndpointKey, RecordType, ZoneIdFilter, ZoneIdName,
};

pub use conflict::{Conflict, TieBreak};

/// Which kinds of changes may be applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Create, update and delete
    #[default]
    Sync,
    /// Create and update, never delete
    UpsertOnly,
    /// Create only
    CreateOnly,
}

impl Policy {
    pub fn allows_updates(self) -> bool {
        !matches!(self, Policy::CreateOnly)
    }

    pub fn allows_deletes(self) -> bool {
        matches!(self, Policy::Sync)
    }
}

impl FromStr for Policy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Policy::Sync),
            "upsert-only" => Ok(Policy::UpsertOnly),
            "create-only" => Ok(Policy::CreateOnly),
            other => Err(crate::Error::config(format!("Unknown policy: {other}"))),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Sync => f.write_str("sync"),
            Policy::UpsertOnly => f.write_str("upsert-only"),
            Policy::CreateOnly => f.write_str("create-only"),
        }
    }
}

/// How the plan decides whether a current record belongs to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipMode {
    /// Owned when the record's `owner` label equals this id
    Labeled { owner_id: String },
    /// Every in-scope record is owned
    Implicit,
}

impl OwnershipMode {
    pub fn owns(&self, endpoint: &Endpoint) -> bool {
        match self {
            OwnershipMode::Labeled { owner_id } => endpoint.owner() == Some(owner_id.as_str()),
            OwnershipMode::Implicit => true,
        }
    }
}

/// A desired endpoint the plan refused to consider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub endpoint: Endpoint,
    pub reason: String,
}

/// Outcome of [`Plan::compute`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanResult {
    /// Changes to apply, sorted by key
    pub changes: Changes,
    /// Invalid desired endpoints
    pub rejected: Vec<Rejected>,
    /// Resolved desired-side conflicts
    pub conflicts: Vec<Conflict>,
    /// Keys left alone because the current record belongs to someone else
    pub foreign: Vec<EndpointKey>,
    /// Changes withheld by the policy
    pub skipped: Changes,
}

/// Plan parameters
#[derive(Debug, Clone)]
pub struct Plan {
    pub policy: Policy,
    /// Every filter must match
    pub domain_filters: Vec<DomainFilter>,
    pub zone_id_filter: ZoneIdFilter,
    pub zones: ZoneIdName,
    pub managed_types: Vec<RecordType>,
    pub ownership: OwnershipMode,
    pub provider_specific_ordered: bool,
    pub tie_break: TieBreak,
}

impl Plan {
    /// A sync plan over every domain with the default managed types
    pub fn new(ownership: OwnershipMode) -> Self {
        Self {
            policy: Policy::Sync,
            domain_filters: Vec::new(),
            zone_id_filter: ZoneIdFilter::default(),
            zones: ZoneIdName::new(),
            managed_types: vec![RecordType::A, RecordType::AAAA, RecordType::CNAME],
            ownership,
            provider_specific_ordered: false,
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a domain filter; endpoints must match all of them
    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        if filter.is_configured() {
            self.domain_filters.push(filter);
        }
        self
    }

    pub fn with_zone_id_filter(mut self, filter: ZoneIdFilter, zones: ZoneIdName) -> Self {
        self.zone_id_filter = filter;
        self.zones = zones;
        self
    }

    pub fn with_managed_types(mut self, types: Vec<RecordType>) -> Self {
        self.managed_types = types;
        self
    }

    pub fn with_provider_specific_ordered(mut self, ordered: bool) -> Self {
        self.provider_specific_ordered = ordered;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Whether an endpoint falls inside every configured filter
    pub fn in_scope(&self, endpoint: &Endpoint) -> bool {
        if !self.managed_types.contains(&endpoint.record_type) {
            return false;
        }
        if !self
            .domain_filters
            .iter()
            .all(|filter| filter.matches(&endpoint.dns_name))
        {
            return false;
        }
        if self.zone_id_filter.is_configured() {
            return match self.zones.find_zone(&endpoint.dns_name) {
                Some((zone_id, _)) => self.zone_id_filter.matches(zone_id),
                None => false,
            };
        }
        true
    }

    /// Compute the changes converging `current` toward `desired`
    pub fn compute(&self, current: &[Endpoint], desired: &[Endpoint]) -> PlanResult {
        let mut result = PlanResult::default();

        let current = self.index_current(current);
        let desired = self.index_desired(desired, &mut result);

        let mut changes = Changes::default();
        for (key, wanted) in &desired {
            match current.get(key) {
                None => changes.create.push(wanted.clone()),
                Some(existing) if !self.ownership.owns(existing) => {
                    info!("Skipping {}: record exists and is not owned by us", key);
                    result.foreign.push(key.clone());
                }
                Some(existing) => {
                    if existing.same_content(wanted, self.provider_specific_ordered) {
                        continue;
                    }
                    let mut updated = wanted.clone();
                    for (label, value) in &existing.labels {
                        updated.labels.entry(label.clone()).or_insert_with(|| value.clone());
                    }
                    changes.update_old.push(existing.clone());
                    changes.update_new.push(updated);
                }
            }
        }
        for (key, existing) in &current {
            if !desired.contains_key(key) && self.ownership.owns(existing) {
                changes.delete.push(existing.clone());
            }
        }

        self.apply_policy(&mut changes, &mut result.skipped);
        changes.sort();
        result.skipped.sort();
        result.changes = changes;
        result
    }

    fn index_current(&self, current: &[Endpoint]) -> BTreeMap<EndpointKey, Endpoint> {
        let mut index = BTreeMap::new();
        for ep in current.iter().filter(|ep| self.in_scope(ep)) {
            let ep = ep.normalized();
            let key = ep.key();
            if index.contains_key(&key) {
                warn!("Provider returned duplicate record {}, keeping the first", key);
                continue;
            }
            index.insert(key, ep);
        }
        index
    }

    fn index_desired(
        &self,
        desired: &[Endpoint],
        result: &mut PlanResult,
    ) -> BTreeMap<EndpointKey, Endpoint> {
        let mut groups: BTreeMap<EndpointKey, Vec<Endpoint>> = BTreeMap::new();
        for ep in desired {
            if !self.in_scope(ep) {
                debug!("Ignoring out-of-scope endpoint {}", ep.key());
                continue;
            }
            if let Some(reason) = validate(ep) {
                warn!("Rejecting desired endpoint {}: {}", ep.key(), reason);
                result.rejected.push(Rejected {
                    endpoint: ep.clone(),
                    reason,
                });
                continue;
            }
            let ep = ep.normalized();
            groups.entry(ep.key()).or_default().push(ep);
        }

        let mut index = BTreeMap::new();
        for (key, group) in groups {
            let Some((winner, conflict)) = conflict::resolve(&key, group, self.tie_break) else {
                continue;
            };
            if let Some(conflict) = conflict {
                warn!(
                    "Conflicting desired endpoints for {}: using {} from {:?}, discarding {:?}",
                    key,
                    winner.targets.join(","),
                    winner.resource().unwrap_or_default(),
                    conflict.loser_resources()
                );
                result.conflicts.push(conflict);
            }
            index.insert(key, winner);
        }
        index
    }

    fn apply_policy(&self, changes: &mut Changes, skipped: &mut Changes) {
        if !self.policy.allows_deletes() && !changes.delete.is_empty() {
            debug!(
                "Policy {} drops {} delete(s)",
                self.policy,
                changes.delete.len()
            );
            skipped.delete = std::mem::take(&mut changes.delete);
        }
        if !self.policy.allows_updates() && !changes.update_new.is_empty() {
            for ep in &changes.update_new {
                info!("Policy {} skips update of {}", self.policy, ep.key());
            }
            skipped.update_old = std::mem::take(&mut changes.update_old);
            skipped.update_new = std::mem::take(&mut changes.update_new);
        }
    }
}

fn validate(endpoint: &Endpoint) -> Option<String> {
    if endpoint.dns_name.trim().trim_end_matches('.').is_empty() {
        return Some("empty DNS name".to_string());
    }
    if endpoint.targets.is_empty() {
        return Some("no targets".to_string());
    }
    if endpoint.targets.iter().any(|t| t.trim().is_empty()) {
        return Some("blank target".to_string());
    }
    if !endpoint.record_type.is_multi_target() && endpoint.targets.len() > 1 {
        return Some(format!(
            "{} record with {} targets",
            endpoint.record_type,
            endpoint.targets.len()
        ));
    }
    None
}
