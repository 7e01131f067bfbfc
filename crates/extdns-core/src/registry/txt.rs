// # TXT Registry
//
// Ownership ledger kept in the provider itself: every managed data record has
// a companion TXT record naming the owner id and the source resource.
//
// ## Companion Names
//
// Current format: the lower-cased record type is prepended to the first
// label (`a-foo.example.com`), then the prefix or suffix is applied to that
// label (`txt-a-foo.example.com`, `a-foo-txt.example.com`). An affix
// containing `%{record_type}` receives the type instead. Legacy format: the
// same without the type. A leading `*` label is swapped for the wildcard
// replacement when one is configured.
//
// ## Write Path
//
// Creates get a current-format companion, plus a legacy one unless
// `new_format_only` is set. Deletes remove the companions observed in the
// last listing. Updates rewrite companion content only when the `resource`
// label moved. Everything goes to the provider in a single call.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::Registry;
use super::cache::RecordCache;
use super::format::{self, DecodeError, OwnershipRecord};
use crate::changes::Changes;
use crate::endpoint::{
    DomainFilter, Endpoint, EndpointKey, OWNER_LABEL, RESOURCE_LABEL, RecordType, ZoneIdName,
    normalize_name,
};
use crate::plan::OwnershipMode;
use crate::traits::Provider;
use crate::{Error, Result};

const RECORD_TYPE_TEMPLATE: &str = "%{record_type}";

/// TXT registry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRegistryOptions {
    pub owner_id: String,
    pub prefix: String,
    pub suffix: String,
    pub wildcard_replacement: String,
    pub new_format_only: bool,
    /// Zero disables the listing cache
    pub cache_interval: Duration,
}

impl TxtRegistryOptions {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }
}

impl Default for TxtRegistryOptions {
    fn default() -> Self {
        Self {
            owner_id: "default".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            wildcard_replacement: String::new(),
            new_format_only: false,
            cache_interval: Duration::ZERO,
        }
    }
}

/// Maps data record names to companion names
#[derive(Debug, Clone)]
struct NameMapper {
    prefix: String,
    suffix: String,
    wildcard_replacement: String,
}

impl NameMapper {
    fn type_in_affix(&self) -> bool {
        self.prefix.contains(RECORD_TYPE_TEMPLATE) || self.suffix.contains(RECORD_TYPE_TEMPLATE)
    }

    fn current(&self, dns_name: &str, record_type: &RecordType) -> String {
        let record_type = record_type.as_str().to_ascii_lowercase();
        self.build(dns_name, &record_type, !self.type_in_affix())
    }

    fn legacy(&self, dns_name: &str) -> String {
        self.build(dns_name, "", false)
    }

    fn build(&self, dns_name: &str, record_type: &str, type_in_label: bool) -> String {
        let name = normalize_name(dns_name);
        let (first, rest) = match name.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name.as_str(), None),
        };
        let mut label = if first == "*" && !self.wildcard_replacement.is_empty() {
            self.wildcard_replacement.clone()
        } else {
            first.to_string()
        };
        if type_in_label {
            label = format!("{record_type}-{label}");
        }
        let prefix = self.prefix.replace(RECORD_TYPE_TEMPLATE, record_type);
        let suffix = self.suffix.replace(RECORD_TYPE_TEMPLATE, record_type);
        let label = format!("{prefix}{label}{suffix}");
        match rest {
            Some(rest) => normalize_name(&format!("{label}.{rest}")),
            None => normalize_name(&label),
        }
    }
}

/// Companions a data record should have
struct Companions {
    current: Endpoint,
    legacy: Option<Endpoint>,
}

/// Values of one TXT record set, sorted by what they mean to us
#[derive(Debug, Default)]
struct TxtValues {
    own: Option<OwnershipRecord>,
    foreign: Option<OwnershipRecord>,
    /// Ordinary TXT data sharing the record set
    plain: Vec<String>,
}

/// What occupies a DNS name in the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Cname,
    ForeignTxt,
    OwnCompanion,
    Other,
}

/// Facts from the last listing that the next apply relies on
#[derive(Debug, Clone, Default)]
struct Snapshot {
    listed: bool,
    /// Our companions, keyed by the data record they vouch for
    companions: HashMap<EndpointKey, Vec<Endpoint>>,
    /// Data records vouched for by each of our companions
    users: HashMap<EndpointKey, Vec<EndpointKey>>,
    /// Keys of every companion we own
    own_companions: HashSet<EndpointKey>,
    /// Data records owned only through a legacy companion
    migrations: BTreeMap<EndpointKey, Endpoint>,
    occupants: HashMap<String, Vec<Occupant>>,
}

impl Snapshot {
    fn occupy(&mut self, name: &str, occupant: Occupant) {
        self.occupants
            .entry(normalize_name(name))
            .or_default()
            .push(occupant);
    }

    /// Whether a companion at `name` would clash with an existing record
    fn blocks_companion(&self, name: &str) -> bool {
        self.occupants
            .get(&normalize_name(name))
            .is_some_and(|occ| {
                occ.iter()
                    .any(|o| matches!(o, Occupant::Cname | Occupant::ForeignTxt))
            })
    }
}

/// Registry keeping ownership in companion TXT records
pub struct TxtRegistry {
    provider: Arc<dyn Provider>,
    owner_id: String,
    mapper: NameMapper,
    new_format_only: bool,
    cache: Option<RecordCache>,
    snapshot: RwLock<Snapshot>,
}

impl TxtRegistry {
    /// Create a TXT registry around `provider`
    ///
    /// # Errors
    ///
    /// `Error::Config` when the owner id is empty or both prefix and suffix
    /// are set.
    pub fn new(provider: Arc<dyn Provider>, options: TxtRegistryOptions) -> Result<Self> {
        if options.owner_id.trim().is_empty() {
            return Err(Error::config("TXT registry owner id cannot be empty"));
        }
        if !options.prefix.is_empty() && !options.suffix.is_empty() {
            return Err(Error::config(
                "TXT registry prefix and suffix are mutually exclusive",
            ));
        }
        let cache = (!options.cache_interval.is_zero())
            .then(|| RecordCache::new(options.cache_interval));

        Ok(Self {
            provider,
            owner_id: options.owner_id,
            mapper: NameMapper {
                prefix: options.prefix,
                suffix: options.suffix,
                wildcard_replacement: options.wildcard_replacement,
            },
            new_format_only: options.new_format_only,
            cache,
            snapshot: RwLock::new(Snapshot::default()),
        })
    }

    /// Current-format companion name for a data record
    pub fn companion_name(&self, dns_name: &str, record_type: &RecordType) -> String {
        self.mapper.current(dns_name, record_type)
    }

    /// Legacy companion name for a data record
    pub fn legacy_companion_name(&self, dns_name: &str) -> String {
        self.mapper.legacy(dns_name)
    }

    async fn listing(&self) -> Result<Vec<Endpoint>> {
        let Some(cache) = &self.cache else {
            return self.provider.records().await;
        };
        if let Some(records) = cache.get().await {
            debug!("Serving {} record(s) from the registry cache", records.len());
            return Ok(records);
        }
        let records = self.provider.records().await?;
        cache.store(&records).await;
        Ok(records)
    }

    fn ownership_labels(&self, endpoint: &Endpoint) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([(OWNER_LABEL.to_string(), self.owner_id.clone())]);
        if let Some(resource) = endpoint.resource() {
            labels.insert(RESOURCE_LABEL.to_string(), resource.to_string());
        }
        labels
    }

    fn companion(&self, data: &Endpoint, name: String, labels: &BTreeMap<String, String>) -> Endpoint {
        let mut companion = Endpoint::new(name, RecordType::TXT, [format::encode(labels)]);
        companion.set_identifier = data.set_identifier.clone();
        companion.record_ttl = data.record_ttl;
        companion
    }

    fn companions_for(&self, data: &Endpoint) -> Companions {
        let labels = self.ownership_labels(data);
        let current = self.companion(
            data,
            self.mapper.current(&data.dns_name, &data.record_type),
            &labels,
        );
        let legacy = (!self.new_format_only && !self.legacy_clashes(data))
            .then(|| self.companion(data, self.mapper.legacy(&data.dns_name), &labels));
        Companions { current, legacy }
    }

    /// A legacy companion would land on the data record's own record set
    fn legacy_clashes(&self, data: &Endpoint) -> bool {
        self.mapper.legacy(&data.dns_name) == normalize_name(&data.dns_name)
            && matches!(data.record_type, RecordType::CNAME | RecordType::TXT)
    }

    fn classify(&self, endpoint: &Endpoint) -> TxtValues {
        let mut values = TxtValues::default();
        for target in &endpoint.targets {
            match format::decode(target) {
                Ok(record) if record.owner() == self.owner_id => {
                    values.own.get_or_insert(record);
                }
                Ok(record) => {
                    values.foreign.get_or_insert(record);
                }
                Err(DecodeError::Malformed(reason)) => {
                    warn!(
                        "Ignoring ownership value of {}: {}",
                        endpoint.dns_name, reason
                    );
                }
                Err(DecodeError::NotOwnership) => values.plain.push(target.clone()),
            }
        }
        values
    }

    /// Split a listed companion into our ownership values and the rest
    fn split_values(&self, companion: &Endpoint) -> (Vec<String>, Vec<String>) {
        companion.targets.iter().cloned().partition(|target| {
            format::decode(target).is_ok_and(|record| record.owner() == self.owner_id)
        })
    }
}

#[async_trait]
impl Registry for TxtRegistry {
    async fn records(&self) -> Result<Vec<Endpoint>> {
        let listing = self.listing().await?;

        let mut snapshot = Snapshot {
            listed: true,
            ..Default::default()
        };
        let mut companions: HashMap<(String, String), (Endpoint, OwnershipRecord)> = HashMap::new();
        let mut data = Vec::new();

        for ep in listing {
            if ep.record_type != RecordType::TXT {
                let occupant = if ep.record_type == RecordType::CNAME {
                    Occupant::Cname
                } else {
                    Occupant::Other
                };
                snapshot.occupy(&ep.dns_name, occupant);
                data.push(ep);
                continue;
            }
            let values = self.classify(&ep);
            if values.own.is_some() {
                snapshot.own_companions.insert(ep.key());
                snapshot.occupy(&ep.dns_name, Occupant::OwnCompanion);
            } else {
                snapshot.occupy(&ep.dns_name, Occupant::ForeignTxt);
            }
            if let Some(record) = values.own.or(values.foreign) {
                let slot = (normalize_name(&ep.dns_name), ep.set_identifier.clone());
                companions.insert(slot, (ep.clone(), record));
            }
            if !values.plain.is_empty() {
                let mut remainder = ep;
                remainder.targets = values.plain;
                data.push(remainder);
            }
        }

        let mut out = Vec::with_capacity(data.len());
        for mut ep in data {
            ep.labels.remove(OWNER_LABEL);
            ep.labels.remove(RESOURCE_LABEL);

            let set_id = ep.set_identifier.clone();
            let lookup = |name: String| companions.get(&(name, set_id.clone()));
            let current = match lookup(self.mapper.current(&ep.dns_name, &ep.record_type)) {
                Some((_, record)) if record.owner() != self.owner_id => {
                    debug!("{} belongs to owner {}", ep.key(), record.owner());
                    out.push(ep);
                    continue;
                }
                current => current,
            };
            let legacy = if self.legacy_clashes(&ep) {
                None
            } else {
                lookup(self.mapper.legacy(&ep.dns_name))
                    .filter(|(_, record)| record.owner() == self.owner_id)
            };

            let Some((_, record)) = current.or(legacy) else {
                out.push(ep);
                continue;
            };
            ep.labels.extend(record.labels().clone());

            let key = ep.key();
            let observed: Vec<Endpoint> = current
                .into_iter()
                .chain(legacy)
                .map(|(companion, _)| companion.clone())
                .collect();
            for companion in &observed {
                snapshot
                    .users
                    .entry(companion.key())
                    .or_default()
                    .push(key.clone());
            }
            snapshot.companions.insert(key.clone(), observed);
            if current.is_none() {
                debug!("{} is owned through a legacy companion only", key);
                snapshot.migrations.insert(key, ep.clone());
            }
            out.push(ep);
        }

        *self.snapshot.write().await = snapshot;
        Ok(out)
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<()> {
        let mut snapshot = self.snapshot.read().await.clone();
        let mut batch = Changes::default();
        let mut withheld = Vec::new();

        for ep in &changes.create {
            let occupant = match ep.record_type {
                RecordType::CNAME => Occupant::Cname,
                RecordType::TXT => Occupant::ForeignTxt,
                _ => Occupant::Other,
            };
            snapshot.occupy(&ep.dns_name, occupant);
        }

        for ep in &changes.create {
            let Companions { current, legacy } = self.companions_for(ep);
            if !snapshot.own_companions.contains(&current.key())
                && snapshot.blocks_companion(&current.dns_name)
            {
                warn!(
                    "Withholding {}: ownership record name {} is taken",
                    ep.key(),
                    current.dns_name
                );
                withheld.push(ep.key().to_string());
                continue;
            }
            batch.create.push(ep.without_labels());
            for companion in std::iter::once(current).chain(legacy) {
                if snapshot.own_companions.contains(&companion.key()) {
                    continue;
                }
                if snapshot.blocks_companion(&companion.dns_name) {
                    debug!(
                        "Skipping legacy ownership record {}: name is taken",
                        companion.dns_name
                    );
                    continue;
                }
                snapshot.own_companions.insert(companion.key());
                batch.create.push(companion);
            }
        }

        let deleted: HashSet<EndpointKey> = changes.delete.iter().map(Endpoint::key).collect();
        let updated: HashMap<EndpointKey, &Endpoint> = changes
            .update_new
            .iter()
            .map(|ep| (ep.key(), ep))
            .collect();

        let mut migrated = Vec::new();
        for (key, ep) in &snapshot.migrations {
            if deleted.contains(key) {
                continue;
            }
            let source = updated.get(key).copied().unwrap_or(ep);
            let current = self.companions_for(source).current;
            if snapshot.own_companions.contains(&current.key()) {
                continue;
            }
            if snapshot.blocks_companion(&current.dns_name) {
                warn!(
                    "Cannot migrate ownership of {}: {} is taken",
                    key, current.dns_name
                );
                continue;
            }
            info!("Migrating ownership record of {} to the current format", key);
            snapshot.own_companions.insert(current.key());
            batch.create.push(current);
            migrated.push(key.clone());
        }

        for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
            batch.update_old.push(old.without_labels());
            batch.update_new.push(new.without_labels());
            if old.resource() == new.resource() {
                continue;
            }
            let observed = if snapshot.listed {
                snapshot.companions.get(&old.key()).cloned().unwrap_or_default()
            } else {
                let Companions { current, legacy } = self.companions_for(old);
                std::iter::once(current).chain(legacy).collect()
            };
            let content = format::encode(&self.ownership_labels(new));
            for companion in observed {
                let shared = snapshot
                    .users
                    .get(&companion.key())
                    .is_some_and(|users| users.len() > 1);
                let (own, mut targets) = self.split_values(&companion);
                if shared || own == [content.clone()] {
                    continue;
                }
                targets.push(content.clone());
                let mut rewritten = companion.clone();
                rewritten.targets = targets;
                batch.update_old.push(companion);
                batch.update_new.push(rewritten);
            }
        }

        let mut companion_deletes = BTreeMap::new();
        let mut companion_trims = BTreeMap::new();
        for ep in &changes.delete {
            batch.delete.push(ep.without_labels());
            let observed = if snapshot.listed {
                snapshot.companions.get(&ep.key()).cloned().unwrap_or_default()
            } else {
                let Companions { current, legacy } = self.companions_for(ep);
                std::iter::once(current).chain(legacy).collect()
            };
            for companion in observed {
                let key = companion.key();
                let still_used = snapshot
                    .users
                    .get(&key)
                    .is_some_and(|users| users.iter().any(|u| !deleted.contains(u)));
                if still_used {
                    continue;
                }
                let (_, rest) = self.split_values(&companion);
                if rest.is_empty() {
                    companion_deletes.insert(key, companion);
                } else {
                    debug!("Keeping {} other value(s) of {}", rest.len(), key);
                    let mut trimmed = companion.clone();
                    trimmed.targets = rest;
                    companion_trims.insert(key, (companion, trimmed));
                }
            }
        }
        batch.delete.extend(companion_deletes.into_values());
        for (old, new) in companion_trims.into_values() {
            batch.update_old.push(old);
            batch.update_new.push(new);
        }

        if !batch.is_empty() {
            if let Err(err) = self.provider.apply_changes(&batch).await {
                if let Some(cache) = &self.cache {
                    cache.invalidate().await;
                }
                return Err(err);
            }
            if let Some(cache) = &self.cache {
                cache.patch(&batch).await;
            }
            if !migrated.is_empty() {
                let mut guard = self.snapshot.write().await;
                for key in &migrated {
                    guard.migrations.remove(key);
                }
            }
        }

        if withheld.is_empty() {
            Ok(())
        } else {
            Err(Error::OwnershipConflict { records: withheld })
        }
    }

    async fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>> {
        self.provider.adjust_endpoints(endpoints).await
    }

    async fn domain_filter(&self) -> Result<DomainFilter> {
        self.provider.domain_filter().await
    }

    async fn zones(&self) -> Result<ZoneIdName> {
        self.provider.zones().await
    }

    fn provider_specific_ordered(&self) -> bool {
        self.provider.provider_specific_ordered()
    }

    fn ownership(&self) -> OwnershipMode {
        OwnershipMode::Labeled {
            owner_id: self.owner_id.clone(),
        }
    }

    fn name(&self) -> &str {
        "txt"
    }
}
