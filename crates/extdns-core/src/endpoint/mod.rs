// # Endpoint Model
//
// Canonical representation of a single DNS record intent, shared by sources,
// the plan, the registry and providers.
//
// ## Identity
//
// Two endpoints describe the same record when their identity keys match:
// normalized DNS name, record type and set identifier. Everything else
// (targets, TTL, provider-specific properties) is content and takes part in
// change detection only.
//
// ## Wire Format
//
// The serde representation is the webhook wire format: camelCase keys, empty
// fields omitted on output and defaulted on input.

pub mod domain_filter;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use domain_filter::{DomainFilter, DomainRegex, ZoneIdFilter, ZoneIdName};

/// Label carrying the owner id of a record managed by a registry
pub const OWNER_LABEL: &str = "owner";

/// Label carrying the source object that produced an endpoint
pub const RESOURCE_LABEL: &str = "resource";

/// DNS record type
///
/// CNAME is the only single-target type; every other type holds a set of
/// targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    NS,
    MX,
    SRV,
    PTR,
    NAPTR,
    /// Any type without a dedicated variant, stored upper-cased
    Other(String),
}

impl RecordType {
    /// The canonical upper-case name of this type
    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::CNAME => "CNAME",
            Self::TXT => "TXT",
            Self::NS => "NS",
            Self::MX => "MX",
            Self::SRV => "SRV",
            Self::PTR => "PTR",
            Self::NAPTR => "NAPTR",
            Self::Other(name) => name,
        }
    }

    /// Whether records of this type may hold more than one target
    pub fn is_multi_target(&self) -> bool {
        !matches!(self, Self::CNAME)
    }
}

impl From<&str> for RecordType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::AAAA,
            "CNAME" => Self::CNAME,
            "TXT" => Self::TXT,
            "NS" => Self::NS,
            "MX" => Self::MX,
            "SRV" => Self::SRV,
            "PTR" => Self::PTR,
            "NAPTR" => Self::NAPTR,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RecordType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for RecordType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque provider-specific property attached to an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderSpecificProperty {
    pub name: String,
    pub value: String,
}

impl ProviderSpecificProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One desired or actual DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_identifier: String,
    /// Zero means "provider default"
    #[serde(rename = "recordTTL", default, skip_serializing_if = "is_zero")]
    pub record_ttl: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecificProperty>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Lower-case a DNS name and strip its trailing dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl Endpoint {
    /// Create an endpoint with the given name, type and targets
    pub fn new<T, S>(dns_name: impl Into<String>, record_type: RecordType, targets: T) -> Self
    where
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dns_name: dns_name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            record_type,
            set_identifier: String::new(),
            record_ttl: 0,
            labels: BTreeMap::new(),
            provider_specific: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn with_set_identifier(mut self, set_identifier: impl Into<String>) -> Self {
        self.set_identifier = set_identifier.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_provider_specific(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.provider_specific
            .push(ProviderSpecificProperty::new(name, value));
        self
    }

    /// The identity key of this endpoint
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            dns_name: normalize_name(&self.dns_name),
            record_type: self.record_type.clone(),
            set_identifier: self.set_identifier.clone(),
        }
    }

    /// Owner id recorded by the registry, if any
    pub fn owner(&self) -> Option<&str> {
        self.labels.get(OWNER_LABEL).map(String::as_str)
    }

    /// Source object that produced this endpoint, if recorded
    pub fn resource(&self) -> Option<&str> {
        self.labels.get(RESOURCE_LABEL).map(String::as_str)
    }

    /// Return a normalized copy.
    ///
    /// The name is lower-cased without its trailing dot. Targets of set-typed
    /// records are sorted and deduplicated; a CNAME target is normalized like a
    /// DNS name.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.dns_name = normalize_name(&self.dns_name);
        out.targets = canonical_targets(&self.record_type, &self.targets);
        out
    }

    /// Deep equality used for change detection.
    ///
    /// `self` is the current record and `desired` the wanted state. Labels are
    /// ignored. TTL is compared only when the desired TTL is set.
    /// Provider-specific properties are compared as a set unless `ordered`.
    pub fn same_content(&self, desired: &Endpoint, ordered: bool) -> bool {
        if self.key() != desired.key() {
            return false;
        }
        if canonical_targets(&self.record_type, &self.targets)
            != canonical_targets(&desired.record_type, &desired.targets)
        {
            return false;
        }
        if desired.record_ttl != 0 && self.record_ttl != desired.record_ttl {
            return false;
        }
        if ordered {
            self.provider_specific == desired.provider_specific
        } else {
            let mut ours = self.provider_specific.clone();
            let mut theirs = desired.provider_specific.clone();
            ours.sort();
            ours.dedup();
            theirs.sort();
            theirs.dedup();
            ours == theirs
        }
    }

    /// A copy without registry bookkeeping labels
    pub fn without_labels(&self) -> Self {
        let mut out = self.clone();
        out.labels.clear();
        out
    }
}

fn canonical_targets(record_type: &RecordType, targets: &[String]) -> Vec<String> {
    if record_type.is_multi_target() {
        let mut out: Vec<String> = targets.iter().map(|t| t.trim().to_string()).collect();
        out.sort();
        out.dedup();
        out
    } else {
        targets.iter().map(|t| normalize_name(t)).collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.dns_name,
            self.record_ttl,
            self.record_type,
            self.targets.join(";")
        )?;
        if !self.set_identifier.is_empty() {
            write!(f, " set={}", self.set_identifier)?;
        }
        Ok(())
    }
}

/// Identity of a record: normalized name, type and set identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub dns_name: String,
    pub record_type: RecordType,
    pub set_identifier: String,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dns_name, self.record_type)?;
        if !self.set_identifier.is_empty() {
            write!(f, "/{}", self.set_identifier)?;
        }
        Ok(())
    }
}

/// Sort endpoints by identity key, then by rendered content for stability
pub fn sort_endpoints(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| {
        a.key()
            .cmp(&b.key())
            .then_with(|| a.targets.cmp(&b.targets))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_parses_case_insensitively() {
        assert_eq!(RecordType::from("cname"), RecordType::CNAME);
        assert_eq!(RecordType::from("Aaaa"), RecordType::AAAA);
        assert_eq!(RecordType::from("caa"), RecordType::Other("CAA".to_string()));
        assert!(!RecordType::CNAME.is_multi_target());
        assert!(RecordType::TXT.is_multi_target());
    }

    #[test]
    fn key_normalizes_name() {
        let a = Endpoint::new("Foo.Example.COM.", RecordType::A, ["1.2.3.4"]);
        let b = Endpoint::new("foo.example.com", RecordType::A, ["5.6.7.8"]);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "foo.example.com/A");
    }

    #[test]
    fn set_identifier_is_part_of_identity() {
        let a = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"]).with_set_identifier("eu");
        let b = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"]).with_set_identifier("us");
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "foo.example.com/A/eu");
    }

    #[test]
    fn set_typed_targets_compare_as_sets() {
        let current = Endpoint::new("foo.example.com", RecordType::A, ["5.6.7.8", "1.2.3.4"]);
        let desired = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4", "5.6.7.8"]);
        assert!(current.same_content(&desired, false));
    }

    #[test]
    fn cname_target_compares_as_dns_name() {
        let current = Endpoint::new("www.example.com", RecordType::CNAME, ["LB.example.com."]);
        let desired = Endpoint::new("www.example.com", RecordType::CNAME, ["lb.example.com"]);
        assert!(current.same_content(&desired, false));
    }

    #[test]
    fn ttl_compared_only_when_desired() {
        let current = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"]).with_ttl(300);
        let unset = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"]);
        assert!(current.same_content(&unset, false));
        assert!(!current.same_content(&unset.clone().with_ttl(60), false));
    }

    #[test]
    fn labels_are_ignored() {
        let current = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"])
            .with_label(OWNER_LABEL, "default");
        let desired = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"])
            .with_label(RESOURCE_LABEL, "svc/a");
        assert!(current.same_content(&desired, false));
    }

    #[test]
    fn provider_specific_order_matters_only_when_declared() {
        let current = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"])
            .with_provider_specific("a", "1")
            .with_provider_specific("b", "2");
        let desired = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"])
            .with_provider_specific("b", "2")
            .with_provider_specific("a", "1");
        assert!(current.same_content(&desired, false));
        assert!(!current.same_content(&desired, true));
    }

    #[test]
    fn wire_format_omits_empty_fields() {
        let ep = Endpoint::new("foo.example.com", RecordType::A, ["1.2.3.4"]);
        let json = serde_json::to_value(&ep).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "dnsName": "foo.example.com",
                "targets": ["1.2.3.4"],
                "recordType": "A"
            })
        );
    }

    #[test]
    fn wire_format_uses_external_dns_keys() {
        let ep: Endpoint = serde_json::from_value(serde_json::json!({
            "dnsName": "foo.example.com",
            "targets": ["lb.example.com"],
            "recordType": "CNAME",
            "setIdentifier": "eu",
            "recordTTL": 300,
            "labels": {"owner": "default"},
            "providerSpecific": [{"name": "weight", "value": "10"}]
        }))
        .unwrap();
        assert_eq!(ep.record_type, RecordType::CNAME);
        assert_eq!(ep.record_ttl, 300);
        assert_eq!(ep.set_identifier, "eu");
        assert_eq!(ep.owner(), Some("default"));
        assert_eq!(ep.provider_specific[0].name, "weight");
    }
}
