//! Domain and zone scoping
//!
//! [`DomainFilter`] decides which names the system may touch at all.
//! [`ZoneIdName`] maps hosted zones to names and finds the best zone for a
//! hostname; [`ZoneIdFilter`] restricts reconciliation to a set of zone ids.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::warn;

use super::normalize_name;

/// A compiled domain pattern, compared and serialized as its source text
#[derive(Debug, Clone)]
pub struct DomainRegex(Regex);

impl DomainRegex {
    /// Compile `pattern`; a blank pattern yields `None`
    pub fn optional(pattern: &str) -> crate::Result<Option<Self>> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(pattern)
            .map(|re| Some(Self(re)))
            .map_err(|e| crate::Error::config(format!("Invalid domain regex {pattern:?}: {e}")))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

impl PartialEq for DomainRegex {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for DomainRegex {}

impl Serialize for DomainRegex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn optional_regex<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DomainRegex>, D::Error> {
    let pattern = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    DomainRegex::optional(&pattern).map_err(serde::de::Error::custom)
}

/// Include/exclude suffix lists, or include/exclude regular expressions
///
/// An empty include list matches every name. Exclusions always win. A filter
/// entry with a leading dot (`.example.com`) matches subdomains only.
///
/// When either regex is set the suffix lists are ignored: a name matches
/// unless the exclusion regex matches it, and only if the include regex
/// (when set) matches it. Regexes see the normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(
        rename = "regexInclude",
        default,
        deserialize_with = "optional_regex",
        skip_serializing_if = "Option::is_none"
    )]
    pub regex_include: Option<DomainRegex>,
    #[serde(
        rename = "regexExclude",
        default,
        deserialize_with = "optional_regex",
        skip_serializing_if = "Option::is_none"
    )]
    pub regex_exclude: Option<DomainRegex>,
}

impl DomainFilter {
    /// A filter matching every name
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Build a filter from include and exclude lists, dropping blank entries
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: prepare(include),
            exclude: prepare(exclude),
            regex_include: None,
            regex_exclude: None,
        }
    }

    /// Switch to regex matching; blank patterns stay unset
    ///
    /// # Errors
    ///
    /// `Error::Config` when a pattern does not compile.
    pub fn with_regex(mut self, include: &str, exclude: &str) -> crate::Result<Self> {
        self.regex_include = DomainRegex::optional(include)?;
        self.regex_exclude = DomainRegex::optional(exclude)?;
        Ok(self)
    }

    fn uses_regex(&self) -> bool {
        self.regex_include.is_some() || self.regex_exclude.is_some()
    }

    /// Whether any include or exclude entry is set
    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty() || self.uses_regex()
    }

    /// Whether `name` is in scope
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize_name(name);
        if self.uses_regex() {
            if self.regex_exclude.as_ref().is_some_and(|re| re.is_match(&name)) {
                return false;
            }
            return self.regex_include.as_ref().is_none_or(|re| re.is_match(&name));
        }
        if self.exclude.iter().any(|d| suffix_match(&name, d)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|d| suffix_match(&name, d))
    }
}

fn prepare<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|d| {
            let d = d.as_ref().trim();
            let subdomains_only = d.starts_with('.');
            let base = normalize_name(d.trim_start_matches('.'));
            if subdomains_only { format!(".{base}") } else { base }
        })
        .filter(|d| !d.is_empty() && d != ".")
        .collect()
}

fn suffix_match(name: &str, filter: &str) -> bool {
    match filter.strip_prefix('.') {
        Some(base) => name.ends_with(&format!(".{base}")),
        None => name == filter || name.ends_with(&format!(".{filter}")),
    }
}

/// Hosted zone id to zone name map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneIdName(BTreeMap<String, String>);

impl ZoneIdName {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, zone_id: impl Into<String>, zone_name: &str) {
        self.0.insert(zone_id.into(), normalize_name(zone_name));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Find the zone whose name is the longest suffix of `hostname`.
    ///
    /// Names are compared in their Unicode form, so punycode hostnames match
    /// zones stored in Unicode and the other way round. Returns
    /// `(zone_id, zone_name)`. Equal-length candidates resolve to the lowest
    /// zone id.
    pub fn find_zone(&self, hostname: &str) -> Option<(&str, &str)> {
        let name = unicode_name(&normalize_name(hostname));
        let mut best: Option<(&str, &str, usize)> = None;
        for (id, zone) in self.iter() {
            let zone_name = unicode_name(zone);
            let fits = name == zone_name || name.ends_with(&format!(".{zone_name}"));
            if fits && best.is_none_or(|(_, _, len)| zone_name.len() > len) {
                best = Some((id, zone, zone_name.len()));
            }
        }
        best.map(|(id, zone, _)| (id, zone))
    }
}

/// Convert every label of `name` to Unicode. Labels holding `_` (service
/// labels such as `_acme-challenge`) are kept as they are.
fn unicode_name(name: &str) -> String {
    name.split('.')
        .map(|label| {
            if label.contains('_') || (label.is_ascii() && !label.starts_with("xn--")) {
                return label.to_string();
            }
            let (converted, result) = idna::domain_to_unicode(label);
            match result {
                Ok(()) => converted,
                Err(e) => {
                    warn!(
                        "Failed to convert label {:?} of {:?} to Unicode: {:?}",
                        label, name, e
                    );
                    label.to_string()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for ZoneIdName {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut zones = Self::new();
        for (id, name) in iter {
            zones.add(id, name.as_ref());
        }
        zones
    }
}

/// Allow-list of zone ids; empty allows every zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneIdFilter(Vec<String>);

impl ZoneIdFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            ids.into_iter()
                .map(Into::into)
                .filter(|id: &String| !id.trim().is_empty())
                .collect(),
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn matches(&self, zone_id: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|id| id == zone_id)
    }
}
