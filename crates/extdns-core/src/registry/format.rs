//! Companion record content codec
//!
//! Content looks like
//! `"heritage=external-dns,external-dns/owner=<id>,external-dns/resource=<ref>"`.
//! The current format is quoted; the legacy format is the same text without
//! quotes. Writers only ever emit the current format.

use std::collections::BTreeMap;
use std::fmt;

use crate::endpoint::{OWNER_LABEL, RESOURCE_LABEL};

/// Heritage marker identifying ownership records
pub const HERITAGE: &str = "external-dns";

/// A decoded ownership record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipRecord {
    /// Quoted content
    Current(BTreeMap<String, String>),
    /// Unquoted content
    Legacy(BTreeMap<String, String>),
}

impl OwnershipRecord {
    pub fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            OwnershipRecord::Current(labels) | OwnershipRecord::Legacy(labels) => labels,
        }
    }

    pub fn owner(&self) -> &str {
        self.labels().get(OWNER_LABEL).map(String::as_str).unwrap_or_default()
    }

    pub fn resource(&self) -> Option<&str> {
        self.labels().get(RESOURCE_LABEL).map(String::as_str)
    }
}

/// Why a TXT value is not a usable ownership record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No heritage marker: an ordinary TXT record
    NotOwnership,
    /// Heritage marker present but the content is unusable
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotOwnership => f.write_str("not an ownership record"),
            DecodeError::Malformed(reason) => write!(f, "malformed ownership record: {reason}"),
        }
    }
}

/// Encode labels in the current (quoted) format.
///
/// Heritage comes first, then labels sorted by key.
pub fn encode(labels: &BTreeMap<String, String>) -> String {
    let mut tokens = vec![format!("heritage={HERITAGE}")];
    tokens.extend(
        labels
            .iter()
            .map(|(key, value)| format!("{HERITAGE}/{key}={value}")),
    );
    format!("\"{}\"", tokens.join(","))
}

/// Decode a TXT value, trying the current format before the legacy one
pub fn decode(text: &str) -> Result<OwnershipRecord, DecodeError> {
    let text = text.trim();
    let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
    if quoted {
        parse(&text[1..text.len() - 1]).map(OwnershipRecord::Current)
    } else {
        parse(text).map(OwnershipRecord::Legacy)
    }
}

fn parse(body: &str) -> Result<BTreeMap<String, String>, DecodeError> {
    let mut heritage = None;
    let mut labels = BTreeMap::new();
    let mut bad_tokens = Vec::new();

    for token in body.split(',') {
        let mut parts = token.splitn(3, '=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            bad_tokens.push(token);
            continue;
        };
        let key = key.trim();
        if key == "heritage" {
            heritage = Some(value.trim());
        } else if let Some(label) = key.strip_prefix(HERITAGE).and_then(|k| k.strip_prefix('/')) {
            labels.insert(label.to_string(), value.trim().to_string());
        }
    }

    match heritage {
        None => Err(DecodeError::NotOwnership),
        Some(value) if value != HERITAGE => {
            Err(DecodeError::Malformed(format!("unknown heritage {value:?}")))
        }
        Some(_) if !bad_tokens.is_empty() => Err(DecodeError::Malformed(format!(
            "unparseable token {:?}",
            bad_tokens[0]
        ))),
        Some(_) => match labels.get(OWNER_LABEL) {
            Some(owner) if !owner.is_empty() => Ok(labels),
            _ => Err(DecodeError::Malformed("missing owner".to_string())),
        },
    }
}
