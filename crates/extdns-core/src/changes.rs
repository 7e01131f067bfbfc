//! Change batch passed from the plan through the registry to a provider

use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, sort_endpoints};

/// A batch of record changes
///
/// `update_old[i]` and `update_new[i]` describe the same record before and
/// after the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_old: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_new: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<Endpoint>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }

    /// Number of records touched, counting an update once
    pub fn len(&self) -> usize {
        self.create.len() + self.update_new.len() + self.delete.len()
    }

    /// Sort creates and deletes by identity key, and update pairs by the key
    /// of their new state
    pub fn sort(&mut self) {
        sort_endpoints(&mut self.create);
        sort_endpoints(&mut self.delete);
        let mut pairs: Vec<(Endpoint, Endpoint)> = self
            .update_old
            .drain(..)
            .zip(self.update_new.drain(..))
            .collect();
        pairs.sort_by_key(|(_, new)| new.key());
        (self.update_old, self.update_new) = pairs.into_iter().unzip();
    }
}
