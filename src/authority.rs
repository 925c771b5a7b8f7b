//! Authority references for index entries.
//!
//! The pipeline never owns authority records; it only attaches an opaque
//! reference to each entry. [`GroupedAuthorities`] derives that reference
//! from a grouping key so equal terms share an authority:
//!
//! | Policy | Key |
//! |--------|-----|
//! | `service/normalize` | service, type, normalized label |
//! | `global/normalize` | type, normalized label |
//! | `service/strict` | service, type, label |

use std::collections::HashMap;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use crate::index_entries::IndexEntry;

pub trait AuthorityResolver: Send {
    /// Reference of the authority grouping `entry` for `service_code`.
    fn resolve(&mut self, service_code: &str, entry: &IndexEntry) -> String;

    fn resolve_all(&mut self, service_code: &str, entries: &mut [IndexEntry]) {
        for entry in entries.iter_mut() {
            entry.authority = Some(self.resolve(service_code, entry));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    ServiceNormalized,
    GlobalNormalized,
    ServiceStrict,
}

impl Grouping {
    pub fn parse(value: &str) -> Result<Self> {
        Ok(match value {
            "service/normalize" => Grouping::ServiceNormalized,
            "global/normalize" => Grouping::GlobalNormalized,
            "service/strict" => Grouping::ServiceStrict,
            other => bail!("unknown authority grouping '{}'", other),
        })
    }
}

/// Hash-based resolver memoised per worker.
pub struct GroupedAuthorities {
    grouping: Grouping,
    cache: HashMap<(String, String, String), String>,
}

impl GroupedAuthorities {
    pub fn new(grouping: Grouping) -> Self {
        GroupedAuthorities {
            grouping,
            cache: HashMap::new(),
        }
    }
}

impl AuthorityResolver for GroupedAuthorities {
    fn resolve(&mut self, service_code: &str, entry: &IndexEntry) -> String {
        let key = match self.grouping {
            Grouping::ServiceNormalized => (
                service_code.to_string(),
                entry.kind.clone(),
                entry.normalized.clone(),
            ),
            Grouping::GlobalNormalized => {
                (String::new(), entry.kind.clone(), entry.normalized.clone())
            }
            Grouping::ServiceStrict => (
                service_code.to_string(),
                entry.kind.clone(),
                entry.label.clone(),
            ),
        };
        self.cache
            .entry(key)
            .or_insert_with_key(|(service, kind, label)| {
                let mut hasher = Sha256::new();
                hasher.update(format!("{}\u{1f}{}\u{1f}{}", service, kind, label).as_bytes());
                format!("{:x}", hasher.finalize())
            })
            .clone()
    }
}
