//! Static registry of door relays that tokens can be minted for.
//!
//! Built once at startup from [`TargetConfig`] entries and never mutated, so
//! it is shared behind an `Arc` without locking.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::TargetConfig;

/// A named physical actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub key: String,
    /// Opaque upstream device identifier.
    #[serde(skip)]
    pub device_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate target key {0:?}")]
    Duplicate(String),
}

/// Keyed, immutable set of [`Target`]s. Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
}

impl TargetRegistry {
    pub fn new(entries: impl IntoIterator<Item = TargetConfig>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for entry in entries {
            if registry.index.contains_key(&entry.key) {
                return Err(RegistryError::Duplicate(entry.key));
            }
            registry
                .index
                .insert(entry.key.clone(), registry.targets.len());
            registry.targets.push(Target {
                key: entry.key,
                device_id: entry.device_id,
                display_name: entry.name,
            });
        }
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<&Target> {
        self.index.get(key).map(|&i| &self.targets[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, id: &str) -> TargetConfig {
        TargetConfig {
            key: key.into(),
            device_id: id.into(),
            name: format!("{key} name"),
        }
    }

    #[test]
    fn lookup_by_key() {
        let reg = TargetRegistry::new([entry("a", "1"), entry("b", "2")]).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("b").unwrap().device_id, "2");
        assert!(reg.get("c").is_none());
        let keys: Vec<_> = reg.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let err = TargetRegistry::new([entry("a", "1"), entry("a", "2")]).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("a".into()));
    }

    #[test]
    fn serialization_hides_device_id() {
        let reg = TargetRegistry::new([entry("a", "secret-id")]).unwrap();
        let json = serde_json::to_value(reg.get("a").unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"key": "a", "name": "a name"}));
    }
}
