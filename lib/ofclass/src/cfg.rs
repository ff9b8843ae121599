// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow table configuration.

use crate::api::Strategy;
use crate::api::TreeRoot;
use crate::engine::cache::CACHE_NODE_MAX_ENTRIES;
use serde::Deserialize;
use serde::Serialize;

pub const FLOW_TABLE_DEF_MAX_FLOWS: u32 = 8192;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub entries_per_bucket: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, entries_per_bucket: CACHE_NODE_MAX_ENTRIES }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: Strategy,
    /// Only meaningful for [`Strategy::Tree`].
    pub tree_root: TreeRoot,
    pub max_flows: u32,
    pub cache: CacheConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            tree_root: TreeRoot::default(),
            max_flows: FLOW_TABLE_DEF_MAX_FLOWS,
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "std")]
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("max_flows must be nonzero")]
    ZeroMaxFlows,

    #[error("cache.entries_per_bucket must be nonzero")]
    ZeroCacheEntries,
}

impl ClassifierConfig {
    /// Parse a configuration from TOML. Missing keys take their
    /// defaults.
    #[cfg(feature = "std")]
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flows == 0 {
            return Err(ConfigError::ZeroMaxFlows);
        }
        if self.cache.entries_per_bucket == 0 {
            return Err(ConfigError::ZeroCacheEntries);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClassifierConfig::from_toml("").unwrap();
        assert_eq!(cfg, ClassifierConfig::default());
        assert_eq!(cfg.strategy, Strategy::Tree);
        assert_eq!(cfg.tree_root, TreeRoot::Vlan);
        assert_eq!(cfg.max_flows, 8192);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.entries_per_bucket, 4);
    }

    #[test]
    fn from_toml() {
        let cfg = ClassifierConfig::from_toml(
            r#"
            strategy = "table_hash"
            max_flows = 16

            [cache]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategy, Strategy::TableHash);
        assert_eq!(cfg.max_flows, 16);
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.entries_per_bucket, 4);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            ClassifierConfig::from_toml("max_flows = 0"),
            Err(ConfigError::ZeroMaxFlows)
        ));
        assert!(matches!(
            ClassifierConfig::from_toml("[cache]\nentries_per_bucket = 0"),
            Err(ConfigError::ZeroCacheEntries)
        ));
        assert!(matches!(
            ClassifierConfig::from_toml("strategy = \"trie\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
