//
// Copyright 2025 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The configuration file: executor limits, stores, verifiers, the policy
//! and optional per-scope overrides.
//!
//! ```json
//! {
//!   "executor": { "requestTimeoutMillis": 30000, "maxDepth": 4 },
//!   "stores": [{ "name": "local", "type": "oci-layout", "path": "./layout" }],
//!   "verifiers": [{ "name": "licenses", "type": "sbom", "disallowedLicenses": ["GPL-3.0"] }],
//!   "policy": { "type": "config", "artifactVerificationPolicies": { "default": "all" } }
//! }
//! ```
//!
//! Files ending in `.toml` are read as TOML, everything else as JSON.

use core::time::Duration;
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use oci_verify_types::PolicyError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    adapters::{AdapterSet, ScopedAdapters},
    executor::{
        ExecutorConfig, DEFAULT_ADAPTER_TIMEOUT, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_DEPTH,
        DEFAULT_REQUEST_TIMEOUT,
    },
    registry::{AdapterRegistry, BuildContext},
    store::{CachedStore, DEFAULT_CACHE_CAPACITY},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse configuration {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("unknown {kind} type {type_name}")]
    UnknownType { kind: &'static str, type_name: String },
    #[error("could not create {kind} {name}")]
    Adapter {
        kind: &'static str,
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("more than one {kind} is named {name}")]
    Duplicate { kind: &'static str, name: String },
}

/// Settings of one store or verifier. Everything besides the common keys is
/// left for the adapter's constructor to interpret.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    pub name: String,
    /// Registered type of the adapter. Defaults to the name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Stores only: keep results for this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
    /// Stores only: how many results of each kind the cache keeps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl AdapterSettings {
    pub fn new(name: &str, kind: &str) -> Self {
        Self { name: name.to_string(), kind: Some(kind.to_string()), ..Default::default() }
    }

    pub fn with_setting(mut self, key: &str, value: serde_json::Value) -> Self {
        self.settings.insert(key.to_string(), value);
        self
    }

    pub fn type_name(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    /// Deserializes the adapter-specific settings.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PolicySettings {
    pub fn new(kind: &str) -> Self {
        Self { kind: kind.to_string(), settings: serde_json::Map::new() }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.settings.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorSettings {
    pub request_timeout_millis: u64,
    pub adapter_timeout_millis: u64,
    pub max_concurrency: usize,
    pub max_depth: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            request_timeout_millis: millis(DEFAULT_REQUEST_TIMEOUT),
            adapter_timeout_millis: millis(DEFAULT_ADAPTER_TIMEOUT),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        ExecutorConfig {
            request_timeout: Duration::from_millis(settings.request_timeout_millis),
            adapter_timeout: Duration::from_millis(settings.adapter_timeout_millis),
            max_concurrency: settings.max_concurrency,
            max_depth: settings.max_depth,
        }
    }
}

/// Stores, verifiers and policy of one adapter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// In priority order.
    #[serde(default)]
    pub stores: Vec<AdapterSettings>,
    /// In registration order.
    #[serde(default)]
    pub verifiers: Vec<AdapterSettings>,
    pub policy: PolicySettings,
}

impl AdapterConfig {
    /// Instantiates every adapter through `registry`.
    pub fn build(
        &self,
        registry: &AdapterRegistry,
        context: &BuildContext,
    ) -> Result<AdapterSet, ConfigError> {
        check_unique("store", &self.stores)?;
        check_unique("verifier", &self.verifiers)?;

        let mut adapters = AdapterSet::new(registry.create_policy(&self.policy)?);
        for settings in &self.stores {
            let store = registry.create_store(settings, context)?;
            let store = match settings.cache_ttl_seconds {
                Some(ttl) => Arc::new(CachedStore::with_capacity(
                    store,
                    Duration::from_secs(ttl),
                    settings.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
                )),
                None => store,
            };
            adapters = adapters.with_store(store);
        }
        for settings in &self.verifiers {
            adapters = adapters.with_verifier(registry.create_verifier(settings, context)?);
        }
        Ok(adapters)
    }
}

fn check_unique(kind: &'static str, adapters: &[AdapterSettings]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for settings in adapters {
        if !names.insert(settings.name.as_str()) {
            return Err(ConfigError::Duplicate { kind, name: settings.name.clone() });
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(flatten)]
    pub adapters: AdapterConfig,
    /// Adapter sets selected by naming a scope in the request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scopes: BTreeMap<String, AdapterConfig>,
    /// Where executables for plugin adapters are looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        if path.extension().is_some_and(|extension| extension == "toml") {
            Self::from_toml(&content, path)
        } else {
            Self::from_json(&content, path)
        }
    }

    pub fn from_json(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|err| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::from(&self.executor)
    }

    /// Resolves relative paths against `base_dir`, normally the directory
    /// of the configuration file.
    pub fn build_context(&self, base_dir: &Path) -> BuildContext {
        BuildContext {
            base_dir: base_dir.to_path_buf(),
            plugins_dir: self.plugins_dir.as_ref().map(|dir| base_dir.join(dir)),
        }
    }

    /// Builds the default adapter set.
    pub fn build(
        &self,
        registry: &AdapterRegistry,
        base_dir: &Path,
    ) -> Result<AdapterSet, ConfigError> {
        self.adapters.build(registry, &self.build_context(base_dir))
    }

    /// Builds the default adapter set and one set per configured scope.
    pub fn build_provider(
        &self,
        registry: &AdapterRegistry,
        base_dir: &Path,
    ) -> Result<ScopedAdapters, ConfigError> {
        let context = self.build_context(base_dir);
        let provider = ScopedAdapters::new();
        provider.set_default(self.adapters.build(registry, &context)?);
        for (scope, adapters) in &self.scopes {
            provider.set_scope(scope, adapters.build(registry, &context)?);
        }
        Ok(provider)
    }
}
