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

//! Maps adapter type names from the configuration to constructors.
//!
//! A type that is not registered is looked up as an executable of the same
//! name in the plugins directory and run through the plugin protocol.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use oci_verify_types::{Policy, PolicyError, ReferrerStore, Verifier};
use serde::Deserialize;

use crate::{
    config::{AdapterSettings, ConfigError, PolicySettings},
    plugin::{PluginCommand, PluginStore, PluginVerifier, PluginVerifierSettings},
    policy::{ConfigPolicy, PermissivePolicy, StrictPolicy},
    store::{OciLayoutSettings, OciLayoutStore},
    verifiers::{SbomSettings, SbomVerifier, SignatureSettings, SignatureVerifier},
};

pub const OCI_LAYOUT_STORE: &str = "oci-layout";
pub const PLUGIN: &str = "plugin";
pub const SBOM_VERIFIER: &str = "sbom";
pub const SIGNATURE_VERIFIER: &str = "signature";
pub const CONFIG_POLICY: &str = "config";
pub const STRICT_POLICY: &str = "strict";
pub const PERMISSIVE_POLICY: &str = "permissive";

/// Where relative paths in adapter settings are resolved.
#[derive(Clone, Debug, Default)]
pub struct BuildContext {
    pub base_dir: PathBuf,
    pub plugins_dir: Option<PathBuf>,
}

impl BuildContext {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn plugin_executable(&self, type_name: &str) -> Option<PathBuf> {
        let path = self.plugins_dir.as_ref()?.join(type_name);
        path.is_file().then_some(path)
    }
}

pub type StoreConstructor =
    fn(&AdapterSettings, &BuildContext) -> anyhow::Result<Arc<dyn ReferrerStore>>;
pub type VerifierConstructor =
    fn(&AdapterSettings, &BuildContext) -> anyhow::Result<Arc<dyn Verifier>>;
pub type PolicyConstructor = fn(&PolicySettings) -> Result<Arc<dyn Policy>, PolicyError>;

pub struct AdapterRegistry {
    stores: HashMap<String, StoreConstructor>,
    verifiers: HashMap<String, VerifierConstructor>,
    policies: HashMap<String, PolicyConstructor>,
}

impl Default for AdapterRegistry {
    /// A registry with every built-in adapter.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_store(OCI_LAYOUT_STORE, oci_layout_store);
        registry.register_store(PLUGIN, plugin_store);
        registry.register_verifier(SBOM_VERIFIER, sbom_verifier);
        registry.register_verifier(SIGNATURE_VERIFIER, signature_verifier);
        registry.register_verifier(PLUGIN, plugin_verifier);
        registry.register_policy(CONFIG_POLICY, config_policy);
        registry.register_policy(STRICT_POLICY, strict_policy);
        registry.register_policy(PERMISSIVE_POLICY, permissive_policy);
        registry
    }
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self { stores: HashMap::new(), verifiers: HashMap::new(), policies: HashMap::new() }
    }

    /// Registers `constructor` for `type_name`, replacing any previous one.
    pub fn register_store(&mut self, type_name: &str, constructor: StoreConstructor) {
        self.stores.insert(type_name.to_string(), constructor);
    }

    pub fn register_verifier(&mut self, type_name: &str, constructor: VerifierConstructor) {
        self.verifiers.insert(type_name.to_string(), constructor);
    }

    pub fn register_policy(&mut self, type_name: &str, constructor: PolicyConstructor) {
        self.policies.insert(type_name.to_string(), constructor);
    }

    pub fn create_store(
        &self,
        settings: &AdapterSettings,
        context: &BuildContext,
    ) -> Result<Arc<dyn ReferrerStore>, ConfigError> {
        let type_name = settings.type_name();
        let created = match (self.stores.get(type_name), context.plugin_executable(type_name)) {
            (Some(constructor), _) => constructor(settings, context),
            (None, Some(path)) => {
                log::debug!("store {} uses plugin {}", settings.name, path.display());
                Ok(Arc::new(PluginStore::new(
                    &settings.name,
                    PluginCommand::new(path),
                    plugin_config(settings),
                )) as Arc<dyn ReferrerStore>)
            }
            (None, None) => {
                return Err(ConfigError::UnknownType {
                    kind: "store",
                    type_name: type_name.to_string(),
                })
            }
        };
        created.map_err(|source| ConfigError::Adapter {
            kind: "store",
            name: settings.name.clone(),
            source,
        })
    }

    pub fn create_verifier(
        &self,
        settings: &AdapterSettings,
        context: &BuildContext,
    ) -> Result<Arc<dyn Verifier>, ConfigError> {
        let type_name = settings.type_name();
        let created = match (self.verifiers.get(type_name), context.plugin_executable(type_name))
        {
            (Some(constructor), _) => constructor(settings, context),
            (None, Some(path)) => {
                log::debug!("verifier {} uses plugin {}", settings.name, path.display());
                external_verifier(settings, type_name, path)
            }
            (None, None) => {
                return Err(ConfigError::UnknownType {
                    kind: "verifier",
                    type_name: type_name.to_string(),
                })
            }
        };
        created.map_err(|source| ConfigError::Adapter {
            kind: "verifier",
            name: settings.name.clone(),
            source,
        })
    }

    pub fn create_policy(&self, settings: &PolicySettings) -> Result<Arc<dyn Policy>, ConfigError> {
        let constructor = self.policies.get(&settings.kind).ok_or_else(|| {
            ConfigError::UnknownType { kind: "policy", type_name: settings.kind.clone() }
        })?;
        Ok(constructor(settings)?)
    }
}

#[derive(Deserialize)]
struct PluginLocation {
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Settings forwarded to a plugin: everything besides the executable path.
fn plugin_config(settings: &AdapterSettings) -> serde_json::Value {
    let mut config = settings.settings.clone();
    config.remove("path");
    serde_json::Value::Object(config)
}

fn plugin_command(
    settings: &AdapterSettings,
    context: &BuildContext,
) -> anyhow::Result<PluginCommand> {
    let location: PluginLocation = settings.parse()?;
    let path = match location.path {
        Some(path) => context.resolve(&path),
        None => context
            .plugins_dir
            .as_ref()
            .map(|dir| dir.join(&settings.name))
            .context("plugin adapters need a path or a plugins directory")?,
    };
    Ok(PluginCommand::new(path))
}

fn oci_layout_store(
    settings: &AdapterSettings,
    context: &BuildContext,
) -> anyhow::Result<Arc<dyn ReferrerStore>> {
    let mut layout: OciLayoutSettings = settings.parse()?;
    layout.path = context.resolve(&layout.path);
    Ok(Arc::new(OciLayoutStore::from_settings(&settings.name, layout)))
}

fn plugin_store(
    settings: &AdapterSettings,
    context: &BuildContext,
) -> anyhow::Result<Arc<dyn ReferrerStore>> {
    let command = plugin_command(settings, context)?;
    Ok(Arc::new(PluginStore::new(&settings.name, command, plugin_config(settings))))
}

fn sbom_verifier(
    settings: &AdapterSettings,
    _context: &BuildContext,
) -> anyhow::Result<Arc<dyn Verifier>> {
    let sbom: SbomSettings = settings.parse()?;
    Ok(Arc::new(SbomVerifier::new(&settings.name, sbom)))
}

fn signature_verifier(
    settings: &AdapterSettings,
    context: &BuildContext,
) -> anyhow::Result<Arc<dyn Verifier>> {
    let signature: SignatureSettings = settings.parse()?;
    Ok(Arc::new(SignatureVerifier::from_settings(&settings.name, signature, &context.base_dir)?))
}

fn plugin_verifier(
    settings: &AdapterSettings,
    context: &BuildContext,
) -> anyhow::Result<Arc<dyn Verifier>> {
    let command = plugin_command(settings, context)?;
    let plugin: PluginVerifierSettings = settings.parse()?;
    Ok(Arc::new(PluginVerifier::new(&settings.name, PLUGIN, command, plugin)))
}

fn external_verifier(
    settings: &AdapterSettings,
    type_name: &str,
    path: PathBuf,
) -> anyhow::Result<Arc<dyn Verifier>> {
    let plugin: PluginVerifierSettings = settings.parse()?;
    Ok(Arc::new(PluginVerifier::new(&settings.name, type_name, PluginCommand::new(path), plugin)))
}

fn config_policy(settings: &PolicySettings) -> Result<Arc<dyn Policy>, PolicyError> {
    Ok(Arc::new(ConfigPolicy::from_settings(&settings.to_value())?))
}

fn strict_policy(_settings: &PolicySettings) -> Result<Arc<dyn Policy>, PolicyError> {
    Ok(Arc::new(StrictPolicy))
}

fn permissive_policy(_settings: &PolicySettings) -> Result<Arc<dyn Policy>, PolicyError> {
    Ok(Arc::new(PermissivePolicy))
}
