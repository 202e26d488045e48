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

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use oci_verify_types::{Policy, ReferrerStore, Verifier};

/// The collaborators used to verify one subject: stores in priority order,
/// verifiers in registration order and a single policy.
#[derive(Clone)]
pub struct AdapterSet {
    pub stores: Vec<Arc<dyn ReferrerStore>>,
    pub verifiers: Vec<Arc<dyn Verifier>>,
    pub policy: Arc<dyn Policy>,
}

impl AdapterSet {
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self { stores: Vec::new(), verifiers: Vec::new(), policy }
    }

    pub fn with_store(mut self, store: Arc<dyn ReferrerStore>) -> Self {
        self.stores.push(store);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifiers.push(verifier);
        self
    }
}

impl core::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("stores", &self.stores.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("verifiers", &self.verifiers.iter().map(|v| v.name()).collect::<Vec<_>>())
            .field("policy", &self.policy.kind())
            .finish()
    }
}

/// Hands out the adapter set for a scope. The executor asks once per
/// request, so implementations may swap sets between requests.
pub trait AdapterProvider: Send + Sync {
    /// Returns the set for `scope`, or the default set when `scope` is
    /// `None`. `None` is returned for scopes that are not known.
    fn adapters(&self, scope: Option<&str>) -> Option<Arc<AdapterSet>>;
}

/// A provider with a single set, used regardless of the requested scope.
pub struct StaticAdapters(Arc<AdapterSet>);

impl StaticAdapters {
    pub fn new(adapters: AdapterSet) -> Self {
        Self(Arc::new(adapters))
    }
}

impl AdapterProvider for StaticAdapters {
    fn adapters(&self, _scope: Option<&str>) -> Option<Arc<AdapterSet>> {
        Some(self.0.clone())
    }
}

/// A provider keyed by scope name (for example a namespace), with an
/// optional default set for requests that do not name one.
#[derive(Default)]
pub struct ScopedAdapters {
    default: RwLock<Option<Arc<AdapterSet>>>,
    scopes: RwLock<HashMap<String, Arc<AdapterSet>>>,
}

impl ScopedAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&self, adapters: AdapterSet) {
        *write(&self.default) = Some(Arc::new(adapters));
    }

    pub fn set_scope(&self, scope: &str, adapters: AdapterSet) {
        log::info!("registering adapters for scope {scope}");
        write(&self.scopes).insert(scope.to_string(), Arc::new(adapters));
    }

    pub fn remove_scope(&self, scope: &str) -> bool {
        write(&self.scopes).remove(scope).is_some()
    }

    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = read(&self.scopes).keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

impl AdapterProvider for ScopedAdapters {
    fn adapters(&self, scope: Option<&str>) -> Option<Arc<AdapterSet>> {
        match scope {
            Some(scope) => read(&self.scopes).get(scope).cloned(),
            None => read(&self.default).clone(),
        }
    }
}

// A panic while holding one of these locks leaves the map itself intact.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
