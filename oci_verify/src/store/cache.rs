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

use core::{hash::Hash, num::NonZeroUsize, time::Duration};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use oci_verify_types::{
    AttachmentDescriptor, ListPage, ReferenceManifest, ReferrerStore, SubjectReference,
};
use tokio::time::Instant;

/// Entries kept per cached operation when no capacity is configured.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A bounded LRU map whose entries also expire `ttl` after insertion.
struct TtlCache<K: Hash + Eq, V> {
    ttl: Duration,
    entries: Mutex<LruCache<K, (Instant, V)>>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self { ttl, entries: Mutex::new(LruCache::new(capacity)) }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, (Instant, V)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => {
                return Some(value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    fn insert(&self, key: K, value: V) {
        self.lock().put(key, (Instant::now(), value));
    }
}

type PageKey = (String, Vec<String>, Option<String>);

/// Keeps resolution results, listing pages and manifests of another store
/// for a fixed time. Failures are never cached and blobs always go to the
/// inner store.
///
/// Each kind of result holds at most `capacity` entries; the least recently
/// used one is evicted first.
pub struct CachedStore {
    inner: Arc<dyn ReferrerStore>,
    subjects: TtlCache<String, AttachmentDescriptor>,
    pages: TtlCache<PageKey, ListPage>,
    manifests: TtlCache<String, ReferenceManifest>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn ReferrerStore>, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_CACHE_CAPACITY)
    }

    /// A zero `capacity` is treated as one.
    pub fn with_capacity(inner: Arc<dyn ReferrerStore>, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            subjects: TtlCache::new(ttl, capacity),
            pages: TtlCache::new(ttl, capacity),
            manifests: TtlCache::new(ttl, capacity),
        }
    }
}

#[async_trait]
impl ReferrerStore for CachedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn resolve_subject(
        &self,
        subject: &SubjectReference,
    ) -> anyhow::Result<AttachmentDescriptor> {
        let key = subject.to_string();
        if let Some(descriptor) = self.subjects.get(&key) {
            return Ok(descriptor);
        }
        let descriptor = self.inner.resolve_subject(subject).await?;
        self.subjects.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    async fn list_attachments(
        &self,
        subject: &SubjectReference,
        artifact_types: &[String],
        continuation_token: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        let key =
            (subject.to_string(), artifact_types.to_vec(), continuation_token.map(str::to_string));
        if let Some(page) = self.pages.get(&key) {
            log::debug!("serving cached listing of {subject} from {}", self.name());
            return Ok(page);
        }
        let page =
            self.inner.list_attachments(subject, artifact_types, continuation_token).await?;
        self.pages.insert(key, page.clone());
        Ok(page)
    }

    async fn fetch_manifest(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        if let Some(manifest) = self.manifests.get(&descriptor.digest) {
            return Ok(manifest);
        }
        let manifest = self.inner.fetch_manifest(subject, descriptor).await?;
        self.manifests.insert(descriptor.digest.clone(), manifest.clone());
        Ok(manifest)
    }

    async fn fetch_blob(
        &self,
        subject: &SubjectReference,
        digest: &str,
    ) -> anyhow::Result<Vec<u8>> {
        self.inner.fetch_blob(subject, digest).await
    }
}
