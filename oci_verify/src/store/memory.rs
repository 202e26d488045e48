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

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use oci_verify_types::{
    AttachmentDescriptor, ListPage, ReferenceManifest, ReferrerStore, SubjectReference,
};

use crate::digest::sha256_digest;

/// A store held entirely in memory, populated through its builder methods.
///
/// Listing is paginated by `page_size`; the continuation token is the offset
/// of the next descriptor.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    name: String,
    page_size: usize,
    tags: HashMap<String, AttachmentDescriptor>,
    referrers: HashMap<String, Vec<AttachmentDescriptor>>,
    manifests: HashMap<String, ReferenceManifest>,
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            page_size: usize::MAX,
            tags: HashMap::new(),
            referrers: HashMap::new(),
            manifests: HashMap::new(),
            blobs: HashMap::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_tag(mut self, tag: &str, descriptor: AttachmentDescriptor) -> Self {
        self.tags.insert(tag.to_string(), descriptor);
        self
    }

    /// Records `descriptor` as an attachment of the object with
    /// `subject_digest`.
    pub fn with_referrer(mut self, subject_digest: &str, descriptor: AttachmentDescriptor) -> Self {
        self.referrers.entry(subject_digest.to_string()).or_default().push(descriptor);
        self
    }

    pub fn with_manifest(mut self, digest: &str, manifest: ReferenceManifest) -> Self {
        self.manifests.insert(digest.to_string(), manifest);
        self
    }

    /// Stores `content` and returns the store with the digest it is
    /// addressable by.
    pub fn with_blob(mut self, content: &[u8]) -> (Self, String) {
        let digest = sha256_digest(content);
        self.blobs.insert(digest.clone(), content.to_vec());
        (self, digest)
    }
}

#[async_trait]
impl ReferrerStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_subject(
        &self,
        subject: &SubjectReference,
    ) -> anyhow::Result<AttachmentDescriptor> {
        if let Some(digest) = subject.digest() {
            return Ok(AttachmentDescriptor { digest: digest.to_string(), ..Default::default() });
        }
        let tag = subject.tag().context("reference has neither tag nor digest")?;
        self.tags.get(tag).cloned().with_context(|| format!("tag {tag} not found in {}", self.name))
    }

    async fn list_attachments(
        &self,
        subject: &SubjectReference,
        artifact_types: &[String],
        continuation_token: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        let digest = subject.digest().context("cannot list referrers of an unresolved subject")?;
        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().context("invalid continuation token")?,
            None => 0,
        };
        let matching: Vec<&AttachmentDescriptor> = self
            .referrers
            .get(digest)
            .map(|all| all.iter().filter(|d| d.matches_any(artifact_types)).collect())
            .unwrap_or_default();
        let end = offset.saturating_add(self.page_size).min(matching.len());
        let descriptors =
            matching.get(offset..end).unwrap_or_default().iter().map(|d| (*d).clone()).collect();
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(ListPage { descriptors, next_token })
    }

    async fn fetch_manifest(
        &self,
        _subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        self.manifests
            .get(&descriptor.digest)
            .cloned()
            .with_context(|| format!("manifest {} not found in {}", descriptor.digest, self.name))
    }

    async fn fetch_blob(
        &self,
        _subject: &SubjectReference,
        digest: &str,
    ) -> anyhow::Result<Vec<u8>> {
        self.blobs
            .get(digest)
            .cloned()
            .with_context(|| format!("blob {digest} not found in {}", self.name))
    }
}
