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

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};
use oci_verify_types::{
    AttachmentDescriptor, ListPage, ReferenceManifest, ReferrerStore, SubjectReference,
};
use serde::Deserialize;

use crate::digest::{sha256_hex, verify_digest};

/// Index annotation holding the tag of a manifest.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciLayoutSettings {
    pub path: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Serves a subject and its referrers from an OCI image layout directory
/// (`index.json` plus `blobs/sha256/<hex>`).
///
/// The layout is read on every call, so it may be updated while the store is
/// in use. Registry and repository of the subject are ignored: a layout holds
/// a single repository.
#[derive(Clone, Debug)]
pub struct OciLayoutStore {
    name: String,
    root: PathBuf,
    page_size: usize,
}

impl OciLayoutStore {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self { name: name.to_string(), root: root.into(), page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn from_settings(name: &str, settings: OciLayoutSettings) -> Self {
        Self::new(name, settings.path).with_page_size(settings.page_size)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn read_index(&self) -> anyhow::Result<ImageIndex> {
        let path = self.root.join("index.json");
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("could not parse {}", path.display()))
    }

    async fn read_blob(&self, digest: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join("blobs").join("sha256").join(sha256_hex(digest)?);
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("could not read blob {}", path.display()))?;
        verify_digest(digest, &content).with_context(|| format!("corrupt blob {digest}"))?;
        Ok(content)
    }

    async fn read_manifest(&self, digest: &str) -> anyhow::Result<ImageManifest> {
        let content = self.read_blob(digest).await?;
        serde_json::from_slice(&content)
            .with_context(|| format!("blob {digest} is not an image manifest"))
    }
}

fn annotations(descriptor: &Descriptor) -> BTreeMap<String, String> {
    descriptor
        .annotations()
        .as_ref()
        .map(|annotations| annotations.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn attachment(descriptor: &Descriptor, artifact_type: String) -> AttachmentDescriptor {
    AttachmentDescriptor {
        digest: descriptor.digest().to_string(),
        artifact_type,
        media_type: descriptor.media_type().to_string(),
        size: descriptor.size(),
        annotations: annotations(descriptor),
    }
}

fn artifact_type_of(manifest: &ImageManifest) -> String {
    match manifest.artifact_type() {
        Some(artifact_type) => artifact_type.to_string(),
        None => manifest.config().media_type().to_string(),
    }
}

fn entry_artifact_type(descriptor: &Descriptor) -> String {
    descriptor.artifact_type().as_ref().map(ToString::to_string).unwrap_or_default()
}

#[async_trait]
impl ReferrerStore for OciLayoutStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_subject(
        &self,
        subject: &SubjectReference,
    ) -> anyhow::Result<AttachmentDescriptor> {
        let index = self.read_index().await?;
        let entry = match (subject.digest(), subject.tag()) {
            (Some(digest), _) => {
                index.manifests().iter().find(|entry| entry.digest().to_string() == digest)
            }
            (None, Some(tag)) => index.manifests().iter().find(|entry| {
                entry
                    .annotations()
                    .as_ref()
                    .and_then(|annotations| annotations.get(REF_NAME_ANNOTATION))
                    .is_some_and(|name| name == tag)
            }),
            (None, None) => None,
        };
        let entry = entry
            .with_context(|| format!("{subject} not found in layout {}", self.root.display()))?;
        Ok(attachment(entry, entry_artifact_type(entry)))
    }

    async fn list_attachments(
        &self,
        subject: &SubjectReference,
        artifact_types: &[String],
        continuation_token: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        let subject_digest =
            subject.digest().context("cannot list referrers of an unresolved subject")?;
        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().context("invalid continuation token")?,
            None => 0,
        };

        let index = self.read_index().await?;
        let mut descriptors = Vec::new();
        let mut next_token = None;
        for (position, entry) in index.manifests().iter().enumerate().skip(offset) {
            if descriptors.len() == self.page_size {
                next_token = Some(position.to_string());
                break;
            }
            let digest = entry.digest().to_string();
            let manifest = match self.read_manifest(&digest).await {
                Ok(manifest) => manifest,
                Err(err) => {
                    log::debug!("skipping index entry {digest}: {err:#}");
                    continue;
                }
            };
            let refers_to_subject = manifest
                .subject()
                .as_ref()
                .is_some_and(|referenced| referenced.digest().to_string() == subject_digest);
            if !refers_to_subject {
                continue;
            }
            let descriptor = attachment(entry, artifact_type_of(&manifest));
            if descriptor.matches_any(artifact_types) {
                descriptors.push(descriptor);
            }
        }
        Ok(ListPage { descriptors, next_token })
    }

    async fn fetch_manifest(
        &self,
        _subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        let manifest = self.read_manifest(&descriptor.digest).await?;
        Ok(ReferenceManifest {
            media_type: manifest.media_type().as_ref().map(ToString::to_string).unwrap_or_default(),
            artifact_type: Some(artifact_type_of(&manifest)),
            blobs: manifest
                .layers()
                .iter()
                .map(|layer| attachment(layer, entry_artifact_type(layer)))
                .collect(),
            subject: manifest
                .subject()
                .as_ref()
                .map(|subject| attachment(subject, entry_artifact_type(subject))),
            annotations: manifest.annotations().clone().unwrap_or_default().into_iter().collect(),
        })
    }

    async fn fetch_blob(
        &self,
        _subject: &SubjectReference,
        digest: &str,
    ) -> anyhow::Result<Vec<u8>> {
        self.read_blob(digest).await
    }
}
