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

use core::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    descriptor::{AttachmentDescriptor, ReferenceManifest},
    reference::SubjectReference,
};

/// One page of a referrer listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    #[serde(default)]
    pub descriptors: Vec<AttachmentDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Raised when a call to a store or verifier does not complete in time.
/// Policies recognize it by downcasting the [`anyhow::Error`] they are given.
#[derive(Debug, Error)]
#[error("{operation} timed out after {after:?}")]
pub struct AdapterTimeout {
    pub operation: String,
    pub after: Duration,
}

/// A source of attachments: something that can resolve tags, list referrers
/// and hand out manifests and blobs.
#[async_trait]
pub trait ReferrerStore: Send + Sync {
    fn name(&self) -> &str;

    /// Maps a tagged reference to the descriptor of the object it points
    /// at.
    async fn resolve_subject(
        &self,
        subject: &SubjectReference,
    ) -> anyhow::Result<AttachmentDescriptor>;

    /// Lists one page of attachments referencing `subject`. Stores may
    /// ignore `artifact_types`; callers filter again.
    async fn list_attachments(
        &self,
        subject: &SubjectReference,
        artifact_types: &[String],
        continuation_token: Option<&str>,
    ) -> anyhow::Result<ListPage>;

    async fn fetch_manifest(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest>;

    async fn fetch_blob(&self, subject: &SubjectReference, digest: &str)
        -> anyhow::Result<Vec<u8>>;
}
