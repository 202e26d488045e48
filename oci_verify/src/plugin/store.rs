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

use anyhow::Context;
use async_trait::async_trait;
use oci_verify_types::{
    AttachmentDescriptor, ListPage, ReferenceManifest, ReferrerStore, SubjectReference,
};
use serde_json::json;

use super::PluginCommand;
use crate::digest::verify_digest;

pub const RESOLVE_SUBJECT: &str = "RESOLVE_SUBJECT";
pub const LIST_REFERRERS: &str = "LIST_REFERRERS";
pub const GET_MANIFEST: &str = "GET_MANIFEST";
pub const GET_BLOB: &str = "GET_BLOB";

/// A store backed by a plugin executable, typically bridging to a registry.
///
/// Every request carries the store's own settings under `config`. Blobs are
/// returned as raw bytes on stdout and checked against their digest.
pub struct PluginStore {
    name: String,
    command: PluginCommand,
    config: serde_json::Value,
}

impl PluginStore {
    pub fn new(name: &str, command: PluginCommand, config: serde_json::Value) -> Self {
        Self { name: name.to_string(), command, config }
    }
}

#[async_trait]
impl ReferrerStore for PluginStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_subject(
        &self,
        subject: &SubjectReference,
    ) -> anyhow::Result<AttachmentDescriptor> {
        let request = json!({ "config": self.config, "subject": subject.to_string() });
        self.command
            .run(RESOLVE_SUBJECT, subject, &request)
            .await
            .with_context(|| format!("plugin store {} could not resolve {subject}", self.name))
    }

    async fn list_attachments(
        &self,
        subject: &SubjectReference,
        artifact_types: &[String],
        continuation_token: Option<&str>,
    ) -> anyhow::Result<ListPage> {
        let request = json!({
            "config": self.config,
            "subject": subject.to_string(),
            "artifactTypes": artifact_types,
            "nextToken": continuation_token,
        });
        self.command
            .run(LIST_REFERRERS, subject, &request)
            .await
            .with_context(|| format!("plugin store {} could not list referrers", self.name))
    }

    async fn fetch_manifest(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
    ) -> anyhow::Result<ReferenceManifest> {
        let request = json!({
            "config": self.config,
            "subject": subject.to_string(),
            "descriptor": descriptor,
        });
        self.command.run(GET_MANIFEST, subject, &request).await.with_context(|| {
            format!("plugin store {} could not fetch manifest {}", self.name, descriptor.digest)
        })
    }

    async fn fetch_blob(
        &self,
        subject: &SubjectReference,
        digest: &str,
    ) -> anyhow::Result<Vec<u8>> {
        let request = json!({
            "config": self.config,
            "subject": subject.to_string(),
            "digest": digest,
        });
        let content = self
            .command
            .run_raw(GET_BLOB, subject, &request)
            .await
            .with_context(|| format!("plugin store {} could not fetch blob {digest}", self.name))?;
        verify_digest(digest, &content)?;
        Ok(content)
    }
}
