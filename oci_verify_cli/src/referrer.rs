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

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::{future::BoxFuture, FutureExt};
use oci_verify::{call::AdapterCalls, store::list_all_attachments, AdapterSet};
use oci_verify_types::{AttachmentDescriptor, ReferrerStore, StructuralMarker, SubjectReference};
use serde::Serialize;

use crate::flags::Target;

#[derive(Parser, Debug)]
#[command(about = "Inspect the attachments of a subject without verifying them")]
pub struct Referrer {
    #[command(subcommand)]
    pub command: ReferrerCommands,
}

impl Referrer {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        self.command.run(writer).await
    }
}

#[derive(Subcommand, Debug)]
pub enum ReferrerCommands {
    List(ListCommand),
    ShowManifest(ShowManifestCommand),
    ShowBlob(ShowBlobCommand),
}

impl ReferrerCommands {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        match self {
            Self::List(cmd) => cmd.run(writer).await,
            Self::ShowManifest(cmd) => cmd.run(writer).await,
            Self::ShowBlob(cmd) => cmd.run(writer).await,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Print the attachment tree of a subject, per store")]
pub struct ListCommand {
    #[command(flatten)]
    pub target: Target,

    #[arg(
        long = "artifact-type",
        help = "Only list direct attachments of this artifact type. May be repeated."
    )]
    pub artifact_types: Vec<String>,
}

/// What one store knows about a subject.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreListing {
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub referrers: Vec<ReferrerNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerNode {
    #[serde(flatten)]
    pub descriptor: AttachmentDescriptor,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub referrers: Vec<ReferrerNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<StructuralMarker>,
}

/// Lists the attachments of `subject` in `store` and, recursively, their
/// own attachments down to `max_depth` levels.
pub fn list_tree<'a>(
    store: &'a dyn ReferrerStore,
    subject: &'a SubjectReference,
    artifact_types: &'a [String],
    calls: &'a AdapterCalls,
    path: Vec<String>,
    max_depth: usize,
) -> BoxFuture<'a, anyhow::Result<Vec<ReferrerNode>>> {
    async move {
        let descriptors = list_all_attachments(store, subject, artifact_types, calls).await?;
        let mut nodes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let mut node = ReferrerNode { descriptor, referrers: Vec::new(), marker: None };
            if path.contains(&node.descriptor.digest) {
                node.marker = Some(StructuralMarker::Cycle);
            } else if path.len() >= max_depth {
                node.marker = Some(StructuralMarker::DepthLimit);
            } else {
                let child = subject.with_digest(&node.descriptor.digest);
                let mut child_path = path.clone();
                child_path.push(node.descriptor.digest.clone());
                node.referrers = list_tree(store, &child, &[], calls, child_path, max_depth)
                    .await
                    .with_context(|| format!("listing referrers of {child}"))?;
            }
            nodes.push(node);
        }
        Ok(nodes)
    }
    .boxed()
}

async fn list_store(
    store: &dyn ReferrerStore,
    subject: &SubjectReference,
    artifact_types: &[String],
    calls: &AdapterCalls,
    max_depth: usize,
) -> StoreListing {
    let mut listing = StoreListing {
        store: store.name().to_string(),
        digest: None,
        referrers: Vec::new(),
        error: None,
    };
    let resolved = match subject.digest() {
        Some(_) => Ok(subject.clone()),
        None => calls
            .run("resolving subject", store.resolve_subject(subject))
            .await
            .map(|descriptor| subject.with_digest(&descriptor.digest)),
    };
    let result = match resolved {
        Ok(resolved) => {
            listing.digest = resolved.digest().map(ToString::to_string);
            let path = listing.digest.iter().cloned().collect();
            list_tree(store, &resolved, artifact_types, calls, path, max_depth).await
        }
        Err(err) => Err(err),
    };
    match result {
        Ok(referrers) => listing.referrers = referrers,
        Err(err) => {
            log::warn!("store {} failed: {err:#}", store.name());
            listing.error = Some(format!("{err:#}"));
        }
    }
    listing
}

/// Produces one listing per store of `adapters`, in store order.
pub async fn list_stores(
    adapters: &AdapterSet,
    subject: &SubjectReference,
    artifact_types: &[String],
    calls: &AdapterCalls,
    max_depth: usize,
) -> Vec<StoreListing> {
    let mut listings = Vec::with_capacity(adapters.stores.len());
    for store in &adapters.stores {
        let listing = list_store(store.as_ref(), subject, artifact_types, calls, max_depth).await;
        listings.push(listing);
    }
    listings
}

impl ListCommand {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        let subject = self.target.reference()?;
        let (config, provider) = self.target.load()?;
        let adapters = self.target.adapters(provider.as_ref())?;
        let executor = config.executor_config();
        let calls = AdapterCalls::new(executor.max_concurrency, executor.adapter_timeout);

        let listings =
            list_stores(&adapters, &subject, &self.artifact_types, &calls, executor.max_depth)
                .await;

        serde_json::to_writer_pretty(&mut *writer, &listings)
            .context("could not serialize referrers to JSON")?;
        writeln!(writer).context("could not write referrers")?;
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(about = "Print a manifest from the first store that has it")]
pub struct ShowManifestCommand {
    #[command(flatten)]
    pub target: Target,

    #[arg(long, help = "Digest of the manifest, e.g. sha256:...")]
    pub digest: String,
}

impl ShowManifestCommand {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        let subject = self.target.reference()?;
        let (_, provider) = self.target.load()?;
        let adapters = self.target.adapters(provider.as_ref())?;
        let descriptor =
            AttachmentDescriptor { digest: self.digest.clone(), ..Default::default() };

        let mut failures = Vec::new();
        for store in &adapters.stores {
            match store.fetch_manifest(&subject, &descriptor).await {
                Ok(manifest) => {
                    serde_json::to_writer_pretty(&mut *writer, &manifest)
                        .context("could not serialize manifest to JSON")?;
                    writeln!(writer).context("could not write manifest")?;
                    return Ok(());
                }
                Err(err) => failures.push(format!("{}: {err:#}", store.name())),
            }
        }
        anyhow::bail!("manifest {} not found: {}", self.digest, failures.join("; "))
    }
}

#[derive(Parser, Debug)]
#[command(about = "Write a blob from the first store that has it")]
pub struct ShowBlobCommand {
    #[command(flatten)]
    pub target: Target,

    #[arg(long, help = "Digest of the blob, e.g. sha256:...")]
    pub digest: String,
}

impl ShowBlobCommand {
    pub async fn run(&self, writer: &mut dyn Write) -> anyhow::Result<()> {
        let subject = self.target.reference()?;
        let (_, provider) = self.target.load()?;
        let adapters = self.target.adapters(provider.as_ref())?;

        let mut failures = Vec::new();
        for store in &adapters.stores {
            match store.fetch_blob(&subject, &self.digest).await {
                Ok(content) => {
                    writer.write_all(&content).context("could not write blob")?;
                    return Ok(());
                }
                Err(err) => failures.push(format!("{}: {err:#}", store.name())),
            }
        }
        anyhow::bail!("blob {} not found: {}", self.digest, failures.join("; "))
    }
}
