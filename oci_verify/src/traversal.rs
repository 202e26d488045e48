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

use std::sync::Arc;

use futures::{future::BoxFuture, stream, FutureExt, StreamExt, TryStreamExt};
use oci_verify_types::{
    AttachmentDescriptor, ReferrerStore, StoreFailure, StructuralMarker, SubjectReference,
    VerificationNode,
};

use crate::{
    adapters::AdapterSet,
    aggregate::aggregate,
    call::AdapterCalls,
    dispatch::Dispatcher,
    executor::ExecutorError,
    store::list_all_attachments,
};

type StoreListing = (Arc<dyn ReferrerStore>, anyhow::Result<Vec<AttachmentDescriptor>>);

/// The children found below one subject.
struct Expansion {
    children: Vec<VerificationNode>,
    store_errors: Vec<StoreFailure>,
}

/// Walks the referrer graph of one subject for a single request.
pub(crate) struct Traversal<'a> {
    adapters: &'a AdapterSet,
    calls: &'a AdapterCalls,
    dispatcher: Dispatcher<'a>,
    max_concurrency: usize,
    max_depth: usize,
}

impl<'a> Traversal<'a> {
    pub fn new(
        adapters: &'a AdapterSet,
        calls: &'a AdapterCalls,
        max_concurrency: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            adapters,
            calls,
            dispatcher: Dispatcher {
                verifiers: &adapters.verifiers,
                policy: adapters.policy.as_ref(),
                calls,
            },
            max_concurrency: max_concurrency.max(1),
            max_depth,
        }
    }

    /// Maps a tagged reference to a digest reference by asking the stores in
    /// priority order. References that already carry a digest are returned
    /// unchanged.
    pub async fn resolve(
        &self,
        subject: &SubjectReference,
    ) -> Result<SubjectReference, ExecutorError> {
        if subject.is_resolved() {
            return Ok(subject.clone());
        }
        let mut failures = Vec::new();
        for store in &self.adapters.stores {
            let operation = format!("resolving {subject} in store {}", store.name());
            match self.calls.run(&operation, store.resolve_subject(subject)).await {
                Ok(descriptor) => {
                    log::info!("resolved {subject} to {} via {}", descriptor.digest, store.name());
                    return Ok(subject.with_digest(&descriptor.digest));
                }
                Err(err) => {
                    log::warn!("{operation} failed: {err:#}");
                    failures.push(StoreFailure {
                        store: store.name().to_string(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        Err(ExecutorError::Resolution { subject: subject.to_string(), failures })
    }

    /// Builds the root node for `subject`, whose resolved form is `resolved`.
    pub async fn traverse(
        &self,
        subject: &SubjectReference,
        resolved: &SubjectReference,
        artifact_types: &[String],
    ) -> Result<VerificationNode, ExecutorError> {
        let path = vec![resolved.digest().unwrap_or_default().to_string()];
        let expansion = self.expand(resolved, artifact_types, &path, 0).await?;
        let is_success = aggregate(self.adapters.policy.as_ref(), &[], &expansion.children)?;
        Ok(VerificationNode {
            subject: subject.to_string(),
            is_success,
            nested_results: expansion.children,
            store_errors: expansion.store_errors,
            ..Default::default()
        })
    }

    /// Lists the attachments of `subject` in every store and visits the ones
    /// the policy wants verified. Children come back in store order, then in
    /// listing order within a store.
    fn expand<'s>(
        &'s self,
        subject: &'s SubjectReference,
        artifact_types: &'s [String],
        path: &'s [String],
        depth: usize,
    ) -> BoxFuture<'s, Result<Expansion, ExecutorError>> {
        async move {
            let listing_calls: Vec<_> = self
                .adapters
                .stores
                .iter()
                .cloned()
                .map(|store| async move {
                    let listed =
                        list_all_attachments(store.as_ref(), subject, artifact_types, self.calls)
                            .await;
                    (store, listed)
                })
                .collect();
            let listings: Vec<StoreListing> =
                stream::iter(listing_calls).buffered(self.max_concurrency).collect().await;

            let mut store_errors = Vec::new();
            let mut pending = Vec::new();
            for (store, listed) in listings {
                match listed {
                    Ok(descriptors) => {
                        pending.extend(descriptors.into_iter().map(|found| (store.clone(), found)));
                    }
                    Err(err) => {
                        log::warn!(
                            "store {} could not list attachments of {subject}: {err:#}",
                            store.name()
                        );
                        store_errors.push(StoreFailure {
                            store: store.name().to_string(),
                            message: format!("{err:#}"),
                        });
                    }
                }
            }
            if store_errors.len() == self.adapters.stores.len() {
                return Err(ExecutorError::Listing {
                    subject: subject.to_string(),
                    failures: store_errors,
                });
            }

            let policy = self.adapters.policy.as_ref();
            let pending: Vec<_> = pending
                .into_iter()
                .filter(|(_, descriptor)| {
                    let needed = policy.verify_needed(subject, descriptor);
                    if !needed {
                        log::debug!(
                            "{} of {subject} does not need verification",
                            descriptor.digest
                        );
                    }
                    needed
                })
                .collect();

            let visits: Vec<_> = pending
                .iter()
                .map(|(store, descriptor)| {
                    self.visit(subject, store.as_ref(), descriptor.clone(), path, depth + 1)
                })
                .collect();
            let children =
                stream::iter(visits).buffered(self.max_concurrency).try_collect().await?;
            Ok(Expansion { children, store_errors })
        }
        .boxed()
    }

    /// Verifies one attachment of `parent` found at `depth` (the root's own
    /// attachments are at depth 1), then descends into its attachments if a
    /// verifier that ran asked for it.
    async fn visit(
        &self,
        parent: &SubjectReference,
        store: &dyn ReferrerStore,
        descriptor: AttachmentDescriptor,
        path: &[String],
        depth: usize,
    ) -> Result<VerificationNode, ExecutorError> {
        let policy = self.adapters.policy.as_ref();
        let attachment = parent.with_digest(&descriptor.digest);
        let mut node = VerificationNode {
            subject: attachment.to_string(),
            artifact_type: Some(descriptor.artifact_type.clone()),
            ..Default::default()
        };

        if path.contains(&descriptor.digest) {
            log::warn!("{} refers back to an ancestor, not descending", descriptor.digest);
            node.marker = Some(StructuralMarker::Cycle);
            node.is_success = aggregate(policy, &[], &[])?;
            return Ok(node);
        }

        let dispatch = self.dispatcher.dispatch(parent, &descriptor, store).await;

        if !dispatch.nested_artifact_types.is_empty() {
            if depth >= self.max_depth {
                log::warn!(
                    "not descending into {} at depth {depth}: maximum depth reached",
                    descriptor.digest
                );
                node.marker = Some(StructuralMarker::DepthLimit);
            } else {
                let mut child_path = path.to_vec();
                child_path.push(descriptor.digest.clone());
                let expansion = self
                    .expand(&attachment, &dispatch.nested_artifact_types, &child_path, depth)
                    .await?;
                node.nested_results = expansion.children;
                node.store_errors = expansion.store_errors;
            }
        }

        node.verifier_reports = dispatch.outcomes;
        node.is_success = aggregate(policy, &node.verifier_reports, &node.nested_results)?;
        Ok(node)
    }
}
