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

//! Built-in [`ReferrerStore`] implementations and helpers shared by every
//! store consumer.

mod cache;
mod memory;
mod oci_layout;

use std::collections::HashSet;

use oci_verify_types::{AttachmentDescriptor, ReferrerStore, SubjectReference};

pub use self::{
    cache::{CachedStore, DEFAULT_CACHE_CAPACITY},
    memory::MemoryStore,
    oci_layout::{OciLayoutSettings, OciLayoutStore, REF_NAME_ANNOTATION},
};
use crate::call::AdapterCalls;

/// Follows the continuation tokens of `store` until the listing is
/// exhausted and returns the descriptors matching `artifact_types`, in
/// listing order.
///
/// Every page request goes through `calls`, so each one is individually
/// bounded in time. A store that hands out the same token twice is treated
/// as failing rather than looping forever.
pub async fn list_all_attachments(
    store: &dyn ReferrerStore,
    subject: &SubjectReference,
    artifact_types: &[String],
    calls: &AdapterCalls,
) -> anyhow::Result<Vec<AttachmentDescriptor>> {
    let mut descriptors = Vec::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;
    loop {
        let operation = format!("listing attachments of {subject} in store {}", store.name());
        let page = calls
            .run(&operation, store.list_attachments(subject, artifact_types, token.as_deref()))
            .await?;
        descriptors.extend(page.descriptors.into_iter().filter(|d| d.matches_any(artifact_types)));
        match page.next_token.filter(|next| !next.is_empty()) {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    anyhow::bail!(
                        "store {} repeated continuation token {next} for {subject}",
                        store.name()
                    );
                }
                token = Some(next);
            }
            None => break,
        }
    }
    log::debug!("store {} listed {} attachments of {subject}", store.name(), descriptors.len());
    Ok(descriptors)
}
