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

use serde::{Deserialize, Serialize};

use crate::{outcome::VerificationOutcome, policy::NestedVerdict};

/// Why traversal stopped below a node without consulting the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructuralMarker {
    /// The node's digest already appears on the path from the root.
    Cycle,
    /// Descending further would exceed the configured maximum depth.
    DepthLimit,
}

/// A store that could not list attachments for a node while other stores
/// could.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFailure {
    pub store: String,
    pub message: String,
}

/// One node of the result tree: a subject, the outcomes of verifiers run
/// against it, and the results for attachments of its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationNode {
    pub subject: String,
    pub is_success: bool,
    #[serde(default)]
    pub verifier_reports: Vec<VerificationOutcome>,
    #[serde(default)]
    pub nested_results: Vec<VerificationNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<StructuralMarker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_errors: Vec<StoreFailure>,
    #[serde(skip)]
    pub artifact_type: Option<String>,
}

impl VerificationNode {
    /// Summarizes this node for its parent's aggregation.
    pub fn verdict(&self) -> NestedVerdict {
        NestedVerdict {
            subject: self.subject.clone(),
            artifact_type: self.artifact_type.clone().unwrap_or_default(),
            is_success: self.is_success,
        }
    }

    /// Iterates over every node of the subtree, depth first, parents before
    /// children.
    pub fn walk(&self) -> Box<dyn Iterator<Item = &VerificationNode> + '_> {
        Box::new(
            core::iter::once(self).chain(self.nested_results.iter().flat_map(|child| child.walk())),
        )
    }
}

/// The final result of verifying a subject.
///
/// The root node's fields are flattened into the top level of the JSON
/// document, next to request metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    #[serde(flatten)]
    pub root: VerificationNode,
    #[serde(default)]
    pub subject_digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_types: Vec<String>,
    #[serde(default)]
    pub duration_millis: u64,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.root.is_success
    }
}
