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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Describes one object that references a subject (a signature, an SBOM, a
/// scan result, ...). Produced by stores and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub digest: String,
    #[serde(default)]
    pub artifact_type: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl AttachmentDescriptor {
    pub fn new(digest: &str, artifact_type: &str, media_type: &str, size: u64) -> Self {
        Self {
            digest: digest.to_string(),
            artifact_type: artifact_type.to_string(),
            media_type: media_type.to_string(),
            size,
            annotations: BTreeMap::new(),
        }
    }

    /// Returns true if the descriptor passes an artifact type filter. An
    /// empty filter accepts every type.
    pub fn matches_any(&self, artifact_types: &[String]) -> bool {
        artifact_types.is_empty() || artifact_types.iter().any(|t| *t == self.artifact_type)
    }
}

/// The manifest of an attachment: what it is and which blobs hold its
/// content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceManifest {
    #[serde(default)]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub blobs: Vec<AttachmentDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<AttachmentDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
