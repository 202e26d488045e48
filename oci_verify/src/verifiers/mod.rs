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

//! Built-in [`Verifier`](oci_verify_types::Verifier) implementations.

mod sbom;
mod signature;

use oci_verify_types::AttachmentDescriptor;
use serde::Deserialize;

pub use self::{
    sbom::{
        DisallowedPackage, SbomSettings, SbomVerifier, SBOM_POLICY_VIOLATION, SPDX_ARTIFACT_TYPE,
    },
    signature::{
        SignatureSettings, SignatureVerifier, SIGNATURE_ARTIFACT_TYPE, SIGNATURE_MALFORMED,
        SIGNATURE_MISMATCH, SUBJECT_MISMATCH,
    },
};

/// Which attachments a verifier accepts and which of their own attachments
/// it wants verified in turn. Shared by every configurable verifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierScope {
    #[serde(default)]
    pub artifact_types: Vec<String>,
    #[serde(default)]
    pub nested_artifact_types: Vec<String>,
}

impl VerifierScope {
    /// Uses `artifact_type` when no artifact types were configured.
    pub fn or_default_type(mut self, artifact_type: &str) -> Self {
        if self.artifact_types.is_empty() {
            self.artifact_types.push(artifact_type.to_string());
        }
        self
    }

    pub fn accepts(&self, descriptor: &AttachmentDescriptor) -> bool {
        self.artifact_types.iter().any(|t| *t == descriptor.artifact_type)
    }
}
