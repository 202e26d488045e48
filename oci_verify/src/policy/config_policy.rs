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

use oci_verify_types::{
    policy::error_outcome, AggregationItem, AttachmentDescriptor, ErrorContext, Policy,
    PolicyError, SubjectReference, VerificationOutcome,
};
use serde::{Deserialize, Serialize};

/// Key of the entry applied to artifact types without their own entry.
pub const DEFAULT_POLICY_KEY: &str = "default";

/// How the attachments of one artifact type combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPolicy {
    /// One successful attachment of the type is enough.
    Any,
    /// Every attachment of the type must pass.
    All,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPolicySettings {
    #[serde(default)]
    pub artifact_verification_policies: BTreeMap<String, ArtifactPolicy>,
}

/// A policy driven by a per-artifact-type table.
///
/// Attachments whose type has no entry (and no `default` entry exists) are
/// not verified at all. Verification of an `any` type continues after a
/// failure so that a later verifier can still succeed.
#[derive(Clone, Debug)]
pub struct ConfigPolicy {
    policies: BTreeMap<String, ArtifactPolicy>,
}

impl ConfigPolicy {
    pub fn new(policies: BTreeMap<String, ArtifactPolicy>) -> Result<Self, PolicyError> {
        if policies.is_empty() {
            return Err(PolicyError::Configuration(
                "artifactVerificationPolicies must name at least one artifact type".to_string(),
            ));
        }
        Ok(Self { policies })
    }

    pub fn from_settings(settings: &serde_json::Value) -> Result<Self, PolicyError> {
        let settings: ConfigPolicySettings = serde_json::from_value(settings.clone())
            .map_err(|err| PolicyError::Configuration(err.to_string()))?;
        Self::new(settings.artifact_verification_policies)
    }

    fn lookup(&self, artifact_type: &str) -> Option<ArtifactPolicy> {
        self.policies
            .get(artifact_type)
            .or_else(|| self.policies.get(DEFAULT_POLICY_KEY))
            .copied()
    }
}

impl Policy for ConfigPolicy {
    fn kind(&self) -> &'static str {
        "config"
    }

    fn verify_needed(&self, _: &SubjectReference, descriptor: &AttachmentDescriptor) -> bool {
        self.lookup(&descriptor.artifact_type).is_some()
    }

    fn continue_verify_on_failure(
        &self,
        _: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        _: &VerificationOutcome,
    ) -> bool {
        self.lookup(&descriptor.artifact_type) == Some(ArtifactPolicy::Any)
    }

    fn error_to_verify_result(
        &self,
        context: &ErrorContext,
        error: &anyhow::Error,
    ) -> VerificationOutcome {
        error_outcome(context, error)
    }

    fn overall_verify_result(&self, items: &[AggregationItem]) -> Result<bool, PolicyError> {
        if items.is_empty() {
            return Ok(false);
        }

        let mut by_type: BTreeMap<&str, Vec<bool>> = BTreeMap::new();
        for item in items {
            match item {
                AggregationItem::Outcome(outcome) => {
                    if !outcome.is_success {
                        return Ok(false);
                    }
                }
                AggregationItem::Nested(verdict) => by_type
                    .entry(verdict.artifact_type.as_str())
                    .or_default()
                    .push(verdict.is_success),
            }
        }

        Ok(by_type.into_iter().all(|(artifact_type, verdicts)| {
            match self.lookup(artifact_type).unwrap_or(ArtifactPolicy::All) {
                ArtifactPolicy::Any => verdicts.iter().any(|passed| *passed),
                ArtifactPolicy::All => verdicts.iter().all(|passed| *passed),
            }
        }))
    }
}
