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
    AttachmentDescriptor, ReferrerStore, SubjectReference, VerificationOutcome, Verifier,
};
use serde::{Deserialize, Serialize};

use super::VerifierScope;

pub const SPDX_ARTIFACT_TYPE: &str = "application/spdx+json";
pub const SBOM_POLICY_VIOLATION: &str = "SBOM_POLICY_VIOLATION";

const VERIFIER_TYPE: &str = "sbom";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisallowedPackage {
    pub name: String,
    /// When absent every version of the package is disallowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbomSettings {
    #[serde(flatten)]
    pub scope: VerifierScope,
    #[serde(default)]
    pub disallowed_licenses: Vec<String>,
    #[serde(default)]
    pub disallowed_packages: Vec<DisallowedPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxDocument {
    #[serde(default)]
    packages: Vec<SpdxPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxPackage {
    name: String,
    #[serde(default)]
    version_info: Option<String>,
    #[serde(default)]
    license_concluded: Option<String>,
    #[serde(default)]
    license_declared: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct LicenseViolation {
    package: String,
    version: Option<String>,
    license: String,
}

/// Checks SPDX JSON documents against lists of disallowed licenses and
/// packages.
pub struct SbomVerifier {
    name: String,
    scope: VerifierScope,
    disallowed_licenses: Vec<String>,
    disallowed_packages: Vec<DisallowedPackage>,
}

impl SbomVerifier {
    pub fn new(name: &str, settings: SbomSettings) -> Self {
        Self {
            name: name.to_string(),
            scope: settings.scope.or_default_type(SPDX_ARTIFACT_TYPE),
            disallowed_licenses: settings
                .disallowed_licenses
                .iter()
                .map(|license| license.to_ascii_lowercase())
                .collect(),
            disallowed_packages: settings.disallowed_packages,
        }
    }

    fn license_violations(&self, package: &SpdxPackage) -> Vec<LicenseViolation> {
        let expressions =
            [package.license_concluded.as_deref(), package.license_declared.as_deref()];
        let mut violations: Vec<LicenseViolation> = Vec::new();
        for license in expressions.into_iter().flatten().flat_map(license_identifiers) {
            let disallowed = self.disallowed_licenses.contains(&license.to_ascii_lowercase());
            if disallowed && !violations.iter().any(|v| v.license == license) {
                violations.push(LicenseViolation {
                    package: package.name.clone(),
                    version: package.version_info.clone(),
                    license: license.to_string(),
                });
            }
        }
        violations
    }

    fn is_disallowed_package(&self, package: &SpdxPackage) -> bool {
        self.disallowed_packages.iter().any(|disallowed| {
            disallowed.name == package.name
                && disallowed
                    .version
                    .as_ref()
                    .map_or(true, |version| Some(version) == package.version_info.as_ref())
        })
    }
}

/// Splits an SPDX license expression into license identifiers, dropping
/// operators and parentheses.
fn license_identifiers(expression: &str) -> impl Iterator<Item = &str> {
    expression
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|token| !token.is_empty())
        .filter(|token| !matches!(*token, "AND" | "OR" | "WITH" | "and" | "or" | "with"))
        .filter(|token| !matches!(*token, "NOASSERTION" | "NONE"))
}

#[async_trait]
impl Verifier for SbomVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifier_type(&self) -> &str {
        VERIFIER_TYPE
    }

    fn can_verify(&self, descriptor: &AttachmentDescriptor) -> bool {
        self.scope.accepts(descriptor)
    }

    async fn verify(
        &self,
        subject: &SubjectReference,
        descriptor: &AttachmentDescriptor,
        store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerificationOutcome> {
        let manifest = store
            .fetch_manifest(subject, descriptor)
            .await
            .with_context(|| format!("fetching SBOM manifest {}", descriptor.digest))?;
        if manifest.blobs.is_empty() {
            anyhow::bail!("SBOM manifest {} has no blobs", descriptor.digest);
        }

        let mut license_violations = Vec::new();
        let mut package_violations = Vec::new();
        let mut package_count = 0;
        for blob in &manifest.blobs {
            let content = store
                .fetch_blob(subject, &blob.digest)
                .await
                .with_context(|| format!("fetching SBOM blob {}", blob.digest))?;
            let document: SpdxDocument = serde_json::from_slice(&content)
                .with_context(|| format!("parsing SPDX document {}", blob.digest))?;
            package_count += document.packages.len();
            for package in &document.packages {
                license_violations.extend(self.license_violations(package));
                if self.is_disallowed_package(package) {
                    package_violations.push(DisallowedPackage {
                        name: package.name.clone(),
                        version: package.version_info.clone(),
                    });
                }
            }
        }

        if license_violations.is_empty() && package_violations.is_empty() {
            return Ok(VerificationOutcome::success(
                &self.name,
                VERIFIER_TYPE,
                format!("SBOM with {package_count} packages complies with the license policy"),
            ));
        }
        Ok(VerificationOutcome::failure(
            &self.name,
            VERIFIER_TYPE,
            format!(
                "SBOM violates policy: {} disallowed licenses, {} disallowed packages",
                license_violations.len(),
                package_violations.len()
            ),
        )
        .with_error_reason(SBOM_POLICY_VIOLATION)
        .with_extensions(serde_json::json!({
            "licenseViolations": license_violations,
            "packageViolations": package_violations,
        })))
    }

    fn nested_artifact_types(&self) -> &[String] {
        &self.scope.nested_artifact_types
    }
}
